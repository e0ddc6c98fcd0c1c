use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{LabError, LabModule, ModuleSpec};

/// 模块名 -> 插件实现。每次调用都重新查表，注册/替换后下一次请求即生效
#[derive(Default)]
pub struct LabRegistry {
    modules: DashMap<String, Arc<dyn LabModule>>,
}

impl LabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_modules() -> Self {
        let registry = Self::new();
        super::register_builtin_modules(&registry);
        registry
    }

    /// Registers `module` under its own name, returning the unit it replaced.
    pub fn register(&self, module: Arc<dyn LabModule>) -> Option<Arc<dyn LabModule>> {
        let name = module.name().to_string();
        let previous = self.modules.insert(name.clone(), module);
        if previous.is_some() {
            info!("Replaced lab module: {}", name);
        } else {
            debug!("Registered lab module: {}", name);
        }
        previous
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn LabModule>, LabError> {
        // Clone the Arc out so no map guard outlives the lookup.
        match self.modules.get(name).map(|r| r.value().clone()) {
            Some(module) => Ok(module),
            None => {
                debug!("Lab module not found: {}", name);
                Err(LabError::ModuleNotFound(name.to_string()))
            }
        }
    }

    pub fn get_spec(&self, name: &str) -> Result<ModuleSpec, LabError> {
        self.resolve(name)?.spec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::types::{ArgSpec, LabArgs};

    struct Versioned(&'static str);

    impl LabModule for Versioned {
        fn name(&self) -> &str {
            "versioned"
        }

        fn spec(&self) -> Result<ModuleSpec, LabError> {
            Ok(ModuleSpec {
                module: self.name().to_string(),
                description: self.0.to_string(),
                args: [("x".to_string(), ArgSpec::new("x"))].into_iter().collect(),
            })
        }
    }

    struct Bare;

    impl LabModule for Bare {
        fn name(&self) -> &str {
            "bare"
        }
    }

    #[test]
    fn builtin_specs_match_their_names() {
        let registry = LabRegistry::with_builtin_modules();
        let names = registry.names();
        assert!(names.contains(&"foo".to_string()));
        for name in names {
            let spec = registry.get_spec(&name).unwrap();
            assert_eq!(spec.module, name);
            assert!(!spec.description.is_empty());
        }
    }

    #[test]
    fn foo_spec_is_stable() {
        let registry = LabRegistry::with_builtin_modules();
        let spec = registry.get_spec("foo").unwrap();
        assert_eq!(spec.description, "Foo module for demonstration purposes");
        assert_eq!(
            spec.args.keys().cloned().collect::<Vec<_>>(),
            vec!["arg1".to_string(), "arg2".to_string()]
        );
        // Pure: a second lookup yields an equal spec.
        assert_eq!(registry.get_spec("foo").unwrap(), spec);
    }

    #[test]
    fn unknown_module_is_not_found() {
        let registry = LabRegistry::with_builtin_modules();
        assert_eq!(
            registry.get_spec("missing").unwrap_err(),
            LabError::ModuleNotFound("missing".to_string())
        );
        assert!(registry.resolve("").is_err());
    }

    #[test]
    fn missing_operations_are_reported_distinctly() {
        let registry = LabRegistry::new();
        registry.register(Arc::new(Bare));

        assert_eq!(
            registry.get_spec("bare").unwrap_err(),
            LabError::SpecUnavailable("bare".to_string())
        );
        let module = registry.resolve("bare").unwrap();
        assert!(matches!(
            module.main(LabArgs::new()),
            Err(LabError::EntryPointUnavailable(name)) if name == "bare"
        ));
    }

    #[test]
    fn replacement_takes_effect_on_next_lookup() {
        let registry = LabRegistry::new();
        assert!(registry.register(Arc::new(Versioned("v1"))).is_none());
        assert_eq!(registry.get_spec("versioned").unwrap().description, "v1");

        assert!(registry.register(Arc::new(Versioned("v2"))).is_some());
        assert_eq!(registry.get_spec("versioned").unwrap().description, "v2");
    }
}
