use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, FuturesUnordered};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use super::registry::LabRegistry;
use super::types::{
    parse_args, value_text, ArgSpec, ExecutionResult, LabArgs, LabError, LabModule, ModuleSpec,
};

pub fn register_builtin_modules(registry: &LabRegistry) {
    registry.register(Arc::new(FooModule));
    registry.register(Arc::new(EchoModule));
    registry.register(Arc::new(BazModule));
}

/// 演示用模块：按顺序逐条产出四条消息
struct FooModule;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FooArgs {
    arg1: Value,
    arg2: Value,
}

impl LabModule for FooModule {
    fn name(&self) -> &str {
        "foo"
    }

    fn spec(&self) -> Result<ModuleSpec, LabError> {
        Ok(ModuleSpec {
            module: "foo".to_string(),
            description: "Foo module for demonstration purposes".to_string(),
            args: [
                ("arg1", "First argument for foo module"),
                ("arg2", "Second argument for foo module"),
            ]
            .into_iter()
            .map(|(k, d)| (k.to_string(), ArgSpec::new(d)))
            .collect(),
        })
    }

    fn main(&self, args: LabArgs) -> Result<ExecutionResult, LabError> {
        let FooArgs { arg1, arg2 } = parse_args(self.name(), args)?;
        let (arg1, arg2) = (value_text(&arg1), value_text(&arg2));

        let messages = vec![
            "foo: received arguments".to_string(),
            format!("foo: arg1 = {arg1}"),
            format!("foo: arg2 = {arg2}"),
            format!("foo {arg1} {arg2}"),
        ];
        Ok(ExecutionResult::Stream(
            stream::iter(messages.into_iter().map(Ok::<_, LabError>)).boxed(),
        ))
    }
}

/// Returns a single value instead of a stream.
struct EchoModule;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EchoArgs {
    text: Value,
}

impl LabModule for EchoModule {
    fn name(&self) -> &str {
        "echo"
    }

    fn spec(&self) -> Result<ModuleSpec, LabError> {
        Ok(ModuleSpec {
            module: "echo".to_string(),
            description: "Echoes its argument back as a single message".to_string(),
            args: [("text".to_string(), ArgSpec::new("Text to echo back"))]
                .into_iter()
                .collect(),
        })
    }

    fn main(&self, args: LabArgs) -> Result<ExecutionResult, LabError> {
        let EchoArgs { text } = parse_args(self.name(), args)?;
        Ok(ExecutionResult::Scalar(value_text(&text)))
    }
}

const BAZ_DEFAULT_UNIT_MS: u64 = 100;

/// Three waits run concurrently; messages arrive in completion order.
struct BazModule;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BazArgs {
    #[serde(default)]
    unit_ms: Option<u64>,
}

impl LabModule for BazModule {
    fn name(&self) -> &str {
        "baz"
    }

    fn spec(&self) -> Result<ModuleSpec, LabError> {
        Ok(ModuleSpec {
            module: "baz".to_string(),
            description: "Runs three waits of 3, 2 and 1 units concurrently".to_string(),
            args: [(
                "unit_ms".to_string(),
                ArgSpec::new("Length of one unit in milliseconds (default 100)"),
            )]
            .into_iter()
            .collect(),
        })
    }

    fn main(&self, args: LabArgs) -> Result<ExecutionResult, LabError> {
        let BazArgs { unit_ms } = parse_args(self.name(), args)?;
        let unit = Duration::from_millis(unit_ms.unwrap_or(BAZ_DEFAULT_UNIT_MS));

        let waits: FuturesUnordered<_> = [3u32, 2, 1]
            .into_iter()
            .map(|units| async move {
                tokio::time::sleep(unit * units).await;
                Ok::<_, LabError>(format!(
                    "waited {} units, now={}",
                    units,
                    chrono::Local::now().format("%H:%M:%S%.3f")
                ))
            })
            .collect();
        Ok(ExecutionResult::Stream(waits.boxed()))
    }
}
