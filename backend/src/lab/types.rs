use std::collections::BTreeMap;

use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type LabArgs = Map<String, Value>;

/// Lazily produced progress messages; an `Err` item ends the run.
pub type MessageStream = BoxStream<'static, Result<String, LabError>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabError {
    #[error("Module '{0}' not found in lab directory")]
    ModuleNotFound(String),
    #[error("Module '{0}' does not have a 'spec' function")]
    SpecUnavailable(String),
    #[error("Module '{0}' does not have a 'main' function")]
    EntryPointUnavailable(String),
    #[error("ERROR: {0}")]
    PluginRuntime(String),
    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub description: String,
}

impl ArgSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub module: String,
    pub description: String,
    #[serde(default)]
    pub args: BTreeMap<String, ArgSpec>,
}

/// `main` 的返回值：单个值，或逐条产出的消息流
pub enum ExecutionResult {
    Scalar(String),
    Stream(MessageStream),
}

/// A lab plugin. Both operations are optional; the defaults report them as missing.
pub trait LabModule: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> Result<ModuleSpec, LabError> {
        Err(LabError::SpecUnavailable(self.name().to_string()))
    }

    fn main(&self, _args: LabArgs) -> Result<ExecutionResult, LabError> {
        Err(LabError::EntryPointUnavailable(self.name().to_string()))
    }
}

/// POST body of the lab endpoint after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub module: String,
    pub args: LabArgs,
}

impl ExecutionRequest {
    pub fn from_value(body: Value) -> Result<Self, LabError> {
        let Value::Object(mut body) = body else {
            return Err(LabError::Validation(
                "request body must be a JSON object".to_string(),
            ));
        };

        let module = match body.remove("module") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::String(_)) | None | Some(Value::Null) => {
                return Err(LabError::Validation("module is required".to_string()))
            }
            Some(_) => {
                return Err(LabError::Validation("module must be a string".to_string()))
            }
        };

        let args = match body.remove("args") {
            None | Some(Value::Null) => LabArgs::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(LabError::Validation(
                    "args must be a mapping".to_string(),
                ))
            }
        };

        Ok(Self { module, args })
    }
}

/// Deserialize the keyword arguments of a module; a mismatch is the plugin's runtime error,
/// the same way a bad call signature would be.
pub fn parse_args<T: DeserializeOwned>(module: &str, args: LabArgs) -> Result<T, LabError> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| LabError::PluginRuntime(format!("{module}.main(): {e}")))
}

/// Text form of an argument value: strings verbatim, everything else as JSON.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
