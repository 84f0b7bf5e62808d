use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Flat name → value mapping handed to a tool handler.
pub type ToolArguments = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
}

impl ToolDescription {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            metadata: IndexMap::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool invocation failed: {0}")]
    Invocation(String),
    #[error("tool rejected input: {0}")]
    InvalidInput(String),
}

pub type ToolOutput = Result<String, ToolError>;

/// A named action the model can request. The orchestrator only knows that it
/// takes named arguments and yields text or an error.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn description(&self) -> &ToolDescription;
    async fn invoke(&self, args: ToolArguments) -> ToolOutput;
}

type ToolFn = dyn Fn(ToolArguments) -> ToolOutput + Send + Sync;

/// Adapts a synchronous closure into a [`ToolHandler`].
pub struct FnTool {
    description: ToolDescription,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(description: ToolDescription, func: F) -> Self
    where
        F: Fn(ToolArguments) -> ToolOutput + Send + Sync + 'static,
    {
        Self {
            description,
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl ToolHandler for FnTool {
    fn description(&self) -> &ToolDescription {
        &self.description
    }

    async fn invoke(&self, args: ToolArguments) -> ToolOutput {
        (self.func)(args)
    }
}

/// Reads a required string argument.
pub fn required_str<'a>(args: &'a ToolArguments, key: &str) -> Result<&'a str, ToolError> {
    match args.get(key) {
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(other) => Err(ToolError::InvalidInput(format!(
            "argument '{key}' must be a string, got {other}"
        ))),
        None => Err(ToolError::InvalidInput(format!(
            "missing required argument '{key}'"
        ))),
    }
}
