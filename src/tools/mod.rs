//! Tool registry and the tools the agent can call.
//!
//! Every tool exposes a JSON schema that is advertised to the model on each
//! request. The registry turns a `(name, raw argument payload)` pair coming
//! from the model into text for the transcript; failures come back as
//! [`ToolError`] values the loop records instead of aborting.

mod weather;

pub use weather::GetWeather;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure of a single tool invocation. Never fatal to the session.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Malformed arguments for {tool}: {reason}")]
    MalformedArguments { tool: String, reason: String },

    #[error("Tool {tool} failed: {error:#}")]
    Execution { tool: String, error: anyhow::Error },
}

impl ToolError {
    pub fn malformed(tool: &str, reason: impl std::fmt::Display) -> Self {
        Self::MalformedArguments {
            tool: tool.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn execution(tool: &str, error: impl Into<anyhow::Error>) -> Self {
        Self::Execution {
            tool: tool.to_string(),
            error: error.into(),
        }
    }

    /// Stable kind tag, used in the tool-result text the model sees.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "UnknownTool",
            Self::MalformedArguments { .. } => "MalformedArguments",
            Self::Execution { .. } => "ToolExecutionError",
        }
    }

    /// Text appended to the transcript in place of a successful result.
    pub fn to_tool_content(&self) -> String {
        format!("Error ({}): {}", self.kind(), self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
}

/// A capability the model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to request this tool.
    fn name(&self) -> &str;

    /// Human-readable description for the model.
    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments.
    fn parameters_schema(&self) -> Value;

    /// Run the tool with already-parsed JSON arguments.
    ///
    /// Invalid argument shapes should be reported as
    /// [`ToolError::MalformedArguments`], not panics.
    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}

/// Schema advertised to the model for one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Deserialize tool arguments into a typed struct.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::malformed(tool, e))
}

/// Registry of available tools, kept in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in tools.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(Arc::new(GetWeather));
        registry
    }

    /// Register a tool. Names are never silently overwritten.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        if self.index.contains_key(tool.name()) {
            return Err(RegistryError::DuplicateTool(tool.name().to_string()));
        }
        self.insert(tool);
        Ok(())
    }

    /// Caller guarantees the name is not registered yet.
    fn insert(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!("Registered tool: {}", name);
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All schemas, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Look up a tool, parse its raw argument payload and run it.
    pub async fn invoke(&self, name: &str, raw_arguments: &str) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let args = parse_payload(name, raw_arguments)?;

        tool.execute(args).await
    }
}

/// An empty payload counts as an empty object; some models send `""` for
/// tools without parameters.
fn parse_payload(tool: &str, raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_json::from_str(raw).map_err(|e| ToolError::malformed(tool, e))?;
    if !value.is_object() {
        return Err(ToolError::malformed(tool, "arguments must be a JSON object"));
    }
    Ok(value)
}
