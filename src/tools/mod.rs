pub mod file;
pub mod web;
pub mod workspace;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AgentError, Result};

pub use workspace::Workspace;

/// Output from a tool execution.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }

    /// Successful structured output, serialized to JSON text for the model.
    pub fn json(value: &Value) -> Self {
        Self::ok(value.to_string())
    }
}

/// A function call emitted by the model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    /// JSON object text; validated against the tool's schema at dispatch.
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

/// The answer to one [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    pub output: String,
}

/// Shared resources passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub workspace: Workspace,
    pub http_client: reqwest::Client,
}

// -- Parameter schema ------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
}

impl ParamType {
    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

/// Flat, ordered mapping of parameter name to its spec.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSchema {
    params: Vec<(String, ParamSpec)>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.param(name, kind, description, true)
    }

    pub fn optional(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.param(name, kind, description, false)
    }

    fn param(mut self, name: &str, kind: ParamType, description: &str, required: bool) -> Self {
        self.params.push((
            name.to_string(),
            ParamSpec {
                kind,
                description: description.to_string(),
                required,
            },
        ));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Render as a JSON Schema object for the model.
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.params {
            properties.insert(
                name.clone(),
                serde_json::json!({
                    "type": spec.kind.as_str(),
                    "description": spec.description,
                }),
            );
            if spec.required {
                required.push(Value::String(name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check that `args` names exactly the declared parameters with the
    /// declared types.  `null` is treated as an omitted optional value.
    pub fn validate(&self, args: &Arguments) -> Result<()> {
        for key in args.0.keys() {
            if self.get(key).is_none() {
                return Err(AgentError::InvalidArguments(format!(
                    "unexpected parameter '{key}'"
                )));
            }
        }
        for (name, spec) in &self.params {
            match args.0.get(name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(AgentError::InvalidArguments(format!(
                        "missing required parameter '{name}'"
                    )));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(AgentError::InvalidArguments(format!(
                        "parameter '{name}' must be of type {}",
                        spec.kind.as_str()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Parsed call arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    /// Parse the model's argument text.  Empty text and `null` mean no
    /// arguments; anything other than a JSON object is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| AgentError::InvalidArguments(format!("arguments are not valid JSON: {e}")))?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(AgentError::InvalidArguments(format!(
                "arguments must be a JSON object, got {other}"
            ))),
        }
    }

    #[cfg(test)]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        self.0.get(name).and_then(Value::as_u64)
    }
}

// -- Tools ------------------------------------------------------------------

/// Metadata and behavior shared by every built-in tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of the tool (e.g. "read_file").
    fn name(&self) -> &'static str;

    /// Human-readable description handed to the model.
    fn description(&self) -> &'static str;

    fn parameters(&self) -> ParameterSchema;

    /// Run the tool.  Expected failures (missing file, mismatch) come back as
    /// `Ok(ToolOutput::error(..))`; `Err` is reserved for unexpected ones.
    async fn execute(&self, args: &Arguments, ctx: &ToolContext) -> Result<ToolOutput>;
}

/// The closed set of tools this agent can run.
#[derive(Debug, Clone)]
pub enum ToolHandler {
    ListFilesInDir(file::ListFilesTool),
    ReadFile(file::ReadFileTool),
    EditFile(file::EditFileTool),
    FetchUrl(web::FetchUrlTool),
}

impl ToolHandler {
    fn tool(&self) -> &dyn Tool {
        match self {
            Self::ListFilesInDir(t) => t,
            Self::ReadFile(t) => t,
            Self::EditFile(t) => t,
            Self::FetchUrl(t) => t,
        }
    }

    pub async fn invoke(&self, args: &Arguments, ctx: &ToolContext) -> Result<ToolOutput> {
        self.tool().execute(args, ctx).await
    }
}

/// Registry entry: everything the model is told about a tool plus the code
/// that runs it.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
    pub handler: ToolHandler,
}

impl From<ToolHandler> for ToolDefinition {
    fn from(handler: ToolHandler) -> Self {
        let tool = handler.tool();
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
            handler,
        }
    }
}

/// Function declaration as handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Registry of all available tools, in registration order.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.  A second tool with the same name is a configuration
    /// error.
    pub fn register(&mut self, definition: impl Into<ToolDefinition>) -> Result<()> {
        let definition = definition.into();
        if self.index.contains_key(&definition.name) {
            return Err(AgentError::Config(format!(
                "duplicate tool name: {}",
                definition.name
            )));
        }
        self.index.insert(definition.name.clone(), self.tools.len());
        self.tools.push(definition);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Declarations for every registered tool, in registration order.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .iter()
            .map(|t| ToolDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.to_json(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Run a model-requested call.  Never fails: every problem, from an
    /// unknown name to an I/O error inside the handler, becomes error text
    /// in the returned result.
    pub async fn dispatch(&self, call: &ToolCallRequest, ctx: &ToolContext) -> ToolResult {
        let output = match self.try_dispatch(call, ctx).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.call_id, err = %e, "tool call failed");
                ToolOutput::error(e.to_string())
            }
        };
        ToolResult {
            call_id: call.call_id.clone(),
            success: output.success,
            output: output.output,
        }
    }

    async fn try_dispatch(&self, call: &ToolCallRequest, ctx: &ToolContext) -> Result<ToolOutput> {
        let definition = self
            .resolve(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        let args = Arguments::parse(&call.arguments)?;
        definition.parameters.validate(&args)?;
        debug!(tool = %call.name, call_id = %call.call_id, "executing tool call");
        definition.handler.invoke(&args, ctx).await
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

/// Build the tool registry from config.
pub fn build_registry(config: &Config) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    registry.register(ToolHandler::ListFilesInDir(file::ListFilesTool))?;
    registry.register(ToolHandler::ReadFile(file::ReadFileTool))?;
    registry.register(ToolHandler::EditFile(file::EditFileTool::new(
        config.tools.edit.replace,
    )))?;

    if config.tools.fetch_url.enabled {
        registry.register(ToolHandler::FetchUrl(web::FetchUrlTool::new(
            config.tools.fetch_url.max_chars,
        )))?;
    }

    Ok(registry)
}
