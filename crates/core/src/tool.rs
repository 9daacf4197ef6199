//! Tool trait and registry: the name/argument contract between model and handlers.
//!
//! The model requests tools by name with a raw JSON argument string. The
//! registry resolves the name, parses and checks the arguments against the
//! declared required set, and only then invokes the handler. Every failure is
//! captured in a [`ToolResult`]; the agent loop never sees a raw error from a
//! handler.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ToolContractError, ToolError};
use crate::message::{ToolRequest, Turn};

/// What the model is told about a tool. Built once at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Unique tool name within an agent
    pub name: String,

    /// Description the model uses to pick the tool
    pub description: String,

    /// JSON Schema for the arguments object
    pub parameters: Value,

    /// Argument names that must be present
    #[serde(default)]
    pub required: Vec<String>,
}

impl ToolDeclaration {
    /// Build a declaration, taking the required set from the schema's `required` array.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        let required = parameters["required"]
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            required,
        }
    }
}

/// A tool handler working on untyped JSON arguments.
///
/// Arguments reaching `execute` are always a JSON object with every
/// required key present.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "getWeather").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with validated arguments.
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError>;

    fn to_declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// A tool handler with a concrete argument type.
///
/// Register with [`ToolRegistry::register_typed`]; arguments that do not
/// deserialize into `Args` are rejected as a contract error before `call` runs.
#[async_trait]
pub trait TypedTool: Send + Sync + 'static {
    type Args: DeserializeOwned + Send;
    type Output: Serialize + Send;

    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    async fn call(&self, args: Self::Args) -> Result<Self::Output, ToolError>;
}

struct Typed<T>(T);

#[async_trait]
impl<T: TypedTool> Tool for Typed<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    fn parameters_schema(&self) -> Value {
        self.0.parameters_schema()
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: T::Args = serde_json::from_value(arguments).map_err(|e| {
            ToolContractError::MalformedArguments {
                tool: self.0.name().to_string(),
                reason: e.to_string(),
            }
        })?;
        let output = self.0.call(args).await?;
        serde_json::to_value(output).map_err(|e| ToolError::execution(self.0.name(), e))
    }
}

/// The outcome of one tool request.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// The request this result answers
    pub request_id: String,

    pub tool_name: String,

    pub outcome: Result<Value, ToolError>,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_fatal(&self) -> bool {
        matches!(&self.outcome, Err(e) if e.is_fatal())
    }

    /// Text placed in the transcript. Errors carry an `Error:` marker.
    pub fn content(&self) -> String {
        match &self.outcome {
            Ok(Value::String(s)) => s.clone(),
            Ok(value) => value.to_string(),
            Err(e) => format!("Error: {e}"),
        }
    }

    pub fn to_turn(&self) -> Turn {
        Turn::tool_result(
            self.request_id.clone(),
            self.tool_name.clone(),
            self.content(),
            !self.is_success(),
        )
    }
}

/// Executes tool requests on behalf of the agent loop.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Declarations sent to the model with every request.
    fn declarations(&self) -> Vec<ToolDeclaration>;

    /// Validate and run one request. Never fails: errors land in the result.
    async fn dispatch(&self, request: &ToolRequest) -> ToolResult;

    /// Run all requests of one turn concurrently. Results come back in
    /// request order regardless of completion order.
    async fn dispatch_all(&self, requests: &[ToolRequest]) -> Vec<ToolResult> {
        join_all(requests.iter().map(|request| self.dispatch(request))).await
    }
}

struct Registered {
    tool: Box<dyn Tool>,
    declaration: ToolDeclaration,
}

/// A registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let declaration = tool.to_declaration();
        let name = declaration.name.clone();
        if self.tools.contains_key(&name) {
            warn!(tool = %name, "Replacing previously registered tool");
        }
        self.tools.insert(name, Registered { tool, declaration });
    }

    /// Register a tool with typed arguments.
    pub fn register_typed<T: TypedTool>(&mut self, tool: T) {
        self.register(Box::new(Typed(tool)));
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: Box<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn with_typed<T: TypedTool>(mut self, tool: T) -> Self {
        self.register_typed(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|r| r.tool.as_ref())
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve the tool and check `raw_arguments` against its declaration.
    pub fn validate(
        &self,
        name: &str,
        raw_arguments: &str,
    ) -> Result<(&dyn Tool, Value), ToolContractError> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| ToolContractError::UnknownTool(name.to_string()))?;

        let arguments = if raw_arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str::<Value>(raw_arguments).map_err(|e| {
                ToolContractError::MalformedArguments {
                    tool: name.to_string(),
                    reason: e.to_string(),
                }
            })?
        };

        let Some(object) = arguments.as_object() else {
            return Err(ToolContractError::MalformedArguments {
                tool: name.to_string(),
                reason: "arguments must be a JSON object".into(),
            });
        };

        if let Some(missing) = registered
            .declaration
            .required
            .iter()
            .find(|key| object.get(key.as_str()).is_none_or(Value::is_null))
        {
            return Err(ToolContractError::MissingArgument {
                tool: name.to_string(),
                argument: missing.clone(),
            });
        }

        Ok((registered.tool.as_ref(), arguments))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(|r| r.declaration.clone()).collect()
    }

    async fn dispatch(&self, request: &ToolRequest) -> ToolResult {
        let outcome = match self.validate(&request.name, &request.arguments) {
            Ok((tool, arguments)) => {
                debug!(tool = %request.name, request_id = %request.id, "Executing tool");
                tool.execute(arguments).await
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &outcome {
            warn!(tool = %request.name, request_id = %request.id, error = %e, "Tool call failed");
        }

        ToolResult {
            request_id: request.id.clone(),
            tool_name: request.name.clone(),
            outcome,
        }
    }
}
