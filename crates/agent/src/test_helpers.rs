//! Shared test helpers for agent tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};
use taskloop_core::error::{ProviderError, ToolError};
use taskloop_core::message::ToolRequest;
use taskloop_core::provider::{Provider, ProviderRequest, ProviderResponse};
use taskloop_core::tool::{Tool, ToolRegistry};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given. Once the queue is empty the last
/// response repeats.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(mut responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        match responses.len() {
            0 => panic!("SequentialMockProvider: no responses scripted"),
            1 => responses[0].clone(),
            _ => responses.pop().unwrap(),
        }
    }
}

/// Create a response requesting the given tools.
pub fn tool_calls(calls: &[(&str, &str, Value)]) -> ProviderResponse {
    ProviderResponse::tools(
        calls
            .iter()
            .map(|(id, name, args)| ToolRequest::new(*id, *name, args.to_string()))
            .collect(),
    )
}

/// Echoes its arguments after sleeping `delay_ms`.
pub struct SlowEcho;

#[async_trait]
impl Tool for SlowEcho {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the text back"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string"},
                "delay_ms": {"type": "integer"}
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        if let Some(ms) = arguments["delay_ms"].as_u64() {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
        Ok(arguments["text"].clone())
    }
}

/// Returns its arguments as the payload.
pub struct Passthrough(pub &'static str);

#[async_trait]
impl Tool for Passthrough {
    fn name(&self) -> &str {
        self.0
    }

    fn description(&self) -> &str {
        "Return the arguments unchanged"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        Ok(arguments)
    }
}

pub fn registry() -> ToolRegistry {
    ToolRegistry::new()
        .with(Box::new(SlowEcho))
        .with(Box::new(Passthrough("lookup")))
        .with(Box::new(Passthrough("done")))
}
