//! Memory tools: let the agent save to and search its long-term memory.
//!
//! Both tools share one [`VectorMemory`]. An embedding-service failure is
//! reported as a fatal [`ToolError::Embedding`]; the agent loop ends the run
//! rather than showing the model a half-working memory.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use taskloop_core::error::{MemoryError, ToolError};
use taskloop_core::tool::TypedTool;
use taskloop_memory::VectorMemory;
use tracing::info;

pub const SAVE_MEMORY: &str = "saveMemory";
pub const GET_MEMORY: &str = "getMemory";

fn tool_error(tool_name: &str, error: MemoryError) -> ToolError {
    match error {
        MemoryError::Embedding(source) => ToolError::Embedding {
            tool_name: tool_name.into(),
            source,
        },
        other => ToolError::execution(tool_name, other),
    }
}

/// `saveMemory { content }`: embed and persist a new memory.
pub struct SaveMemoryTool {
    memory: Arc<VectorMemory>,
}

impl SaveMemoryTool {
    pub fn new(memory: Arc<VectorMemory>) -> Self {
        Self { memory }
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveMemoryArgs {
    pub content: String,
}

#[async_trait]
impl TypedTool for SaveMemoryTool {
    type Args = SaveMemoryArgs;
    type Output = String;

    fn name(&self) -> &str {
        SAVE_MEMORY
    }

    fn description(&self) -> &str {
        "Use this function to save a memory to your long term memory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The content to save to your long term memory."
                }
            },
            "required": ["content"]
        })
    }

    async fn call(&self, args: SaveMemoryArgs) -> Result<String, ToolError> {
        let record = self
            .memory
            .save(&args.content)
            .await
            .map_err(|e| tool_error(SAVE_MEMORY, e))?;
        info!(id = %record.id, tokens = record.token_count, "Saved memory");
        Ok("Memory saved successfully.".into())
    }
}

/// `getMemory { query, limit? }`: the most similar memories, one per line.
pub struct GetMemoryTool {
    memory: Arc<VectorMemory>,
    default_limit: usize,
}

impl GetMemoryTool {
    pub fn new(memory: Arc<VectorMemory>, default_limit: usize) -> Self {
        Self {
            memory,
            default_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GetMemoryArgs {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[async_trait]
impl TypedTool for GetMemoryTool {
    type Args = GetMemoryArgs;
    type Output = String;

    fn name(&self) -> &str {
        GET_MEMORY
    }

    fn description(&self) -> &str {
        "Use this function to get a memory from your long term memory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The query to search your long term memory."
                },
                "limit": {
                    "type": "integer",
                    "description": format!("Maximum number of memories to return (default {})", self.default_limit)
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: GetMemoryArgs) -> Result<String, ToolError> {
        let k = args.limit.unwrap_or(self.default_limit);
        let memories = self
            .memory
            .retrieve(&args.query, k)
            .await
            .map_err(|e| tool_error(GET_MEMORY, e))?;

        if memories.is_empty() {
            return Ok("No memories found.".into());
        }
        Ok(memories
            .iter()
            .map(|m| m.record.content.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskloop_core::embedding::Embedder;
    use taskloop_core::error::EmbeddingError;
    use taskloop_core::message::ToolRequest;
    use taskloop_core::tool::{ToolDispatcher, ToolRegistry};
    use taskloop_memory::{HashingEmbedder, InMemoryBackend};

    fn memory() -> Arc<VectorMemory> {
        Arc::new(
            VectorMemory::new(
                Arc::new(HashingEmbedder::new(64)),
                Arc::new(InMemoryBackend::new(64)),
            )
            .unwrap(),
        )
    }

    fn registry(memory: Arc<VectorMemory>) -> ToolRegistry {
        ToolRegistry::new()
            .with_typed(SaveMemoryTool::new(memory.clone()))
            .with_typed(GetMemoryTool::new(memory, 5))
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        fn model(&self) -> &str {
            "down"
        }
        fn dimensions(&self) -> usize {
            64
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Network("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn save_then_get() {
        let memory = memory();
        let registry = registry(memory.clone());

        let saved = registry
            .dispatch(&ToolRequest::new("c1", SAVE_MEMORY, r#"{"content":"My dog is named Rex"}"#))
            .await;
        assert!(saved.is_success());
        assert_eq!(saved.content(), "Memory saved successfully.");
        assert_eq!(memory.count().await.unwrap(), 1);

        let found = registry
            .dispatch(&ToolRequest::new("c2", GET_MEMORY, r#"{"query":"dog named Rex"}"#))
            .await;
        assert_eq!(found.content(), "My dog is named Rex");
    }

    #[tokio::test]
    async fn get_on_empty_store() {
        let registry = registry(memory());
        let result = registry
            .dispatch(&ToolRequest::new("c1", GET_MEMORY, r#"{"query":"anything"}"#))
            .await;
        assert!(result.is_success());
        assert_eq!(result.content(), "No memories found.");
    }

    #[tokio::test]
    async fn limit_caps_results() {
        let memory = memory();
        for fact in ["red apples", "green apples", "yellow apples"] {
            memory.save(fact).await.unwrap();
        }
        let registry = registry(memory);
        let result = registry
            .dispatch(&ToolRequest::new("c1", GET_MEMORY, r#"{"query":"apples","limit":2}"#))
            .await;
        assert_eq!(result.content().lines().count(), 2);
    }

    #[tokio::test]
    async fn missing_content_is_contract_error() {
        let registry = registry(memory());
        let result = registry.dispatch(&ToolRequest::new("c1", SAVE_MEMORY, "{}")).await;
        assert!(!result.is_success());
        assert!(!result.is_fatal());
    }

    #[tokio::test]
    async fn embedding_outage_is_fatal() {
        let memory = Arc::new(
            VectorMemory::new(Arc::new(DownEmbedder), Arc::new(InMemoryBackend::new(64))).unwrap(),
        );
        let registry = registry(memory);
        let result = registry
            .dispatch(&ToolRequest::new("c1", SAVE_MEMORY, r#"{"content":"lost"}"#))
            .await;
        assert!(result.is_fatal());
    }
}
