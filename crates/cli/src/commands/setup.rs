//! Wiring shared by the commands: config, memory, provider and agent.

use std::error::Error;
use std::sync::Arc;

use taskloop_agent::AgentLoop;
use taskloop_config::AppConfig;
use taskloop_core::embedding::Embedder;
use taskloop_core::event::{DomainEvent, EventBus};
use taskloop_core::memory::MemoryBackend;
use taskloop_memory::{HashingEmbedder, InMemoryBackend, SqliteBackend, VectorMemory};
use taskloop_tools::{Notepad, NotepadTool};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

pub type CmdResult<T = ()> = Result<T, Box<dyn Error>>;

pub fn load_config() -> CmdResult<AppConfig> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

/// Fail early with setup instructions when no key is configured.
pub fn require_api_key(config: &AppConfig) -> CmdResult {
    // Local runtimes accept any key.
    if config.has_api_key() || matches!(config.provider.as_str(), "ollama" | "vllm") {
        return Ok(());
    }
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    TASKLOOP_API_KEY = 'sk-...'");
    eprintln!("    OPENAI_API_KEY   = 'sk-...'");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    Err("No API key found. See above for setup instructions.".into())
}

/// Open the configured memory store.
pub async fn open_memory(
    config: &AppConfig,
    offline: bool,
    event_bus: Arc<EventBus>,
) -> CmdResult<Arc<VectorMemory>> {
    let dims = config.memory.dimensions;

    let embedder: Arc<dyn Embedder> = if offline || config.memory.offline_embeddings {
        Arc::new(HashingEmbedder::new(dims))
    } else {
        taskloop_providers::build_embedder(config)?
    };

    let backend: Arc<dyn MemoryBackend> = match config.memory.backend.as_str() {
        "in_memory" => Arc::new(InMemoryBackend::new(dims)),
        _ => {
            let path = config.memory.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let url = format!("sqlite://{}", path.display());
            Arc::new(SqliteBackend::new(&url, dims).await?)
        }
    };

    Ok(Arc::new(VectorMemory::new(embedder, backend)?.with_event_bus(event_bus)))
}

/// The configured notepad, if any.
pub fn notepad(config: &AppConfig) -> Option<Notepad> {
    config.memory.notepad.clone().map(Notepad::new)
}

/// The agent with the memory tools, the completion sentinel and, when
/// configured, the notepad tool.
pub fn build_agent(
    config: &AppConfig,
    memory: Arc<VectorMemory>,
    event_bus: Arc<EventBus>,
) -> CmdResult<AgentLoop> {
    let provider = taskloop_providers::build_provider(config)?;
    let mut registry = taskloop_tools::memory_registry(memory, config.memory.retrieve_limit);
    if let Some(notepad) = notepad(config) {
        registry.register_typed(NotepadTool::new(notepad));
    }
    Ok(AgentLoop::from_config(provider, Arc::new(registry), config).with_event_bus(event_bus))
}

/// Log domain events at debug level until the bus is dropped.
pub fn spawn_event_logger(event_bus: &EventBus) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event logger lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event.as_ref() {
                DomainEvent::ToolDispatched {
                    tool_name,
                    success,
                    duration_ms,
                    ..
                } => debug!(tool = %tool_name, success, duration_ms, "Tool dispatched"),
                DomainEvent::MemorySaved { id, token_count, .. } => {
                    debug!(%id, token_count, "Memory saved")
                }
                other => debug!(event = ?other, "Event"),
            }
        }
    });
}
