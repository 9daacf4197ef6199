//! # taskloop core
//!
//! Domain types, traits, and error definitions for the taskloop agent.
//! This crate defines the domain model that all other crates implement against.
//!
//! ## Design
//!
//! Every boundary is a trait here: [`Provider`] for completions, [`Embedder`]
//! for vectors, [`MemoryBackend`] for storage, [`Tool`] and [`ToolDispatcher`]
//! for handlers. Implementations live in their respective crates, so tests can
//! swap in scripted stand-ins for every network service.

pub mod embedding;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use embedding::Embedder;
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryBackend, MemoryRecord, ScoredMemory};
pub use message::{ToolRequest, Transcript, TranscriptId, Turn};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, Usage};
pub use tool::{Tool, ToolDeclaration, ToolDispatcher, ToolRegistry, ToolResult, TypedTool};
