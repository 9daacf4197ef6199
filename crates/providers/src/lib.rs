//! Completion and embedding clients for taskloop.
//!
//! All completion clients implement `taskloop_core::Provider` and all
//! embedding clients implement `taskloop_core::Embedder`. The builder
//! picks the endpoint from configuration.

pub mod builder;
pub mod embedding;
mod http;
pub mod openai_compat;
pub mod retry;

pub use builder::{build_embedder, build_provider};
pub use embedding::OpenAiEmbedder;
pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryingEmbedder, RetryingProvider};
