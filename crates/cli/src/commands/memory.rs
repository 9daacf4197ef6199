//! `taskloop memory`: direct access to long-term memory.

use std::sync::Arc;

use taskloop_core::event::EventBus;

use super::setup::{self, CmdResult};

pub async fn save(content: &str, offline: bool) -> CmdResult {
    let config = setup::load_config()?;
    if !(offline || config.memory.offline_embeddings) {
        setup::require_api_key(&config)?;
    }
    let memory = setup::open_memory(&config, offline, Arc::new(EventBus::default())).await?;

    let record = memory.save(content).await?;
    println!("  Saved memory {} ({} tokens)", record.id, record.token_count);
    Ok(())
}

pub async fn search(query: &str, k: Option<usize>, offline: bool) -> CmdResult {
    let config = setup::load_config()?;
    if !(offline || config.memory.offline_embeddings) {
        setup::require_api_key(&config)?;
    }
    let memory = setup::open_memory(&config, offline, Arc::new(EventBus::default())).await?;

    let k = k.unwrap_or(config.memory.retrieve_limit);
    println!("  Searching memories for: \"{query}\"");
    println!();

    let results = memory.retrieve(query, k).await?;
    if results.is_empty() {
        println!("  No memories found.");
    }
    for (i, scored) in results.iter().enumerate() {
        let content: String = scored.record.content.chars().take(80).collect();
        println!("  {:>2}. [similarity: {:.3}] {}", i + 1, scored.similarity, content);
    }
    Ok(())
}

pub async fn stats(offline: bool) -> CmdResult {
    let config = setup::load_config()?;
    if !(offline || config.memory.offline_embeddings) {
        setup::require_api_key(&config)?;
    }
    let memory = setup::open_memory(&config, offline, Arc::new(EventBus::default())).await?;

    println!("  Memory Statistics");
    println!("  =================");
    println!("  Backend:     {}", memory.backend_name());
    let embeddings = if offline {
        "feature-hashing (offline)"
    } else {
        config.memory.embedding_model.as_str()
    };
    println!("  Embeddings:  {embeddings}");
    println!("  Dimensions:  {}", memory.dimensions());
    println!("  Records:     {}", memory.count().await?);
    if config.memory.backend == "sqlite" {
        println!("  DB file:     {}", config.memory.resolved_path().display());
    }
    Ok(())
}
