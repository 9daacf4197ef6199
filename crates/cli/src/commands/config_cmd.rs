//! `taskloop config`: configuration management commands.

use taskloop_config::AppConfig;

use super::setup::CmdResult;

pub fn init() -> CmdResult {
    let dir = AppConfig::config_dir();
    let path = dir.join("config.toml");
    if path.exists() {
        println!("  Config already exists at {}", path.display());
        return Ok(());
    }
    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("  Wrote default config to {}", path.display());
    Ok(())
}

/// Load and validate the config, then check the provider is reachable.
pub async fn validate() -> CmdResult {
    println!("  Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("  Config parsed successfully");
            if !config.has_api_key() {
                println!("  Warning: no API key set (set TASKLOOP_API_KEY or OPENAI_API_KEY)");
            }
            println!();
            println!("  Provider:    {}", config.provider);
            println!("  Base URL:    {}", config.resolved_base_url());
            println!("  Model:       {}", config.model);
            println!("  Iterations:  {}", config.agent.max_iterations);
            println!("  Sentinel:    {}", config.agent.sentinel.as_deref().unwrap_or("(none)"));
            println!(
                "  Memory:      {} ({} dims, {})",
                config.memory.backend, config.memory.dimensions, config.memory.embedding_model
            );
            println!();
            match taskloop_providers::build_provider(&config) {
                Ok(provider) => match provider.health_check().await {
                    Ok(true) => println!("  Provider reachable"),
                    Ok(false) => println!("  Provider responded with an error"),
                    Err(e) => println!("  Provider unreachable: {e}"),
                },
                Err(e) => println!("  Provider not configured: {e}"),
            }
            Ok(())
        }
        Err(e) => {
            println!("  Config error: {e}");
            Err(e.into())
        }
    }
}
