//! `oxpilot models` — list models available on the configured provider.

use anyhow::Context;
use oxpilot_config::AppConfig;
use oxpilot_providers::LlmClient;

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let client = LlmClient::new(&config).context("Failed to create client")?;

    println!(
        "Models on provider '{}' (current: {}):",
        client.provider_name(),
        client.model()
    );

    match client.list_models().await {
        Ok(models) if models.is_empty() => println!("  (none reported)"),
        Ok(models) => {
            for model in models {
                println!("  {model}");
            }
        }
        Err(e) => {
            eprintln!("Failed to list models: {e}");
        }
    }

    Ok(())
}
