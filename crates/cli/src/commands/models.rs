//! `lmgram models`: List models served by the inference server.

use std::path::Path;

use lmgram_config::AppConfig;
use lmgram_core::provider::InferenceClient;
use lmgram_providers::LmStudioClient;

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::init(config_path)?;
    let client = LmStudioClient::new(config.api_address.clone());

    let models = client.list_models().await?;
    if models.is_empty() {
        println!("No models loaded at {}", config.api_address);
        return Ok(());
    }

    println!("Models at {}:", config.api_address);
    for model in &models {
        let marker = if *model == config.model { "*" } else { " " };
        println!(" {marker} {model}");
    }
    Ok(())
}
