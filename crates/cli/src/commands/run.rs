//! `lmgram run`: Start the bot.

use std::path::Path;
use std::sync::Arc;

use lmgram_channels::TelegramClient;
use lmgram_config::{AppConfig, ResponseMode, Translations, UpdateMethod};
use lmgram_context::{ContextSettings, ConversationStore};
use lmgram_providers::LmStudioClient;
use lmgram_relay::{UpdateDispatcher, run_long_polling};
use lmgram_security::UserStore;
use tokio::sync::watch;

use crate::logging;

pub async fn run(
    config_path: &Path,
    verbose: bool,
    model: Option<String>,
    mode: Option<ResponseMode>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::init(config_path)?;
    apply_overrides(&mut config, model, mode);

    logging::init_json(
        verbose,
        &AppConfig::resolve(config_path, &config.paths.log_file),
    )?;

    if config.model.is_empty() {
        return Err("no model selected: pass --model or set `model` in the config".into());
    }
    if !config.has_bot_token() {
        return Err(format!(
            "telegram.bot_token is not set in {} (or LMGRAM_BOT_TOKEN)",
            config_path.display()
        )
        .into());
    }

    let translations = Translations::load(&config.locales_dir(config_path), &config.language)?;

    let users_path = AppConfig::resolve(config_path, &config.paths.users_file);
    let users = match UserStore::load(&users_path) {
        Ok(users) => users,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load users; starting with an empty list");
            UserStore::empty(users_path)
        }
    };

    let store = ConversationStore::new(ContextSettings {
        token_limit: config.token_limit,
        system_role: config.system_role.clone(),
        pin_system_prompt: config.pin_system_prompt,
    });

    let telegram = Arc::new(TelegramClient::new(config.telegram.bot_token.clone()));
    match telegram.get_me().await {
        Ok(me) => tracing::info!(
            username = me.username.as_deref().unwrap_or_default(),
            id = me.id,
            "Connected to Telegram"
        ),
        Err(e) => tracing::warn!(error = %e, "getMe failed; continuing"),
    }

    let dispatcher = Arc::new(
        UpdateDispatcher::new(
            telegram.clone(),
            Arc::new(LmStudioClient::new(config.api_address.clone())),
            Arc::new(store),
            Arc::new(users),
            Arc::new(translations),
            config.model.clone(),
        )
        .with_mode(config.response_mode),
    );

    tracing::info!(
        model = %config.model,
        mode = ?config.response_mode,
        api = %config.api_address,
        method = ?config.telegram.update_method,
        "Starting lmgram"
    );

    match config.telegram.update_method {
        UpdateMethod::Polling => {
            telegram.delete_webhook().await?;

            let (stop_tx, stop_rx) = watch::channel(false);
            let polling = tokio::spawn(run_long_polling(
                telegram,
                dispatcher,
                config.telegram.polling_timeout,
                stop_rx,
            ));

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
            let _ = stop_tx.send(true);
            polling.await?;
        }
        UpdateMethod::Webhook => {
            let cert = AppConfig::resolve(config_path, &config.webhook.cert_file);
            let key = AppConfig::resolve(config_path, &config.webhook.key_file);
            if !key.is_file() {
                tracing::warn!(
                    key = %key.display(),
                    "Webhook key file not found; terminate TLS in front of the listener"
                );
            }

            telegram
                .ensure_webhook(&config.webhook.public_url(), Some(&cert))
                .await?;

            let router = lmgram_gateway::build_router(dispatcher);
            lmgram_gateway::serve(&config.webhook.listen_addr(), router).await?;
        }
    }

    Ok(())
}

/// Command-line flags win over the config file.
fn apply_overrides(config: &mut AppConfig, model: Option<String>, mode: Option<ResponseMode>) {
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(mode) = mode {
        config.response_mode = mode;
    }
}
