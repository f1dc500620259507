use std::sync::Arc;

use serenity::prelude::GatewayIntents;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

use issuebot::discord::Handler;
use issuebot::tracker::TrackerClient;
use issuebot::{model, Bridge, Config};

/// Stdout logging, plus a file log when `log_dir` is set. The returned guard
/// must live as long as the process so buffered file writes are flushed.
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        );

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Failed to create log dir {}: {e}", dir.display());
            }
            let appender = tracing_appender::rolling::never(dir, "issuebot.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                );
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let _guard = init_logging(&config);

    info!("🚀 Starting issuebot...");
    info!("Repository: {}", config.repo.as_slug());
    info!("Model: {} (policy: {:?})", config.openai_model, config.policy);

    let tracker = match TrackerClient::new(&config.github_api_base, &config.github_token, config.repo.clone()) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to create GitHub client: {e}");
            std::process::exit(1);
        }
    };
    let model = model::Client::new(
        config.openai_api_key.clone(),
        &config.openai_api_base,
        config.openai_model.clone(),
    );
    let bridge = Arc::new(Bridge::new(model, tracker, config.policy));

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = match serenity::Client::builder(&config.discord_token, intents)
        .event_handler(Handler::new(bridge))
        .await
    {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create Discord client: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = client.start().await {
        error!("Discord client stopped: {e}");
        std::process::exit(1);
    }
}
