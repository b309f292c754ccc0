use std::sync::Arc;

use futures::StreamExt;

use cine_assist::catalog::Catalog;
use cine_assist::channels::{Channel, CliChannel, TelegramChannel, Transport};
use cine_assist::config::{BotConfig, ChannelKind};
use cine_assist::llm::OllamaClient;
use cine_assist::store::UserStore;
use cine_assist::survey::SurveyBot;

#[tokio::main]
async fn main() -> cine_assist::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env()?;

    let catalog = match &config.questions_path {
        Some(path) => Catalog::from_path(path)?,
        None => Catalog::default_set(),
    };

    eprintln!("🎬 Cine Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Ollama: {} (model: {})", config.ollama_host, config.ollama_model);
    eprintln!("   Users: {}", config.users_path.display());
    eprintln!("   Questions: {}", catalog.len());
    eprintln!(
        "   Operator: {}",
        config.admin_user_id.as_deref().unwrap_or("disabled")
    );

    let store = Arc::new(UserStore::new(
        config.users_path.clone(),
        config.broadcast_delay,
    ));
    let backend = Arc::new(OllamaClient::new(
        config.ollama_host.clone(),
        config.ollama_model.clone(),
    ));

    let (channel, transport): (Arc<dyn Channel>, Arc<dyn Transport>) = match config.channel {
        ChannelKind::Telegram => {
            // from_env already requires the token for this channel
            let token = config.telegram_token.clone().ok_or_else(|| {
                cine_assist::error::ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into())
            })?;
            let telegram = Arc::new(TelegramChannel::new(token));
            (Arc::clone(&telegram) as Arc<dyn Channel>, telegram)
        }
        ChannelKind::Cli => {
            let cli = Arc::new(CliChannel::new());
            (Arc::clone(&cli) as Arc<dyn Channel>, cli)
        }
    };
    eprintln!("   Channel: {}\n", channel.name());

    if let Err(e) = channel.health_check().await {
        tracing::warn!("Channel health check failed: {e}");
    }

    let bot = Arc::new(SurveyBot::new(
        catalog,
        store,
        backend,
        transport,
        config.admin_user_id.clone(),
    ));

    let mut stream = channel.start().await?;
    tracing::info!("Bot started successfully!");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            maybe_msg = stream.next() => {
                let Some(msg) = maybe_msg else {
                    tracing::info!("Message stream ended");
                    break;
                };
                // Events for different participants run concurrently; the
                // per-user generation gate serializes within a participant.
                let bot = Arc::clone(&bot);
                tokio::spawn(async move {
                    if let Err(e) = bot.handle(&msg).await {
                        tracing::warn!(user = %msg.sender_id, "Failed to handle message: {e}");
                    }
                });
            }
        }
    }

    channel.shutdown().await?;
    Ok(())
}
