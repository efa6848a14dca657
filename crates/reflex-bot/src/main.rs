use std::sync::Arc;

use clap::Parser;
use reflex_bot::{demo, Bot, ShellAdapter};
use reflex_core::{Message, ReflexConfig, Room, User};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "reflex", version, about = "Conversational message engine, shell edition")]
struct Cli {
    /// Path to config file (default: $REFLEX_CONFIG or ~/.reflex/reflex.toml).
    #[arg(short, long)]
    config: Option<String>,

    /// Name to chat as.
    #[arg(short, long, default_value = "you")]
    user: String,

    /// Skip the built-in demo branches.
    #[arg(long)]
    bare: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reflex=info,reflex_thoughts=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // explicit path > REFLEX_CONFIG env > ~/.reflex/reflex.toml
    let config_path = cli.config.or_else(|| std::env::var("REFLEX_CONFIG").ok());
    let config = ReflexConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        ReflexConfig::default()
    });

    let shell = Arc::new(ShellAdapter::new(config.bot.name.clone()));
    let bot = Bot::from_config(config, shell, None)?;
    if !cli.bare {
        demo::install(bot.runtime())?;
    }
    bot.start().await?;

    let user = User::new(cli.user.clone(), cli.user).in_room(Room::new("shell"));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!(user = %user.name, "reading messages from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = bot.runtime().receive(Message::text(user.clone(), line)).await {
                    warn!(error = %e, "message processing failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    bot.shutdown().await;
    Ok(())
}
