use clap::Parser;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zetas_db::UserRepository;

mod bot;
mod config;
mod models;
mod services;
mod state;

use crate::config::BotConfig;
use crate::services::pairing_service::CommandRoutine;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BotConfig::parse();
    info!("Starting {}...", config.title);

    let users = UserRepository::open(&config.users_file, config.admin_ids.clone()).await?;
    tokio::fs::create_dir_all(&config.pairing_dir).await?;
    info!(
        "Users file: {}, pairing workspaces: {}",
        config.users_file.display(),
        config.pairing_dir.display()
    );

    let routine = Arc::new(CommandRoutine::new(
        config.pairing_command.clone(),
        config.pairing_args.clone(),
    ));
    let bot = Bot::new(&config.token);
    let state = AppState::new(config, users, routine);

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(());
            }
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
    });

    bot::run_bot(bot, shutdown_rx, state).await;
    info!("Bot stopped");
    Ok(())
}
