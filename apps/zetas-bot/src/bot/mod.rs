use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::{dptree, prelude::*, types::Update, update_listeners, ApiError, RequestError};
use tracing::{error, info, warn};

use crate::state::AppState;

pub mod handlers;
pub mod keyboards;
pub mod menu;
pub mod messenger;
pub mod router;
pub mod utils;

#[cfg(test)]
pub mod testing;

pub async fn run_bot(
    bot: Bot,
    mut shutdown_signal: tokio::sync::broadcast::Receiver<()>,
    state: AppState,
) {
    info!("Starting bot dispatcher...");

    std::panic::set_hook(Box::new(|info| {
        error!("CRITICAL BOT PANIC: {:?}", info);
    }));

    match bot.get_me().await {
        Ok(me) => {
            let username = me.username.clone().unwrap_or("unknown".into());
            info!("Bot connected as: @{}", username);
        }
        Err(e) => {
            error!("CRITICAL: Bot failed to connect to Telegram: {}", e);
            return;
        }
    }

    let listener = update_listeners::polling_default(bot.clone()).await;
    let mut dispatcher = Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .default_handler(|upd: Arc<Update>| async move {
            info!("Unhandled update: {:?}", upd.id);
        })
        .build();

    tokio::select! {
        _ = dispatcher.dispatch_with_listener(listener, Arc::new(on_listener_error)) => {
            info!("Bot dispatcher exited naturally");
        }
        _ = shutdown_signal.recv() => {
            info!("Bot received shutdown signal, stopping...");
        }
    }
}

static SCHEMA_BUILT: AtomicBool = AtomicBool::new(false);

/// Builds the update handler tree. A second registration in one process would
/// answer every update twice, so it exits and leaves the restart to the supervisor.
pub fn schema() -> UpdateHandler<RequestError> {
    if SCHEMA_BUILT.swap(true, Ordering::SeqCst) {
        error!("Update handlers registered twice, exiting");
        std::process::exit(1);
    }
    dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::command::message_handler))
        .branch(Update::filter_callback_query().endpoint(handlers::callback::callback_handler))
}

async fn on_listener_error(e: RequestError) {
    if is_duplicate_listener(&e) {
        // Two pollers on one token would answer every update twice.
        error!("Another instance is polling with this token, shutting down");
        std::process::exit(1);
    }
    warn!("Update listener error: {}", e);
}

fn is_duplicate_listener(e: &RequestError) -> bool {
    matches!(e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates))
}
