use tracing::debug;

use crate::bot::handlers::{admin, callback, command, message};
use crate::bot::messenger::Messenger;
use crate::models::incoming::{Incoming, IncomingKind};
use crate::state::AppState;

/// Dispatches one inbound event to the handler for its kind.
///
/// Admin callbacks are dropped here for non-admin chats so none of their
/// side effects (including deleting the button message) happen.
pub async fn route<M: Messenger>(
    messenger: &M,
    state: &AppState,
    event: Incoming,
) -> anyhow::Result<()> {
    match &event.kind {
        IncomingKind::Command(cmd) => command::handle_command(messenger, state, &event, *cmd).await,
        IncomingKind::Callback(data) if admin::is_admin_callback(data) => {
            if !state.is_admin(event.chat_id.0) {
                debug!("Chat {} is not an admin, dropping {:?}", event.chat_id.0, data);
                return Ok(());
            }
            admin::handle_admin_callback(messenger, state, &event, data).await
        }
        IncomingKind::Callback(data) => {
            callback::handle_callback(messenger, state, &event, data).await
        }
        IncomingKind::Text(_) | IncomingKind::Media => {
            message::handle_message(messenger, state, &event).await
        }
    }
}
