use chrono::Utc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::utils::html;
use tracing::{debug, error, info, warn};

use crate::bot::handlers::admin;
use crate::bot::keyboards::retry_pairing_keyboard;
use crate::bot::messenger::Messenger;
use crate::bot::utils::{delete_later, delete_quietly};
use crate::models::conversation::Conversation;
use crate::models::incoming::Incoming;
use crate::services::access_policy::pairing_mode;
use crate::services::pairing_service::{PairingError, PhoneNumber};
use crate::state::AppState;

const INVALID_NUMBER_TTL: Duration = Duration::from_secs(5);
const CODE_TTL: Duration = Duration::from_secs(60);

/// Handles free text and media. Only meaningful while the chat is in a flow
/// that awaits input; otherwise it is ignored.
pub async fn handle_message<M: Messenger>(
    messenger: &M,
    state: &AppState,
    event: &Incoming,
) -> anyhow::Result<()> {
    let chat = event.chat_id;
    // Taking the state up front means a second message racing this one sees
    // Idle and cannot start the same flow step twice.
    let (current, epoch) = state.conversations.take_with_epoch(chat).await;

    match (current, event.text()) {
        (Conversation::Idle, _) => {
            debug!("Chat {} sent input outside of any flow", chat.0);
            Ok(())
        }
        (Conversation::AwaitingPairingNumber { prompt }, Some(text)) => {
            receive_pairing_number(messenger, state, event, text, prompt, epoch).await
        }
        (Conversation::AwaitingSupportText { prompt }, Some(text)) => {
            receive_support_text(messenger, state, event, text, prompt).await
        }
        (Conversation::AwaitingPairingNumber { .. }, None)
        | (Conversation::AwaitingSupportText { .. }, None) => {
            state.conversations.restore(chat, current).await;
            Ok(())
        }
        (Conversation::AdminAddVip(step), _) if state.is_admin(chat.0) => {
            admin::continue_add_vip(messenger, state, event, step).await
        }
        (Conversation::AdminNotify(step), _) if state.is_admin(chat.0) => {
            admin::continue_notify(messenger, state, event, step).await
        }
        (Conversation::AdminAddVip(_), _) | (Conversation::AdminNotify(_), _) => {
            warn!("Chat {} is in an admin flow without admin rights", chat.0);
            Ok(())
        }
    }
}

async fn receive_pairing_number<M: Messenger>(
    messenger: &M,
    state: &AppState,
    event: &Incoming,
    text: &str,
    prompt: Option<MessageId>,
    epoch: u64,
) -> anyhow::Result<()> {
    let chat = event.chat_id;
    if let Some(id) = event.message_id {
        delete_quietly(messenger, chat, id).await;
    }
    if let Some(id) = prompt {
        delete_quietly(messenger, chat, id).await;
    }

    let number = match PhoneNumber::parse(text) {
        Ok(number) => number,
        Err(_) => {
            if let Ok(id) = messenger
                .send_html(
                    chat,
                    "❌ <b>Invalid number.</b>\n\nIt must contain 10 to 15 digits, e.g. <code>593969533280</code>.",
                    Some(retry_pairing_keyboard()),
                )
                .await
            {
                delete_later(messenger, chat, id, INVALID_NUMBER_TTL);
            }
            return Ok(());
        }
    };

    let user = state.users.get_or_create(chat.0).await?;
    let free_mode = state.settings.is_free_mode().await;
    let mode = pairing_mode(&user, free_mode, state.is_admin(chat.0));

    let processing = messenger
        .send_html(
            chat,
            "🔄 Generating your connection code, please wait...",
            None,
        )
        .await
        .ok();
    let result = state
        .pairing_service
        .request_pairing(chat.0, number.as_str(), mode)
        .await;
    if let Some(id) = processing {
        delete_quietly(messenger, chat, id).await;
    }

    if state.conversations.epoch(chat).await != epoch {
        info!("Discarding pairing result for chat {}: the chat moved on", chat.0);
        return Ok(());
    }

    match result {
        Ok(code) => {
            state
                .users
                .link_account(chat.0, number.as_str(), Utc::now())
                .await?;
            info!("Chat {} linked a WhatsApp number", chat.0);

            let text = format!(
                "✅ <b>CODE GENERATED</b>\n\n<code>{}</code>\n\n\
                 1. Open WhatsApp and go to <b>Linked devices</b>.\n\
                 2. Tap <b>Link a device</b>, then <b>Link with phone number</b>.\n\
                 3. Enter the code above.\n\n\
                 <i>This message disappears in 60 seconds.</i>",
                html::escape(&code)
            );
            if let Ok(id) = messenger.send_html(chat, &text, None).await {
                delete_later(messenger, chat, id, CODE_TTL);
            }
        }
        Err(PairingError::Timeout { attempts }) => {
            warn!("No pairing code for chat {} after {} attempts", chat.0, attempts);
            let _ = messenger
                .send_html(
                    chat,
                    "❌ Could not generate the code. Please try again.",
                    Some(retry_pairing_keyboard()),
                )
                .await;
        }
        Err(e) => {
            error!("Pairing failed for chat {}: {}", chat.0, e);
            let _ = messenger
                .send_html(
                    chat,
                    "❌ Something went wrong while generating the code. Contact the administrator.",
                    None,
                )
                .await;
        }
    }
    Ok(())
}

async fn receive_support_text<M: Messenger>(
    messenger: &M,
    state: &AppState,
    event: &Incoming,
    text: &str,
    prompt: Option<MessageId>,
) -> anyhow::Result<()> {
    let chat = event.chat_id;
    if let Some(id) = prompt {
        delete_quietly(messenger, chat, id).await;
    }

    let _ = messenger
        .send_html(
            chat,
            "✅ Your message was sent to support. We will get back to you soon.",
            None,
        )
        .await;

    let forward = format!(
        "🆘 <b>NEW SUPPORT MESSAGE</b>\n\n<b>From:</b> {} (<code>{}</code>)\n\n{}",
        html::escape(&event.sender_name),
        chat.0,
        html::escape(text)
    );
    for admin_id in state.admin_service.admin_ids() {
        if let Err(e) = messenger
            .send_html(ChatId(*admin_id), &forward, None)
            .await
        {
            warn!("Failed to forward support message to admin {}: {}", admin_id, e);
        }
    }
    Ok(())
}
