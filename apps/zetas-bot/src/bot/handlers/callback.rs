use std::time::Duration;
use teloxide::prelude::*;
use tracing::{debug, error, info, warn};

use crate::bot::handlers::command::{send_prices, send_user_menu};
use crate::bot::keyboards::{cancel_pairing_keyboard, connect_keyboard, disconnect_keyboard};
use crate::bot::messenger::Messenger;
use crate::bot::router::route;
use crate::bot::utils::{delete_later, delete_quietly};
use crate::models::conversation::Transition;
use crate::models::incoming::Incoming;
use crate::state::AppState;

const CANCEL_TTL: Duration = Duration::from_secs(5);

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(event) = Incoming::from_callback(&q) else {
        return Ok(());
    };
    let chat = event.chat_id;
    if let Err(e) = route(&bot, &state, event).await {
        error!("Failed to handle callback in chat {}: {:#}", chat.0, e);
    }
    Ok(())
}

pub async fn handle_callback<M: Messenger>(
    messenger: &M,
    state: &AppState,
    event: &Incoming,
    data: &str,
) -> anyhow::Result<()> {
    let chat = event.chat_id;
    // The screen that carried the button is replaced by whatever comes next.
    if let Some(id) = event.message_id {
        delete_quietly(messenger, chat, id).await;
    }

    match data {
        "show_prices" => send_prices(messenger, state, chat).await,
        "show_menu" => send_user_menu(messenger, state, chat).await,
        "start_pairing" => start_pairing(messenger, state, chat).await,
        "cancel_pairing" => {
            state.conversations.apply(chat, Transition::Reset).await;
            if let Ok(id) = messenger
                .send_html(chat, "❌ Operation cancelled.", None)
                .await
            {
                delete_later(messenger, chat, id, CANCEL_TTL);
            }
            Ok(())
        }
        "disconnect_whatsapp" => disconnect(messenger, state, chat).await,
        "support" | "soporte" => begin_support(messenger, state, chat).await,
        other => {
            debug!("Unhandled callback {:?} from chat {}", other, chat.0);
            Ok(())
        }
    }
}

/// Puts the chat into the pairing flow unless it already has a linked account.
pub async fn start_pairing<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
) -> anyhow::Result<()> {
    let user = state.users.get_or_create(chat.0).await?;
    if user.is_linked() {
        let _ = messenger
            .send_html(
                chat,
                "⚠️ <b>You already have a WhatsApp number connected.</b>\n\nDisconnect it before linking another one.",
                Some(disconnect_keyboard()),
            )
            .await;
        return Ok(());
    }

    state.conversations.apply(chat, Transition::BeginPairing).await;
    let prompt = "<b>📱 WHATSAPP CONNECTION</b>\n\n\
                  Send your WhatsApp number in international format, e.g. <code>593969533280</code>.\n\n\
                  <i>Your pairing code will be sent here.</i>";
    if let Ok(id) = messenger
        .send_html(chat, prompt, Some(cancel_pairing_keyboard()))
        .await
    {
        state
            .conversations
            .apply(chat, Transition::AttachPrompt(id))
            .await;
    }
    Ok(())
}

async fn disconnect<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
) -> anyhow::Result<()> {
    state.users.unlink_account(chat.0).await?;
    state.conversations.apply(chat, Transition::Reset).await;
    if let Err(e) = state.pairing_service.purge_chat(chat.0).await {
        warn!("Failed to purge pairing sessions of chat {}: {}", chat.0, e);
    }
    info!("Chat {} disconnected its WhatsApp session", chat.0);

    let _ = messenger
        .send_html(
            chat,
            "❌ <b>WhatsApp session disconnected.</b>\n\nYou can connect another number now.",
            Some(connect_keyboard()),
        )
        .await;
    Ok(())
}

async fn begin_support<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
) -> anyhow::Result<()> {
    state.conversations.apply(chat, Transition::BeginSupport).await;
    let prompt = "🆘 <b>SUPPORT</b>\n\nWrite your question, report or suggestion. The team will answer as soon as possible.";
    if let Ok(id) = messenger.send_html(chat, prompt, None).await {
        state
            .conversations
            .apply(chat, Transition::AttachPrompt(id))
            .await;
    }
    Ok(())
}
