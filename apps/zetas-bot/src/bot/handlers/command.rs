use chrono::Utc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::utils::html;
use tracing::{debug, error, info};

use crate::bot::handlers::{admin, callback};
use crate::bot::keyboards::{menu_keyboard, purchase_keyboard, support_keyboard, welcome_keyboard};
use crate::bot::menu::{caption, CardKind, MenuCard, MENU_REFRESH};
use crate::bot::messenger::Messenger;
use crate::bot::router::route;
use crate::bot::utils::{delete_later, delete_quietly};
use crate::models::incoming::{Command, Incoming};
use crate::services::access_policy::can_use_gated_tool;
use crate::state::AppState;

const WELCOME_TTL: Duration = Duration::from_secs(30);
const DENIAL_TTL: Duration = Duration::from_secs(10);

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let Some(event) = Incoming::from_message(&msg) else {
        debug!("Ignoring unsupported message in chat {}", msg.chat.id.0);
        return Ok(());
    };
    info!("Received message in chat {}", msg.chat.id.0);

    if let Err(e) = route(&bot, &state, event).await {
        error!("Failed to handle message in chat {}: {:#}", msg.chat.id.0, e);
    }
    Ok(())
}

pub async fn handle_command<M: Messenger>(
    messenger: &M,
    state: &AppState,
    event: &Incoming,
    command: Command,
) -> anyhow::Result<()> {
    let chat = event.chat_id;
    info!("Command {:?} from chat {}", command, chat.0);

    match command {
        Command::Start => send_welcome(messenger, state, chat).await,
        Command::Menu => {
            if let Some(id) = event.message_id {
                delete_quietly(messenger, chat, id).await;
            }
            send_user_menu(messenger, state, chat).await
        }
        Command::Pairing => {
            let user = state.users.get_or_create(chat.0).await?;
            let free_mode = state.settings.is_free_mode().await;
            if !can_use_gated_tool(&user, free_mode, Utc::now()) {
                return send_access_denied(messenger, chat).await;
            }
            callback::start_pairing(messenger, state, chat).await?;
            if let Some(id) = event.message_id {
                delete_quietly(messenger, chat, id).await;
            }
            Ok(())
        }
        Command::Admin | Command::Stats | Command::FreeOn | Command::FreeOff
            if !state.is_admin(chat.0) =>
        {
            debug!("Chat {} is not an admin, ignoring {:?}", chat.0, command);
            Ok(())
        }
        Command::Admin => admin::send_admin_menu(messenger, chat).await,
        Command::Stats => admin::send_stats(messenger, state, chat).await,
        Command::FreeOn => admin::set_free_mode(messenger, state, chat, true).await,
        Command::FreeOff => admin::set_free_mode(messenger, state, chat, false).await,
    }
}

async fn send_welcome<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
) -> anyhow::Result<()> {
    let user = state.users.get_or_create(chat.0).await?;
    let text = if user.is_linked() {
        "✅ <b>Your WhatsApp is already connected.</b>\n\nOpen the menu to keep going.".to_string()
    } else {
        format!(
            "👋 <b>Welcome to {}!</b>\n\nConnect your WhatsApp number to get started.",
            html::escape(&state.config.title)
        )
    };

    if let Ok(id) = messenger
        .send_html(chat, &text, Some(welcome_keyboard(user.is_linked())))
        .await
    {
        delete_later(messenger, chat, id, WELCOME_TTL);
    }
    Ok(())
}

/// Shows the gated menu, or the purchase screen when the chat has no access.
pub async fn send_user_menu<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let user = state.users.get_or_create(chat.0).await?;
    let free_mode = state.settings.is_free_mode().await;
    if !can_use_gated_tool(&user, free_mode, now) {
        return send_access_denied(messenger, chat).await;
    }

    // VIP takes precedence so the countdown shows even while free mode is on.
    let expiry = user.vip_expires_at.filter(|_| user.is_vip_active(now));
    let text = caption(&state.config.title, expiry, now);
    let keyboard = menu_keyboard(user.is_linked());

    let (message, kind) = match &state.config.menu_photo {
        Some(photo) => (
            messenger
                .send_photo_card(chat, photo, &text, Some(keyboard.clone()))
                .await?,
            CardKind::Photo,
        ),
        None => (
            messenger
                .send_html(chat, &text, Some(keyboard.clone()))
                .await?,
            CardKind::Text,
        ),
    };

    match expiry {
        Some(expiry) => {
            let card = MenuCard {
                chat,
                message,
                kind,
                title: state.config.title.clone(),
                expiry,
                keyboard,
            };
            state.menus.start(messenger.clone(), card, MENU_REFRESH).await;
        }
        None => state.menus.stop(chat).await,
    }
    Ok(())
}

async fn send_access_denied<M: Messenger>(messenger: &M, chat: ChatId) -> anyhow::Result<()> {
    let text = "⛔ <b>You do not have active VIP access.</b>\n\nBuy a plan to use the bot.";
    if let Ok(id) = messenger
        .send_html(chat, text, Some(purchase_keyboard()))
        .await
    {
        delete_later(messenger, chat, id, DENIAL_TTL);
    }
    Ok(())
}

pub async fn send_prices<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
) -> anyhow::Result<()> {
    let c = &state.config;
    let text = format!(
        "💎 <b>VIP PRICES</b>\n\n\
         • 1 day: <b>${}</b>\n\
         • 1 week: <b>${}</b>\n\
         • 1 month: <b>${}</b>\n\
         • 1 year: <b>${}</b>\n\n\
         Contact support to purchase.",
        c.price_day, c.price_week, c.price_month, c.price_year
    );
    let _ = messenger
        .send_html(chat, &text, Some(support_keyboard()))
        .await;
    Ok(())
}
