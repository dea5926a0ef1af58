use chrono::Utc;
use teloxide::prelude::*;
use teloxide::utils::html;
use tracing::{debug, error, info, warn};

use crate::bot::keyboards::{admin_keyboard, notify_kind_keyboard};
use crate::bot::messenger::Messenger;
use crate::bot::utils::{chunk_lines, delete_quietly};
use crate::models::conversation::{AddVipStep, Conversation, NotifyStep, PayloadKind, Transition};
use crate::models::incoming::Incoming;
use crate::services::broadcast_service::BroadcastPayload;
use crate::state::AppState;

/// Older button payloads still present on messages sent by earlier releases.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("stats_admin", "admin_stats"),
    ("panel_admin", "admin_panel"),
    ("descargar_usuarios", "admin_download_users"),
];

/// Maps a legacy admin payload to its current name.
pub fn canonical_callback(data: &str) -> &str {
    LEGACY_ALIASES
        .iter()
        .find(|(legacy, _)| *legacy == data)
        .map(|(_, current)| *current)
        .unwrap_or(data)
}

pub fn is_admin_callback(data: &str) -> bool {
    canonical_callback(data).starts_with("admin_")
}

pub async fn handle_admin_callback<M: Messenger>(
    messenger: &M,
    state: &AppState,
    event: &Incoming,
    data: &str,
) -> anyhow::Result<()> {
    let chat = event.chat_id;
    if !state.is_admin(chat.0) {
        debug!("Ignoring admin callback {:?} from chat {}", data, chat.0);
        return Ok(());
    }
    if let Some(id) = event.message_id {
        delete_quietly(messenger, chat, id).await;
    }

    match canonical_callback(data) {
        "admin_menu" => send_admin_menu(messenger, chat).await,
        "admin_addvip" => {
            state.conversations.apply(chat, Transition::BeginAddVip).await;
            let _ = messenger
                .send_html(
                    chat,
                    "🔢 Send the <b>Telegram ID</b> of the user who will receive VIP:",
                    None,
                )
                .await;
            Ok(())
        }
        "admin_notify" => {
            state.conversations.apply(chat, Transition::BeginNotify).await;
            let _ = messenger
                .send_html(
                    chat,
                    "📢 What kind of notification do you want to send?",
                    Some(notify_kind_keyboard()),
                )
                .await;
            Ok(())
        }
        "admin_notify_text" => choose_notify_kind(messenger, state, chat, PayloadKind::Text).await,
        "admin_notify_media" => {
            choose_notify_kind(messenger, state, chat, PayloadKind::Media).await
        }
        "admin_stats" => send_stats(messenger, state, chat).await,
        "admin_panel" => send_panel(messenger, state, chat).await,
        "admin_download_users" => send_user_file(messenger, state, chat).await,
        "admin_free_on" => set_free_mode(messenger, state, chat, true).await,
        "admin_free_off" => set_free_mode(messenger, state, chat, false).await,
        other => {
            debug!("Unhandled admin callback {:?}", other);
            Ok(())
        }
    }
}

pub async fn send_admin_menu<M: Messenger>(messenger: &M, chat: ChatId) -> anyhow::Result<()> {
    let _ = messenger
        .send_html(
            chat,
            "👑 <b>ADMIN PANEL</b>\n\nPick an action:",
            Some(admin_keyboard()),
        )
        .await;
    Ok(())
}

async fn choose_notify_kind<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
    kind: PayloadKind,
) -> anyhow::Result<()> {
    state
        .conversations
        .apply(chat, Transition::NotifyKindChosen(kind))
        .await;
    let prompt = match kind {
        PayloadKind::Text => "✏️ Write the text to send to every active VIP user:",
        PayloadKind::Media => {
            "📎 Send the photo, video, audio or file to forward to every active VIP user:"
        }
    };
    let _ = messenger.send_html(chat, prompt, None).await;
    Ok(())
}

pub async fn send_stats<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
) -> anyhow::Result<()> {
    let stats = state.users.stats(Utc::now()).await?;
    let free_mode = state.settings.is_free_mode().await;
    let text = format!(
        "📊 <b>BOT STATISTICS</b>\n\n\
         <b>Total users:</b> {}\n\
         <b>Active VIP:</b> {}\n\
         <b>Linked WhatsApp sessions:</b> {}\n\
         <b>FREE mode:</b> {}",
        stats.total,
        stats.active_vip,
        stats.linked,
        if free_mode { "on" } else { "off" }
    );
    let _ = messenger.send_html(chat, &text, None).await;
    Ok(())
}

async fn send_panel<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
) -> anyhow::Result<()> {
    let users = state.users.get_all().await?;
    let mut text = format!("👑 <b>USERS</b> ({})\n", users.len());
    for user in &users {
        let expires = user
            .vip_expires_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let linked = user
            .linked_account
            .as_deref()
            .map(html::escape)
            .unwrap_or_else(|| "not linked".to_string());
        text.push_str(&format!(
            "\n• <code>{}</code> | VIP until {} | WA: {}",
            user.tg_id, expires, linked
        ));
    }

    for chunk in chunk_lines(&text) {
        if let Err(e) = messenger.send_html(chat, &chunk, None).await {
            warn!("Failed to send user panel to {}: {}", chat.0, e);
            break;
        }
    }
    Ok(())
}

async fn send_user_file<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
) -> anyhow::Result<()> {
    if let Err(e) = messenger.send_file(chat, state.users.path()).await {
        error!("Failed to send users file to {}: {}", chat.0, e);
        let _ = messenger
            .send_html(chat, "❌ Could not send the users file.", None)
            .await;
    }
    Ok(())
}

pub async fn set_free_mode<M: Messenger>(
    messenger: &M,
    state: &AppState,
    chat: ChatId,
    enabled: bool,
) -> anyhow::Result<()> {
    state.settings.set_free_mode(enabled).await;

    let text = if enabled {
        "🟢 <b>FREE mode enabled.</b>\n\nEvery user can use the bot for now."
    } else {
        if let Err(e) = state.pairing_service.purge_free_sessions().await {
            error!("Failed to purge FREE sessions: {}", e);
        }
        "🔴 <b>FREE mode disabled.</b>\n\nAll FREE sessions were removed. Only VIP users can use the bot."
    };
    let _ = messenger.send_html(chat, text, None).await;
    Ok(())
}

/// Continues the two-step VIP grant. `step` has already been taken from the
/// conversation store; it is put back whenever the input has to be re-sent.
pub async fn continue_add_vip<M: Messenger>(
    messenger: &M,
    state: &AppState,
    event: &Incoming,
    step: AddVipStep,
) -> anyhow::Result<()> {
    let chat = event.chat_id;
    let current = Conversation::AdminAddVip(step);

    match step {
        AddVipStep::AwaitingTarget => {
            let Some(target) = event.text().and_then(parse_target) else {
                state.conversations.restore(chat, current).await;
                let _ = messenger
                    .send_html(chat, "❌ Invalid ID. Send a numeric Telegram ID.", None)
                    .await;
                return Ok(());
            };
            let next = current.apply(Transition::VipTargetChosen(target));
            state.conversations.restore(chat, next).await;
            let _ = messenger
                .send_html(
                    chat,
                    &format!("📅 How many VIP days for <code>{}</code>?", target),
                    None,
                )
                .await;
            Ok(())
        }
        AddVipStep::AwaitingDays { target } => {
            let Some(days) = event.text().and_then(parse_days) else {
                state.conversations.restore(chat, current).await;
                let _ = messenger
                    .send_html(chat, "❌ Invalid number of days. Send a whole number from 1 to 36500.", None)
                    .await;
                return Ok(());
            };

            let user = match state.users.grant_vip(target, days, Utc::now()).await {
                Ok(user) => user,
                Err(e) => {
                    error!("Failed to grant VIP to {}: {:#}", target, e);
                    let _ = messenger
                        .send_html(chat, "❌ Could not grant VIP. Check the logs.", None)
                        .await;
                    return Ok(());
                }
            };
            info!("Admin {} granted {} VIP days to {}", chat.0, days, target);

            let expires = user
                .vip_expires_at
                .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default();
            let _ = messenger
                .send_html(
                    chat,
                    &format!(
                        "✅ Granted <b>{}</b> VIP day(s) to <code>{}</code>.\nExpires: {}",
                        days, target, expires
                    ),
                    None,
                )
                .await;

            let notice = format!(
                "🎉 <b>You received {} VIP day(s)!</b>\n\nUse /menu to get started.",
                days
            );
            if let Err(e) = messenger.send_html(ChatId(target), &notice, None).await {
                warn!("Could not tell {} about the VIP grant: {}", target, e);
            }
            Ok(())
        }
    }
}

pub async fn continue_notify<M: Messenger>(
    messenger: &M,
    state: &AppState,
    event: &Incoming,
    step: NotifyStep,
) -> anyhow::Result<()> {
    let chat = event.chat_id;
    let current = Conversation::AdminNotify(step);

    let payload = match step {
        // Still waiting for a kind button; free input does not advance the flow.
        NotifyStep::ChoosingKind => {
            state.conversations.restore(chat, current).await;
            return Ok(());
        }
        NotifyStep::AwaitingPayload(PayloadKind::Text) => {
            match event.text().filter(|t| !t.trim().is_empty()) {
                Some(text) => BroadcastPayload::Text(text.to_string()),
                None => {
                    state.conversations.restore(chat, current).await;
                    let _ = messenger
                        .send_html(chat, "❌ The notification must be non-empty text.", None)
                        .await;
                    return Ok(());
                }
            }
        }
        NotifyStep::AwaitingPayload(PayloadKind::Media) => match event.message_id {
            Some(message) => BroadcastPayload::Media {
                from: chat,
                message,
            },
            None => {
                state.conversations.restore(chat, current).await;
                return Ok(());
            }
        },
    };

    let delivered = match state
        .broadcast_service
        .notify_active_vip(messenger, &payload, Utc::now())
        .await
    {
        Ok(n) => n,
        Err(e) => {
            error!("Broadcast failed: {:#}", e);
            let _ = messenger
                .send_html(chat, "❌ Could not send the notification.", None)
                .await;
            return Ok(());
        }
    };

    let _ = messenger
        .send_html(
            chat,
            &format!("✅ Notification sent to {} active VIP user(s).", delivered),
            None,
        )
        .await;
    Ok(())
}

fn parse_target(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok().filter(|id| *id != 0)
}

/// A century; anything longer is a typo.
const MAX_VIP_DAYS: i64 = 36_500;

fn parse_days(text: &str) -> Option<i64> {
    text.trim()
        .parse::<i64>()
        .ok()
        .filter(|d| (1..=MAX_VIP_DAYS).contains(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_aliases_resolve() {
        assert_eq!(canonical_callback("stats_admin"), "admin_stats");
        assert_eq!(canonical_callback("descargar_usuarios"), "admin_download_users");
        assert_eq!(canonical_callback("show_menu"), "show_menu");
        assert!(is_admin_callback("panel_admin"));
        assert!(!is_admin_callback("support"));
    }

    #[test]
    fn test_input_parsing() {
        assert_eq!(parse_target(" 12345 "), Some(12345));
        assert_eq!(parse_target("0"), None);
        assert_eq!(parse_target("abc"), None);
        assert_eq!(parse_days("30"), Some(30));
        assert_eq!(parse_days("0"), None);
        assert_eq!(parse_days("-3"), None);
        assert_eq!(parse_days("1.5"), None);
        assert_eq!(parse_days("36500"), Some(36_500));
        assert_eq!(parse_days("36501"), None);
        assert_eq!(parse_days("100000000"), None);
    }
}
