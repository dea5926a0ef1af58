use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::{ChatId, InlineKeyboardMarkup, MessageId};
use teloxide::utils::html;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::bot::messenger::{Messenger, TransportError};

pub const MENU_REFRESH: Duration = Duration::from_secs(60);
pub const EXPIRED_NOTICE: &str = "⛔ Your VIP access has expired.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    Photo,
    Text,
}

/// A menu message whose VIP countdown is kept up to date.
#[derive(Debug, Clone)]
pub struct MenuCard {
    pub chat: ChatId,
    pub message: MessageId,
    pub kind: CardKind,
    pub title: String,
    pub expiry: DateTime<Utc>,
    pub keyboard: InlineKeyboardMarkup,
}

impl MenuCard {
    async fn edit<M: Messenger>(
        &self,
        messenger: &M,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError> {
        match self.kind {
            CardKind::Photo => {
                messenger
                    .edit_caption_html(self.chat, self.message, text, keyboard)
                    .await
            }
            CardKind::Text => {
                messenger
                    .edit_html(self.chat, self.message, text, keyboard)
                    .await
            }
        }
    }
}

/// `expiry` is `None` when access comes from free mode.
pub fn caption(title: &str, expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let header = format!("<b>📱 {} MENU</b>", html::escape(title));
    match expiry {
        Some(expiry) => format!(
            "{}\n\n<b>VIP TIME LEFT:</b> {}\n\n<i>Pick an option below</i>",
            header,
            format_remaining(expiry - now)
        ),
        None => format!(
            "{}\n\n<i>FREE mode is temporarily enabled.</i>\n\n<i>Pick an option below</i>",
            header
        ),
    }
}

pub fn format_remaining(left: TimeDelta) -> String {
    let secs = left.num_seconds().max(0);
    format!(
        "{}d {}h {}m {}s",
        secs / 86_400,
        (secs / 3_600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

/// One countdown task per chat. Showing a new menu replaces the old task.
#[derive(Clone, Default)]
pub struct MenuTickers {
    tasks: Arc<Mutex<HashMap<ChatId, JoinHandle<()>>>>,
}

impl MenuTickers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start<M: Messenger>(&self, messenger: M, card: MenuCard, period: Duration) {
        let chat = card.chat;
        let handle = tokio::spawn(run_countdown(messenger, card, period));
        if let Some(previous) = self.tasks.lock().await.insert(chat, handle) {
            previous.abort();
        }
    }

    pub async fn stop(&self, chat: ChatId) {
        if let Some(handle) = self.tasks.lock().await.remove(&chat) {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub async fn is_running(&self, chat: ChatId) -> bool {
        self.tasks
            .lock()
            .await
            .get(&chat)
            .is_some_and(|h| !h.is_finished())
    }
}

async fn run_countdown<M: Messenger>(messenger: M, card: MenuCard, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let now = Utc::now();
        if card.expiry <= now {
            let _ = card.edit(&messenger, EXPIRED_NOTICE, None).await;
            debug!("Menu countdown for chat {} reached expiry", card.chat.0);
            break;
        }
        let text = caption(&card.title, Some(card.expiry), now);
        if let Err(e) = card.edit(&messenger, &text, Some(card.keyboard.clone())).await {
            debug!("Stopping menu countdown for chat {}: {}", card.chat.0, e);
            break;
        }
    }
}
