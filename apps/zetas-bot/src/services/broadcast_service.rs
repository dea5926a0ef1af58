use chrono::{DateTime, Utc};
use std::time::Duration;
use teloxide::types::{ChatId, MessageId};
use teloxide::utils::html;
use tracing::{info, warn};
use zetas_db::UserRepository;

use crate::bot::messenger::Messenger;

#[derive(Debug, Clone)]
pub enum BroadcastPayload {
    Text(String),
    /// A message in the admin's chat, copied to each recipient unchanged.
    Media { from: ChatId, message: MessageId },
}

#[derive(Clone)]
pub struct BroadcastService {
    users: UserRepository,
    pace: Duration,
}

impl BroadcastService {
    pub fn new(users: UserRepository, pace: Duration) -> Self {
        Self { users, pace }
    }

    /// Delivers `payload` to every chat with active VIP and returns how many
    /// deliveries succeeded. A failed recipient is skipped, never fatal.
    pub async fn notify_active_vip<M: Messenger>(
        &self,
        messenger: &M,
        payload: &BroadcastPayload,
        now: DateTime<Utc>,
    ) -> anyhow::Result<usize> {
        let recipients = self.users.list_active_vip(now).await?;
        info!("Broadcasting to {} active VIP users", recipients.len());

        let mut delivered = 0;
        for user in &recipients {
            let chat = ChatId(user.tg_id);
            let res = match payload {
                BroadcastPayload::Text(text) => messenger
                    .send_html(chat, &format_notice(text), None)
                    .await
                    .map(|_| ()),
                BroadcastPayload::Media { from, message } => {
                    messenger.copy_to(chat, *from, *message).await
                }
            };
            match res {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to notify VIP {}: {}", user.tg_id, e),
            }

            if !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
        }

        info!(
            "Broadcast complete: {}/{} delivered",
            delivered,
            recipients.len()
        );
        Ok(delivered)
    }
}

fn format_notice(text: &str) -> String {
    format!("📢 <b>IMPORTANT NOTICE:</b>\n\n{}", html::escape(text))
}
