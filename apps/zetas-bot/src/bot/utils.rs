use std::time::Duration;
use teloxide::types::{ChatId, MessageId};
use tracing::debug;

use crate::bot::messenger::Messenger;

/// Telegram rejects messages above 4096 characters; leave room for markup.
const CHUNK_LIMIT: usize = 4000;

/// Best-effort delete. A message that is already gone is not an error.
pub async fn delete_quietly<M: Messenger>(messenger: &M, chat: ChatId, message: MessageId) {
    if let Err(e) = messenger.delete(chat, message).await {
        debug!("Ignoring failed delete of {:?} in chat {}: {}", message, chat.0, e);
    }
}

pub fn delete_later<M: Messenger>(messenger: &M, chat: ChatId, message: MessageId, after: Duration) {
    let messenger = messenger.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        delete_quietly(&messenger, chat, message).await;
    });
}

/// Splits `text` on line boundaries into pieces Telegram will accept.
pub fn chunk_lines(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if !current.is_empty() && current.chars().count() + line.chars().count() + 1 > CHUNK_LIMIT {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_lines_keeps_short_text_whole() {
        assert_eq!(chunk_lines("a\nb"), vec!["a\nb".to_string()]);
        assert!(chunk_lines("").is_empty());
    }

    #[test]
    fn test_chunk_lines_splits_long_panels() {
        let line = "x".repeat(100);
        let text = vec![line.as_str(); 100].join("\n");
        let chunks = chunk_lines(&text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= CHUNK_LIMIT));
        assert_eq!(chunks.join("\n"), text);
    }
}
