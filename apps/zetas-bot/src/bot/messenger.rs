use async_trait::async_trait;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, InputFile, MessageId, ParseMode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),
    #[error("{0}")]
    Rejected(String),
}

/// The slice of the Bot API the handlers use. Everything is HTML formatted.
#[async_trait]
pub trait Messenger: Clone + Send + Sync + 'static {
    async fn send_html(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId, TransportError>;

    async fn edit_html(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError>;

    async fn send_photo_card(
        &self,
        chat: ChatId,
        photo: &Path,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId, TransportError>;

    async fn edit_caption_html(
        &self,
        chat: ChatId,
        message: MessageId,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError>;

    async fn delete(&self, chat: ChatId, message: MessageId) -> Result<(), TransportError>;

    async fn send_file(&self, chat: ChatId, path: &Path) -> Result<(), TransportError>;

    /// Re-sends `message` from `from` as-is, whatever its content type.
    async fn copy_to(
        &self,
        to: ChatId,
        from: ChatId,
        message: MessageId,
    ) -> Result<(), TransportError>;
}

#[async_trait]
impl Messenger for Bot {
    async fn send_html(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId, TransportError> {
        let mut req = self.send_message(chat, text).parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            req = req.reply_markup(keyboard);
        }
        Ok(req.await?.id)
    }

    async fn edit_html(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError> {
        let mut req = self
            .edit_message_text(chat, message, text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            req = req.reply_markup(keyboard);
        }
        req.await?;
        Ok(())
    }

    async fn send_photo_card(
        &self,
        chat: ChatId,
        photo: &Path,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId, TransportError> {
        let mut req = self
            .send_photo(chat, InputFile::file(photo))
            .caption(caption)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            req = req.reply_markup(keyboard);
        }
        Ok(req.await?.id)
    }

    async fn edit_caption_html(
        &self,
        chat: ChatId,
        message: MessageId,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError> {
        let mut req = self
            .edit_message_caption(chat, message)
            .caption(caption)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            req = req.reply_markup(keyboard);
        }
        req.await?;
        Ok(())
    }

    async fn delete(&self, chat: ChatId, message: MessageId) -> Result<(), TransportError> {
        self.delete_message(chat, message).await?;
        Ok(())
    }

    async fn send_file(&self, chat: ChatId, path: &Path) -> Result<(), TransportError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(TransportError::Rejected(format!(
                "{} does not exist",
                path.display()
            )));
        }
        self.send_document(chat, InputFile::file(path)).await?;
        Ok(())
    }

    async fn copy_to(
        &self,
        to: ChatId,
        from: ChatId,
        message: MessageId,
    ) -> Result<(), TransportError> {
        self.copy_message(to, from, message).await?;
        Ok(())
    }
}
