use teloxide::types::{CallbackQuery, ChatId, Message, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Menu,
    Pairing,
    Admin,
    Stats,
    FreeOn,
    FreeOff,
}

impl Command {
    /// Parses `/name`, `/name@bot` or `/name args`. Unknown commands yield `None`
    /// and are treated as plain text.
    pub fn parse(text: &str) -> Option<Command> {
        let head = text.split_whitespace().next()?.strip_prefix('/')?;
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        match name.as_str() {
            "start" => Some(Command::Start),
            "menu" => Some(Command::Menu),
            "pairing" => Some(Command::Pairing),
            "admin" | "adminmenu" => Some(Command::Admin),
            "stats" => Some(Command::Stats),
            "free_on" => Some(Command::FreeOn),
            "free_off" => Some(Command::FreeOff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingKind {
    Command(Command),
    Callback(String),
    Text(String),
    /// Any non-text message (photo, video, document, ...).
    Media,
}

/// A transport-neutral view of one update.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub chat_id: ChatId,
    pub sender_name: String,
    pub message_id: Option<MessageId>,
    pub kind: IncomingKind,
}

impl Incoming {
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            IncomingKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn from_message(msg: &Message) -> Option<Self> {
        let kind = if let Some(text) = msg.text() {
            match Command::parse(text) {
                Some(cmd) => IncomingKind::Command(cmd),
                None => IncomingKind::Text(text.to_string()),
            }
        } else if carries_media(msg) {
            IncomingKind::Media
        } else {
            return None;
        };

        Some(Self {
            chat_id: msg.chat.id,
            sender_name: msg
                .from
                .as_ref()
                .map(|u| u.first_name.clone())
                .unwrap_or_default(),
            message_id: Some(msg.id),
            kind,
        })
    }

    pub fn from_callback(q: &CallbackQuery) -> Option<Self> {
        let data = q.data.clone()?;
        let (chat_id, message_id) = match q.message.as_ref() {
            Some(m) => (m.chat().id, Some(m.id())),
            None => (ChatId(q.from.id.0 as i64), None),
        };
        Some(Self {
            chat_id,
            sender_name: q.from.first_name.clone(),
            message_id,
            kind: IncomingKind::Callback(data),
        })
    }
}

fn carries_media(msg: &Message) -> bool {
    msg.caption().is_some()
        || msg.photo().is_some()
        || msg.video().is_some()
        || msg.audio().is_some()
        || msg.voice().is_some()
        || msg.document().is_some()
        || msg.animation().is_some()
        || msg.sticker().is_some()
        || msg.video_note().is_some()
}
