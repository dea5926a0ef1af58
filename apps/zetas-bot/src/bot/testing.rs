//! In-memory doubles for the Bot API and the pairing routine.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teloxide::types::{ChatId, InlineKeyboardButtonKind, InlineKeyboardMarkup, MessageId};
use tempfile::TempDir;
use zetas_db::UserRepository;

use crate::bot::messenger::{Messenger, TransportError};
use crate::config::BotConfig;
use crate::models::incoming::{Command, Incoming, IncomingKind};
use crate::services::pairing_service::{PairingRoutine, ARTIFACT_FILE};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub enum Sent {
    Html {
        chat: ChatId,
        id: MessageId,
        text: String,
        buttons: Vec<String>,
    },
    EditHtml {
        chat: ChatId,
        message: MessageId,
        text: String,
    },
    Photo {
        chat: ChatId,
        caption: String,
    },
    EditCaption {
        chat: ChatId,
        message: MessageId,
        caption: String,
    },
    Deleted {
        chat: ChatId,
        message: MessageId,
    },
    File {
        chat: ChatId,
        path: PathBuf,
    },
    Copy {
        to: ChatId,
        from: ChatId,
        message: MessageId,
    },
}

#[derive(Clone, Default)]
pub struct RecordingMessenger {
    log: Arc<Mutex<Vec<Sent>>>,
    next_id: Arc<AtomicI32>,
    failing: Arc<Mutex<HashSet<ChatId>>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call targeting `chat` fails from now on.
    pub fn fail_for(&self, chat: ChatId) {
        self.failing.lock().unwrap().insert(chat);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Html { chat: c, text, .. } if c == chat => Some(text),
                Sent::Photo {
                    chat: c, caption, ..
                } if c == chat => Some(caption),
                _ => None,
            })
            .collect()
    }

    pub fn last_text_to(&self, chat: ChatId) -> Option<String> {
        self.texts_to(chat).pop()
    }

    pub fn buttons_to(&self, chat: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Html {
                    chat: c, buttons, ..
                } if c == chat => Some(buttons),
                _ => None,
            })
            .last()
            .unwrap_or_default()
    }

    fn check(&self, chat: ChatId) -> Result<(), TransportError> {
        if self.failing.lock().unwrap().contains(&chat) {
            return Err(TransportError::Rejected(format!("chat {} unreachable", chat.0)));
        }
        Ok(())
    }

    fn push(&self, sent: Sent) {
        self.log.lock().unwrap().push(sent);
    }

    fn allocate(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn callback_data(keyboard: Option<InlineKeyboardMarkup>) -> Vec<String> {
    keyboard
        .map(|k| {
            k.inline_keyboard
                .into_iter()
                .flatten()
                .filter_map(|b| match b.kind {
                    InlineKeyboardButtonKind::CallbackData(data) => Some(data),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_html(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId, TransportError> {
        self.check(chat)?;
        let id = self.allocate();
        self.push(Sent::Html {
            chat,
            id,
            text: text.to_string(),
            buttons: callback_data(keyboard),
        });
        Ok(id)
    }

    async fn edit_html(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        _keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError> {
        self.check(chat)?;
        self.push(Sent::EditHtml {
            chat,
            message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_photo_card(
        &self,
        chat: ChatId,
        _photo: &Path,
        caption: &str,
        _keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId, TransportError> {
        self.check(chat)?;
        let id = self.allocate();
        self.push(Sent::Photo {
            chat,
            caption: caption.to_string(),
        });
        Ok(id)
    }

    async fn edit_caption_html(
        &self,
        chat: ChatId,
        message: MessageId,
        caption: &str,
        _keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError> {
        self.check(chat)?;
        self.push(Sent::EditCaption {
            chat,
            message,
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, chat: ChatId, message: MessageId) -> Result<(), TransportError> {
        self.check(chat)?;
        self.push(Sent::Deleted { chat, message });
        Ok(())
    }

    async fn send_file(&self, chat: ChatId, path: &Path) -> Result<(), TransportError> {
        self.check(chat)?;
        self.push(Sent::File {
            chat,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn copy_to(
        &self,
        to: ChatId,
        from: ChatId,
        message: MessageId,
    ) -> Result<(), TransportError> {
        self.check(to)?;
        self.push(Sent::Copy { to, from, message });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum RoutineBehavior {
    WriteCode(String),
    WriteCodeAfter(String, Duration),
    Silent,
    Fail,
}

/// Stands in for the external code generator.
pub struct ScriptedRoutine {
    behavior: RoutineBehavior,
    calls: AtomicU32,
    last: Mutex<Option<(String, PathBuf)>>,
}

impl ScriptedRoutine {
    pub fn new(behavior: RoutineBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicU32::new(0),
            last: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_number(&self) -> Option<String> {
        self.last.lock().unwrap().as_ref().map(|(n, _)| n.clone())
    }

    pub fn last_workspace(&self) -> Option<PathBuf> {
        self.last.lock().unwrap().as_ref().map(|(_, w)| w.clone())
    }
}

fn artifact_body(code: &str) -> String {
    serde_json::json!({ "code": code }).to_string()
}

#[async_trait]
impl PairingRoutine for ScriptedRoutine {
    async fn start(&self, number: &str, workspace: &Path) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((number.to_string(), workspace.to_path_buf()));

        match &self.behavior {
            RoutineBehavior::WriteCode(code) => {
                tokio::fs::write(workspace.join(ARTIFACT_FILE), artifact_body(code)).await?;
            }
            RoutineBehavior::WriteCodeAfter(code, delay) => {
                let path = workspace.join(ARTIFACT_FILE);
                let body = artifact_body(code);
                let delay = *delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tokio::fs::write(path, body).await;
                });
            }
            RoutineBehavior::Silent => {}
            RoutineBehavior::Fail => anyhow::bail!("socket closed before pairing"),
        }
        Ok(())
    }
}

pub fn test_config(dir: &Path, admin_ids: Vec<i64>) -> BotConfig {
    BotConfig {
        token: "test-token".into(),
        admin_ids,
        users_file: dir.join("users.json"),
        pairing_dir: dir.join("pairing"),
        pairing_command: PathBuf::from("true"),
        pairing_args: vec![],
        pairing_poll_interval_ms: 1,
        pairing_max_attempts: 20,
        menu_photo: None,
        title: "ZETAS-BOT V4".into(),
        price_day: 5,
        price_week: 25,
        price_month: 80,
        price_year: 800,
        broadcast_pace_ms: 0,
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub state: AppState,
    pub messenger: RecordingMessenger,
    pub routine: Arc<ScriptedRoutine>,
}

impl Harness {
    pub async fn new(admin_ids: Vec<i64>, behavior: RoutineBehavior) -> Self {
        Self::with_config(behavior, |dir| test_config(dir, admin_ids)).await
    }

    pub async fn with_config(
        behavior: RoutineBehavior,
        make: impl FnOnce(&Path) -> BotConfig,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = make(dir.path());
        let users = UserRepository::open(&config.users_file, config.admin_ids.clone())
            .await
            .unwrap();
        let routine = ScriptedRoutine::new(behavior);
        let state = AppState::new(config, users, routine.clone());
        Self {
            dir,
            state,
            messenger: RecordingMessenger::new(),
            routine,
        }
    }

    pub fn pairing_dir(&self) -> PathBuf {
        self.dir.path().join("pairing")
    }
}

static NEXT_INBOUND: AtomicI32 = AtomicI32::new(10_000);

fn event(chat: i64, kind: IncomingKind) -> Incoming {
    Incoming {
        chat_id: ChatId(chat),
        sender_name: "Tester".into(),
        message_id: Some(MessageId(NEXT_INBOUND.fetch_add(1, Ordering::SeqCst))),
        kind,
    }
}

pub fn text_event(chat: i64, text: &str) -> Incoming {
    event(chat, IncomingKind::Text(text.to_string()))
}

pub fn media_event(chat: i64) -> Incoming {
    event(chat, IncomingKind::Media)
}

pub fn command_event(chat: i64, command: Command) -> Incoming {
    event(chat, IncomingKind::Command(command))
}

pub fn callback_event(chat: i64, data: &str) -> Incoming {
    event(chat, IncomingKind::Callback(data.to_string()))
}
