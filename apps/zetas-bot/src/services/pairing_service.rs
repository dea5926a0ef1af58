use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// File the external routine writes into its workspace once a code exists.
pub const ARTIFACT_FILE: &str = "pairing.json";
const FREE_SUBTREE: &str = "free";

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("phone number must have 10 to 15 digits")]
    InvalidNumber,
    #[error("could not prepare pairing workspace {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("pairing routine failed: {0:#}")]
    ExternalFailure(anyhow::Error),
    #[error("no pairing code after {attempts} attempts")]
    Timeout { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingMode {
    Paid,
    Free,
}

/// Digits-only phone number, 10 to 15 digits long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, PairingError> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if (10..=15).contains(&digits.len()) {
            Ok(Self(digits))
        } else {
            Err(PairingError::InvalidNumber)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The opaque code generator. It is only started here; completion is
/// observed through the artifact it leaves in `workspace`.
#[async_trait]
pub trait PairingRoutine: Send + Sync {
    async fn start(&self, number: &str, workspace: &Path) -> anyhow::Result<()>;
}

/// Runs `<program> <args..> <number> <workspace>` as a detached child process.
pub struct CommandRoutine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRoutine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl PairingRoutine for CommandRoutine {
    async fn start(&self, number: &str, workspace: &Path) -> anyhow::Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(number)
            .arg(workspace)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program.display()))?;

        let workspace = workspace.to_path_buf();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!("Pairing routine for {} exited", workspace.display())
                }
                Ok(status) => warn!(
                    "Pairing routine for {} exited with {}",
                    workspace.display(),
                    status
                ),
                Err(e) => warn!("Lost track of pairing routine for {}: {}", workspace.display(), e),
            }
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { code: String, attempt: u32 },
    Exhausted { attempts: u32 },
}

/// Calls `probe` up to `max_attempts` times, sleeping `interval` between
/// calls, until it yields a code.
pub async fn wait_for_code<F, Fut>(policy: PollPolicy, mut probe: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<String>>,
{
    for attempt in 1..=policy.max_attempts {
        if let Some(code) = probe().await {
            return PollOutcome::Ready { code, attempt };
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    PollOutcome::Exhausted {
        attempts: policy.max_attempts,
    }
}

#[derive(Deserialize)]
struct PairingArtifact {
    code: String,
}

/// Reads the artifact. Missing, half-written or empty files all count as
/// "not ready yet".
pub async fn read_artifact(path: &Path) -> Option<String> {
    let raw = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice::<PairingArtifact>(&raw) {
        Ok(artifact) => Some(artifact.code.trim().to_string()).filter(|c| !c.is_empty()),
        Err(e) => {
            debug!("Pairing artifact {} not ready: {}", path.display(), e);
            None
        }
    }
}

#[derive(Clone)]
pub struct PairingService {
    root: PathBuf,
    routine: Arc<dyn PairingRoutine>,
    poll: PollPolicy,
}

impl PairingService {
    pub fn new(root: impl Into<PathBuf>, routine: Arc<dyn PairingRoutine>, poll: PollPolicy) -> Self {
        Self {
            root: root.into(),
            routine,
            poll,
        }
    }

    pub fn free_root(&self) -> PathBuf {
        self.root.join(FREE_SUBTREE)
    }

    pub fn workspace_for(&self, chat_id: i64, number: &PhoneNumber, mode: PairingMode) -> PathBuf {
        let base = match mode {
            PairingMode::Paid => self.root.clone(),
            PairingMode::Free => self.free_root(),
        };
        base.join(chat_id.to_string()).join(number.as_str())
    }

    /// Normalizes `raw` and runs a full pairing attempt. Does not touch the
    /// user store; persisting the link on success is up to the caller.
    pub async fn request_pairing(
        &self,
        chat_id: i64,
        raw: &str,
        mode: PairingMode,
    ) -> Result<String, PairingError> {
        let number = PhoneNumber::parse(raw)?;
        self.pair(chat_id, &number, mode).await
    }

    pub async fn pair(
        &self,
        chat_id: i64,
        number: &PhoneNumber,
        mode: PairingMode,
    ) -> Result<String, PairingError> {
        let workspace = self.workspace_for(chat_id, number, mode);
        prepare_workspace(&workspace).await?;

        info!("Starting {:?} pairing for chat {}", mode, chat_id);
        self.routine
            .start(number.as_str(), &workspace)
            .await
            .map_err(|e| {
                error!("Pairing routine failed for chat {}: {:#}", chat_id, e);
                PairingError::ExternalFailure(e)
            })?;

        let artifact = workspace.join(ARTIFACT_FILE);
        match wait_for_code(self.poll, || read_artifact(&artifact)).await {
            PollOutcome::Ready { code, attempt } => {
                info!("Pairing code ready for chat {} after {} attempt(s)", chat_id, attempt);
                Ok(code)
            }
            PollOutcome::Exhausted { attempts } => {
                warn!("Pairing for chat {} timed out, workspace kept at {}", chat_id, workspace.display());
                Err(PairingError::Timeout { attempts })
            }
        }
    }

    /// Removes every workspace belonging to `chat_id`, paid and free.
    pub async fn purge_chat(&self, chat_id: i64) -> std::io::Result<()> {
        remove_tree(&self.root.join(chat_id.to_string())).await?;
        remove_tree(&self.free_root().join(chat_id.to_string())).await
    }

    /// Drops the whole free-mode subtree.
    pub async fn purge_free_sessions(&self) -> std::io::Result<()> {
        remove_tree(&self.free_root()).await
    }
}

async fn prepare_workspace(path: &Path) -> Result<(), PairingError> {
    let wrap = |source| PairingError::Workspace {
        path: path.to_path_buf(),
        source,
    };
    remove_tree(path).await.map_err(wrap)?;
    tokio::fs::create_dir_all(path).await.map_err(wrap)
}

async fn remove_tree(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
