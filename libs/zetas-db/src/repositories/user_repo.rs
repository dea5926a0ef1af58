use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::user::User;

/// Flat-file user store.
///
/// Every operation reads the whole file and every mutation rewrites it. All
/// mutations go through `write_lock`, so two handlers updating overlapping
/// records cannot lose each other's writes.
#[derive(Debug, Clone)]
pub struct UserRepository {
    path: PathBuf,
    admin_ids: Arc<Vec<i64>>,
    write_lock: Arc<Mutex<()>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub total: usize,
    pub active_vip: usize,
    pub linked: usize,
}

struct Snapshot {
    users: Vec<User>,
    corrupt: bool,
}

impl UserRepository {
    /// Opens the store, creating an empty `[]` file when none exists yet.
    pub async fn open(path: impl Into<PathBuf>, admin_ids: Vec<i64>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::write(&path, "[]")
                .await
                .with_context(|| format!("Failed to create users file {}", path.display()))?;
            info!("Created empty users file at {}", path.display());
        }

        Ok(Self {
            path,
            admin_ids: Arc::new(admin_ids),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_admin_id(&self, tg_id: i64) -> bool {
        self.admin_ids.contains(&tg_id)
    }

    pub async fn get_all(&self) -> Result<Vec<User>> {
        Ok(self.load().await?.users)
    }

    pub async fn get_by_tg_id(&self, tg_id: i64) -> Result<Option<User>> {
        Ok(self
            .load()
            .await?
            .users
            .into_iter()
            .find(|u| u.tg_id == tg_id))
    }

    /// Returns the record for `tg_id`, persisting a fresh one on first contact.
    pub async fn get_or_create(&self, tg_id: i64) -> Result<User> {
        let is_admin = self.is_admin_id(tg_id);
        self.mutate(|users| {
            if let Some(existing) = users.iter().find(|u| u.tg_id == tg_id) {
                return (existing.clone(), false);
            }
            let user = User::new(tg_id, is_admin);
            users.push(user.clone());
            (user, true)
        })
        .await
    }

    /// Links `account` to `tg_id`, taking it away from any other owner first.
    /// Does nothing when `tg_id` has no record.
    pub async fn link_account(
        &self,
        tg_id: i64,
        account: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        self.mutate(|users| {
            if !users.iter().any(|u| u.tg_id == tg_id) {
                return (None, false);
            }
            for other in users
                .iter_mut()
                .filter(|u| u.tg_id != tg_id && u.linked_account.as_deref() == Some(account))
            {
                debug!("Account moved away from chat {}", other.tg_id);
                other.linked_account = None;
            }
            let user = users.iter_mut().find(|u| u.tg_id == tg_id).map(|u| {
                u.linked_account = Some(account.to_string());
                u.last_linked_at = Some(now);
                u.clone()
            });
            (user, true)
        })
        .await
    }

    /// Clears the link fields. The caller owns purging on-disk sessions.
    pub async fn unlink_account(&self, tg_id: i64) -> Result<Option<User>> {
        self.mutate(|users| match users.iter_mut().find(|u| u.tg_id == tg_id) {
            Some(user) => {
                user.linked_account = None;
                user.last_linked_at = None;
                (Some(user.clone()), true)
            }
            None => (None, false),
        })
        .await
    }

    /// Adds `days` of VIP on top of whichever is later: now or the current expiry.
    pub async fn grant_vip(&self, tg_id: i64, days: i64, now: DateTime<Utc>) -> Result<User> {
        anyhow::ensure!(days > 0, "VIP grant must be at least one day, got {}", days);
        let extra = TimeDelta::try_days(days).context("VIP grant is out of range")?;
        let is_admin = self.is_admin_id(tg_id);

        self.mutate(|users| {
            let idx = match users.iter().position(|u| u.tg_id == tg_id) {
                Some(idx) => idx,
                None => {
                    users.push(User::new(tg_id, is_admin));
                    users.len() - 1
                }
            };
            let user = &mut users[idx];
            let base = user.vip_expires_at.filter(|exp| *exp > now).unwrap_or(now);
            let Some(expires) = base.checked_add_signed(extra) else {
                return (
                    Err(anyhow::anyhow!("VIP grant of {} days for {} overflows the calendar", days, tg_id)),
                    false,
                );
            };
            user.vip_expires_at = Some(expires);
            (Ok(user.clone()), true)
        })
        .await?
    }

    pub async fn list_active_vip(&self, now: DateTime<Utc>) -> Result<Vec<User>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|u| u.is_vip_active(now))
            .collect())
    }

    pub async fn count_linked(&self) -> Result<usize> {
        Ok(self.get_all().await?.iter().filter(|u| u.is_linked()).count())
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<UserStats> {
        let users = self.get_all().await?;
        Ok(UserStats {
            total: users.len(),
            active_vip: users.iter().filter(|u| u.is_vip_active(now)).count(),
            linked: users.iter().filter(|u| u.is_linked()).count(),
        })
    }

    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<User>) -> (T, bool),
    {
        let _guard = self.write_lock.lock().await;
        let Snapshot { mut users, corrupt } = self.load().await?;
        let (out, changed) = f(&mut users);
        if changed {
            if corrupt {
                self.preserve_corrupt_file().await;
            }
            self.save(&users).await?;
        }
        Ok(out)
    }

    async fn load(&self) -> Result<Snapshot> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Snapshot {
                    users: Vec::new(),
                    corrupt: false,
                });
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        match serde_json::from_slice::<Vec<User>>(&raw) {
            Ok(users) => Ok(Snapshot {
                users,
                corrupt: false,
            }),
            Err(e) => {
                warn!(
                    "Users file {} is unreadable ({}), treating it as empty",
                    self.path.display(),
                    e
                );
                Ok(Snapshot {
                    users: Vec::new(),
                    corrupt: true,
                })
            }
        }
    }

    async fn preserve_corrupt_file(&self) {
        let backup = self.sibling(&format!(
            "corrupt-{}",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        match tokio::fs::copy(&self.path, &backup).await {
            Ok(_) => warn!("Corrupt users file preserved at {}", backup.display()),
            Err(e) => warn!("Could not preserve corrupt users file: {}", e),
        }
    }

    /// Writes to a temp file and renames it over the store, so readers never
    /// observe a half-written collection.
    async fn save(&self, users: &[User]) -> Result<()> {
        let body = serde_json::to_vec_pretty(users).context("Failed to serialize users")?;
        let tmp = self.sibling(&format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to replace {}", self.path.display()));
        }
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "users.json".into());
        name.push(format!(".{}", suffix));
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn repo(admins: Vec<i64>) -> (TempDir, UserRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = UserRepository::open(dir.path().join("users.json"), admins)
            .await
            .unwrap();
        (dir, repo)
    }

    #[tokio::test]
    async fn test_open_creates_empty_file() {
        let (dir, repo) = repo(vec![]).await;
        let raw = std::fs::read_to_string(dir.path().join("users.json")).unwrap();
        assert_eq!(raw, "[]");
        assert!(repo.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_or_create_persists_and_flags_admin() {
        let (_dir, repo) = repo(vec![7]).await;

        let admin = repo.get_or_create(7).await.unwrap();
        let user = repo.get_or_create(8).await.unwrap();
        assert!(admin.is_admin);
        assert!(!user.is_admin);
        assert_eq!(user.linked_account, None);

        // second call returns the stored record instead of a new one
        repo.get_or_create(8).await.unwrap();
        assert_eq!(repo.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_link_moves_account_to_new_owner() {
        let (_dir, repo) = repo(vec![]).await;
        let now = Utc::now();
        repo.get_or_create(1).await.unwrap();
        repo.get_or_create(2).await.unwrap();

        repo.link_account(1, "593969533280", now).await.unwrap();
        let linked = repo.link_account(2, "593969533280", now).await.unwrap().unwrap();
        assert_eq!(linked.linked_account.as_deref(), Some("593969533280"));
        assert_eq!(linked.last_linked_at, Some(now));

        let first = repo.get_by_tg_id(1).await.unwrap().unwrap();
        assert_eq!(first.linked_account, None);
        assert_eq!(repo.count_linked().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_link_is_noop_without_record() {
        let (_dir, repo) = repo(vec![]).await;
        repo.get_or_create(1).await.unwrap();
        repo.link_account(1, "5939695332", Utc::now()).await.unwrap();

        let res = repo.link_account(99, "5939695332", Utc::now()).await.unwrap();
        assert!(res.is_none());
        assert!(repo.get_by_tg_id(99).await.unwrap().is_none());
        let owner = repo.get_by_tg_id(1).await.unwrap().unwrap();
        assert_eq!(owner.linked_account.as_deref(), Some("5939695332"));
    }

    #[tokio::test]
    async fn test_unlink_clears_link_fields() {
        let (_dir, repo) = repo(vec![]).await;
        repo.get_or_create(5).await.unwrap();
        repo.link_account(5, "12345678901", Utc::now()).await.unwrap();

        let user = repo.unlink_account(5).await.unwrap().unwrap();
        assert_eq!(user.linked_account, None);
        assert_eq!(user.last_linked_at, None);
        assert!(repo.unlink_account(6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grant_vip_from_now_and_stacking() {
        let (_dir, repo) = repo(vec![]).await;
        let now = Utc::now();

        let fresh = repo.grant_vip(10, 3, now).await.unwrap();
        assert_eq!(fresh.vip_expires_at, Some(now + Duration::days(3)));

        let stacked = repo.grant_vip(10, 2, now).await.unwrap();
        assert_eq!(stacked.vip_expires_at, Some(now + Duration::days(5)));
    }

    #[tokio::test]
    async fn test_grant_vip_restarts_from_now_after_expiry() {
        let (_dir, repo) = repo(vec![]).await;
        let past = Utc::now() - Duration::days(10);
        repo.grant_vip(10, 1, past).await.unwrap();

        let now = Utc::now();
        let user = repo.grant_vip(10, 1, now).await.unwrap();
        assert_eq!(user.vip_expires_at, Some(now + Duration::days(1)));
    }

    #[tokio::test]
    async fn test_grant_vip_rejects_non_positive_days() {
        let (_dir, repo) = repo(vec![]).await;
        assert!(repo.grant_vip(10, 0, Utc::now()).await.is_err());
        assert!(repo.grant_vip(10, -4, Utc::now()).await.is_err());
        assert!(repo.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_vip_past_calendar_end_fails_without_writing() {
        let (_dir, repo) = repo(vec![]).await;
        let now = Utc::now();
        assert!(repo.grant_vip(10, 100_000_000, now).await.is_err());
        assert!(repo.get_all().await.unwrap().is_empty());

        let granted = repo.grant_vip(11, 2, now).await.unwrap();
        assert!(repo.grant_vip(11, 100_000_000, now).await.is_err());
        let user = repo.get_by_tg_id(11).await.unwrap().unwrap();
        assert_eq!(user.vip_expires_at, granted.vip_expires_at);
    }

    #[tokio::test]
    async fn test_active_vip_and_stats() {
        let (_dir, repo) = repo(vec![]).await;
        let now = Utc::now();
        repo.grant_vip(1, 5, now).await.unwrap();
        repo.grant_vip(2, 1, now - Duration::days(3)).await.unwrap();
        repo.get_or_create(3).await.unwrap();
        repo.link_account(3, "1234567890", now).await.unwrap();

        let active = repo.list_active_vip(now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].tg_id, 1);

        let stats = repo.stats(now).await.unwrap();
        assert_eq!(
            stats,
            UserStats {
                total: 3,
                active_vip: 1,
                linked: 1
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_not_lost() {
        let (_dir, repo) = repo(vec![]).await;
        let mut tasks = Vec::new();
        for id in 0..20 {
            let repo = repo.clone();
            tasks.push(tokio::spawn(async move { repo.get_or_create(id).await }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert_eq!(repo.get_all().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_empty_and_is_preserved() {
        let (dir, repo) = repo(vec![]).await;
        std::fs::write(repo.path(), "{ not json").unwrap();

        assert!(repo.get_all().await.unwrap().is_empty());

        repo.get_or_create(1).await.unwrap();
        assert_eq!(repo.get_all().await.unwrap().len(), 1);

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
        let kept = std::fs::read_to_string(backups[0].path()).unwrap();
        assert_eq!(kept, "{ not json");
    }
}
