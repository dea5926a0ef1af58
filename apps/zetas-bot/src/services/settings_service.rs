use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Process-wide runtime switches. Nothing here is persisted: a restart
/// always comes back with free mode off.
#[derive(Clone, Default)]
pub struct SettingsService {
    free_mode: Arc<RwLock<bool>>,
}

impl SettingsService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_free_mode(&self) -> bool {
        *self.free_mode.read().await
    }

    pub async fn set_free_mode(&self, enabled: bool) {
        let mut flag = self.free_mode.write().await;
        if *flag != enabled {
            info!("Free mode {}", if enabled { "enabled" } else { "disabled" });
        }
        *flag = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_free_mode_starts_off_and_toggles() {
        let settings = SettingsService::new();
        assert!(!settings.is_free_mode().await);

        settings.set_free_mode(true).await;
        let shared = settings.clone();
        assert!(shared.is_free_mode().await);

        shared.set_free_mode(false).await;
        assert!(!settings.is_free_mode().await);
    }
}
