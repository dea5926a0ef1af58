use std::sync::Arc;
use zetas_db::UserRepository;

use crate::bot::menu::MenuTickers;
use crate::config::BotConfig;
use crate::services::admin_service::AdminService;
use crate::services::broadcast_service::BroadcastService;
use crate::services::conversation_service::ConversationStore;
use crate::services::pairing_service::{PairingRoutine, PairingService, PollPolicy};
use crate::services::settings_service::SettingsService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BotConfig>,
    pub users: UserRepository,
    pub settings: SettingsService,
    pub admin_service: AdminService,
    pub pairing_service: PairingService,
    pub broadcast_service: BroadcastService,
    pub conversations: ConversationStore,
    pub menus: MenuTickers,
}

impl AppState {
    pub fn new(config: BotConfig, users: UserRepository, routine: Arc<dyn PairingRoutine>) -> Self {
        let pairing_service = PairingService::new(
            config.pairing_dir.clone(),
            routine,
            PollPolicy {
                interval: config.poll_interval(),
                max_attempts: config.pairing_max_attempts,
            },
        );
        let broadcast_service = BroadcastService::new(users.clone(), config.broadcast_pace());

        Self {
            admin_service: AdminService::new(config.admin_ids.clone()),
            settings: SettingsService::new(),
            conversations: ConversationStore::new(),
            menus: MenuTickers::new(),
            pairing_service,
            broadcast_service,
            users,
            config: Arc::new(config),
        }
    }

    pub fn is_admin(&self, tg_id: i64) -> bool {
        self.admin_service.is_admin(tg_id)
    }
}
