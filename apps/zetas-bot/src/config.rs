use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Telegram front end for VIP access and device pairing", long_about = None)]
pub struct BotConfig {
    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Chat ids allowed into the admin branches (comma separated)
    #[arg(long, env = "ADMIN_IDS", value_delimiter = ',')]
    pub admin_ids: Vec<i64>,

    #[arg(long, env = "USERS_FILE", default_value = "data/users.json")]
    pub users_file: PathBuf,

    /// Root of the pairing workspaces; free-mode sessions live under `<dir>/free`
    #[arg(long, env = "PAIRING_DIR", default_value = "data/pairing")]
    pub pairing_dir: PathBuf,

    /// Program started for every pairing attempt as `<cmd> <args..> <number> <workspace>`
    #[arg(long, env = "PAIRING_COMMAND", default_value = "node")]
    pub pairing_command: PathBuf,

    #[arg(long, env = "PAIRING_ARGS", value_delimiter = ',', default_value = "pairing.js")]
    pub pairing_args: Vec<String>,

    #[arg(long, env = "PAIRING_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub pairing_poll_interval_ms: u64,

    #[arg(long, env = "PAIRING_MAX_ATTEMPTS", default_value_t = 30)]
    pub pairing_max_attempts: u32,

    /// Optional picture shown on the menu card
    #[arg(long, env = "MENU_PHOTO")]
    pub menu_photo: Option<PathBuf>,

    #[arg(long, env = "BOT_TITLE", default_value = "ZETAS-BOT V4")]
    pub title: String,

    #[arg(long, env = "PRICE_DAY", default_value_t = 5)]
    pub price_day: u32,

    #[arg(long, env = "PRICE_WEEK", default_value_t = 25)]
    pub price_week: u32,

    #[arg(long, env = "PRICE_MONTH", default_value_t = 80)]
    pub price_month: u32,

    #[arg(long, env = "PRICE_YEAR", default_value_t = 800)]
    pub price_year: u32,

    /// Pause between deliveries when notifying VIPs
    #[arg(long, env = "BROADCAST_PACE_MS", default_value_t = 50)]
    pub broadcast_pace_ms: u64,
}

impl BotConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.pairing_poll_interval_ms)
    }

    pub fn broadcast_pace(&self) -> Duration {
        Duration::from_millis(self.broadcast_pace_ms)
    }
}
