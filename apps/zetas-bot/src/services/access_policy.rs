use chrono::{DateTime, Utc};
use zetas_db::User;

use crate::services::pairing_service::PairingMode;

/// Whether `user` may reach the gated menu. Evaluated on every request since
/// VIP expiry is relative to `now`.
pub fn can_use_gated_tool(user: &User, free_mode: bool, now: DateTime<Utc>) -> bool {
    user.is_vip_active(now) || free_mode
}

/// Free-mode sessions are reserved for regular chats that never had VIP.
pub fn pairing_mode(user: &User, free_mode: bool, is_admin: bool) -> PairingMode {
    if free_mode && !is_admin && user.vip_expires_at.is_none() {
        PairingMode::Free
    } else {
        PairingMode::Paid
    }
}
