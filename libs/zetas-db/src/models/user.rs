use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One chat's record in the users file.
///
/// Field names on disk follow the historical `users.json` layout so an
/// existing file keeps loading: the linked account lives under
/// `whatsapp_number` (empty string meaning "not linked") and `is_admin` may be
/// stored as `0`/`1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "telegram_id")]
    pub tg_id: i64,
    #[serde(
        rename = "whatsapp_number",
        default,
        deserialize_with = "empty_as_none"
    )]
    pub linked_account: Option<String>,
    #[serde(rename = "expires", default)]
    pub vip_expires_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "loose_bool")]
    pub is_admin: bool,
    #[serde(rename = "last_connected", default)]
    pub last_linked_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(tg_id: i64, is_admin: bool) -> Self {
        Self {
            tg_id,
            linked_account: None,
            vip_expires_at: None,
            is_admin,
            last_linked_at: None,
        }
    }

    pub fn is_vip_active(&self, now: DateTime<Utc>) -> bool {
        self.vip_expires_at.is_some_and(|exp| exp > now)
    }

    pub fn is_linked(&self) -> bool {
        self.linked_account.is_some()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_reads_legacy_record() {
        let raw = r#"{"telegram_id": 7223378630, "whatsapp_number": "", "is_admin": 1}"#;
        let user: User = serde_json::from_str(raw).unwrap();

        assert_eq!(user.tg_id, 7223378630);
        assert_eq!(user.linked_account, None);
        assert!(user.is_admin);
        assert_eq!(user.vip_expires_at, None);
        assert_eq!(user.last_linked_at, None);
    }

    #[test]
    fn test_reads_linked_record_with_expiry() {
        let raw = r#"{
            "telegram_id": 42,
            "whatsapp_number": "593969533280",
            "expires": "2030-01-01T00:00:00Z",
            "is_admin": false,
            "last_connected": "2029-12-01T10:00:00.000Z"
        }"#;
        let user: User = serde_json::from_str(raw).unwrap();

        assert_eq!(user.linked_account.as_deref(), Some("593969533280"));
        assert!(user.is_linked());
        assert!(!user.is_admin);
        assert!(user.vip_expires_at.is_some());
        assert!(user.last_linked_at.is_some());
    }

    #[test]
    fn test_vip_active_is_strict_on_boundary() {
        let now = Utc::now();
        let mut user = User::new(1, false);
        assert!(!user.is_vip_active(now));

        user.vip_expires_at = Some(now);
        assert!(!user.is_vip_active(now));

        user.vip_expires_at = Some(now + Duration::seconds(1));
        assert!(user.is_vip_active(now));
    }
}
