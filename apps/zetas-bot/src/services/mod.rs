pub mod access_policy;
pub mod admin_service;
pub mod broadcast_service;
pub mod conversation_service;
pub mod pairing_service;
pub mod settings_service;
