pub mod conversation;
pub mod incoming;
