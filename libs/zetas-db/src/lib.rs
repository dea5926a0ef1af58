pub mod models;
pub mod repositories;

pub use repositories::user_repo::{UserRepository, UserStats};
pub use models::user::User;
