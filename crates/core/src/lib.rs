pub mod config;
pub mod retry;
pub mod session;
pub mod types;

pub use types::Entity;
