pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod inference;
pub mod model;
pub mod prompts;

pub use api::{router, AppState};
pub use config::AppConfig;
