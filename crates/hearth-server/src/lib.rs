pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod server;
pub mod state;

pub use config::{Cli, ServerConfig};
pub use server::{app_config, run_server};
pub use state::AppState;
