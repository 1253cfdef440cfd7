pub mod admin;
pub mod api;
pub mod auth;
pub mod bank;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use store::JsonStore;
