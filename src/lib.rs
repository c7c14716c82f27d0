// Core modules
pub mod api;
pub mod config;
pub mod db;
pub mod decision;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod news;
pub mod performance;
pub mod trader;

// Re-export commonly used types
pub use api::Exchange;
pub use config::Settings;
pub use models::*;
pub use trader::{CycleOutcome, Trader};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
