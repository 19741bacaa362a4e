// Core modules
pub mod api;
pub mod broker;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod market;
pub mod models;
pub mod risk;
pub mod scheduler;
pub mod session;
pub mod strategy;

// Re-export commonly used types
pub use error::{BrokerError, TradingError};
pub use models::*;
pub use session::TradingSession;
pub use strategy::SignalPolicy;

// Error handling
pub type Result<T> = std::result::Result<T, TradingError>;
