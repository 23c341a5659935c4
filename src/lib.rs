//! Raffle Sync Library
//!
//! Ticket reservation and purchase engine for a number raffle. Each running
//! instance owns its own copy of the campaign state and mirrors committed
//! purchases to other instances through a broadcast hub.

pub mod activity;
pub mod admin;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod generator;
pub mod instance;
pub mod models;
pub mod relay;
pub mod snapshot;
pub mod state_manager;
pub mod store;
pub mod view;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult, RaffleError};
pub use instance::{InstanceHandle, InstanceSettings, RaffleInstance};
pub use state_manager::RaffleState;
