pub mod cli;
pub mod config;
pub mod core;
pub mod logging;

pub use config::SyncConfig;
pub use crate::core::{FileInventory, SyncEngine, SyncError, SyncReport};
