// Core modules
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod models;
pub mod profiles;
pub mod retry;

// Re-export commonly used types
pub use api::{PriceSource, SwapExecutor, WalletProvider};
pub use config::Settings;
pub use execution::{AutoBuyOutcome, AutoBuyer, CycleReport, OrderManager, OrderRequest};
pub use models::*;
pub use profiles::ProfileManager;

// Error handling
pub use error::{EngineError, Result};
