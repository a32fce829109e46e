// Order tracking, exit triggers and swap execution
pub mod auto_buyer;
pub mod ledger;
pub mod monitor;
pub mod order_manager;
pub mod trigger;

pub use auto_buyer::{AutoBuyOutcome, AutoBuyer};
pub use monitor::{ConfirmationMonitor, MonitorConfig, MonitorOutcome};
pub use order_manager::{CycleFailure, CycleReport, OrderManager, OrderRequest};
pub use trigger::{evaluate, TriggerDecision};
