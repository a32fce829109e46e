pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresPersistence;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{NewOrder, Order, OrderStatus, Platform, Profile};
use crate::Result;

/// Durable record of every order
///
/// Each call is atomic on its own; nothing spans several orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an ACTIVE order with `last_price_max = entry_value`
    async fn create_order(&self, order: NewOrder) -> Result<Uuid>;

    async fn get_order(&self, id: Uuid) -> Result<Order>;

    async fn get_orders(&self, status: OrderStatus) -> Result<Vec<Order>>;

    /// Raise `last_price_max`; ignored unless the order is ACTIVE and the price is a new high
    async fn update_last_price_max(&self, id: Uuid, new_price: f64) -> Result<()>;

    /// Compare-and-set status change, rejected unless the current status may move to `status`
    async fn set_status(&self, id: Uuid, status: OrderStatus) -> Result<()>;

    /// PROCESSING -> COMPLETE with `time_sold = now`
    async fn complete_order(&self, id: Uuid, profit: Option<f64>) -> Result<()>;

    /// Sum of balances still committed (ACTIVE or PROCESSING) for a mint
    async fn active_balance(&self, mint_address: &str) -> Result<f64>;

    /// Move every PROCESSING order back to ACTIVE, returning how many moved
    ///
    /// Only safe while no cycle is running against this store.
    async fn reset_processing(&self) -> Result<u64>;
}

/// Storage for buy/sell profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or replace by id
    async fn save_profile(&self, profile: &Profile) -> Result<()>;

    async fn get_profile(&self, platform: Platform, username: &str) -> Result<Option<Profile>>;

    async fn get_profile_by_id(&self, id: Uuid) -> Result<Option<Profile>>;

    async fn get_profiles(&self) -> Result<Vec<Profile>>;

    /// Returns false when no profile had that id
    async fn delete_profile(&self, id: Uuid) -> Result<bool>;
}
