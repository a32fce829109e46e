use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderStore, ProfileStore};
use crate::error::EngineError;
use crate::models::{NewOrder, Order, OrderStatus, Platform, Profile};
use crate::Result;

/// In-process store for dry runs and tests
///
/// A single write lock per call gives the same per-order atomicity as a row update.
#[derive(Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<Uuid, Order>>,
    profiles: RwLock<HashMap<Uuid, Profile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, order: NewOrder) -> Result<Uuid> {
        order.validate()?;
        let id = Uuid::new_v4();
        let order = order.into_order(id, Utc::now());
        self.orders.write().await.insert(id, order);
        Ok(id)
    }

    async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    async fn get_orders(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.time_added);
        Ok(orders)
    }

    async fn update_last_price_max(&self, id: Uuid, new_price: f64) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(EngineError::NotFound(id))?;

        if order.status == OrderStatus::Active && new_price > order.last_price_max {
            order.last_price_max = new_price;
        }
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: OrderStatus) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(EngineError::NotFound(id))?;

        if !order.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                id,
                from: order.status,
                to: status,
            });
        }

        order.status = status;
        Ok(())
    }

    async fn complete_order(&self, id: Uuid, profit: Option<f64>) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(EngineError::NotFound(id))?;

        if order.status != OrderStatus::Processing {
            return Err(EngineError::InvalidTransition {
                id,
                from: order.status,
                to: OrderStatus::Complete,
            });
        }

        order.status = OrderStatus::Complete;
        order.time_sold = Some(Utc::now());
        order.profit = profit;
        Ok(())
    }

    async fn active_balance(&self, mint_address: &str) -> Result<f64> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.mint_address == mint_address && o.status.reserves_balance())
            .map(|o| o.balance)
            .sum())
    }

    async fn reset_processing(&self) -> Result<u64> {
        let mut orders = self.orders.write().await;
        let mut moved = 0;
        for order in orders.values_mut() {
            if order.status == OrderStatus::Processing {
                order.status = OrderStatus::Active;
                moved += 1;
            }
        }
        Ok(moved)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn save_profile(&self, profile: &Profile) -> Result<()> {
        self.profiles
            .write()
            .await
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn get_profile(&self, platform: Platform, username: &str) -> Result<Option<Profile>> {
        self.get_profile_by_id(Profile::id_for(platform, username))
            .await
    }

    async fn get_profile_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn get_profiles(&self) -> Result<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self.profiles.read().await.values().cloned().collect();
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(profiles)
    }

    async fn delete_profile(&self, id: Uuid) -> Result<bool> {
        Ok(self.profiles.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Currency, SellMode};

    fn new_order(mint: &str, balance: f64) -> NewOrder {
        NewOrder {
            mint_address: mint.to_string(),
            sell_mode: SellMode::StopLoss,
            sell_value: 10.0,
            sell_type: Currency::Usdc,
            entry_value: 2.0,
            balance,
            slippage: 50,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let id = store.create_order(new_order("MINT", 5.0)).await.unwrap();

        let order = store.get_order(id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.last_price_max, 2.0);
        assert_eq!(store.get_orders(OrderStatus::Active).await.unwrap().len(), 1);
        assert!(store.get_orders(OrderStatus::Complete).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_zero_entry_value() {
        let store = MemoryStore::new();
        let mut order = new_order("MINT", 5.0);
        order.entry_value = 0.0;

        let result = store.create_order(order).await;
        assert!(matches!(result, Err(EngineError::InvariantViolation(_))));
        assert!(store.get_orders(OrderStatus::Active).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_processing_leaves_other_states() {
        let store = MemoryStore::new();
        let stuck = store.create_order(new_order("MINT", 1.0)).await.unwrap();
        let canceled = store.create_order(new_order("MINT", 1.0)).await.unwrap();
        store.set_status(stuck, OrderStatus::Processing).await.unwrap();
        store.set_status(canceled, OrderStatus::Canceled).await.unwrap();

        assert_eq!(store.reset_processing().await.unwrap(), 1);
        assert_eq!(store.get_order(stuck).await.unwrap().status, OrderStatus::Active);
        assert_eq!(store.get_order(canceled).await.unwrap().status, OrderStatus::Canceled);
        assert_eq!(store.reset_processing().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        assert!(matches!(store.get_order(id).await, Err(EngineError::NotFound(x)) if x == id));
        assert!(matches!(
            store.set_status(id, OrderStatus::Canceled).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_last_price_max_only_ratchets_up() {
        let store = MemoryStore::new();
        let id = store.create_order(new_order("MINT", 5.0)).await.unwrap();

        store.update_last_price_max(id, 3.0).await.unwrap();
        store.update_last_price_max(id, 2.5).await.unwrap();
        assert_eq!(store.get_order(id).await.unwrap().last_price_max, 3.0);

        // Frozen once the order leaves ACTIVE
        store.set_status(id, OrderStatus::Processing).await.unwrap();
        store.update_last_price_max(id, 4.0).await.unwrap();
        assert_eq!(store.get_order(id).await.unwrap().last_price_max, 3.0);
    }

    #[tokio::test]
    async fn test_set_status_rejects_illegal_transition() {
        let store = MemoryStore::new();
        let id = store.create_order(new_order("MINT", 5.0)).await.unwrap();

        store.set_status(id, OrderStatus::Canceled).await.unwrap();
        let result = store.set_status(id, OrderStatus::Processing).await;

        assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
        assert_eq!(store.get_order(id).await.unwrap().status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn test_complete_requires_processing() {
        let store = MemoryStore::new();
        let id = store.create_order(new_order("MINT", 5.0)).await.unwrap();

        assert!(store.complete_order(id, Some(1.0)).await.is_err());

        store.set_status(id, OrderStatus::Processing).await.unwrap();
        store.complete_order(id, Some(12.5)).await.unwrap();

        let order = store.get_order(id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Complete);
        assert_eq!(order.profit, Some(12.5));
        assert!(order.time_sold.is_some());
    }

    #[tokio::test]
    async fn test_active_balance_counts_active_and_processing() {
        let store = MemoryStore::new();
        let a = store.create_order(new_order("MINT", 5.0)).await.unwrap();
        let b = store.create_order(new_order("MINT", 3.0)).await.unwrap();
        let c = store.create_order(new_order("MINT", 2.0)).await.unwrap();
        store.create_order(new_order("OTHER", 100.0)).await.unwrap();

        store.set_status(b, OrderStatus::Processing).await.unwrap();
        store.set_status(c, OrderStatus::Canceled).await.unwrap();

        assert_eq!(store.active_balance("MINT").await.unwrap(), 8.0);

        store.set_status(a, OrderStatus::Processing).await.unwrap();
        store.complete_order(a, None).await.unwrap();
        assert_eq!(store.active_balance("MINT").await.unwrap(), 3.0);
    }
}
