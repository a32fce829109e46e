use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::ledger;
use super::monitor::{ConfirmationMonitor, MonitorConfig, MonitorOutcome};
use super::trigger::{self, TriggerDecision};
use crate::api::{PriceSource, SwapExecutor, WalletProvider};
use crate::db::OrderStore;
use crate::error::EngineError;
use crate::models::{Currency, NewOrder, Order, OrderStatus, SellMode};
use crate::Result;

/// Manual request to start tracking tokens already held in the wallet
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub mint_address: String,
    pub sell_mode: SellMode,
    pub sell_value: f64,
    pub sell_type: Currency,
    pub balance: f64,
    pub slippage: u16,
}

/// An order-level failure collected during a cycle
#[derive(Debug)]
pub struct CycleFailure {
    pub order_id: Option<Uuid>,
    pub mint_address: String,
    pub error: EngineError,
}

/// Summary of one evaluation pass
#[derive(Debug, Default)]
pub struct CycleReport {
    pub evaluated: usize,
    pub ratcheted: usize,
    pub triggered: usize,
    pub sold: Vec<Uuid>,
    pub revoked: Vec<Uuid>,
    pub failures: Vec<CycleFailure>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, order_id: Option<Uuid>, mint_address: &str, error: EngineError) {
        tracing::error!(
            order_id = ?order_id,
            "❌ Cycle failure on {}: {}",
            mint_address,
            error
        );
        self.failures.push(CycleFailure {
            order_id,
            mint_address: mint_address.to_string(),
            error,
        });
    }
}

/// How a spawned per-order task ended
enum TaskOutcome {
    Sold,
    Revoked,
}

/// Drives ACTIVE orders through their exit policies
///
/// Cheap to clone; every spawned sell task carries its own handle.
#[derive(Clone)]
pub struct OrderManager {
    store: Arc<dyn OrderStore>,
    prices: Arc<dyn PriceSource>,
    swapper: Arc<dyn SwapExecutor>,
    wallet: Arc<dyn WalletProvider>,
    monitor: MonitorConfig,
}

impl OrderManager {
    pub fn new(
        store: Arc<dyn OrderStore>,
        prices: Arc<dyn PriceSource>,
        swapper: Arc<dyn SwapExecutor>,
        wallet: Arc<dyn WalletProvider>,
        monitor: MonitorConfig,
    ) -> Self {
        Self {
            store,
            prices,
            swapper,
            wallet,
            monitor,
        }
    }

    /// Start tracking part of the wallet's balance of a token
    ///
    /// The entry value is the token's current price. Fails with
    /// `InsufficientBalance` before anything is written if the request would
    /// commit more than the wallet holds.
    pub async fn add_order(&self, request: OrderRequest) -> Result<Uuid> {
        let remaining = self.remaining_trackable_balance(&request.mint_address).await?;
        ledger::ensure_trackable(&request.mint_address, request.balance, remaining)?;

        let entry_value = self.prices.get_value(&request.mint_address).await?;

        let id = self
            .store
            .create_order(NewOrder {
                mint_address: request.mint_address.clone(),
                sell_mode: request.sell_mode,
                sell_value: request.sell_value,
                sell_type: request.sell_type,
                entry_value,
                balance: request.balance,
                slippage: request.slippage,
            })
            .await?;

        tracing::info!(
            order_id = %id,
            "📝 Tracking {} of {} ({} {}) at ${:.8}",
            request.balance,
            request.mint_address,
            request.sell_mode,
            request.sell_value,
            entry_value
        );

        Ok(id)
    }

    /// Stop tracking an ACTIVE order
    pub async fn cancel_order(&self, id: Uuid) -> Result<()> {
        self.store.set_status(id, OrderStatus::Canceled).await?;
        tracing::info!(order_id = %id, "Order canceled");
        Ok(())
    }

    pub async fn get_orders(&self, status: OrderStatus) -> Result<Vec<Order>> {
        self.store.get_orders(status).await
    }

    /// Return orders left in PROCESSING by an interrupted process to ACTIVE
    ///
    /// Call once at startup, before the first cycle.
    pub async fn recover_processing(&self) -> Result<u64> {
        let moved = self.store.reset_processing().await?;
        if moved > 0 {
            tracing::warn!("⚠️  Returned {} interrupted order(s) to ACTIVE", moved);
        }
        Ok(moved)
    }

    /// Wallet balance of a mint not yet claimed by ACTIVE or PROCESSING orders
    pub async fn remaining_trackable_balance(&self, mint_address: &str) -> Result<f64> {
        let total = self.wallet.token_balance(mint_address).await?;
        ledger::remaining_trackable_balance(self.store.as_ref(), mint_address, total).await
    }

    /// Run one evaluation pass over every ACTIVE order
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one evaluation pass with an explicit clock
    ///
    /// Returns `Err` only when the order list itself can't be read; per-order
    /// failures are collected in the report. Every spawned sell task is joined
    /// before returning. The tasks are not owned by this future, so a caller
    /// that drops the cycle early leaves them to finish on their own.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let orders = self.store.get_orders(OrderStatus::Active).await?;
        let mut report = CycleReport {
            evaluated: orders.len(),
            ..Default::default()
        };

        if orders.is_empty() {
            tracing::debug!("No active orders");
            return Ok(report);
        }

        let prices = self.fetch_prices(&orders).await;
        let mut tasks = Vec::new();

        for order in orders {
            let current_price = match prices.get(&order.mint_address) {
                Some(Ok(price)) => *price,
                Some(Err(e)) => {
                    let message = format!("price unavailable: {}", e);
                    let error = if e.is_retryable() {
                        EngineError::ProviderTransient(message)
                    } else {
                        EngineError::ProviderTerminal(message)
                    };
                    report.fail(Some(order.id), &order.mint_address, error);
                    continue;
                }
                None => continue,
            };

            match trigger::evaluate(&order, current_price, now) {
                TriggerDecision::Hold => {}
                TriggerDecision::RaiseMax(price) => {
                    match self.store.update_last_price_max(order.id, price).await {
                        Ok(()) => report.ratcheted += 1,
                        Err(e) => report.fail(Some(order.id), &order.mint_address, e),
                    }
                }
                decision @ (TriggerDecision::SellNow | TriggerDecision::Confirm) => {
                    if let Err(e) = self.store.set_status(order.id, OrderStatus::Processing).await
                    {
                        // Canceled between listing and now; nothing to sell
                        report.fail(Some(order.id), &order.mint_address, e);
                        continue;
                    }
                    report.triggered += 1;

                    let manager = self.clone();
                    let id = order.id;
                    let mint_address = order.mint_address.clone();

                    if decision == TriggerDecision::SellNow {
                        tracing::info!(
                            order_id = %id,
                            "⏰ Time-based trigger reached for {}",
                            mint_address
                        );
                        tasks.push(tokio::spawn(async move {
                            let result = manager.sell_order(&order).await.map(|_| TaskOutcome::Sold);
                            (id, mint_address, result)
                        }));
                    } else {
                        tracing::info!(
                            order_id = %id,
                            "📉 Sell condition detected for {} at ${:.8}: starting monitoring",
                            mint_address,
                            current_price
                        );
                        tasks.push(tokio::spawn(async move {
                            let result = manager.confirm_and_sell(&order).await;
                            (id, mint_address, result)
                        }));
                    }
                }
            }
        }

        for task in tasks {
            match task.await {
                Ok((id, _, Ok(TaskOutcome::Sold))) => report.sold.push(id),
                Ok((id, _, Ok(TaskOutcome::Revoked))) => report.revoked.push(id),
                Ok((id, mint_address, Err(e))) => report.fail(Some(id), &mint_address, e),
                Err(e) => report.fail(
                    None,
                    "unknown",
                    EngineError::InvariantViolation(format!("order task aborted: {}", e)),
                ),
            }
        }

        tracing::info!(
            "Cycle complete: {} evaluated, {} triggered, {} sold, {} revoked, {} failed",
            report.evaluated,
            report.triggered,
            report.sold.len(),
            report.revoked.len(),
            report.failures.len()
        );

        Ok(report)
    }

    /// One price lookup per distinct mint, run concurrently
    async fn fetch_prices(&self, orders: &[Order]) -> HashMap<String, Result<f64>> {
        let mints: HashSet<String> = orders.iter().map(|o| o.mint_address.clone()).collect();
        let mut lookups = JoinSet::new();

        for mint_address in mints {
            let prices = Arc::clone(&self.prices);
            lookups.spawn(async move {
                let price = prices.get_value(&mint_address).await;
                (mint_address, price)
            });
        }

        let mut results = HashMap::new();
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((mint_address, price)) => {
                    results.insert(mint_address, price);
                }
                Err(e) => tracing::error!("Price lookup task aborted: {}", e),
            }
        }
        results
    }

    /// Run the confirmation monitor, then sell or return the order to ACTIVE
    async fn confirm_and_sell(&self, order: &Order) -> Result<TaskOutcome> {
        let monitor = ConfirmationMonitor::new(Arc::clone(&self.prices), self.monitor.clone());

        match monitor.confirm(order).await {
            Ok(MonitorOutcome::Confirmed { last_price }) => {
                tracing::info!(
                    order_id = %order.id,
                    "Sell condition confirmed for {} at ${:.8}",
                    order.mint_address,
                    last_price
                );
                self.sell_order(order).await?;
                Ok(TaskOutcome::Sold)
            }
            Ok(MonitorOutcome::Revoked {
                price,
                drawdown_pct,
            }) => {
                tracing::info!(
                    order_id = %order.id,
                    "Sell condition revoked for {} at ${:.8} ({:.2}% below max). Reactivating tracking.",
                    order.mint_address,
                    price,
                    drawdown_pct
                );
                self.store.set_status(order.id, OrderStatus::Active).await?;
                Ok(TaskOutcome::Revoked)
            }
            Err(e) => {
                self.reactivate(order).await;
                Err(e)
            }
        }
    }

    /// Swap a PROCESSING order into its settlement currency and close it
    async fn sell_order(&self, order: &Order) -> Result<()> {
        let settlement_mint = order.sell_type.mint_address();

        let outcome = match self
            .swapper
            .swap(
                &order.mint_address,
                settlement_mint,
                order.balance,
                order.slippage,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    order_id = %order.id,
                    "Swap failed for {}; reactivating tracking: {}",
                    order.mint_address,
                    e
                );
                self.reactivate(order).await;
                return Err(e);
            }
        };

        let profit = match self.prices.get_value(settlement_mint).await {
            Ok(price) => Some(outcome.received_amount * price),
            Err(e) => {
                tracing::warn!(
                    order_id = %order.id,
                    "Could not price {} {} received; profit unknown: {}",
                    outcome.received_amount,
                    order.sell_type,
                    e
                );
                None
            }
        };

        self.store.complete_order(order.id, profit).await?;

        match profit {
            Some(p) => tracing::info!(
                order_id = %order.id,
                "✅ Sold {} {} for {} {} (${:.2}) tx {}",
                order.balance,
                order.mint_address,
                outcome.received_amount,
                order.sell_type,
                p,
                outcome.signature
            ),
            None => tracing::info!(
                order_id = %order.id,
                "✅ Sold {} {} for {} {} tx {}",
                order.balance,
                order.mint_address,
                outcome.received_amount,
                order.sell_type,
                outcome.signature
            ),
        }

        Ok(())
    }

    async fn reactivate(&self, order: &Order) {
        if let Err(e) = self.store.set_status(order.id, OrderStatus::Active).await {
            tracing::error!(
                order_id = %order.id,
                "Failed to return order to ACTIVE: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::SwapOutcome;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    /// Fixed prices per mint plus a swap that can be told to fail
    #[derive(Default)]
    struct FakeMarket {
        prices: Mutex<HashMap<String, f64>>,
        fail_swaps: Mutex<bool>,
        swaps: Mutex<Vec<(String, String, f64)>>,
        balances: Mutex<HashMap<String, f64>>,
    }

    impl FakeMarket {
        fn set_price(&self, mint: &str, price: f64) {
            self.prices.lock().unwrap().insert(mint.to_string(), price);
        }
    }

    #[async_trait]
    impl PriceSource for FakeMarket {
        async fn get_value(&self, mint_address: &str) -> Result<f64> {
            self.prices
                .lock()
                .unwrap()
                .get(mint_address)
                .copied()
                .ok_or_else(|| EngineError::ProviderTerminal(format!("no price for {}", mint_address)))
        }
    }

    #[async_trait]
    impl SwapExecutor for FakeMarket {
        async fn swap(
            &self,
            from_mint: &str,
            to_mint: &str,
            amount: f64,
            _slippage_bps: u16,
        ) -> Result<SwapOutcome> {
            if *self.fail_swaps.lock().unwrap() {
                return Err(EngineError::ProviderTerminal("no route".to_string()));
            }
            self.swaps
                .lock()
                .unwrap()
                .push((from_mint.to_string(), to_mint.to_string(), amount));
            Ok(SwapOutcome {
                received_amount: amount * 2.0,
                signature: "sig".to_string(),
            })
        }
    }

    #[async_trait]
    impl WalletProvider for FakeMarket {
        fn public_key(&self) -> &str {
            "wallet"
        }

        async fn token_balance(&self, mint_address: &str) -> Result<f64> {
            Ok(self
                .balances
                .lock()
                .unwrap()
                .get(mint_address)
                .copied()
                .unwrap_or(0.0))
        }

        async fn token_decimals(&self, _mint_address: &str) -> Result<u8> {
            Ok(6)
        }

        async fn sign_and_send(&self, _transaction_base64: &str) -> Result<String> {
            Ok("sig".to_string())
        }
    }

    fn setup() -> (Arc<MemoryStore>, Arc<FakeMarket>, OrderManager) {
        let store = Arc::new(MemoryStore::new());
        let market = Arc::new(FakeMarket::default());
        market.set_price(Currency::Usdc.mint_address(), 1.0);
        let manager = OrderManager::new(
            store.clone(),
            market.clone(),
            market.clone(),
            market.clone(),
            MonitorConfig {
                samples: 3,
                interval_ms: 1,
            },
        );
        (store, market, manager)
    }

    fn request(sell_mode: SellMode, sell_value: f64, balance: f64) -> OrderRequest {
        OrderRequest {
            mint_address: "MINT".to_string(),
            sell_mode,
            sell_value,
            sell_type: Currency::Usdc,
            balance,
            slippage: 100,
        }
    }

    #[tokio::test]
    async fn test_add_order_uses_current_price_as_entry() {
        let (store, market, manager) = setup();
        market.balances.lock().unwrap().insert("MINT".to_string(), 10.0);
        market.set_price("MINT", 0.5);

        let id = manager
            .add_order(request(SellMode::StopLoss, 10.0, 4.0))
            .await
            .unwrap();

        let order = store.get_order(id).await.unwrap();
        assert_eq!(order.entry_value, 0.5);
        assert_eq!(order.last_price_max, 0.5);
        assert_eq!(manager.remaining_trackable_balance("MINT").await.unwrap(), 6.0);
    }

    #[tokio::test]
    async fn test_add_order_rejects_overdraw() {
        let (store, market, manager) = setup();
        market.balances.lock().unwrap().insert("MINT".to_string(), 10.0);
        market.set_price("MINT", 0.5);

        manager
            .add_order(request(SellMode::StopLoss, 10.0, 7.0))
            .await
            .unwrap();
        let result = manager.add_order(request(SellMode::StopLoss, 10.0, 4.0)).await;

        assert!(matches!(result, Err(EngineError::InsufficientBalance { .. })));
        assert_eq!(store.get_orders(OrderStatus::Active).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_ratchets_and_holds() {
        let (store, market, manager) = setup();
        market.balances.lock().unwrap().insert("MINT".to_string(), 10.0);
        market.set_price("MINT", 1.0);
        let id = manager
            .add_order(request(SellMode::StopLoss, 10.0, 1.0))
            .await
            .unwrap();

        market.set_price("MINT", 1.5);
        let report = manager.run_cycle().await.unwrap();
        assert_eq!(report.ratcheted, 1);
        assert_eq!(store.get_order(id).await.unwrap().last_price_max, 1.5);

        market.set_price("MINT", 1.4);
        let report = manager.run_cycle().await.unwrap();
        assert_eq!(report.triggered, 0);
        assert_eq!(store.get_order(id).await.unwrap().status, OrderStatus::Active);
    }

    #[tokio::test]
    async fn test_time_based_sells_into_settlement_currency() {
        let (store, market, manager) = setup();
        market.balances.lock().unwrap().insert("MINT".to_string(), 10.0);
        market.set_price("MINT", 1.0);
        let id = manager
            .add_order(request(SellMode::TimeBased, 30.0, 3.0))
            .await
            .unwrap();

        let report = manager
            .run_cycle_at(Utc::now() + Duration::minutes(31))
            .await
            .unwrap();

        assert_eq!(report.sold, vec![id]);
        let order = store.get_order(id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Complete);
        assert_eq!(order.profit, Some(6.0));

        let swaps = market.swaps.lock().unwrap();
        assert_eq!(
            swaps[0],
            ("MINT".to_string(), Currency::Usdc.mint_address().to_string(), 3.0)
        );
    }

    #[tokio::test]
    async fn test_swap_failure_reactivates_and_reports() {
        let (store, market, manager) = setup();
        market.balances.lock().unwrap().insert("MINT".to_string(), 10.0);
        market.set_price("MINT", 1.0);
        let id = manager
            .add_order(request(SellMode::TimeBased, 0.0, 3.0))
            .await
            .unwrap();
        *market.fail_swaps.lock().unwrap() = true;

        let report = manager.run_cycle().await.unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.failures[0].order_id, Some(id));
        assert!(matches!(report.failures[0].error, EngineError::ProviderTerminal(_)));
        assert_eq!(store.get_order(id).await.unwrap().status, OrderStatus::Active);
    }

    #[tokio::test]
    async fn test_missing_price_leaves_order_untouched() {
        let (store, market, manager) = setup();
        market.balances.lock().unwrap().insert("MINT".to_string(), 10.0);
        market.set_price("MINT", 1.0);
        let id = manager
            .add_order(request(SellMode::StopLoss, 10.0, 3.0))
            .await
            .unwrap();
        market.prices.lock().unwrap().remove("MINT");

        let report = manager.run_cycle().await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(store.get_order(id).await.unwrap().status, OrderStatus::Active);
    }

    #[tokio::test]
    async fn test_profit_lookup_failure_still_completes() {
        let (store, market, manager) = setup();
        market.balances.lock().unwrap().insert("MINT".to_string(), 10.0);
        market.set_price("MINT", 1.0);
        market.prices.lock().unwrap().remove(Currency::Usdc.mint_address());
        let id = manager
            .add_order(request(SellMode::TimeBased, 0.0, 3.0))
            .await
            .unwrap();

        let report = manager.run_cycle().await.unwrap();

        assert!(report.is_clean());
        let order = store.get_order(id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Complete);
        assert_eq!(order.profit, None);
    }

    #[tokio::test]
    async fn test_cancel_only_from_active() {
        let (store, market, manager) = setup();
        market.balances.lock().unwrap().insert("MINT".to_string(), 10.0);
        market.set_price("MINT", 1.0);
        let id = manager
            .add_order(request(SellMode::StopLoss, 10.0, 3.0))
            .await
            .unwrap();

        manager.cancel_order(id).await.unwrap();
        assert!(manager.cancel_order(id).await.is_err());
        assert!(matches!(
            manager.cancel_order(Uuid::new_v4()).await,
            Err(EngineError::NotFound(_))
        ));
        assert_eq!(store.get_order(id).await.unwrap().status, OrderStatus::Canceled);

        // Canceled orders are never evaluated
        let report = manager.run_cycle().await.unwrap();
        assert_eq!(report.evaluated, 0);
    }
}
