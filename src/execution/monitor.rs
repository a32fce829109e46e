use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::trigger::drawdown_pct;
use crate::api::PriceSource;
use crate::models::Order;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Consecutive samples that must all confirm the drawdown
    pub samples: u32,
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            samples: 10,
            interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorOutcome {
    /// Every sample stayed at or past the threshold
    Confirmed { last_price: f64 },
    /// A sample recovered above the threshold
    Revoked { price: f64, drawdown_pct: f64 },
}

/// Re-samples a stop-loss trigger before committing to a sell
///
/// Compares each sample against the order's frozen `last_price_max`.
pub struct ConfirmationMonitor {
    prices: Arc<dyn PriceSource>,
    config: MonitorConfig,
}

impl ConfirmationMonitor {
    pub fn new(prices: Arc<dyn PriceSource>, config: MonitorConfig) -> Self {
        Self { prices, config }
    }

    /// Sample the price `samples` times; the first recovery revokes
    ///
    /// A failed sample is returned as an error and the caller treats it as a revoke.
    pub async fn confirm(&self, order: &Order) -> Result<MonitorOutcome> {
        let samples = self.config.samples.max(1);
        let mut last_price = 0.0;

        for sample in 1..=samples {
            let price = self.prices.get_value(&order.mint_address).await?;
            let drawdown = drawdown_pct(order.last_price_max, price);

            if drawdown < order.sell_value {
                tracing::info!(
                    order_id = %order.id,
                    "Sell condition not met for {} on sample {}/{}: decrease {:.2}%",
                    order.mint_address,
                    sample,
                    samples,
                    drawdown
                );
                return Ok(MonitorOutcome::Revoked {
                    price,
                    drawdown_pct: drawdown,
                });
            }

            tracing::debug!(
                order_id = %order.id,
                "Sample {}/{} for {}: ${:.8} ({:.2}% below max)",
                sample,
                samples,
                order.mint_address,
                price,
                drawdown
            );
            last_price = price;

            if sample < samples {
                sleep(Duration::from_millis(self.config.interval_ms)).await;
            }
        }

        Ok(MonitorOutcome::Confirmed { last_price })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::models::{Currency, NewOrder, SellMode};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Replays prices in order, then repeats the last one
    struct ScriptedPrices {
        prices: Mutex<Vec<Result<f64>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedPrices {
        fn new(prices: Vec<Result<f64>>) -> Self {
            Self {
                prices: Mutex::new(prices),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedPrices {
        async fn get_value(&self, _mint_address: &str) -> Result<f64> {
            *self.calls.lock().unwrap() += 1;
            let mut prices = self.prices.lock().unwrap();
            if prices.len() > 1 {
                prices.remove(0)
            } else {
                match &prices[0] {
                    Ok(p) => Ok(*p),
                    Err(e) => Err(EngineError::ProviderTransient(e.to_string())),
                }
            }
        }
    }

    fn stop_loss_order() -> Order {
        NewOrder {
            mint_address: "MINT".to_string(),
            sell_mode: SellMode::StopLoss,
            sell_value: 10.0,
            sell_type: Currency::Usdc,
            entry_value: 100.0,
            balance: 1.0,
            slippage: 100,
        }
        .into_order(Uuid::new_v4(), Utc::now())
    }

    fn fast() -> MonitorConfig {
        MonitorConfig {
            samples: 10,
            interval_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_all_samples_confirm() {
        let prices = Arc::new(ScriptedPrices::new(vec![Ok(90.0), Ok(85.0), Ok(89.0)]));
        let monitor = ConfirmationMonitor::new(prices.clone(), fast());

        let outcome = monitor.confirm(&stop_loss_order()).await.unwrap();

        assert_eq!(outcome, MonitorOutcome::Confirmed { last_price: 89.0 });
        assert_eq!(prices.calls(), 10);
    }

    #[tokio::test]
    async fn test_recovery_on_last_sample_revokes() {
        let mut script: Vec<Result<f64>> = (0..9).map(|_| Ok(89.0)).collect();
        script.push(Ok(95.0));
        let prices = Arc::new(ScriptedPrices::new(script));
        let monitor = ConfirmationMonitor::new(prices.clone(), fast());

        let outcome = monitor.confirm(&stop_loss_order()).await.unwrap();

        assert!(matches!(outcome, MonitorOutcome::Revoked { price, .. } if price == 95.0));
        assert_eq!(prices.calls(), 10);
    }

    #[tokio::test]
    async fn test_failed_sample_is_an_error() {
        let prices = Arc::new(ScriptedPrices::new(vec![
            Ok(89.0),
            Err(EngineError::ProviderTerminal("no price".to_string())),
            Ok(89.0),
        ]));
        let monitor = ConfirmationMonitor::new(prices.clone(), fast());

        let result = monitor.confirm(&stop_loss_order()).await;

        assert!(matches!(result, Err(EngineError::ProviderTerminal(_))));
        assert_eq!(prices.calls(), 2);
    }
}
