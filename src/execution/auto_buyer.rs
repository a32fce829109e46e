use std::sync::Arc;
use uuid::Uuid;

use crate::api::{PriceSource, SwapExecutor, WalletProvider};
use crate::db::{OrderStore, ProfileStore};
use crate::error::EngineError;
use crate::models::{AmountType, BuyPolicy, NewOrder, Platform};
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum AutoBuyOutcome {
    Created { order_id: Uuid, balance: f64 },
    /// Profile exists but is inactive
    Skipped,
}

/// Amount of the source currency to spend under a buy policy
pub fn size_entry(policy: &BuyPolicy, source_mint: &str, wallet_balance: f64) -> Result<f64> {
    match policy.amount_type {
        AmountType::Amount => {
            if wallet_balance < policy.amount {
                return Err(EngineError::InsufficientBalance {
                    mint_address: source_mint.to_string(),
                    available: wallet_balance,
                    requested: policy.amount,
                });
            }
            Ok(policy.amount)
        }
        AmountType::Percent => Ok(wallet_balance * (policy.amount / 100.0)),
    }
}

/// Truncate to six decimals so the tracked balance never exceeds what was received
fn floor_to_micro(amount: f64) -> f64 {
    (amount * 1_000_000.0).floor() / 1_000_000.0
}

/// Per-token USD price implied by the entry swap itself
fn implied_entry_value(spend: f64, source_price: f64, received_amount: f64) -> Option<f64> {
    let value = spend * source_price / received_amount;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Buys a token on behalf of a profile and starts tracking the position
pub struct AutoBuyer {
    orders: Arc<dyn OrderStore>,
    profiles: Arc<dyn ProfileStore>,
    prices: Arc<dyn PriceSource>,
    swapper: Arc<dyn SwapExecutor>,
    wallet: Arc<dyn WalletProvider>,
}

impl AutoBuyer {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        profiles: Arc<dyn ProfileStore>,
        prices: Arc<dyn PriceSource>,
        swapper: Arc<dyn SwapExecutor>,
        wallet: Arc<dyn WalletProvider>,
    ) -> Self {
        Self {
            orders,
            profiles,
            prices,
            swapper,
            wallet,
        }
    }

    /// Enter `mint_address` with the profile's buy policy and track it with its sell policy
    pub async fn auto_buy(
        &self,
        mint_address: &str,
        platform: Platform,
        username: &str,
    ) -> Result<AutoBuyOutcome> {
        let profile = self
            .profiles
            .get_profile(platform, username)
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound {
                platform: platform.to_string(),
                username: username.to_string(),
            })?;

        if !profile.is_active {
            tracing::info!("Profile {} is inactive, skipping buy of {}", username, mint_address);
            return Ok(AutoBuyOutcome::Skipped);
        }

        let source_mint = profile.buy.buy_type.mint_address();
        let wallet_balance = self.wallet.token_balance(source_mint).await?;
        let spend = size_entry(&profile.buy, source_mint, wallet_balance)?;

        tracing::info!(
            "🛒 Buying {} with {} {} for {} ({})",
            mint_address,
            spend,
            profile.buy.buy_type,
            username,
            platform
        );

        let outcome = self
            .swapper
            .swap(source_mint, mint_address, spend, profile.buy.slippage)
            .await?;

        // The tokens are in the wallet now; every failure below must say so
        let untracked = |reason: String| {
            tracing::error!(
                "❌ Bought {} {} (tx {}) but no order was created: {}",
                outcome.received_amount,
                mint_address,
                outcome.signature,
                reason
            );
            EngineError::UntrackedPosition {
                mint_address: mint_address.to_string(),
                received_amount: outcome.received_amount,
                signature: outcome.signature.clone(),
                reason,
            }
        };

        let balance = floor_to_micro(outcome.received_amount);
        let entry_value = self
            .entry_value_after_swap(mint_address, source_mint, spend, outcome.received_amount)
            .await
            .map_err(|e| untracked(e.to_string()))?;

        let order_id = self
            .orders
            .create_order(NewOrder {
                mint_address: mint_address.to_string(),
                sell_mode: profile.sell.sell_mode,
                sell_value: profile.sell.sell_value,
                sell_type: profile.sell.sell_type,
                entry_value,
                balance,
                slippage: profile.sell.slippage,
            })
            .await
            .map_err(|e| untracked(e.to_string()))?;

        tracing::info!(
            order_id = %order_id,
            "✅ Order created with balance of {} (tx {})",
            balance,
            outcome.signature
        );

        Ok(AutoBuyOutcome::Created { order_id, balance })
    }

    /// Current price of the bought token, or the price paid when the lookup fails
    async fn entry_value_after_swap(
        &self,
        mint_address: &str,
        source_mint: &str,
        spend: f64,
        received_amount: f64,
    ) -> Result<f64> {
        let lookup_error = match self.prices.get_value(mint_address).await {
            Ok(price) if price.is_finite() && price > 0.0 => return Ok(price),
            Ok(price) => EngineError::InvariantViolation(format!(
                "price {} for {} is not positive",
                price, mint_address
            )),
            Err(e) => e,
        };

        tracing::warn!(
            "Price lookup for {} failed after buying ({}); using the swap's implied price",
            mint_address,
            lookup_error
        );

        let source_price = self.prices.get_value(source_mint).await?;
        implied_entry_value(spend, source_price, received_amount).ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "no usable entry price for {}: {}",
                mint_address, lookup_error
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Currency;

    fn policy(amount_type: AmountType, amount: f64) -> BuyPolicy {
        BuyPolicy {
            buy_type: Currency::Sol,
            amount_type,
            amount,
            slippage: 100,
        }
    }

    #[test]
    fn test_percent_sizing() {
        let spend = size_entry(&policy(AmountType::Percent, 50.0), "SOL", 10.0).unwrap();
        assert_eq!(spend, 5.0);
    }

    #[test]
    fn test_fixed_sizing_requires_balance() {
        let spend = size_entry(&policy(AmountType::Amount, 2.0), "SOL", 10.0).unwrap();
        assert_eq!(spend, 2.0);

        let result = size_entry(&policy(AmountType::Amount, 12.0), "SOL", 10.0);
        assert!(matches!(result, Err(EngineError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_floor_to_micro_never_rounds_up() {
        assert_eq!(floor_to_micro(1.23456789), 1.234567);
        assert_eq!(floor_to_micro(0.0000009), 0.0);
        assert_eq!(floor_to_micro(2.5), 2.5);
        assert!(floor_to_micro(0.9999999) <= 0.9999999);
    }

    #[test]
    fn test_implied_entry_value() {
        // 5 SOL at $150 bought 30_000 tokens
        assert_eq!(implied_entry_value(5.0, 150.0, 30_000.0), Some(0.025));
        assert_eq!(implied_entry_value(5.0, 150.0, 0.0), None);
        assert_eq!(implied_entry_value(5.0, 0.0, 10.0), None);
    }
}
