use crate::db::OrderStore;
use crate::error::EngineError;
use crate::Result;

/// Wallet balance of a mint not yet committed to ACTIVE or PROCESSING orders
pub async fn remaining_trackable_balance(
    store: &dyn OrderStore,
    mint_address: &str,
    total_wallet_balance: f64,
) -> Result<f64> {
    let committed = store.active_balance(mint_address).await?;
    Ok(total_wallet_balance - committed)
}

/// Fail with `InsufficientBalance` when `requested` would overdraw `remaining`
pub fn ensure_trackable(mint_address: &str, requested: f64, remaining: f64) -> Result<()> {
    if requested > remaining {
        return Err(EngineError::InsufficientBalance {
            mint_address: mint_address.to_string(),
            available: remaining.max(0.0),
            requested,
        });
    }
    Ok(())
}
