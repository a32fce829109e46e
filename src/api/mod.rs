pub mod dexscreener;
pub mod jupiter;
pub mod solana;

pub use dexscreener::DexScreenerClient;
pub use jupiter::{JupiterClient, Quote};
pub use solana::SolanaWallet;

use async_trait::async_trait;

use crate::models::SwapOutcome;
use crate::Result;

/// Resolves a token's current USD value
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_value(&self, mint_address: &str) -> Result<f64>;
}

/// Executes trades on the aggregator
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// Sell `amount` (UI units) of `from_mint` for `to_mint`
    async fn swap(
        &self,
        from_mint: &str,
        to_mint: &str,
        amount: f64,
        slippage_bps: u16,
    ) -> Result<SwapOutcome>;
}

/// Holds the trading wallet: balances, mint metadata, signing
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn public_key(&self) -> &str;

    /// Spendable balance of a token in UI units (native SOL for the SOL mint)
    async fn token_balance(&self, mint_address: &str) -> Result<f64>;

    async fn token_decimals(&self, mint_address: &str) -> Result<u8>;

    /// Sign a base64 encoded versioned transaction and submit it, returning its signature
    async fn sign_and_send(&self, transaction_base64: &str) -> Result<String>;
}
