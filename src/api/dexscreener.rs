use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::PriceSource;
use crate::error::EngineError;
use crate::models::{TokenInfo, USDC_MINT_ADDRESS};
use crate::retry::{with_retry, RetryPolicy};
use crate::Result;

/// Client for DexScreener API
#[derive(Clone)]
pub struct DexScreenerClient {
    client: Client,
    api_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct DexScreenerResponse {
    #[serde(default)]
    pairs: Option<Vec<PairData>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairData {
    chain_id: String,
    base_token: BaseToken,
    price_usd: Option<String>,
    #[serde(default)]
    price_change: PriceChange,
}

#[derive(Debug, Deserialize)]
struct BaseToken {
    address: String,
    name: String,
    symbol: String,
}

#[derive(Debug, Deserialize, Default)]
struct PriceChange {
    #[serde(default)]
    h24: Option<f64>,
}

impl DexScreenerClient {
    pub fn new(api_url: &str, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            retry,
        }
    }

    /// Get symbol, name and USD price for a token by its mint address
    /// Includes retry logic with exponential backoff for transient failures
    pub async fn get_token_info(&self, mint_address: &str) -> Result<TokenInfo> {
        with_retry(&self.retry, "dexscreener token", move || {
            self.fetch_token_info_once(mint_address)
        })
        .await
    }

    /// Internal method to fetch token info once (without retry logic)
    async fn fetch_token_info_once(&self, mint_address: &str) -> Result<TokenInfo> {
        let url = format!("{}/tokens/{}", self.api_url, mint_address);

        let response: DexScreenerResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // The token may be quoted in several pools; take the first Solana pair
        // where it is the base token
        let pair = response
            .pairs
            .unwrap_or_default()
            .into_iter()
            .find(|p| p.chain_id == "solana" && p.base_token.address == mint_address)
            .ok_or_else(|| {
                EngineError::ProviderTerminal(format!("No Solana pair found for {}", mint_address))
            })?;

        let price_usd = pair
            .price_usd
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| {
                EngineError::ProviderTerminal(format!("Invalid priceUsd for {}", mint_address))
            })?;

        Ok(TokenInfo {
            mint_address: pair.base_token.address,
            symbol: pair.base_token.symbol,
            name: pair.base_token.name,
            price_usd,
            price_change_24h: pair.price_change.h24,
        })
    }
}

#[async_trait]
impl PriceSource for DexScreenerClient {
    async fn get_value(&self, mint_address: &str) -> Result<f64> {
        if mint_address == USDC_MINT_ADDRESS {
            return Ok(1.0);
        }

        Ok(self.get_token_info(mint_address).await?.price_usd)
    }
}
