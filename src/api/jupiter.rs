use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use super::{PriceSource, SwapExecutor, WalletProvider};
use crate::config::JupiterSettings;
use crate::error::EngineError;
use crate::models::{SwapOutcome, USDC_MINT_ADDRESS};
use crate::retry::{with_retry, RetryPolicy};
use crate::Result;

// Jupiter Swap API v1 / Price API v3
// Docs: https://dev.jup.ag/docs/swap-api/get-quote
type JupiterRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for Jupiter aggregator API
#[derive(Clone)]
pub struct JupiterClient {
    client: Client,
    quote_api_url: String,
    price_api_url: String,
    wallet: Arc<dyn WalletProvider>,
    retry: RetryPolicy,
    rate_limiter: Arc<JupiterRateLimiter>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    input_mint: String,
    in_amount: String,
    output_mint: String,
    out_amount: String,
    #[serde(default)]
    price_impact_pct: Option<String>,
    #[serde(default)]
    route_plan: Vec<serde_json::Value>, // Passed back verbatim to /swap
    #[serde(flatten)]
    rest: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a QuoteResponse,
    user_public_key: &'a str,
    wrap_and_unwrap_sol: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceEntry {
    usd_price: f64,
}

/// Quote information from Jupiter
#[derive(Debug, Clone)]
pub struct Quote {
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_pct: f64,
    pub route_count: usize,
}

impl JupiterClient {
    pub fn new(
        settings: &JupiterSettings,
        wallet: Arc<dyn WalletProvider>,
        retry: RetryPolicy,
    ) -> Self {
        let rpm = NonZeroU32::new(settings.rate_limit_rpm).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Self {
            client: Client::new(),
            quote_api_url: settings.quote_api_url.trim_end_matches('/').to_string(),
            price_api_url: settings.price_api_url.trim_end_matches('/').to_string(),
            wallet,
            retry,
            rate_limiter,
        }
    }

    /// Get a quote for swapping tokens
    ///
    /// # Arguments
    /// * `amount` - Amount in raw units (e.g., lamports for SOL)
    /// * `slippage_bps` - Slippage tolerance in basis points (50 = 0.5%)
    pub async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote> {
        let response = self
            .fetch_quote(input_mint, output_mint, amount, slippage_bps)
            .await?;

        Ok(Quote {
            in_amount: parse_amount(&response.in_amount)?,
            out_amount: parse_amount(&response.out_amount)?,
            price_impact_pct: response
                .price_impact_pct
                .as_deref()
                .and_then(|p| p.parse().ok())
                .unwrap_or(0.0),
            route_count: response.route_plan.len(),
        })
    }

    async fn fetch_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<QuoteResponse> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&swapMode=ExactIn",
            self.quote_api_url, input_mint, output_mint, amount, slippage_bps
        );

        let url = url.as_str();
        let response: QuoteResponse = with_retry(&self.retry, "jupiter quote", || async move {
            self.rate_limiter.until_ready().await;
            let response = self.client.get(url).send().await?.error_for_status()?;
            Ok(response.json().await?)
        })
        .await?;
        tracing::debug!("Quote response: {:?}", response);

        if response.route_plan.is_empty() {
            return Err(EngineError::ProviderTerminal(format!(
                "No swap routes available for {} -> {}",
                input_mint, output_mint
            )));
        }

        Ok(response)
    }

    async fn fetch_price_once(&self, mint_address: &str) -> Result<f64> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}?ids={}", self.price_api_url, mint_address);
        let prices: HashMap<String, PriceEntry> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let price = prices
            .get(mint_address)
            .map(|entry| entry.usd_price)
            .ok_or_else(|| {
                EngineError::ProviderTerminal(format!("No price returned for {}", mint_address))
            })?;

        if !price.is_finite() || price <= 0.0 {
            return Err(EngineError::ProviderTerminal(format!(
                "Invalid price {} for {}",
                price, mint_address
            )));
        }

        Ok(price)
    }
}

#[async_trait]
impl PriceSource for JupiterClient {
    async fn get_value(&self, mint_address: &str) -> Result<f64> {
        if mint_address == USDC_MINT_ADDRESS {
            return Ok(1.0);
        }

        with_retry(&self.retry, "jupiter price", move || self.fetch_price_once(mint_address)).await
    }
}

#[async_trait]
impl SwapExecutor for JupiterClient {
    async fn swap(
        &self,
        from_mint: &str,
        to_mint: &str,
        amount: f64,
        slippage_bps: u16,
    ) -> Result<SwapOutcome> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(EngineError::InvariantViolation(format!(
                "Swap amount must be positive, got {}",
                amount
            )));
        }

        let from_decimals = self.wallet.token_decimals(from_mint).await?;
        let to_decimals = self.wallet.token_decimals(to_mint).await?;
        let raw_amount = to_raw_units(amount, from_decimals);

        tracing::info!(
            "Fetching swap quote for {} {} ({} raw units) -> {}",
            amount,
            from_mint,
            raw_amount,
            to_mint
        );
        let quote = self
            .fetch_quote(from_mint, to_mint, raw_amount, slippage_bps)
            .await?;
        let out_amount = parse_amount(&quote.out_amount)?;

        // Posting the swap is not idempotent from our side, so a single attempt
        self.rate_limiter.until_ready().await;
        let request = SwapRequest {
            quote_response: &quote,
            user_public_key: self.wallet.public_key(),
            wrap_and_unwrap_sol: true,
        };
        let swap: SwapResponse = self
            .client
            .post(format!("{}/swap", self.quote_api_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if swap.swap_transaction.is_empty() {
            return Err(EngineError::ProviderTerminal(
                "No swapTransaction provided by the /swap endpoint".to_string(),
            ));
        }

        let signature = self.wallet.sign_and_send(&swap.swap_transaction).await?;
        let received_amount = from_raw_units(out_amount, to_decimals);

        tracing::info!(
            "Swap submitted: {} {} -> {} {} quoted (tx {})",
            amount,
            from_mint,
            received_amount,
            to_mint,
            signature
        );

        Ok(SwapOutcome {
            received_amount,
            signature,
        })
    }
}

fn parse_amount(raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| EngineError::ProviderTerminal(format!("Invalid amount in quote: {}", raw)))
}

fn to_raw_units(amount: f64, decimals: u8) -> u64 {
    (amount * 10f64.powi(decimals as i32)) as u64
}

fn from_raw_units(raw: u64, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}
