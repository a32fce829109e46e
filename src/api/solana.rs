use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::WalletProvider;
use crate::error::EngineError;
use crate::models::SOL_MINT_ADDRESS;
use crate::retry::{with_retry, RetryPolicy};
use crate::Result;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// RPC error codes that clear up on their own (node behind, slot skipped, ...)
const TRANSIENT_RPC_CODES: &[i64] = &[-32004, -32005, -32007, -32014];

/// Wallet backed by Solana JSON-RPC for reads and an external signing service for writes
///
/// The signer holds the private key; this process only ever sees the public key.
#[derive(Clone)]
pub struct SolanaWallet {
    client: Client,
    rpc_url: String,
    signer_url: String,
    public_key: String,
    retry: RetryPolicy,
    decimals_cache: Arc<RwLock<HashMap<String, u8>>>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct TokenSupply {
    decimals: u8,
}

#[derive(Debug, Deserialize)]
struct TokenAccount {
    account: AccountData,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAmount {
    ui_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignResponse {
    signed_transaction: String,
}

impl SolanaWallet {
    pub fn new(rpc_url: &str, signer_url: &str, public_key: &str, retry: RetryPolicy) -> Self {
        let mut cache = HashMap::new();
        cache.insert(SOL_MINT_ADDRESS.to_string(), 9);

        Self {
            client: Client::new(),
            rpc_url: rpc_url.to_string(),
            signer_url: signer_url.trim_end_matches('/').to_string(),
            public_key: public_key.to_string(),
            retry,
            decimals_cache: Arc::new(RwLock::new(cache)),
        }
    }

    async fn rpc_once<T: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            let message = format!("{} failed ({}): {}", method, err.code, err.message);
            return Err(if TRANSIENT_RPC_CODES.contains(&err.code) {
                EngineError::ProviderTransient(message)
            } else {
                EngineError::ProviderTerminal(message)
            });
        }

        response
            .result
            .ok_or_else(|| EngineError::ProviderTerminal(format!("{} returned no result", method)))
    }

    /// Read-only RPC call with retries
    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let params = &params;
        with_retry(&self.retry, method, move || self.rpc_once(method, params)).await
    }

    async fn sol_balance(&self) -> Result<f64> {
        let lamports: WithContext<u64> = self.rpc("getBalance", json!([self.public_key])).await?;
        Ok(lamports.value as f64 / LAMPORTS_PER_SOL)
    }

    async fn send_transaction(&self, signed_base64: &str) -> Result<String> {
        self.rpc_once(
            "sendTransaction",
            &json!([
                signed_base64,
                {"encoding": "base64", "skipPreflight": false, "preflightCommitment": "processed"}
            ]),
        )
        .await
    }
}

#[async_trait]
impl WalletProvider for SolanaWallet {
    fn public_key(&self) -> &str {
        &self.public_key
    }

    async fn token_balance(&self, mint_address: &str) -> Result<f64> {
        if mint_address == SOL_MINT_ADDRESS {
            return self.sol_balance().await;
        }

        let accounts: WithContext<Vec<TokenAccount>> = self
            .rpc(
                "getTokenAccountsByOwner",
                json!([
                    self.public_key,
                    {"mint": mint_address},
                    {"encoding": "jsonParsed"}
                ]),
            )
            .await?;

        // A wallet can hold the same mint in several token accounts
        Ok(accounts
            .value
            .iter()
            .filter_map(|a| a.account.data.parsed.info.token_amount.ui_amount)
            .sum())
    }

    async fn token_decimals(&self, mint_address: &str) -> Result<u8> {
        if let Some(decimals) = self.decimals_cache.read().await.get(mint_address) {
            return Ok(*decimals);
        }

        let supply: WithContext<TokenSupply> =
            self.rpc("getTokenSupply", json!([mint_address])).await?;

        self.decimals_cache
            .write()
            .await
            .insert(mint_address.to_string(), supply.value.decimals);

        Ok(supply.value.decimals)
    }

    async fn sign_and_send(&self, transaction_base64: &str) -> Result<String> {
        let signed: SignResponse = self
            .client
            .post(format!("{}/sign", self.signer_url))
            .json(&json!({
                "publicKey": self.public_key,
                "transaction": transaction_base64,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let signature = self.send_transaction(&signed.signed_transaction).await?;
        tracing::info!("Transaction sent: https://explorer.solana.com/tx/{}", signature);

        Ok(signature)
    }
}
