use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::execution::monitor::MonitorConfig;
use crate::models::{AmountType, BuyPolicy, Currency, SellMode, SellPolicy};
use crate::retry::RetryPolicy;

/// Which provider answers `get_value` lookups
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceSourceKind {
    Jupiter,
    DexScreener,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupiterSettings {
    pub quote_api_url: String,
    pub price_api_url: String,
    pub rate_limit_rpm: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexScreenerSettings {
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaSettings {
    pub rpc_url: String,
    /// Base58 public key of the trading wallet
    pub wallet_public_key: Option<String>,
    /// Signing service that holds the wallet key
    pub signer_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSettings {
    pub interval_secs: u64,
}

/// Policies new profiles start from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDefaults {
    pub auto_buy: BuyPolicy,
    pub auto_sell: SellPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database_url: Option<String>,
    pub price_source: PriceSourceKind,
    pub jupiter: JupiterSettings,
    pub dexscreener: DexScreenerSettings,
    pub solana: SolanaSettings,
    pub retry: RetryPolicy,
    pub monitor: MonitorConfig,
    pub cycle: CycleSettings,
    pub defaults: ProfileDefaults,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            price_source: PriceSourceKind::Jupiter,
            jupiter: JupiterSettings {
                quote_api_url: "https://lite-api.jup.ag/swap/v1".to_string(),
                price_api_url: "https://lite-api.jup.ag/price/v3".to_string(),
                rate_limit_rpm: 60,
            },
            dexscreener: DexScreenerSettings {
                api_url: "https://api.dexscreener.com/latest/dex".to_string(),
            },
            solana: SolanaSettings {
                rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
                wallet_public_key: None,
                signer_url: None,
            },
            retry: RetryPolicy::default(),
            monitor: MonitorConfig::default(),
            cycle: CycleSettings { interval_secs: 5 },
            defaults: ProfileDefaults {
                auto_buy: BuyPolicy {
                    buy_type: Currency::Sol,
                    amount_type: AmountType::Percent,
                    amount: 5.0,
                    slippage: 100,
                },
                auto_sell: SellPolicy {
                    sell_mode: SellMode::StopLoss,
                    sell_type: Currency::Usdc,
                    sell_value: 15.0,
                    slippage: 100,
                },
            },
        }
    }
}

impl Settings {
    /// Built-in defaults, then `<file_stem>.toml` if present, then `AUTOTRADER__*` env vars
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(
                config::Environment::with_prefix("AUTOTRADER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load_without_file() {
        let settings = Settings::load_from("does-not-exist").unwrap();

        assert_eq!(settings.monitor.samples, 10);
        assert_eq!(settings.monitor.interval_ms, 1000);
        assert_eq!(settings.price_source, PriceSourceKind::Jupiter);
        assert_eq!(settings.defaults.auto_sell.sell_mode, SellMode::StopLoss);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("autotrader-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.toml");
        std::fs::write(
            &path,
            r#"
price_source = "dexscreener"

[monitor]
samples = 4
interval_ms = 250

[cycle]
interval_secs = 30
"#,
        )
        .unwrap();

        let stem = dir.join("settings");
        let settings = Settings::load_from(stem.to_str().unwrap()).unwrap();

        assert_eq!(settings.price_source, PriceSourceKind::DexScreener);
        assert_eq!(settings.monitor.samples, 4);
        assert_eq!(settings.cycle.interval_secs, 30);
        // Untouched sections keep their defaults
        assert_eq!(settings.retry.max_attempts, 3);

        std::fs::remove_dir_all(dir).ok();
    }
}
