use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const SOL_MINT_ADDRESS: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT_ADDRESS: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Lifecycle state of an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Active,
    Processing,
    Complete,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Active => "ACTIVE",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Complete => "COMPLETE",
            OrderStatus::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Canceled)
    }

    /// Balance stays committed while the order is in one of these states
    pub fn reserves_balance(&self) -> bool {
        matches!(self, OrderStatus::Active | OrderStatus::Processing)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (OrderStatus::Active, OrderStatus::Processing)
                | (OrderStatus::Active, OrderStatus::Canceled)
                | (OrderStatus::Processing, OrderStatus::Active)
                | (OrderStatus::Processing, OrderStatus::Complete)
        )
    }

    /// States from which `next` may be entered
    pub fn predecessors(next: OrderStatus) -> &'static [OrderStatus] {
        match next {
            OrderStatus::Active => &[OrderStatus::Processing],
            OrderStatus::Processing => &[OrderStatus::Active],
            OrderStatus::Complete => &[OrderStatus::Processing],
            OrderStatus::Canceled => &[OrderStatus::Active],
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" | "0" => Ok(OrderStatus::Active),
            "PROCESSING" | "1" => Ok(OrderStatus::Processing),
            "COMPLETE" | "2" => Ok(OrderStatus::Complete),
            "CANCELED" | "3" => Ok(OrderStatus::Canceled),
            other => Err(format!("Invalid order status: {}", other)),
        }
    }
}

/// Exit trigger family
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SellMode {
    /// `sell_value` is minutes since the order was added
    TimeBased,
    /// `sell_value` is percent drawdown from the highest observed price
    StopLoss,
}

impl SellMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SellMode::TimeBased => "time_based",
            SellMode::StopLoss => "stop_loss",
        }
    }
}

impl fmt::Display for SellMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SellMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "time_based" => Ok(SellMode::TimeBased),
            "stop_loss" => Ok(SellMode::StopLoss),
            other => Err(format!("Invalid sell mode: {}", other)),
        }
    }
}

/// Currency used to fund an entry or settle an exit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Currency {
    #[serde(rename = "USDC")]
    Usdc,
    #[serde(rename = "SOL")]
    Sol,
}

impl Currency {
    pub fn mint_address(&self) -> &'static str {
        match self {
            Currency::Usdc => USDC_MINT_ADDRESS,
            Currency::Sol => SOL_MINT_ADDRESS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usdc => "USDC",
            Currency::Sol => "SOL",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USDC" => Ok(Currency::Usdc),
            "SOL" => Ok(Currency::Sol),
            other => Err(format!("Invalid currency: {}", other)),
        }
    }
}

/// How a profile sizes its entry swaps
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AmountType {
    Amount,
    Percent,
}

impl AmountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmountType::Amount => "amount",
            AmountType::Percent => "percent",
        }
    }
}

impl FromStr for AmountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "amount" => Ok(AmountType::Amount),
            "percent" => Ok(AmountType::Percent),
            other => Err(format!("Invalid amount type: {}", other)),
        }
    }
}

/// Signal source a profile is bound to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            other => Err(format!("Invalid platform: {}", other)),
        }
    }
}

/// A tracked, sized position in a token with an attached exit policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub mint_address: String,
    pub balance: f64,
    pub entry_value: f64,
    pub last_price_max: f64, // Ratchets up only; stop-loss reference
    pub sell_mode: SellMode,
    pub sell_value: f64,
    pub sell_type: Currency,
    pub slippage: u16, // Basis points
    pub status: OrderStatus,
    pub time_added: DateTime<Utc>,
    pub time_sold: Option<DateTime<Utc>>,
    pub profit: Option<f64>,
}

/// Everything needed to create an order
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub mint_address: String,
    pub sell_mode: SellMode,
    pub sell_value: f64,
    pub sell_type: Currency,
    pub entry_value: f64,
    pub balance: f64,
    pub slippage: u16,
}

impl NewOrder {
    /// Reject requests that would leave the stop-loss reference at zero or NaN
    pub fn validate(&self) -> crate::Result<()> {
        if !self.entry_value.is_finite() || self.entry_value <= 0.0 {
            return Err(crate::EngineError::InvariantViolation(format!(
                "entry_value must be positive, got {}",
                self.entry_value
            )));
        }
        if !self.balance.is_finite() || self.balance <= 0.0 {
            return Err(crate::EngineError::InvariantViolation(format!(
                "balance must be positive, got {}",
                self.balance
            )));
        }
        if !self.sell_value.is_finite() || self.sell_value < 0.0 {
            return Err(crate::EngineError::InvariantViolation(format!(
                "sell_value must be non-negative, got {}",
                self.sell_value
            )));
        }
        Ok(())
    }

    /// Build the ACTIVE order record this request describes
    pub fn into_order(self, id: Uuid, time_added: DateTime<Utc>) -> Order {
        Order {
            id,
            mint_address: self.mint_address,
            balance: self.balance,
            entry_value: self.entry_value,
            last_price_max: self.entry_value,
            sell_mode: self.sell_mode,
            sell_value: self.sell_value,
            sell_type: self.sell_type,
            slippage: self.slippage,
            status: OrderStatus::Active,
            time_added,
            time_sold: None,
            profit: None,
        }
    }
}

/// Entry sizing policy of a profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuyPolicy {
    pub buy_type: Currency,
    pub amount_type: AmountType,
    pub amount: f64,
    pub slippage: u16,
}

/// Exit policy copied into every order a profile creates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SellPolicy {
    pub sell_mode: SellMode,
    pub sell_type: Currency,
    pub sell_value: f64,
    pub slippage: u16,
}

/// Reusable buy/sell policy bound to a signal source identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub platform: Platform,
    pub username: String,
    pub is_active: bool,
    pub buy: BuyPolicy,
    pub sell: SellPolicy,
}

impl Profile {
    /// Stable id derived from the signal identity
    pub fn id_for(platform: Platform, username: &str) -> Uuid {
        Uuid::new_v5(
            &Uuid::NAMESPACE_DNS,
            format!("{}_{}", platform.as_str(), username).as_bytes(),
        )
    }

    pub fn new(platform: Platform, username: &str, buy: BuyPolicy, sell: SellPolicy) -> Self {
        Self {
            id: Self::id_for(platform, username),
            platform,
            username: username.to_string(),
            is_active: true,
            buy,
            sell,
        }
    }
}

/// Result of an executed swap
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapOutcome {
    /// Quoted output in UI units of the output token
    ///
    /// Taken from the quote the transaction was built from, not read back from
    /// the settled transaction. Slippage can make the real amount smaller.
    pub received_amount: f64,
    /// Signature of the submitted transaction; it is not confirmed to have landed
    pub signature: String,
}

/// Display metadata for a token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenInfo {
    pub mint_address: String,
    pub symbol: String,
    pub name: String,
    pub price_usd: f64,
    pub price_change_24h: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order() -> NewOrder {
        NewOrder {
            mint_address: "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN".to_string(),
            sell_mode: SellMode::StopLoss,
            sell_value: 10.0,
            sell_type: Currency::Usdc,
            entry_value: 0.85,
            balance: 120.0,
            slippage: 50,
        }
    }

    #[test]
    fn test_new_order_starts_active_at_entry_price() {
        let order = new_order().into_order(Uuid::new_v4(), Utc::now());

        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.last_price_max, 0.85);
        assert!(order.time_sold.is_none());
        assert!(order.profit.is_none());
    }

    #[test]
    fn test_status_transitions() {
        assert!(OrderStatus::Active.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Active.can_transition_to(OrderStatus::Canceled));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Active));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Complete));

        assert!(!OrderStatus::Active.can_transition_to(OrderStatus::Complete));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Canceled.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Complete.can_transition_to(OrderStatus::Active));

        assert!(OrderStatus::Complete.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
    }

    #[test]
    fn test_predecessors_agree_with_transitions() {
        for next in [
            OrderStatus::Active,
            OrderStatus::Processing,
            OrderStatus::Complete,
            OrderStatus::Canceled,
        ] {
            for prev in OrderStatus::predecessors(next) {
                assert!(prev.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("active".parse::<OrderStatus>(), Ok(OrderStatus::Active));
        assert_eq!("2".parse::<OrderStatus>(), Ok(OrderStatus::Complete));
        assert!("sold".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_currency_mints() {
        assert_eq!(Currency::Sol.mint_address(), SOL_MINT_ADDRESS);
        assert_eq!(Currency::Usdc.mint_address(), USDC_MINT_ADDRESS);
        assert_eq!("sol".parse::<Currency>(), Ok(Currency::Sol));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&SellMode::TimeBased).unwrap(),
            "\"time_based\""
        );
        assert_eq!(serde_json::to_string(&Currency::Usdc).unwrap(), "\"USDC\"");
        assert_eq!(
            serde_json::to_string(&OrderStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
    }

    #[test]
    fn test_profile_id_is_stable_per_identity() {
        let a = Profile::id_for(Platform::Twitter, "alpha_caller");
        let b = Profile::id_for(Platform::Twitter, "alpha_caller");
        let c = Profile::id_for(Platform::Twitter, "someone_else");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
