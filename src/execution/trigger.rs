use chrono::{DateTime, Utc};

use crate::models::{Order, SellMode};

/// What one cycle should do with an ACTIVE order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerDecision {
    Hold,
    /// New high; persist it as `last_price_max`
    RaiseMax(f64),
    /// Time-based deadline reached; swap without confirmation
    SellNow,
    /// Stop-loss drawdown reached; hand off to a confirmation monitor
    Confirm,
}

/// Percent drop of `current_price` below `last_price_max`
pub fn drawdown_pct(last_price_max: f64, current_price: f64) -> f64 {
    (last_price_max - current_price) / last_price_max * 100.0
}

/// Whether a price sample still satisfies the order's stop-loss threshold
pub fn stop_loss_holds(order: &Order, current_price: f64) -> bool {
    drawdown_pct(order.last_price_max, current_price) >= order.sell_value
}

/// Evaluate an ACTIVE order against the current price
pub fn evaluate(order: &Order, current_price: f64, now: DateTime<Utc>) -> TriggerDecision {
    match order.sell_mode {
        SellMode::TimeBased => {
            // Deadline wins over a ratchet in the same cycle
            let elapsed_minutes = (now - order.time_added).num_milliseconds() as f64 / 60_000.0;
            if elapsed_minutes >= order.sell_value {
                TriggerDecision::SellNow
            } else if current_price > order.last_price_max {
                TriggerDecision::RaiseMax(current_price)
            } else {
                TriggerDecision::Hold
            }
        }
        SellMode::StopLoss => {
            if current_price > order.last_price_max {
                TriggerDecision::RaiseMax(current_price)
            } else if stop_loss_holds(order, current_price) {
                TriggerDecision::Confirm
            } else {
                TriggerDecision::Hold
            }
        }
    }
}
