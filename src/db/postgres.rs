use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::{OrderStore, ProfileStore};
use crate::error::EngineError;
use crate::models::{
    AmountType, BuyPolicy, Currency, NewOrder, Order, OrderStatus, Platform, Profile, SellMode,
    SellPolicy,
};
use crate::Result;

const ORDER_COLUMNS: &str = "id, mint_address, balance, entry_value, last_price_max, sell_mode, \
     sell_value, sell_type, slippage, status, time_added, time_sold, profit";

const PROFILE_COLUMNS: &str = "id, platform, username, is_active, buy_type, buy_amount_type, \
     buy_amount, buy_slippage, sell_mode, sell_type, sell_value, sell_slippage";

/// Postgres persistence for orders and profiles
pub struct PostgresPersistence {
    pool: PgPool,
}

fn to_decimal(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| EngineError::InvariantViolation(format!("{} is not storable", value)))
}

fn to_f64(value: Decimal) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| EngineError::Storage(format!("NUMERIC {} out of range", value)))
}

fn parse_column<T: FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: String| EngineError::Storage(format!("column {}: {}", column, e)))
}

fn slippage_column(row: &PgRow, column: &str) -> Result<u16> {
    let raw: i32 = row.try_get(column)?;
    u16::try_from(raw)
        .map_err(|_| EngineError::Storage(format!("column {}: {} out of range", column, raw)))
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    let profit: Option<Decimal> = row.try_get("profit")?;

    Ok(Order {
        id: row.try_get("id")?,
        mint_address: row.try_get("mint_address")?,
        balance: to_f64(row.try_get("balance")?)?,
        entry_value: to_f64(row.try_get("entry_value")?)?,
        last_price_max: to_f64(row.try_get("last_price_max")?)?,
        sell_mode: parse_column(row, "sell_mode")?,
        sell_value: to_f64(row.try_get("sell_value")?)?,
        sell_type: parse_column(row, "sell_type")?,
        slippage: slippage_column(row, "slippage")?,
        status: parse_column(row, "status")?,
        time_added: row.try_get::<DateTime<Utc>, _>("time_added")?,
        time_sold: row.try_get::<Option<DateTime<Utc>>, _>("time_sold")?,
        profit: profit.map(to_f64).transpose()?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<Profile> {
    let platform: Platform = parse_column(row, "platform")?;
    let sell_mode: SellMode = parse_column(row, "sell_mode")?;
    let sell_type: Currency = parse_column(row, "sell_type")?;
    let buy_type: Currency = parse_column(row, "buy_type")?;
    let amount_type: AmountType = parse_column(row, "buy_amount_type")?;

    Ok(Profile {
        id: row.try_get("id")?,
        platform,
        username: row.try_get("username")?,
        is_active: row.try_get("is_active")?,
        buy: BuyPolicy {
            buy_type,
            amount_type,
            amount: to_f64(row.try_get("buy_amount")?)?,
            slippage: slippage_column(row, "buy_slippage")?,
        },
        sell: SellPolicy {
            sell_mode,
            sell_type,
            sell_value: to_f64(row.try_get("sell_value")?)?,
            slippage: slippage_column(row, "sell_slippage")?,
        },
    })
}

impl PostgresPersistence {
    /// Connect to Postgres and apply pending migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool })
    }

    async fn current_status(&self, id: Uuid) -> Result<OrderStatus> {
        let row = sqlx::query("SELECT status FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EngineError::NotFound(id))?;

        parse_column(&row, "status")
    }

    /// Delete all orders and profiles (testing only)
    #[cfg(test)]
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM orders").execute(&self.pool).await?;
        sqlx::query("DELETE FROM profiles")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresPersistence {
    async fn create_order(&self, order: NewOrder) -> Result<Uuid> {
        order.validate()?;
        let order = order.into_order(Uuid::new_v4(), Utc::now());

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, mint_address, balance, entry_value, last_price_max, sell_mode,
                sell_value, sell_type, slippage, status, time_added
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id)
        .bind(&order.mint_address)
        .bind(to_decimal(order.balance)?)
        .bind(to_decimal(order.entry_value)?)
        .bind(to_decimal(order.last_price_max)?)
        .bind(order.sell_mode.as_str())
        .bind(to_decimal(order.sell_value)?)
        .bind(order.sell_type.as_str())
        .bind(i32::from(order.slippage))
        .bind(order.status.as_str())
        .bind(order.time_added)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved order {} for {} to Postgres", order.id, order.mint_address);

        Ok(order.id)
    }

    async fn get_order(&self, id: Uuid) -> Result<Order> {
        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EngineError::NotFound(id))?;

        order_from_row(&row)
    }

    async fn get_orders(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE status = $1 ORDER BY time_added ASC",
            ORDER_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }

    async fn update_last_price_max(&self, id: Uuid, new_price: f64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET last_price_max = $1, updated_at = NOW()
            WHERE id = $2 AND status = 'ACTIVE' AND last_price_max < $1
            "#,
        )
        .bind(to_decimal(new_price)?)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Not a new high, or no longer ACTIVE; only a missing row is an error
            self.current_status(id).await?;
        }

        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: OrderStatus) -> Result<()> {
        let allowed_from: Vec<String> = OrderStatus::predecessors(status)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = ANY($3)
            "#,
        )
        .bind(status.as_str())
        .bind(id)
        .bind(&allowed_from)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let from = self.current_status(id).await?;
            return Err(EngineError::InvalidTransition { id, from, to: status });
        }

        Ok(())
    }

    async fn complete_order(&self, id: Uuid, profit: Option<f64>) -> Result<()> {
        let profit = profit.map(to_decimal).transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'COMPLETE', time_sold = NOW(), profit = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(id)
        .bind(profit)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let from = self.current_status(id).await?;
            return Err(EngineError::InvalidTransition {
                id,
                from,
                to: OrderStatus::Complete,
            });
        }

        Ok(())
    }

    async fn active_balance(&self, mint_address: &str) -> Result<f64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(balance), 0) AS total
            FROM orders
            WHERE mint_address = $1 AND status IN ('ACTIVE', 'PROCESSING')
            "#,
        )
        .bind(mint_address)
        .fetch_one(&self.pool)
        .await?;

        to_f64(row.try_get("total")?)
    }

    async fn reset_processing(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'ACTIVE', updated_at = NOW()
            WHERE status = 'PROCESSING'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProfileStore for PostgresPersistence {
    async fn save_profile(&self, profile: &Profile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (
                id, platform, username, is_active, buy_type, buy_amount_type,
                buy_amount, buy_slippage, sell_mode, sell_type, sell_value, sell_slippage
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                is_active = EXCLUDED.is_active,
                buy_type = EXCLUDED.buy_type,
                buy_amount_type = EXCLUDED.buy_amount_type,
                buy_amount = EXCLUDED.buy_amount,
                buy_slippage = EXCLUDED.buy_slippage,
                sell_mode = EXCLUDED.sell_mode,
                sell_type = EXCLUDED.sell_type,
                sell_value = EXCLUDED.sell_value,
                sell_slippage = EXCLUDED.sell_slippage,
                updated_at = NOW()
            "#,
        )
        .bind(profile.id)
        .bind(profile.platform.as_str())
        .bind(&profile.username)
        .bind(profile.is_active)
        .bind(profile.buy.buy_type.as_str())
        .bind(profile.buy.amount_type.as_str())
        .bind(to_decimal(profile.buy.amount)?)
        .bind(i32::from(profile.buy.slippage))
        .bind(profile.sell.sell_mode.as_str())
        .bind(profile.sell.sell_type.as_str())
        .bind(to_decimal(profile.sell.sell_value)?)
        .bind(i32::from(profile.sell.slippage))
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Saved profile {} ({}) to Postgres",
            profile.username,
            profile.platform
        );

        Ok(())
    }

    async fn get_profile(&self, platform: Platform, username: &str) -> Result<Option<Profile>> {
        self.get_profile_by_id(Profile::id_for(platform, username))
            .await
    }

    async fn get_profile_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn get_profiles(&self) -> Result<Vec<Profile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM profiles ORDER BY username ASC",
            PROFILE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(profile_from_row).collect()
    }

    async fn delete_profile(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
