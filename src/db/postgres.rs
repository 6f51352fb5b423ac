use crate::error::StoreError;
use crate::models::{
    Principal, Signal, SignalPayload, Strategy, StrategyStats, Timeframe,
};
use crate::store::{SignalStore, StoreResult, StrategyStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Owner of the seeded system strategy in single-user mode
pub const DEFAULT_USER_ID: Uuid = Uuid::from_u128(1);

/// Postgres persistence for strategies and signals
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to Postgres and run pending migrations
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Load every strategy regardless of status
    pub async fn load_strategies(&self) -> StoreResult<Vec<Strategy>> {
        let rows = sqlx::query(&format!("SELECT {} FROM strategies ORDER BY created_at ASC", STRATEGY_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(strategy_from_row).collect()
    }

    pub async fn load_signals(&self, strategy_id: Uuid) -> StoreResult<Vec<Signal>> {
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, direction, entry_price, stop_loss, targets, is_free,
                   strategy_id, strategy_name, timeframe, note, status,
                   created_by, created_at
            FROM signals
            WHERE strategy_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(signal_from_row).collect()
    }

    /// Delete all signals and strategies (for testing)
    #[cfg(test)]
    pub async fn clear_all(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM signals").execute(&self.pool).await?;
        sqlx::query("DELETE FROM strategies").execute(&self.pool).await?;
        Ok(())
    }
}

const STRATEGY_COLUMNS: &str = "id, user_id, name, symbol, symbols, timeframe, segment, candle_type, \
     rules, action, status, total_signals, last_signal_at, is_system, is_default, created_at, updated_at";

#[async_trait]
impl StrategyStore for PostgresStore {
    async fn find_active(&self) -> StoreResult<Vec<Strategy>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM strategies WHERE status = 'Active' ORDER BY created_at ASC",
            STRATEGY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let strategies = rows
            .iter()
            .map(strategy_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        tracing::debug!("Loaded {} active strategies from Postgres", strategies.len());

        Ok(strategies)
    }

    async fn find_default(&self) -> StoreResult<Option<Strategy>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM strategies WHERE is_default ORDER BY created_at ASC LIMIT 1",
            STRATEGY_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(strategy_from_row).transpose()
    }

    async fn insert(&self, strategy: &Strategy) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO strategies (
                id, user_id, name, symbol, symbols, timeframe, segment, candle_type,
                rules, action, status, total_signals, last_signal_at,
                is_system, is_default, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(strategy.id)
        .bind(strategy.user_id)
        .bind(&strategy.name)
        .bind(&strategy.symbol)
        .bind(&strategy.symbols)
        .bind(strategy.timeframe.as_str())
        .bind(&strategy.segment)
        .bind(enum_to_text(&strategy.candle_type)?)
        .bind(serde_json::to_string(&strategy.rules)?)
        .bind(enum_to_text(&strategy.action)?)
        .bind(strategy.status.as_str())
        .bind(i64::try_from(strategy.stats.total_signals).unwrap_or(i64::MAX))
        .bind(strategy.stats.last_signal_at)
        .bind(strategy.is_system)
        .bind(strategy.is_default)
        .bind(strategy.created_at)
        .bind(strategy.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::info!("Inserted strategy {} ({})", strategy.id, strategy.name);

        Ok(())
    }
}

#[async_trait]
impl SignalStore for PostgresStore {
    async fn create_signal(
        &self,
        payload: SignalPayload,
        principal: &Principal,
    ) -> StoreResult<Signal> {
        let signal = Signal {
            id: Uuid::new_v4(),
            payload,
            created_by: principal.user_id,
            created_at: Utc::now(),
        };
        let p = &signal.payload;

        sqlx::query(
            r#"
            INSERT INTO signals (
                id, symbol, direction, entry_price, stop_loss, targets, is_free,
                strategy_id, strategy_name, timeframe, note, status,
                created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(signal.id)
        .bind(&p.symbol)
        .bind(p.direction.as_str())
        .bind(to_decimal(p.entry_price)?)
        .bind(to_decimal(p.stop_loss)?)
        .bind(serde_json::to_string(&p.targets)?)
        .bind(p.is_free)
        .bind(p.provenance.strategy_id)
        .bind(&p.provenance.strategy_name)
        .bind(p.provenance.timeframe.as_str())
        .bind(&p.note)
        .bind(enum_to_text(&p.status)?)
        .bind(signal.created_by)
        .bind(signal.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved signal {} for {} to Postgres", signal.id, p.symbol);

        Ok(signal)
    }

    async fn update_signal_stats(
        &self,
        strategy_id: Uuid,
        increment: u64,
        last_signal_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE strategies SET
                total_signals = total_signals + $2,
                last_signal_at = GREATEST(COALESCE(last_signal_at, $3), $3),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(strategy_id)
        .bind(i64::try_from(increment).unwrap_or(i64::MAX))
        .bind(last_signal_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("strategy {}", strategy_id)));
        }

        Ok(())
    }
}

fn strategy_from_row(row: &PgRow) -> StoreResult<Strategy> {
    let timeframe: String = row.try_get("timeframe")?;
    let rules: String = row.try_get("rules")?;
    let total_signals: i64 = row.try_get("total_signals")?;

    Ok(Strategy {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        symbol: row.try_get("symbol")?,
        symbols: row.try_get("symbols")?,
        timeframe: parse_timeframe(&timeframe)?,
        segment: row.try_get("segment")?,
        candle_type: enum_from_text(row.try_get("candle_type")?)?,
        rules: serde_json::from_str(&rules)?,
        action: enum_from_text(row.try_get("action")?)?,
        status: enum_from_text(row.try_get("status")?)?,
        stats: StrategyStats {
            total_signals: total_signals.max(0) as u64,
            last_signal_at: row.try_get("last_signal_at")?,
        },
        is_system: row.try_get("is_system")?,
        is_default: row.try_get("is_default")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn signal_from_row(row: &PgRow) -> StoreResult<Signal> {
    let entry_price: Decimal = row.try_get("entry_price")?;
    let stop_loss: Decimal = row.try_get("stop_loss")?;
    let targets: String = row.try_get("targets")?;
    let timeframe: String = row.try_get("timeframe")?;

    Ok(Signal {
        id: row.try_get("id")?,
        payload: SignalPayload {
            symbol: row.try_get("symbol")?,
            direction: enum_from_text(row.try_get("direction")?)?,
            entry_price: from_decimal(entry_price)?,
            stop_loss: from_decimal(stop_loss)?,
            targets: serde_json::from_str(&targets)?,
            is_free: row.try_get("is_free")?,
            provenance: crate::models::SignalProvenance {
                strategy_id: row.try_get("strategy_id")?,
                strategy_name: row.try_get("strategy_name")?,
                timeframe: parse_timeframe(&timeframe)?,
            },
            note: row.try_get("note")?,
            status: enum_from_text(row.try_get("status")?)?,
        },
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_timeframe(value: &str) -> StoreResult<Timeframe> {
    value.parse().map_err(StoreError::InvalidData)
}

/// Text form of a unit enum as serde names it
fn enum_to_text<T: Serialize>(value: &T) -> StoreResult<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(StoreError::InvalidData(format!("not a unit variant: {}", other))),
    }
}

fn enum_from_text<T: DeserializeOwned>(value: String) -> StoreResult<T> {
    Ok(serde_json::from_value(serde_json::Value::String(value))?)
}

fn to_decimal(value: f64) -> StoreResult<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| StoreError::InvalidData(format!("price {} is not finite", value)))
}

fn from_decimal(value: Decimal) -> StoreResult<f64> {
    value
        .to_f64()
        .ok_or_else(|| StoreError::InvalidData(format!("price {} out of range", value)))
}
