use crate::error::StoreError;
use crate::models::{Candle, Timeframe};
use crate::store::{CandleSource, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

fn candle_key(symbol: &str, timeframe: Timeframe) -> String {
    format!("candles:{}:{}", symbol, timeframe.as_str())
}

fn score(timestamp: DateTime<Utc>) -> f64 {
    timestamp.timestamp() as f64
}

/// Redis candle history
///
/// Uses one sorted set per symbol and timeframe, `candles:{symbol}:{timeframe}`,
/// scored by candle open time for time-range queries.
#[derive(Clone)]
pub struct RedisCandleStore {
    conn: ConnectionManager,
}

impl RedisCandleStore {
    /// Connect to Redis, giving up after 5 seconds
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Unavailable("Redis connection timeout after 5 seconds".into()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    /// Save candles, replacing any stored candle with the same timestamp
    pub async fn save_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> StoreResult<()> {
        if candles.is_empty() {
            return Ok(());
        }

        let key = candle_key(symbol, timeframe);
        let mut pipe = redis::pipe();
        pipe.atomic();

        for candle in candles {
            let value = serde_json::to_string(candle)?;
            let ts = score(candle.timestamp);
            pipe.zrembyscore(&key, ts, ts).ignore();
            pipe.zadd(&key, value, ts).ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;

        tracing::debug!("Saved {} candles to {}", candles.len(), key);

        Ok(())
    }

    /// Remove candles older than `keep` from now
    pub async fn cleanup_old(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        keep: chrono::Duration,
    ) -> StoreResult<usize> {
        let key = candle_key(symbol, timeframe);
        let max_score = score(Utc::now() - keep);

        let mut conn = self.conn.clone();
        let removed: usize = conn.zrembyscore(&key, "-inf", format!("({}", max_score)).await?;

        if removed > 0 {
            tracing::debug!("Cleaned up {} old candles from {}", removed, key);
        }

        Ok(removed)
    }

    pub async fn count_candles(&self, symbol: &str, timeframe: Timeframe) -> StoreResult<usize> {
        let mut conn = self.conn.clone();
        let count: usize = conn.zcard(candle_key(symbol, timeframe)).await?;
        Ok(count)
    }
}

#[async_trait]
impl CandleSource for RedisCandleStore {
    async fn get_historical_data(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Candle>> {
        let key = candle_key(symbol, timeframe);

        let mut conn = self.conn.clone();
        let results: Vec<String> = conn.zrangebyscore(&key, score(from), score(to)).await?;

        let candles = results
            .iter()
            .map(|json| serde_json::from_str::<Candle>(json))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Loaded {} candles from {}", candles.len(), key);

        Ok(candles)
    }
}
