use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{Candle, Timeframe};
use crate::store::{CandleSource, StoreResult};

const RATE_LIMIT_RPM: u32 = 600;
const MAX_RETRIES: u32 = 3;
const MAX_LIMIT: usize = 1000;

type CandleRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Kline-style HTTP candle client
///
/// Queries `GET {base}/klines?symbol=..&interval=..&startTime=..&endTime=..&limit=..`
/// and expects rows of `[open_time_ms, open, high, low, close, volume, ...]`,
/// numbers given either as JSON numbers or strings.
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct HttpCandleClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<CandleRateLimiter>,
    retry_base_ms: u64,
    page_limit: usize,
}

impl HttpCandleClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            retry_base_ms: 1000,
            page_limit: MAX_LIMIT,
        })
    }

    /// Scale retry backoff (tests use a few milliseconds)
    pub fn with_retry_base_ms(mut self, retry_base_ms: u64) -> Self {
        self.retry_base_ms = retry_base_ms;
        self
    }

    /// Rows requested per page, capped at the API maximum
    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit.clamp(1, MAX_LIMIT);
        self
    }

    /// Make a rate-limited request with retry on 429 and 5xx
    async fn make_request(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let backoff_ms = self.retry_base_ms * 2u64.pow(attempt);
                        tracing::warn!(
                            "Candle API returned {}, retrying in {}ms (attempt {}/{})",
                            status,
                            backoff_ms,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                        continue;
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    anyhow::bail!("Candle API error ({}): {}", status, error_text);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_ms = self.retry_base_ms * 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}ms (attempt {}/{})",
                        e,
                        backoff_ms,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }

    /// Fetch candles for `symbol` between `from` and `to`, oldest first
    ///
    /// The API counts rows forward from `startTime`, so long ranges are
    /// paged until a short page or `to` is reached.
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let mut candles: Vec<Candle> = Vec::new();
        let mut start = from;

        while start <= to {
            let page = self.fetch_page(symbol, timeframe, start, to).await?;
            let full = page.len() >= self.page_limit;

            let Some(last) = page.iter().map(|c| c.timestamp).max() else {
                break;
            };
            candles.extend(page);

            // A page not moving forward would loop forever
            if !full || last < start {
                break;
            }
            start = last + chrono::Duration::milliseconds(1);
        }

        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);

        tracing::debug!("Fetched {} candles for {}", candles.len(), symbol);

        Ok(candles)
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/klines", self.base_url);
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", timeframe.as_str().to_string()),
            ("startTime", from.timestamp_millis().to_string()),
            ("endTime", to.timestamp_millis().to_string()),
            ("limit", self.page_limit.to_string()),
        ];

        tracing::debug!("Fetching {} {} klines from {}", symbol, timeframe, from);

        let response = self.make_request(&url, &query).await?;
        let rows: Vec<Vec<Value>> = response.json().await.context("Failed to parse klines")?;

        rows.iter().map(|row| parse_kline(row)).collect()
    }
}

fn number(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64().context("Number out of range"),
        Value::String(s) => s.parse().with_context(|| format!("Invalid number {:?}", s)),
        other => anyhow::bail!("Expected number, got {}", other),
    }
}

fn parse_kline(row: &[Value]) -> Result<Candle> {
    if row.len() < 5 {
        anyhow::bail!("Kline row has {} fields, expected at least 5", row.len());
    }

    let open_time = row[0].as_i64().context("Kline open time is not an integer")?;
    let timestamp = Utc
        .timestamp_millis_opt(open_time)
        .single()
        .context("Kline open time out of range")?;

    Ok(Candle {
        timestamp,
        open: number(&row[1])?,
        high: number(&row[2])?,
        low: number(&row[3])?,
        close: number(&row[4])?,
        volume: row.get(5).map(number).transpose()?.unwrap_or(0.0),
    })
}

#[async_trait]
impl CandleSource for HttpCandleClient {
    async fn get_historical_data(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Candle>> {
        self.fetch_candles(symbol, timeframe, from, to)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{:#}", e)))
    }
}
