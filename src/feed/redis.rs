use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{info, warn};

use super::BroadcastTickFeed;
use crate::error::StoreError;
use crate::models::Tick;

/// Republishes JSON ticks from a Redis pub/sub channel onto a broadcast feed
///
/// Malformed messages are logged and skipped.
pub struct RedisTickBridge {
    client: ::redis::Client,
    channel: String,
    event: String,
    feed: Arc<BroadcastTickFeed>,
}

impl RedisTickBridge {
    pub fn new(
        redis_url: &str,
        channel: impl Into<String>,
        event: impl Into<String>,
        feed: Arc<BroadcastTickFeed>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            client: ::redis::Client::open(redis_url)?,
            channel: channel.into(),
            event: event.into(),
            feed,
        })
    }

    /// Forward messages until the Redis connection closes
    pub async fn run(self) -> Result<(), StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        info!(channel = %self.channel, event = %self.event, "Tick bridge subscribed");

        let mut messages = pubsub.on_message();
        while let Some(msg) = messages.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Unreadable tick payload");
                    continue;
                }
            };

            match parse_tick(&payload) {
                Ok(tick) => {
                    self.feed.publish(&self.event, tick);
                }
                Err(e) => warn!(error = %e, payload = %payload, "Skipping malformed tick"),
            }
        }

        warn!(channel = %self.channel, "Tick bridge connection closed");
        Ok(())
    }
}

pub fn parse_tick(payload: &str) -> Result<Tick, serde_json::Error> {
    serde_json::from_str(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::TickFeed;

    #[test]
    fn test_parse_minimal_tick() {
        let tick = parse_tick(r#"{"symbol":"BTCUSDT","price":101.5}"#).unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, 101.5);
        assert!(tick.bid.is_none());
    }

    #[test]
    fn test_parse_full_tick() {
        let tick = parse_tick(
            r#"{"symbol":"ETHUSDT","price":3000.0,"bid":2999.5,"ask":3000.5,"volume":12.0,"timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(tick.ask, Some(3000.5));
        assert_eq!(tick.timestamp.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_tick("not json").is_err());
        assert!(parse_tick(r#"{"symbol":"BTCUSDT"}"#).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_bridge_forwards_ticks() {
        let feed = Arc::new(BroadcastTickFeed::default());
        let mut sub = feed.subscribe("price_update");

        let bridge =
            RedisTickBridge::new("redis://127.0.0.1:6379", "test_ticks", "price_update", feed.clone())
                .unwrap();
        tokio::spawn(bridge.run());
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let client = ::redis::Client::open("redis://127.0.0.1:6379").unwrap();
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = ::redis::AsyncCommands::publish(
            &mut conn,
            "test_ticks",
            r#"{"symbol":"BTCUSDT","price":101.0}"#,
        )
        .await
        .unwrap();

        let tick = sub.recv().await.unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
    }
}
