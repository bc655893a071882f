//! Streaming ticker feed over Kraken's v2 WebSocket.
//!
//! One socket per subscription: connect, send the ticker subscribe
//! handshake, then forward every `last` price from a reader task. The
//! channel closing is the signal that the feed is gone; there is no
//! reconnect here.

use crate::domain::errors::MonitorError;
use crate::domain::ports::PriceFeed;
use crate::domain::types::PriceUpdate;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{self, Receiver};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

pub struct KrakenTickerFeed {
    ws_url: String,
}

/// Ticker frames carry `channel: "ticker"`; heartbeats, status frames and
/// method acknowledgements all parse but are skipped by the channel check.
#[derive(Debug, Deserialize)]
struct TickerEnvelope {
    channel: Option<String>,
    #[serde(default)]
    data: Vec<TickerData>,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    symbol: String,
    last: f64,
}

impl KrakenTickerFeed {
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }
}

#[async_trait]
impl PriceFeed for KrakenTickerFeed {
    async fn subscribe(&self, pair: &str) -> Result<Receiver<PriceUpdate>, MonitorError> {
        let url = url::Url::parse(&self.ws_url)
            .map_err(|e| MonitorError::Subscribe(format!("bad feed url {}: {e}", self.ws_url)))?;

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| MonitorError::Subscribe(e.to_string()))?;
        info!("KrakenTickerFeed: connected to {}", self.ws_url);

        let (mut write, mut read) = ws_stream.split();

        let subscribe_msg = serde_json::json!({
            "method": "subscribe",
            "params": {
                "channel": "ticker",
                "symbol": [pair],
            }
        });
        write
            .send(Message::Text(subscribe_msg.to_string().into()))
            .await
            .map_err(|e| MonitorError::Subscribe(e.to_string()))?;
        debug!("KrakenTickerFeed: subscribed to ticker for {}", pair);

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let Ok(envelope) = serde_json::from_str::<TickerEnvelope>(&text) else {
                            continue;
                        };
                        if envelope.channel.as_deref() != Some("ticker") {
                            continue;
                        }
                        for ticker in envelope.data {
                            let update = PriceUpdate {
                                pair: ticker.symbol,
                                last: ticker.last,
                            };
                            if tx.send(update).await.is_err() {
                                // Subscriber is gone (monitor triggered);
                                // tear the socket down.
                                debug!("KrakenTickerFeed: subscriber dropped, closing");
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("KrakenTickerFeed: connection closed by server");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("KrakenTickerFeed: socket error: {}", e);
                        return;
                    }
                }
            }
            // Stream ended; dropping the sender closes the channel.
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_frames_parse_last_price() {
        let frame = r#"{
            "channel": "ticker",
            "type": "update",
            "data": [{"symbol": "BTC/USDT", "last": 30100.5, "bid": 30100.0, "ask": 30101.0}]
        }"#;
        let envelope: TickerEnvelope = serde_json::from_str(frame).unwrap();
        assert_eq!(envelope.channel.as_deref(), Some("ticker"));
        assert_eq!(envelope.data.len(), 1);
        assert_eq!(envelope.data[0].symbol, "BTC/USDT");
        assert_eq!(envelope.data[0].last, 30100.5);
    }

    #[test]
    fn non_ticker_frames_are_skippable() {
        let heartbeat = r#"{"channel": "heartbeat"}"#;
        let envelope: TickerEnvelope = serde_json::from_str(heartbeat).unwrap();
        assert_eq!(envelope.channel.as_deref(), Some("heartbeat"));
        assert!(envelope.data.is_empty());

        let method_ack = r#"{"method": "subscribe", "success": true, "result": {"channel": "ticker"}}"#;
        let envelope: TickerEnvelope = serde_json::from_str(method_ack).unwrap();
        assert_eq!(envelope.channel, None);
    }
}
