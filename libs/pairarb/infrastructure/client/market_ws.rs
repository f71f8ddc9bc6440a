//! Market-channel WebSocket reader
//!
//! One feed task per tracked market: connects, subscribes to both leg
//! tokens, and writes every update into the shared `BookCache`. Snapshot
//! messages ("book") replace the stored book; "price_change" events only
//! refresh the freshness stamp. Parse failures are dropped silently; the
//! next snapshot supersedes them. Disconnects reconnect with a fixed ~2s
//! backoff and a full resubscribe.

use crate::domain::orderbook::PriceLevel;
use crate::infrastructure::book_cache::BookCache;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Public market data channel
pub const MARKET_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

/// Reconnect backoff after a dropped connection
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Heartbeat cadence; the server drops quiet connections
const PING_INTERVAL: Duration = Duration::from_secs(10);

// =============================================================================
// Wire types
// =============================================================================

/// Subscription message sent after connecting
#[derive(Debug, Clone, Serialize)]
struct MarketSubscription {
    #[serde(rename = "type")]
    msg_type: String,
    assets_ids: Vec<String>,
}

impl MarketSubscription {
    fn new(token_ids: Vec<String>) -> Self {
        Self {
            msg_type: "market".to_string(),
            assets_ids: token_ids,
        }
    }
}

/// Full book snapshot for one asset
#[derive(Debug, Clone, Deserialize)]
struct WsBookEvent {
    #[serde(default)]
    event_type: String,
    asset_id: String,
    #[serde(default)]
    bids: Vec<PriceLevel>,
    #[serde(default)]
    asks: Vec<PriceLevel>,
}

/// Single price change notification
#[derive(Debug, Clone, Deserialize)]
struct WsPriceChange {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    asset_id: Option<String>,
    /// Batched form groups changes per asset
    #[serde(default)]
    price_changes: Vec<WsPriceChangeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct WsPriceChangeEntry {
    asset_id: String,
}

/// Parsed incoming message
enum FeedMessage {
    Books(Vec<WsBookEvent>),
    PriceChange(WsPriceChange),
    Pong,
    Unknown,
}

/// Classify a raw text frame. Snapshots arrive either as a single object or
/// as an array (one entry per subscribed asset).
fn parse_feed_message(text: &str) -> FeedMessage {
    if text == "PONG" {
        return FeedMessage::Pong;
    }

    if let Ok(snapshots) = serde_json::from_str::<Vec<WsBookEvent>>(text) {
        if snapshots.first().map(|s| s.event_type.as_str()) == Some("book") {
            return FeedMessage::Books(snapshots);
        }
    }

    if let Ok(snapshot) = serde_json::from_str::<WsBookEvent>(text) {
        if snapshot.event_type == "book" {
            return FeedMessage::Books(vec![snapshot]);
        }
    }

    if let Ok(change) = serde_json::from_str::<WsPriceChange>(text) {
        if change.event_type == "price_change" {
            return FeedMessage::PriceChange(change);
        }
    }

    FeedMessage::Unknown
}

// =============================================================================
// Feed task
// =============================================================================

/// Run the market feed for a set of tokens until shutdown.
///
/// The shutdown flag follows the engine convention: true while running,
/// flipped to false to stop.
pub async fn run_market_feed(
    url: &str,
    token_ids: Vec<String>,
    books: Arc<BookCache>,
    shutdown: Arc<AtomicBool>,
) {
    books.subscribe(&token_ids);
    let label = feed_label(&token_ids);

    'reconnect: loop {
        if !shutdown.load(Ordering::Acquire) {
            break 'reconnect;
        }

        let (ws_stream, _) = match connect_async(url).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("[Feed {}] Connect failed: {}", label, e);
                sleep(RECONNECT_DELAY).await;
                continue 'reconnect;
            }
        };
        let (mut write, mut read) = ws_stream.split();

        // Resubscribe to everything we track on every (re)connect
        let subscription = MarketSubscription::new(token_ids.clone());
        let sub_json = match serde_json::to_string(&subscription) {
            Ok(json) => json,
            Err(e) => {
                warn!("[Feed {}] Failed to encode subscription: {}", label, e);
                break 'reconnect;
            }
        };
        if let Err(e) = write.send(Message::Text(sub_json.into())).await {
            warn!("[Feed {}] Subscribe failed: {}", label, e);
            sleep(RECONNECT_DELAY).await;
            continue 'reconnect;
        }
        info!("[Feed {}] Connected and subscribed", label);

        let mut heartbeat = interval(PING_INTERVAL);
        let mut shutdown_check = interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                message = read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            handle_frame(&text, &books, &label);
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("[Feed {}] Connection closed by server", label);
                            sleep(RECONNECT_DELAY).await;
                            continue 'reconnect;
                        }
                        Some(Err(e)) => {
                            warn!("[Feed {}] Read error: {}", label, e);
                            sleep(RECONNECT_DELAY).await;
                            continue 'reconnect;
                        }
                        Some(Ok(_)) => {}
                    }
                }
                _ = heartbeat.tick() => {
                    if write.send(Message::Text("PING".to_string().into())).await.is_err() {
                        warn!("[Feed {}] Heartbeat failed", label);
                        sleep(RECONNECT_DELAY).await;
                        continue 'reconnect;
                    }
                }
                _ = shutdown_check.tick() => {
                    if !shutdown.load(Ordering::Acquire) {
                        let _ = write.send(Message::Close(None)).await;
                        break 'reconnect;
                    }
                }
            }
        }
    }

    info!("[Feed {}] Stopped", label);
}

fn handle_frame(text: &str, books: &BookCache, label: &str) {
    match parse_feed_message(text) {
        FeedMessage::Books(snapshots) => {
            for snapshot in snapshots {
                books.apply_snapshot(&snapshot.asset_id, &snapshot.bids, &snapshot.asks);
            }
        }
        FeedMessage::PriceChange(change) => {
            if let Some(asset_id) = change.asset_id {
                books.touch(&asset_id);
            }
            for entry in change.price_changes {
                books.touch(&entry.asset_id);
            }
        }
        FeedMessage::Pong => {}
        FeedMessage::Unknown => {
            debug!("[Feed {}] Dropped unparseable frame", label);
        }
    }
}

fn feed_label(token_ids: &[String]) -> String {
    token_ids
        .first()
        .map(|t| t.chars().take(8).collect())
        .unwrap_or_else(|| "?".to_string())
}
