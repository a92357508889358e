//! Polymarket CLOB market-channel client.
//!
//! Maintains a best-effort live connection to the public market stream,
//! subscribes to the watched outcome tokens in chunks, and routes every
//! top-of-book change into the Polymarket price cache.
//!
//! The connection lifecycle is an explicit state machine:
//!
//! Dialing -> Subscribing -> Reading -> Closing -> Backoff -> Dialing
//!
//! Cancellation short-circuits any state to Terminated. Network and parse
//! failures never surface to the caller; they are absorbed by reconnection
//! and reported through metrics.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval_at, sleep, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{PmPriceCache, QuoteSide};
use crate::metrics::Metrics;

const POLYMARKET_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const READ_DEADLINE: Duration = Duration::from_secs(60);
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(2);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
const INTER_CHUNK_PAUSE: Duration = Duration::from_millis(100);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection lifecycle state. Socket halves travel with the states that
/// own them, so no state can touch a connection it does not hold.
enum ConnState {
    Dialing,
    Subscribing { write: WsSink, read: WsSource },
    Reading { write: WsSink, read: WsSource },
    Closing { write: WsSink },
    Backoff,
    Terminated,
}

/// Outcome of decoding one inbound text frame.
#[derive(Debug, PartialEq)]
enum Decoded {
    Update {
        asset: String,
        side: QuoteSide,
        price: f64,
    },
    Ignored,
    Malformed,
}

#[derive(Debug, Deserialize)]
struct PmFrame {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    asset: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    side: String,
}

/// WebSocket client for the Polymarket market channel.
pub struct PolymarketClient {
    url: String,
    token_ids: Vec<String>,
    chunk_size: usize,
    cache: Arc<PmPriceCache>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
}

impl PolymarketClient {
    pub fn new(
        token_ids: Vec<String>,
        chunk_size: usize,
        cache: Arc<PmPriceCache>,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self::with_url(
            POLYMARKET_WS_URL.to_string(),
            token_ids,
            chunk_size,
            cache,
            metrics,
            cancel,
        )
    }

    /// Creates a client against a custom endpoint.
    pub fn with_url(
        url: String,
        token_ids: Vec<String>,
        chunk_size: usize,
        cache: Arc<PmPriceCache>,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            url,
            token_ids,
            chunk_size,
            cache,
            metrics,
            cancel,
        }
    }

    /// Spawns the connection manager task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(tokens = self.token_ids.len(), url = %self.url, "polymarket client starting");

        let mut delay = RECONNECT_BASE_DELAY;
        let mut state = ConnState::Dialing;

        loop {
            state = match state {
                ConnState::Dialing => {
                    if self.cancel.is_cancelled() {
                        ConnState::Terminated
                    } else {
                        self.dial().await
                    }
                }
                ConnState::Subscribing { mut write, read } => {
                    match self.subscribe(&mut write).await {
                        Ok(()) => {
                            info!(tokens = self.token_ids.len(), "polymarket connected and subscribed");
                            self.metrics.pm_ws_connected.set(1.0);
                            delay = RECONNECT_BASE_DELAY;
                            ConnState::Reading { write, read }
                        }
                        Err(e) => {
                            warn!(error = %e, "polymarket subscribe failed");
                            ConnState::Closing { write }
                        }
                    }
                }
                ConnState::Reading { write, read } => self.read_until_closed(write, read).await,
                ConnState::Closing { mut write } => {
                    let _ = write.close().await;
                    self.metrics.pm_ws_connected.set(0.0);
                    ConnState::Backoff
                }
                ConnState::Backoff => {
                    self.metrics.pm_ws_reconnects.inc();
                    tokio::select! {
                        _ = self.cancel.cancelled() => ConnState::Terminated,
                        _ = sleep(delay) => {
                            delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                            ConnState::Dialing
                        }
                    }
                }
                ConnState::Terminated => break,
            };
        }

        self.metrics.pm_ws_connected.set(0.0);
        info!("polymarket client stopped");
    }

    async fn dial(&self) -> ConnState {
        debug!(url = %self.url, "polymarket dialing");
        match timeout(DIAL_TIMEOUT, connect_async(self.url.as_str())).await {
            Ok(Ok((ws, _response))) => {
                let (write, read) = ws.split();
                ConnState::Subscribing { write, read }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "polymarket dial failed");
                ConnState::Backoff
            }
            Err(_) => {
                warn!("polymarket dial timed out");
                ConnState::Backoff
            }
        }
    }

    /// Sends the subscription in chunks, pausing between chunks so a large
    /// token list does not trip server-side rate ceilings.
    async fn subscribe(
        &self,
        write: &mut WsSink,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        for chunk in self.token_ids.chunks(self.chunk_size.max(1)) {
            let payload = subscribe_payload(chunk);
            write.send(Message::Text(payload.to_string())).await?;
            debug!(chunk_len = chunk.len(), "polymarket subscribed chunk");
            sleep(INTER_CHUNK_PAUSE).await;
        }
        Ok(())
    }

    /// Reading state: services the ping cadence, the rolling read deadline
    /// and cancellation until the connection has to be torn down.
    async fn read_until_closed(&self, mut write: WsSink, mut read: WsSource) -> ConnState {
        let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.close().await;
                    return ConnState::Terminated;
                }
                _ = ping.tick() => {
                    if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                        warn!(error = %e, "polymarket ping failed");
                        return ConnState::Closing { write };
                    }
                }
                _ = sleep_until(last_frame + READ_DEADLINE) => {
                    warn!("polymarket read stalled, forcing reconnect");
                    self.metrics.pm_ws_stalls.inc();
                    return ConnState::Closing { write };
                }
                frame = read.next() => {
                    last_frame = Instant::now();
                    match frame {
                        Some(Ok(msg)) => {
                            if !self.handle_message(&mut write, msg).await {
                                return ConnState::Closing { write };
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "polymarket read error");
                            return ConnState::Closing { write };
                        }
                        None => {
                            info!("polymarket stream ended");
                            return ConnState::Closing { write };
                        }
                    }
                }
            }
        }
    }

    /// Returns false when the server closed the connection.
    async fn handle_message(&self, write: &mut WsSink, msg: Message) -> bool {
        match msg {
            Message::Text(text) => {
                match decode_frame(&text) {
                    Decoded::Update { asset, side, price } => {
                        self.cache.apply(&asset, side, price);
                        self.metrics.pm_price_updates.inc();
                    }
                    Decoded::Ignored => {}
                    Decoded::Malformed => {
                        debug!(frame = %text, "polymarket frame dropped");
                        self.metrics.pm_frames_dropped.inc();
                    }
                }
                true
            }
            Message::Ping(payload) => {
                let _ = write.send(Message::Pong(payload)).await;
                true
            }
            Message::Close(frame) => {
                info!(?frame, "polymarket close frame received");
                false
            }
            _ => true,
        }
    }
}

fn subscribe_payload(token_ids: &[String]) -> serde_json::Value {
    serde_json::json!({
        "type": "MARKET",
        "assets_ids": token_ids,
    })
}

/// Decodes one inbound text frame. Only `book` and `price_change` events
/// carrying a known side and a positive price yield cache updates; every
/// other frame type is ignored.
fn decode_frame(text: &str) -> Decoded {
    if text.eq_ignore_ascii_case("pong") {
        return Decoded::Ignored;
    }

    let frame: PmFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(_) => return Decoded::Malformed,
    };

    if frame.event_type != "book" && frame.event_type != "price_change" {
        return Decoded::Ignored;
    }
    if frame.asset.is_empty() {
        return Decoded::Ignored;
    }

    let price: f64 = match frame.price.parse() {
        Ok(p) => p,
        Err(_) => return Decoded::Malformed,
    };
    if price <= 0.0 {
        return Decoded::Ignored;
    }

    let side = match frame.side.as_str() {
        "sell" => QuoteSide::Ask,
        "buy" => QuoteSide::Bid,
        _ => return Decoded::Ignored,
    };

    Decoded::Update {
        asset: frame.asset,
        side,
        price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_payload_shape() {
        let tokens = vec!["token1".to_string(), "token2".to_string()];
        let payload = subscribe_payload(&tokens);

        assert_eq!(payload["type"], "MARKET");
        assert_eq!(payload["assets_ids"][0], "token1");
        assert_eq!(payload["assets_ids"][1], "token2");
    }

    #[test]
    fn test_chunking_covers_all_tokens() {
        let tokens: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
        let chunks: Vec<_> = tokens.chunks(4).collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 4);
        assert_eq!(chunks[2].len(), 2);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), tokens.len());
    }

    #[test]
    fn test_decode_book_sell_is_ask_update() {
        let decoded = decode_frame(
            r#"{"event_type":"book","asset":"tok","price":"0.45","side":"sell"}"#,
        );
        assert_eq!(
            decoded,
            Decoded::Update {
                asset: "tok".to_string(),
                side: QuoteSide::Ask,
                price: 0.45
            }
        );
    }

    #[test]
    fn test_decode_price_change_buy_is_bid_update() {
        let decoded = decode_frame(
            r#"{"event_type":"price_change","asset":"tok","price":"0.31","side":"buy"}"#,
        );
        assert_eq!(
            decoded,
            Decoded::Update {
                asset: "tok".to_string(),
                side: QuoteSide::Bid,
                price: 0.31
            }
        );
    }

    #[test]
    fn test_decode_ignores_other_event_types() {
        let decoded = decode_frame(
            r#"{"event_type":"last_trade_price","asset":"tok","price":"0.5","side":"buy"}"#,
        );
        assert_eq!(decoded, Decoded::Ignored);
    }

    #[test]
    fn test_decode_ignores_zero_price_and_unknown_side() {
        assert_eq!(
            decode_frame(r#"{"event_type":"book","asset":"tok","price":"0","side":"sell"}"#),
            Decoded::Ignored
        );
        assert_eq!(
            decode_frame(r#"{"event_type":"book","asset":"tok","price":"0.5","side":"hold"}"#),
            Decoded::Ignored
        );
    }

    #[test]
    fn test_decode_pong_and_garbage() {
        assert_eq!(decode_frame("PONG"), Decoded::Ignored);
        assert_eq!(decode_frame("not json"), Decoded::Malformed);
        assert_eq!(
            decode_frame(r#"{"event_type":"book","asset":"tok","price":"abc","side":"buy"}"#),
            Decoded::Malformed
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut delay = RECONNECT_BASE_DELAY;
        let mut seen = vec![delay];
        for _ in 0..6 {
            delay = (delay * 2).min(MAX_RECONNECT_DELAY);
            seen.push(delay);
        }
        assert_eq!(
            seen.iter().map(|d| d.as_secs()).collect::<Vec<_>>(),
            vec![2, 4, 8, 16, 32, 60, 60]
        );
    }
}
