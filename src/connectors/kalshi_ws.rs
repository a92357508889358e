//! Kalshi authenticated ticker-channel client.
//!
//! One signed connection receives venue-wide ticker frames; every frame is
//! routed into the Kalshi price cache with derived NO prices. The
//! connection lifecycle is the same state machine as the Polymarket client,
//! with two differences: the upgrade request is RSA-PSS signed (fresh
//! timestamp per dial attempt) and exactly one subscribe frame is sent.
//!
//! A client built without credentials is Disabled: `spawn` is a no-op, the
//! cache stays empty, and the engine skips every pair on this venue.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval_at, sleep, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{KalshiPriceCache, KalshiQuote};
use crate::connectors::auth::KalshiSigner;
use crate::metrics::Metrics;

const KALSHI_WS_URL: &str = "wss://api.elections.kalshi.com/trade-api/ws/v2";

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const READ_DEADLINE: Duration = Duration::from_secs(60);
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(2);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

enum ConnState {
    Dialing,
    Subscribing { write: WsSink, read: WsSource },
    Reading { write: WsSink, read: WsSource },
    Closing { write: WsSink },
    Backoff,
    Terminated,
}

#[derive(Debug, PartialEq)]
enum Decoded {
    Update { ticker: String, quote: KalshiQuote },
    Ignored,
    Malformed,
}

#[derive(Debug, Deserialize)]
struct TickerFrame {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    yes_bid: f64,
    #[serde(default)]
    yes_ask: f64,
}

/// WebSocket client for the Kalshi ticker channel.
pub struct KalshiClient {
    url: String,
    signer: Option<KalshiSigner>,
    cache: Arc<KalshiPriceCache>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
}

impl KalshiClient {
    /// Builds the client; missing or unparseable credentials downgrade it
    /// to Disabled instead of failing.
    pub fn new(
        key_id: Option<String>,
        key_path: Option<String>,
        cache: Arc<KalshiPriceCache>,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Self {
        let signer = match (key_id, key_path) {
            (Some(id), Some(path)) => match KalshiSigner::from_pem_file(&id, &path) {
                Ok(signer) => {
                    info!(key_id = %id, "kalshi client initialized");
                    Some(signer)
                }
                Err(e) => {
                    warn!(error = %e, "failed to load kalshi private key, kalshi client disabled");
                    None
                }
            },
            _ => {
                warn!("kalshi credentials not provided, kalshi client disabled");
                None
            }
        };

        metrics
            .kalshi_enabled
            .set(if signer.is_some() { 1.0 } else { 0.0 });

        Self {
            url: KALSHI_WS_URL.to_string(),
            signer,
            cache,
            metrics,
            cancel,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.signer.is_some()
    }

    /// Spawns the connection manager; a no-op task when Disabled.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if self.signer.is_none() {
                info!("kalshi client disabled, skipping start");
                return;
            }
            self.run().await;
        })
    }

    async fn run(self) {
        info!(url = %self.url, "kalshi client starting");

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
                            info!("kalshi connected and subscribed to ticker channel");
                            self.metrics.kalshi_ws_connected.set(1.0);
                            delay = RECONNECT_BASE_DELAY;
                            ConnState::Reading { write, read }
                        }
                        Err(e) => {
                            warn!(error = %e, "kalshi subscribe failed");
                            ConnState::Closing { write }
                        }
                    }
                }
                ConnState::Reading { write, read } => self.read_until_closed(write, read).await,
                ConnState::Closing { mut write } => {
                    let _ = write.close().await;
                    self.metrics.kalshi_ws_connected.set(0.0);
                    ConnState::Backoff
                }
                ConnState::Backoff => {
                    self.metrics.kalshi_ws_reconnects.inc();
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

        self.metrics.kalshi_ws_connected.set(0.0);
        info!("kalshi client stopped");
    }

    /// Builds a freshly signed upgrade request and dials. An auth rejection
    /// surfaces as a dial error and is retried like any transient failure,
    /// with a new timestamp on the next attempt.
    async fn dial(&self) -> ConnState {
        let Some(signer) = self.signer.as_ref() else {
            return ConnState::Terminated;
        };

        let request = match self.upgrade_request(signer) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "kalshi upgrade request build failed");
                return ConnState::Backoff;
            }
        };

        debug!(url = %self.url, "kalshi dialing");
        match timeout(DIAL_TIMEOUT, connect_async(request)).await {
            Ok(Ok((ws, _response))) => {
                let (write, read) = ws.split();
                ConnState::Subscribing { write, read }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "kalshi dial failed");
                ConnState::Backoff
            }
            Err(_) => {
                warn!("kalshi dial timed out");
                ConnState::Backoff
            }
        }
    }

    fn upgrade_request(
        &self,
        signer: &KalshiSigner,
    ) -> Result<Request<()>, tokio_tungstenite::tungstenite::http::Error> {
        let headers = signer.ws_handshake_headers();
        Request::builder()
            .uri(self.url.as_str())
            .header("KALSHI-ACCESS-KEY", &headers.key_id)
            .header("KALSHI-ACCESS-SIGNATURE", &headers.signature)
            .header("KALSHI-ACCESS-TIMESTAMP", &headers.timestamp)
            .header("Host", host_of(&self.url))
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .body(())
    }

    /// One subscribe frame for the venue-wide ticker channel; no per-market
    /// filtering happens server-side.
    async fn subscribe(
        &self,
        write: &mut WsSink,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let payload = serde_json::json!({
            "type": "subscribe",
            "channel": "ticker",
        });
        write.send(Message::Text(payload.to_string())).await?;
        debug!("kalshi subscribed to ticker channel");
        Ok(())
    }

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
                        warn!(error = %e, "kalshi ping failed");
                        return ConnState::Closing { write };
                    }
                }
                _ = sleep_until(last_frame + READ_DEADLINE) => {
                    warn!("kalshi read stalled, forcing reconnect");
                    self.metrics.kalshi_ws_stalls.inc();
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
                            warn!(error = %e, "kalshi read error");
                            return ConnState::Closing { write };
                        }
                        None => {
                            info!("kalshi stream ended");
                            return ConnState::Closing { write };
                        }
                    }
                }
            }
        }
    }

    async fn handle_message(&self, write: &mut WsSink, msg: Message) -> bool {
        match msg {
            Message::Text(text) => {
                match decode_frame(&text) {
                    Decoded::Update { ticker, quote } => {
                        self.cache.insert(&ticker, quote);
                        self.metrics.kalshi_price_updates.inc();
                    }
                    Decoded::Ignored => {}
                    Decoded::Malformed => {
                        debug!(frame = %text, "kalshi frame dropped");
                        self.metrics.kalshi_frames_dropped.inc();
                    }
                }
                true
            }
            Message::Ping(payload) => {
                let _ = write.send(Message::Pong(payload)).await;
                true
            }
            Message::Close(frame) => {
                info!(?frame, "kalshi close frame received");
                false
            }
            _ => true,
        }
    }
}

fn host_of(url: &str) -> &str {
    url.trim_start_matches("wss://")
        .trim_start_matches("ws://")
        .split('/')
        .next()
        .unwrap_or_default()
}

/// Decodes one inbound text frame. Only ticker-channel frames with a ticker
/// and strictly positive YES quotes on both sides yield updates; a partial
/// ticker is invalid and dropped, so derived NO prices never collapse to 1.
fn decode_frame(text: &str) -> Decoded {
    let frame: TickerFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(_) => return Decoded::Malformed,
    };

    if frame.channel != "ticker" || frame.ticker.is_empty() {
        return Decoded::Ignored;
    }
    if frame.yes_bid <= 0.0 || frame.yes_ask <= 0.0 {
        return Decoded::Malformed;
    }

    Decoded::Update {
        ticker: frame.ticker,
        quote: KalshiQuote::from_yes(frame.yes_bid, frame.yes_ask),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ticker_frame_derives_no_prices() {
        let decoded = decode_frame(
            r#"{"channel":"ticker","ticker":"KXBTC","yes_bid":0.54,"yes_ask":0.55}"#,
        );

        let Decoded::Update { ticker, quote } = decoded else {
            panic!("expected update");
        };
        assert_eq!(ticker, "KXBTC");
        assert!((quote.yes_bid - 0.54).abs() < 1e-9);
        assert!((quote.no_bid - 0.45).abs() < 1e-9);
        assert!((quote.no_ask - 0.46).abs() < 1e-9);
    }

    #[test]
    fn test_decode_ignores_other_channels() {
        assert_eq!(
            decode_frame(r#"{"channel":"trade","ticker":"KXBTC","yes_bid":0.5,"yes_ask":0.6}"#),
            Decoded::Ignored
        );
        assert_eq!(
            decode_frame(r#"{"channel":"ticker","ticker":""}"#),
            Decoded::Ignored
        );
    }

    #[test]
    fn test_decode_rejects_partial_ticker() {
        // Missing yes_ask would otherwise derive no_bid = 1.
        assert_eq!(
            decode_frame(r#"{"channel":"ticker","ticker":"KXBTC","yes_bid":0.54}"#),
            Decoded::Malformed
        );
        assert_eq!(
            decode_frame(r#"{"channel":"ticker","ticker":"KXBTC","yes_bid":0,"yes_ask":0.55}"#),
            Decoded::Malformed
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_frame("not json"), Decoded::Malformed);
    }

    #[test]
    fn test_host_extraction() {
        assert_eq!(
            host_of("wss://api.elections.kalshi.com/trade-api/ws/v2"),
            "api.elections.kalshi.com"
        );
        assert_eq!(host_of("ws://localhost:9000/ws"), "localhost:9000");
    }
}
