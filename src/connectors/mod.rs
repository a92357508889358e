//! Streaming clients for both venues.
//!
//! Each client owns one WebSocket connection, drives an explicit
//! reconnect state machine, and writes top-of-book updates straight into
//! its venue's price cache. Failures are absorbed locally and reported
//! through metrics only.

pub mod auth;
mod kalshi_ws;
mod polymarket_ws;

pub use auth::{AuthError, KalshiSigner, SignedHeaders};
pub use kalshi_ws::KalshiClient;
pub use polymarket_ws::PolymarketClient;
