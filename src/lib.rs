//! Cross-venue prediction-market arbitrage watcher.
//!
//! Watches two venues in real time - the Polymarket CLOB market stream and
//! the authenticated Kalshi ticker stream - and surfaces covering
//! arbitrage opportunities on paired binary markets.
//!
//! # Architecture
//!
//! - **Streaming clients**: one WebSocket client per venue, each driving an
//!   explicit reconnect state machine with stall detection and exponential
//!   backoff, writing top-of-book updates into its price cache.
//! - **Price caches**: the only state shared across tasks; single writer,
//!   many readers, value-copy lookups.
//! - **Engine**: a 1 s tick loop that evaluates both covering combinations
//!   per pair and atomically replaces a sorted opportunity snapshot.
//! - **Inspection server**: read-only HTTP surface (`/healthz`, `/arbs`,
//!   `/metrics`).
//!
//! Discovery runs once at bootstrap and produces the immutable pair list;
//! nothing is persisted and a restart re-bootstraps from scratch.

pub mod cache;
pub mod config;
pub mod connectors;
pub mod discovery;
pub mod engine;
pub mod matching;
pub mod metrics;
pub mod server;
pub mod utils;

// Re-export commonly used types
pub use cache::{KalshiPriceCache, KalshiQuote, PmPriceCache, PmQuote, QuoteSide};
pub use config::Config;
pub use connectors::{KalshiClient, PolymarketClient};
pub use engine::{Engine, MarketPair, Opportunity};
pub use metrics::Metrics;
