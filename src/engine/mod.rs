//! Arbitrage detection engine.
//!
//! On a fixed 1 s cadence the engine reads both price caches, evaluates the
//! two covering combinations for every market pair, and atomically replaces
//! its published opportunity snapshot. A missing price is not an error; the
//! pair is simply skipped for that tick. The loop exits only on
//! cancellation.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{KalshiPriceCache, PmPriceCache};
use crate::metrics::Metrics;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot size cap.
pub const MAX_OPPORTUNITIES: usize = 1000;

/// A matched binary market across both venues. Immutable after bootstrap.
#[derive(Debug, Clone)]
pub struct MarketPair {
    pub pm_token_yes: String,
    pub pm_token_no: String,
    pub pm_title: String,
    pub kalshi_ticker: String,
    pub kalshi_title: String,
}

/// A detected arbitrage candidate. Field names are part of the `/arbs`
/// JSON contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub timestamp: DateTime<Utc>,
    pub combo: String,
    pub edge_abs: f64,
    pub edge_pct_turn: f64,
    pub pm_title: String,
    pub pm_yes_ask: f64,
    pub pm_no_ask: f64,
    pub kalshi_ticker: String,
    pub kalshi_title: String,
    pub kalshi_yes_bid: f64,
    pub kalshi_yes_ask: f64,
    pub kalshi_no_bid: f64,
    pub kalshi_no_ask: f64,
    pub total_cost: f64,
}

/// Absolute edge of a covering pair: `1 - total_cost`.
pub fn compute_edge(total_cost: f64) -> f64 {
    1.0 - total_cost
}

/// Return on turnover as a percentage: `edge / total_cost * 100`.
///
/// Guarded against non-positive cost. Prices are f64 throughout, so the
/// threshold comparison carries error on the order of 1e-15 per operation.
pub fn compute_roi(edge: f64, total_cost: f64) -> f64 {
    if total_cost <= 0.0 {
        return 0.0;
    }
    (edge / total_cost) * 100.0
}

/// Tick-driven arbitrage engine over a static pair list.
pub struct Engine {
    pairs: Vec<MarketPair>,
    pm_cache: Arc<PmPriceCache>,
    kalshi_cache: Arc<KalshiPriceCache>,
    kalshi_enabled: bool,
    edge_threshold: f64,
    max_opportunities: usize,
    snapshot: RwLock<Vec<Opportunity>>,
    metrics: Arc<Metrics>,
}

impl Engine {
    pub fn new(
        pairs: Vec<MarketPair>,
        pm_cache: Arc<PmPriceCache>,
        kalshi_cache: Arc<KalshiPriceCache>,
        kalshi_enabled: bool,
        edge_threshold: f64,
        metrics: Arc<Metrics>,
    ) -> Self {
        metrics.pairs_total.set(pairs.len() as f64);
        Self {
            pairs,
            pm_cache,
            kalshi_cache,
            kalshi_enabled,
            edge_threshold,
            max_opportunities: MAX_OPPORTUNITIES,
            snapshot: RwLock::new(Vec::new()),
            metrics,
        }
    }

    /// Runs the tick loop until cancellation.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            pairs = self.pairs.len(),
            threshold = self.edge_threshold,
            "arbitrage engine starting"
        );

        let mut tick = interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("arbitrage engine stopping");
                    return;
                }
                _ = tick.tick() => self.recompute(),
            }
        }
    }

    /// One tick: evaluate every pair and atomically replace the snapshot.
    fn recompute(&self) {
        let opportunities = self.evaluate(Utc::now());

        self.metrics
            .opportunities_found
            .add(opportunities.len() as u64);
        self.metrics
            .current_opportunities
            .set(opportunities.len() as f64);
        self.metrics.best_edge_pct.set(
            opportunities
                .first()
                .map(|o| o.edge_pct_turn)
                .unwrap_or(0.0),
        );

        if let Some(best) = opportunities.first() {
            debug!(
                count = opportunities.len(),
                best_roi = best.edge_pct_turn,
                combo = %best.combo,
                "tick produced opportunities"
            );
        }

        *self.snapshot.write() = opportunities;
    }

    /// Scans all pairs against the current cache contents. Pure with
    /// respect to engine state; the result is sorted by return-on-turnover
    /// descending (stable) and truncated to the snapshot cap.
    fn evaluate(&self, now: DateTime<Utc>) -> Vec<Opportunity> {
        let mut found = Vec::new();

        for pair in &self.pairs {
            let Some(pm_yes) = self.pm_cache.lookup(&pair.pm_token_yes) else {
                continue;
            };
            let Some(pm_no) = self.pm_cache.lookup(&pair.pm_token_no) else {
                continue;
            };
            if pm_yes.ask <= 0.0 || pm_no.ask <= 0.0 {
                continue;
            }

            if !self.kalshi_enabled {
                continue;
            }
            let Some(kalshi) = self.kalshi_cache.lookup(&pair.kalshi_ticker) else {
                continue;
            };
            if kalshi.yes_bid <= 0.0 || kalshi.yes_ask <= 0.0 {
                continue;
            }

            // Combination 1: buy YES on Polymarket, NO on Kalshi.
            let cost = pm_yes.ask + kalshi.no_ask;
            let edge = compute_edge(cost);
            let roi = compute_roi(edge, cost);
            if cost > 0.0 && roi >= self.edge_threshold {
                found.push(self.opportunity(
                    now,
                    "PM-YES + K-NO",
                    edge,
                    roi,
                    cost,
                    pair,
                    pm_yes.ask,
                    pm_no.ask,
                    &kalshi,
                ));
            }

            // Combination 2: buy YES on Kalshi, NO on Polymarket.
            let cost = kalshi.yes_ask + pm_no.ask;
            let edge = compute_edge(cost);
            let roi = compute_roi(edge, cost);
            if cost > 0.0 && roi >= self.edge_threshold {
                found.push(self.opportunity(
                    now,
                    "K-YES + PM-NO",
                    edge,
                    roi,
                    cost,
                    pair,
                    pm_yes.ask,
                    pm_no.ask,
                    &kalshi,
                ));
            }
        }

        found.sort_by(|a, b| {
            b.edge_pct_turn
                .partial_cmp(&a.edge_pct_turn)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        found.truncate(self.max_opportunities);
        found
    }

    #[allow(clippy::too_many_arguments)]
    fn opportunity(
        &self,
        now: DateTime<Utc>,
        combo: &str,
        edge_abs: f64,
        edge_pct_turn: f64,
        total_cost: f64,
        pair: &MarketPair,
        pm_yes_ask: f64,
        pm_no_ask: f64,
        kalshi: &crate::cache::KalshiQuote,
    ) -> Opportunity {
        Opportunity {
            timestamp: now,
            combo: combo.to_string(),
            edge_abs,
            edge_pct_turn,
            pm_title: pair.pm_title.clone(),
            pm_yes_ask,
            pm_no_ask,
            kalshi_ticker: pair.kalshi_ticker.clone(),
            kalshi_title: pair.kalshi_title.clone(),
            kalshi_yes_bid: kalshi.yes_bid,
            kalshi_yes_ask: kalshi.yes_ask,
            kalshi_no_bid: kalshi.no_bid,
            kalshi_no_ask: kalshi.no_ask,
            total_cost,
        }
    }

    /// Returns a copy of the current snapshot.
    pub fn opportunities(&self) -> Vec<Opportunity> {
        self.snapshot.read().clone()
    }

    /// Returns a copy of the top `n` opportunities.
    pub fn top(&self, n: usize) -> Vec<Opportunity> {
        let snapshot = self.snapshot.read();
        snapshot.iter().take(n).cloned().collect()
    }
}
