//! Bootstrap market discovery.
//!
//! Runs once at startup: fetches the open-market catalogue from both
//! venues over REST, pairs logically-equivalent binary markets by title
//! similarity and expiration proximity, and hands the core a plain list of
//! market pairs. Discovery failure is fatal; nothing streams without a
//! pair list.

use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::MarketPair;
use crate::matching;

const POLYMARKET_MARKETS_URL: &str = "https://clob.polymarket.com/markets";
const KALSHI_MARKETS_URL: &str = "https://api.elections.kalshi.com/trade-api/v2/markets";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
}

/// A market from the Polymarket CLOB catalogue.
#[derive(Debug, Clone, Deserialize)]
pub struct PolymarketMarket {
    #[serde(default)]
    pub condition_id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub tokens: Vec<PmToken>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub end_date_iso: String,
}

/// One outcome token of a Polymarket market.
#[derive(Debug, Clone, Deserialize)]
pub struct PmToken {
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub outcome: String,
}

/// A market from the Kalshi catalogue.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiMarket {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub expiration_time: String,
}

#[derive(Debug, Deserialize)]
struct PolymarketPage {
    #[serde(default)]
    data: Vec<PolymarketMarket>,
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct KalshiPage {
    #[serde(default)]
    markets: Vec<KalshiMarket>,
    #[serde(default)]
    cursor: String,
}

/// REST client for one-shot discovery on both venues.
pub struct DiscoveryClient {
    client: Client,
    polymarket_url: String,
    kalshi_url: String,
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryClient {
    pub fn new() -> Self {
        Self::with_endpoints(
            POLYMARKET_MARKETS_URL.to_string(),
            KALSHI_MARKETS_URL.to_string(),
        )
    }

    pub fn with_endpoints(polymarket_url: String, kalshi_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            polymarket_url,
            kalshi_url,
        }
    }

    /// Fetches all active, open Polymarket markets, following pagination.
    pub async fn fetch_polymarket_markets(
        &self,
    ) -> Result<Vec<PolymarketMarket>, DiscoveryError> {
        let mut markets = Vec::new();
        let mut cursor = String::new();

        loop {
            let url = if cursor.is_empty() {
                self.polymarket_url.clone()
            } else {
                format!("{}?next_cursor={}", self.polymarket_url, cursor)
            };

            let page: PolymarketPage = self.get_json(&url).await?;
            markets.extend(page.data.into_iter().filter(|m| m.active && !m.closed));

            if page.next_cursor.is_empty() {
                break;
            }
            cursor = page.next_cursor;
            debug!(fetched = markets.len(), cursor = %cursor, "polymarket pagination");
        }

        info!(count = markets.len(), "polymarket markets fetched");
        Ok(markets)
    }

    /// Fetches all open Kalshi markets, following pagination.
    pub async fn fetch_kalshi_markets(&self) -> Result<Vec<KalshiMarket>, DiscoveryError> {
        let mut markets = Vec::new();
        let mut cursor = String::new();

        loop {
            let url = if cursor.is_empty() {
                format!("{}?status=open&limit=1000", self.kalshi_url)
            } else {
                format!("{}?status=open&limit=1000&cursor={}", self.kalshi_url, cursor)
            };

            let page: KalshiPage = self.get_json(&url).await?;
            markets.extend(page.markets);

            if page.cursor.is_empty() {
                break;
            }
            cursor = page.cursor;
            debug!(fetched = markets.len(), cursor = %cursor, "kalshi pagination");
        }

        info!(count = markets.len(), "kalshi markets fetched");
        Ok(markets)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, DiscoveryError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

/// Pairs markets across venues by title similarity, rejecting pairs whose
/// expirations are further apart than the window. Polymarket markets
/// without both YES and NO tokens cannot be covered and are skipped.
pub fn build_pairs(
    pm_markets: &[PolymarketMarket],
    kalshi_markets: &[KalshiMarket],
    title_sim: f64,
    time_window_h: i64,
) -> Vec<MarketPair> {
    let mut pairs = Vec::new();

    for pm in pm_markets {
        for kalshi in kalshi_markets {
            if !matching::is_likely_match(&pm.question, &kalshi.title, title_sim) {
                continue;
            }
            if !within_time_window(&pm.end_date_iso, &kalshi.expiration_time, time_window_h) {
                continue;
            }

            let Some((yes_token, no_token)) = outcome_tokens(pm) else {
                debug!(question = %pm.question, "skipping market without yes/no tokens");
                continue;
            };

            debug!(
                pm_title = %pm.question,
                kalshi_title = %kalshi.title,
                similarity = matching::title_similarity(&pm.question, &kalshi.title),
                "market pair created"
            );

            pairs.push(MarketPair {
                pm_token_yes: yes_token,
                pm_token_no: no_token,
                pm_title: pm.question.clone(),
                kalshi_ticker: kalshi.ticker.clone(),
                kalshi_title: kalshi.title.clone(),
            });
        }
    }

    pairs
}

/// Soft deadline check: only rejects when both timestamps parse.
fn within_time_window(pm_end: &str, kalshi_end: &str, window_h: i64) -> bool {
    let (Ok(pm_end), Ok(kalshi_end)) = (
        DateTime::parse_from_rfc3339(pm_end),
        DateTime::parse_from_rfc3339(kalshi_end),
    ) else {
        return true;
    };

    (pm_end - kalshi_end).num_hours().abs() <= window_h
}

fn outcome_tokens(market: &PolymarketMarket) -> Option<(String, String)> {
    let mut yes = None;
    let mut no = None;
    for token in &market.tokens {
        match token.outcome.as_str() {
            "YES" => yes = Some(token.token_id.clone()),
            "NO" => no = Some(token.token_id.clone()),
            _ => {}
        }
    }
    match (yes, no) {
        (Some(y), Some(n)) if !y.is_empty() && !n.is_empty() => Some((y, n)),
        _ => None,
    }
}

/// Deduplicated Polymarket token ids across all pairs, both sides.
pub fn pm_token_ids(pairs: &[MarketPair]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for pair in pairs {
        for token in [&pair.pm_token_yes, &pair.pm_token_no] {
            if seen.insert(token.clone()) {
                out.push(token.clone());
            }
        }
    }
    out
}

/// Deduplicated Kalshi tickers across all pairs.
pub fn kalshi_tickers(pairs: &[MarketPair]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for pair in pairs {
        if seen.insert(pair.kalshi_ticker.clone()) {
            out.push(pair.kalshi_ticker.clone());
        }
    }
    out
}
