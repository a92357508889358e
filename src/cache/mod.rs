//! Per-venue top-of-book price caches.
//!
//! Each cache has a single writer (its venue's read loop) and many readers
//! (the engine and the inspection surface). Lookups return value copies so
//! the lock is never held across evaluation or serialization.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Which side of the book a Polymarket frame updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSide {
    /// Best ask (venue side "sell").
    Ask,
    /// Best bid (venue side "buy").
    Bid,
}

/// Last-known best prices for one Polymarket outcome token.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PmQuote {
    pub ask: f64,
    pub bid: f64,
}

/// Last-known quote for one Kalshi market, with derived NO prices.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KalshiQuote {
    pub yes_bid: f64,
    pub yes_ask: f64,
    pub no_bid: f64,
    pub no_ask: f64,
}

impl KalshiQuote {
    /// Builds a full quote from the YES side of a ticker frame.
    ///
    /// NO prices are the complement of the opposite YES side:
    /// `no_bid = 1 - yes_ask`, `no_ask = 1 - yes_bid`.
    pub fn from_yes(yes_bid: f64, yes_ask: f64) -> Self {
        Self {
            yes_bid,
            yes_ask,
            no_bid: 1.0 - yes_ask,
            no_ask: 1.0 - yes_bid,
        }
    }
}

/// Polymarket price cache: token id -> merged best ask/bid.
///
/// A frame carries at most one side; the other side keeps its previous
/// value. A non-positive price never overwrites a side, matching the
/// venue's update stream where price zero means "nothing at this level".
#[derive(Debug, Default)]
pub struct PmPriceCache {
    quotes: RwLock<HashMap<String, PmQuote>>,
}

impl PmPriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one side of the book for a token. Idempotent on identical
    /// input; a price of zero or below is a no-op.
    pub fn apply(&self, token_id: &str, side: QuoteSide, price: f64) {
        if price <= 0.0 {
            return;
        }

        let mut quotes = self.quotes.write();
        let quote = quotes.entry(token_id.to_string()).or_default();
        match side {
            QuoteSide::Ask => quote.ask = price,
            QuoteSide::Bid => quote.bid = price,
        }
    }

    /// Returns a copy of the last-known quote, or `None` if the token has
    /// never been updated.
    pub fn lookup(&self, token_id: &str) -> Option<PmQuote> {
        self.quotes.read().get(token_id).copied()
    }

    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }
}

/// Kalshi price cache: ticker -> full quote, replaced atomically per frame.
#[derive(Debug, Default)]
pub struct KalshiPriceCache {
    quotes: RwLock<HashMap<String, KalshiQuote>>,
}

impl KalshiPriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole quote for a ticker.
    pub fn insert(&self, ticker: &str, quote: KalshiQuote) {
        self.quotes.write().insert(ticker.to_string(), quote);
    }

    /// Returns a copy of the last-known quote, or `None` if the ticker has
    /// never been updated.
    pub fn lookup(&self, ticker: &str) -> Option<KalshiQuote> {
        self.quotes.read().get(ticker).copied()
    }

    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_pm_merge_is_order_independent() {
        let a = PmPriceCache::new();
        a.apply("tok", QuoteSide::Ask, 0.45);
        a.apply("tok", QuoteSide::Bid, 0.44);

        let b = PmPriceCache::new();
        b.apply("tok", QuoteSide::Bid, 0.44);
        b.apply("tok", QuoteSide::Ask, 0.45);

        assert_eq!(a.lookup("tok"), b.lookup("tok"));
        assert_eq!(a.lookup("tok"), Some(PmQuote { ask: 0.45, bid: 0.44 }));
    }

    #[test]
    fn test_pm_one_side_leaves_other_unset() {
        let cache = PmPriceCache::new();
        cache.apply("tok", QuoteSide::Ask, 0.61);

        let quote = cache.lookup("tok").unwrap();
        assert_eq!(quote.ask, 0.61);
        assert_eq!(quote.bid, 0.0);
    }

    #[test]
    fn test_pm_zero_price_never_overwrites() {
        let cache = PmPriceCache::new();
        cache.apply("tok", QuoteSide::Ask, 0.50);
        cache.apply("tok", QuoteSide::Ask, 0.0);
        cache.apply("tok", QuoteSide::Bid, -1.0);

        assert_eq!(cache.lookup("tok"), Some(PmQuote { ask: 0.50, bid: 0.0 }));
    }

    #[test]
    fn test_pm_repeated_update_is_idempotent() {
        let cache = PmPriceCache::new();
        cache.apply("tok", QuoteSide::Bid, 0.33);
        let first = cache.lookup("tok");
        cache.apply("tok", QuoteSide::Bid, 0.33);
        assert_eq!(first, cache.lookup("tok"));
    }

    #[test]
    fn test_unknown_key_is_none() {
        assert_eq!(PmPriceCache::new().lookup("missing"), None);
        assert_eq!(KalshiPriceCache::new().lookup("missing"), None);
    }

    #[test]
    fn test_kalshi_insert_replaces_whole_quote() {
        let cache = KalshiPriceCache::new();
        cache.insert("T", KalshiQuote::from_yes(0.54, 0.55));
        cache.insert("T", KalshiQuote::from_yes(0.40, 0.41));

        let quote = cache.lookup("T").unwrap();
        assert!((quote.yes_bid - 0.40).abs() < TOLERANCE);
        assert!((quote.no_bid - 0.59).abs() < TOLERANCE);
    }

    #[test]
    fn test_derived_no_complements_yes() {
        for (yes_bid, yes_ask) in [(0.54, 0.55), (0.5, 0.5), (0.01, 0.99)] {
            let quote = KalshiQuote::from_yes(yes_bid, yes_ask);
            assert!((quote.no_ask + quote.yes_bid - 1.0).abs() < TOLERANCE);
            assert!((quote.no_bid + quote.yes_ask - 1.0).abs() < TOLERANCE);
        }
    }

    #[test]
    fn test_derived_no_is_ordered_when_yes_is() {
        let quote = KalshiQuote::from_yes(0.54, 0.55);
        assert!(quote.no_bid <= quote.no_ask);
        assert!(quote.no_bid >= 0.0 && quote.no_ask <= 1.0);
    }
}
