//! Process metrics for the arbitrage watcher.
//!
//! Counters and gauges are plain atomics updated on the hot paths and
//! rendered into Prometheus text format on demand by the `/metrics`
//! endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge holding an f64 value (stored as raw bits).
#[derive(Debug, Default)]
pub struct Gauge {
    bits: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Metrics registry shared by every component.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Number of market pairs under evaluation.
    pub pairs_total: Gauge,

    /// WebSocket reconnection attempts per venue.
    pub pm_ws_reconnects: Counter,
    pub kalshi_ws_reconnects: Counter,

    /// Read-deadline stalls per venue.
    pub pm_ws_stalls: Counter,
    pub kalshi_ws_stalls: Counter,

    /// Connection status per venue (1 = connected).
    pub pm_ws_connected: Gauge,
    pub kalshi_ws_connected: Gauge,

    /// Whether the Kalshi client is enabled (credentials present).
    pub kalshi_enabled: Gauge,

    /// Applied price updates per venue.
    pub pm_price_updates: Counter,
    pub kalshi_price_updates: Counter,

    /// Frames dropped as malformed or invalid per venue.
    pub pm_frames_dropped: Counter,
    pub kalshi_frames_dropped: Counter,

    /// Opportunities emitted across all ticks.
    pub opportunities_found: Counter,
    /// Opportunities in the current snapshot.
    pub current_opportunities: Gauge,
    /// Best return-on-turnover in the current snapshot, percent.
    pub best_edge_pct: Gauge,

    /// HTTP requests served by the inspection server.
    pub http_requests: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::with_capacity(2048);

        header(&mut out, "arb_pairs_total", "Total number of market pairs monitored for arbitrage", "gauge");
        out.push_str(&format!("arb_pairs_total {}\n\n", self.pairs_total.get()));

        header(&mut out, "arb_ws_reconnects_total", "Total number of WebSocket reconnection attempts", "counter");
        out.push_str(&format!("arb_ws_reconnects_total{{source=\"pm\"}} {}\n", self.pm_ws_reconnects.get()));
        out.push_str(&format!("arb_ws_reconnects_total{{source=\"kalshi\"}} {}\n\n", self.kalshi_ws_reconnects.get()));

        header(&mut out, "arb_ws_stalls_total", "Total number of read-deadline stalls", "counter");
        out.push_str(&format!("arb_ws_stalls_total{{source=\"pm\"}} {}\n", self.pm_ws_stalls.get()));
        out.push_str(&format!("arb_ws_stalls_total{{source=\"kalshi\"}} {}\n\n", self.kalshi_ws_stalls.get()));

        header(&mut out, "arb_ws_connection_status", "WebSocket connection status (1 = connected, 0 = disconnected)", "gauge");
        out.push_str(&format!("arb_ws_connection_status{{source=\"pm\"}} {}\n", self.pm_ws_connected.get()));
        out.push_str(&format!("arb_ws_connection_status{{source=\"kalshi\"}} {}\n\n", self.kalshi_ws_connected.get()));

        header(&mut out, "arb_kalshi_enabled", "Whether the Kalshi client is enabled (1 = credentials loaded)", "gauge");
        out.push_str(&format!("arb_kalshi_enabled {}\n\n", self.kalshi_enabled.get()));

        header(&mut out, "arb_price_updates_total", "Total number of price updates applied to the caches", "counter");
        out.push_str(&format!("arb_price_updates_total{{source=\"pm\"}} {}\n", self.pm_price_updates.get()));
        out.push_str(&format!("arb_price_updates_total{{source=\"kalshi\"}} {}\n\n", self.kalshi_price_updates.get()));

        header(&mut out, "arb_frames_dropped_total", "Total number of frames dropped as malformed or invalid", "counter");
        out.push_str(&format!("arb_frames_dropped_total{{source=\"pm\"}} {}\n", self.pm_frames_dropped.get()));
        out.push_str(&format!("arb_frames_dropped_total{{source=\"kalshi\"}} {}\n\n", self.kalshi_frames_dropped.get()));

        header(&mut out, "arb_opps_found_total", "Total number of arbitrage opportunities found", "counter");
        out.push_str(&format!("arb_opps_found_total {}\n\n", self.opportunities_found.get()));

        header(&mut out, "arb_current_opportunities", "Current number of active arbitrage opportunities", "gauge");
        out.push_str(&format!("arb_current_opportunities {}\n\n", self.current_opportunities.get()));

        header(&mut out, "arb_best_edge_pct", "Best current arbitrage edge percentage", "gauge");
        out.push_str(&format!("arb_best_edge_pct {}\n\n", self.best_edge_pct.get()));

        header(&mut out, "http_requests_total", "Total number of HTTP requests served", "counter");
        out.push_str(&format!("http_requests_total {}\n", self.http_requests.get()));

        out
    }
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} {kind}\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.add(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_counter_concurrent() {
        use std::sync::Arc;
        use std::thread;

        let counter = Arc::new(Counter::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    counter.inc();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.get(), 800);
    }

    #[test]
    fn test_gauge_set_get() {
        let gauge = Gauge::new();
        assert_eq!(gauge.get(), 0.0);

        gauge.set(9.89);
        assert_eq!(gauge.get(), 9.89);

        gauge.set(-3.5);
        assert_eq!(gauge.get(), -3.5);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.pairs_total.set(12.0);
        metrics.pm_ws_reconnects.add(3);
        metrics.opportunities_found.add(7);
        metrics.best_edge_pct.set(9.89);

        let output = metrics.render_prometheus();

        assert!(output.contains("arb_pairs_total 12"));
        assert!(output.contains("arb_ws_reconnects_total{source=\"pm\"} 3"));
        assert!(output.contains("arb_ws_reconnects_total{source=\"kalshi\"} 0"));
        assert!(output.contains("arb_opps_found_total 7"));
        assert!(output.contains("arb_best_edge_pct 9.89"));
        assert!(output.contains("# TYPE arb_opps_found_total counter"));
        assert!(output.contains("# HELP arb_pairs_total"));
    }
}
