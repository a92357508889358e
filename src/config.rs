//! Environment-driven configuration.
//!
//! Every knob has a default; only a malformed value that would leave the
//! process unable to serve (listen address, chunk size) is fatal at
//! startup.

use std::net::SocketAddr;
use thiserror::Error;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_EDGE_MIN_ROR_PCT: f64 = 3.0;
const DEFAULT_TITLE_SIM: f64 = 0.60;
const DEFAULT_TIME_WINDOW_H: i64 = 168;
const DEFAULT_PM_CHUNK: usize = 400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid HTTP_ADDR {0:?}: not a listen address")]
    InvalidHttpAddr(String),

    #[error("PM_CHUNK must be greater than zero")]
    InvalidChunkSize,

    #[error("TITLE_SIM must be within [0, 1], got {0}")]
    InvalidTitleSim(f64),

    #[error("EDGE_MIN_ROR_PCT must be finite, got {0}")]
    InvalidEdgeThreshold(f64),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address for the inspection server.
    pub http_addr: String,
    /// Return-on-turnover threshold, percent.
    pub edge_min_ror_pct: f64,
    /// Title-similarity threshold used during discovery.
    pub title_sim: f64,
    /// Maximum hours between paired-market expirations.
    pub time_window_h: i64,
    /// Subscription chunk size for the Polymarket stream.
    pub pm_chunk: usize,
    /// Kalshi API key id; absent disables the Kalshi client.
    pub kalshi_key_id: Option<String>,
    /// Path to the PEM-encoded Kalshi RSA private key.
    pub kalshi_key_path: Option<String>,
}

impl Config {
    /// Reads configuration from the environment, applying defaults.
    pub fn from_env() -> Self {
        let http_addr = env_or("HTTP_ADDR", DEFAULT_HTTP_ADDR);
        // Accept Go-style ":8080" shorthand for all-interfaces.
        let http_addr = if http_addr.starts_with(':') {
            format!("0.0.0.0{http_addr}")
        } else {
            http_addr
        };

        Self {
            http_addr,
            edge_min_ror_pct: env_parse("EDGE_MIN_ROR_PCT", DEFAULT_EDGE_MIN_ROR_PCT),
            title_sim: env_parse("TITLE_SIM", DEFAULT_TITLE_SIM),
            time_window_h: env_parse("TIME_WINDOW_H", DEFAULT_TIME_WINDOW_H),
            pm_chunk: env_parse("PM_CHUNK", DEFAULT_PM_CHUNK),
            kalshi_key_id: env_opt("KALSHI_KEY_ID"),
            kalshi_key_path: env_opt("KALSHI_PRIVATE_KEY_PATH"),
        }
    }

    /// Rejects configurations the process cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidHttpAddr(self.http_addr.clone()));
        }
        if self.pm_chunk == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        if !(0.0..=1.0).contains(&self.title_sim) {
            return Err(ConfigError::InvalidTitleSim(self.title_sim));
        }
        if !self.edge_min_ror_pct.is_finite() {
            return Err(ConfigError::InvalidEdgeThreshold(self.edge_min_ror_pct));
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            http_addr: "0.0.0.0:8080".to_string(),
            edge_min_ror_pct: 3.0,
            title_sim: 0.60,
            time_window_h: 168,
            pm_chunk: 400,
            kalshi_key_id: None,
            kalshi_key_path: None,
        }
    }

    #[test]
    fn test_validate_defaults() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_addr() {
        let mut cfg = base_config();
        cfg.http_addr = "not-an-address".to_string();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidHttpAddr(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        let mut cfg = base_config();
        cfg.pm_chunk = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidChunkSize)));
    }

    #[test]
    fn test_validate_rejects_title_sim_out_of_range() {
        let mut cfg = base_config();
        cfg.title_sim = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidTitleSim(_))
        ));
    }

    #[test]
    fn test_go_style_addr_is_normalized() {
        // from_env reads the process environment, so exercise the
        // normalization rule directly.
        let addr = ":9090";
        let normalized = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };
        assert!(normalized.parse::<SocketAddr>().is_ok());
    }
}
