//! Application configuration. Mirrors the teacher's `hip3-bot::config`
//! shape: one struct per concern, `#[serde(default = "...")]` plus a
//! matching free function for every field that has a sensible default, so
//! a near-empty TOML file still produces a runnable config.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub key_id: String,
    pub secret_key: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Defaults to `api_base` with its scheme swapped for `wss://`/`ws://`.
    #[serde(default)]
    pub ws_url: Option<String>,
}

fn default_api_base() -> String {
    "https://api.polymarket.us".to_string()
}

impl ExchangeConfig {
    pub fn ws_url(&self) -> String {
        self.ws_url.clone().unwrap_or_else(|| {
            self.api_base
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Phase A (paper) by default; set `true` to route orders to C2.
    #[serde(default)]
    pub live: bool,
    /// When true, rejected signals are logged at `info` instead of `debug`.
    #[serde(default)]
    pub debug_rejections: bool,
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    #[serde(default = "default_scanner_bind")]
    pub scanner_bind: String,
    #[serde(default = "default_dashboard_interval_secs")]
    pub dashboard_interval_secs: u64,
    #[serde(default = "default_market_limit")]
    pub market_limit: u32,
}

fn default_initial_cash() -> f64 {
    100.0
}

fn default_scanner_bind() -> String {
    "127.0.0.1:8088".to_string()
}

fn default_dashboard_interval_secs() -> u64 {
    30
}

fn default_market_limit() -> u32 {
    1500
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            live: false,
            debug_rejections: false,
            initial_cash: default_initial_cash(),
            scanner_bind: default_scanner_bind(),
            dashboard_interval_secs: default_dashboard_interval_secs(),
            market_limit: default_market_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_trade_log_path")]
    pub trade_log_path: String,
    #[serde(default)]
    pub signal_log_path: Option<String>,
    #[serde(default)]
    pub rejection_log_path: Option<String>,
}

fn default_trade_log_path() -> String {
    "logs/trades.csv".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmConfig {
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PmConfig {
    /// CLI arg > `PM_CONFIG` env var > `config/default.toml`, mirroring
    /// the teacher's `HIP3_CONFIG` resolution order.
    pub fn resolve_path(cli_arg: Option<String>) -> String {
        cli_arg
            .or_else(|| std::env::var("PM_CONFIG").ok())
            .unwrap_or_else(|| "config/default.toml".to_string())
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config at {path}: {e}")))?;
        toml::from_str(&content).map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_sections_fall_back_to_defaults() {
        let toml_str = r#"
            [exchange]
            key_id = "abc"
            secret_key = "c2VjcmV0"
        "#;
        let cfg: PmConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.exchange.api_base, "https://api.polymarket.us");
        assert_eq!(cfg.exchange.ws_url(), "wss://api.polymarket.us");
        assert!(!cfg.runtime.live);
        assert_eq!(cfg.runtime.initial_cash, 100.0);
        assert_eq!(cfg.logging.trade_log_path, "logs/trades.csv");
    }
}
