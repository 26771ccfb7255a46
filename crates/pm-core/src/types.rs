use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Lifecycle state of a market, as reported by the catalog and the BBO
/// stream alike (the feed reuses the same vocabulary on each update).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketState {
    Open,
    Suspended,
    Expired,
}

impl MarketState {
    pub fn is_tradeable(self) -> bool {
        matches!(self, MarketState::Open)
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketState::Open => "OPEN",
            MarketState::Suspended => "SUSPENDED",
            MarketState::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MarketState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(MarketState::Open),
            "SUSPENDED" | "PAUSED" => Ok(MarketState::Suspended),
            "EXPIRED" | "CLOSED" | "RESOLVED" => Ok(MarketState::Expired),
            other => Err(CoreError::UnknownMarketState(other.to_string())),
        }
    }
}

/// A discovered market, owned by the out-of-scope Catalog Service and
/// passed in to everything downstream as a plain value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub slug: String,
    pub question: String,
    pub end_time: DateTime<Utc>,
    pub state: MarketState,
}

/// Which side of the binary contract a trade (or signal) acts on.
/// `BuyNo` is economically "sell YES"; the API still denominates price in
/// YES terms, so all arithmetic routes through `unit_cost()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    BuyYes,
    BuyNo,
}

impl Side {
    /// Cost of one unit of this side, given the YES mid price.
    pub fn unit_cost(self, mid: f64) -> f64 {
        match self {
            Side::BuyYes => mid,
            Side::BuyNo => 1.0 - mid,
        }
    }

    /// Profit fraction given entry/current YES-denominated prices.
    pub fn profit_pct(self, entry_mid: f64, current: f64) -> f64 {
        match self {
            Side::BuyYes => (current - entry_mid) / entry_mid,
            Side::BuyNo => (entry_mid - current) / (1.0 - entry_mid),
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::BuyYes => Side::BuyNo,
            Side::BuyNo => Side::BuyYes,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Side::BuyYes => "BUY_YES",
            Side::BuyNo => "BUY_NO",
        };
        write!(f, "{s}")
    }
}

/// Which strategy template classified (or would manage) a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Fade,
    Trend,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Fade => "FADE",
            Strategy::Trend => "TREND",
        };
        write!(f, "{s}")
    }
}

/// Wall-clock game phase, supplied by the out-of-scope Phase Oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    Pre,
    Live,
    Post,
    Unknown,
}

/// Direction of a mid-price move that produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Spike,
    Dip,
}

impl Direction {
    pub fn from_delta(delta: f64) -> Direction {
        if delta >= 0.0 {
            Direction::Spike
        } else {
            Direction::Dip
        }
    }
}

/// How loud a deviation is, derived from `|z|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Alert,
    Watch,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Alert => "ALERT",
            Severity::Watch => "WATCH",
            Severity::Info => "INFO",
        };
        write!(f, "{s}")
    }
}

/// A raw best-bid/offer update as delivered by the feed, before it has been
/// folded into the Market State Store.
#[derive(Debug, Clone)]
pub struct BboSample {
    pub slug: String,
    pub best_bid: f64,
    pub best_ask: f64,
    pub open_interest: f64,
    pub state: MarketState,
    pub received_at: DateTime<Utc>,
}

impl BboSample {
    pub fn mid(&self) -> Result<f64> {
        if self.best_ask <= self.best_bid {
            return Err(CoreError::InvalidBbo {
                bid: self.best_bid,
                ask: self.best_ask,
            });
        }
        let mid = (self.best_bid + self.best_ask) / 2.0;
        if !(mid > 0.0 && mid < 1.0) {
            return Err(CoreError::InvalidMid(mid));
        }
        Ok(mid)
    }

    pub fn spread(&self) -> f64 {
        self.best_ask - self.best_bid
    }
}

/// Numeric value that may arrive from the exchange either as a bare JSON
/// number or as `{value, currency}`. Parsed once at the HTTP/WS boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountLike {
    Value(f64),
    Object {
        value: f64,
        #[serde(default)]
        currency: Option<String>,
    },
}

impl AmountLike {
    pub fn as_f64(&self) -> f64 {
        match self {
            AmountLike::Value(v) => *v,
            AmountLike::Object { value, .. } => *value,
        }
    }
}

impl From<AmountLike> for f64 {
    fn from(a: AmountLike) -> f64 {
        a.as_f64()
    }
}

/// Outcome of the opening-discipline / signal-quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    Accept,
    Reject(String),
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Accept => write!(f, "ACCEPT"),
            Decision::Reject(reason) => write!(f, "REJECT:{reason}"),
        }
    }
}

/// Transient per-tick output of the Signal Engine (spec.md §3). Never
/// stored across ticks by the engine itself; the Trade Loop and Reversion
/// Tracker each keep whatever slice of it they need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub slug: String,
    pub side: Option<Side>,
    pub mid: f64,
    pub delta: f64,
    /// `mean(history)` the z-score was computed against — the pre-spike
    /// baseline, not `mid - delta` (the previous tick's mid).
    pub history_mean: f64,
    pub abs_z: f64,
    pub direction: Direction,
    pub direction_strength: f64,
    pub spread: f64,
    pub liquidity: f64,
    pub decision: Decision,
    pub strategy_hint: Option<Strategy>,
    pub severity: Severity,
    pub game_phase: GamePhase,
    pub burst_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_state_parses_common_aliases() {
        assert_eq!("open".parse::<MarketState>().unwrap(), MarketState::Open);
        assert_eq!(
            "CLOSED".parse::<MarketState>().unwrap(),
            MarketState::Expired
        );
        assert!("garbage".parse::<MarketState>().is_err());
    }

    #[test]
    fn side_unit_cost_and_profit() {
        assert!((Side::BuyYes.unit_cost(0.3) - 0.3).abs() < 1e-9);
        assert!((Side::BuyNo.unit_cost(0.3) - 0.7).abs() < 1e-9);
        // scenario 1 from spec.md §8: BUY_NO entered at 0.44, current 0.384
        let pct = Side::BuyNo.profit_pct(0.44, 0.384);
        assert!((pct - 0.10).abs() < 1e-6, "got {pct}");
    }

    #[test]
    fn bbo_sample_rejects_crossed_book() {
        let s = BboSample {
            slug: "x".into(),
            best_bid: 0.5,
            best_ask: 0.4,
            open_interest: 0.0,
            state: MarketState::Open,
            received_at: Utc::now(),
        };
        assert!(s.mid().is_err());
    }

    #[test]
    fn amount_like_accepts_both_shapes() {
        let a: AmountLike = serde_json::from_str("0.42").unwrap();
        assert!((a.as_f64() - 0.42).abs() < 1e-9);
        let b: AmountLike = serde_json::from_str(r#"{"value": 0.42, "currency": "USD"}"#).unwrap();
        assert!((b.as_f64() - 0.42).abs() < 1e-9);
    }

    #[test]
    fn direction_from_delta() {
        assert_eq!(Direction::from_delta(0.01), Direction::Spike);
        assert_eq!(Direction::from_delta(-0.01), Direction::Dip);
        assert_eq!(Direction::from_delta(0.0), Direction::Spike);
    }
}
