//! Prometheus metrics, registered once via `once_cell::sync::Lazy` statics.
//! Mirrors `hip3-telemetry::metrics`: registration failure is a programmer
//! error (duplicate metric name), so it panics at first access rather than
//! threading a `Result` through every call site.
//!
//! # Panics
//! Any metric here panics on first use if registration fails (e.g. two
//! metrics sharing a name). This can only happen from a coding mistake in
//! this module, never from runtime conditions.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Gauge, GaugeVec, HistogramVec,
};

pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("pm_ws_connected", "1 if the BBO stream is connected").unwrap()
});

pub static OPEN_POSITIONS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("pm_open_positions", "Current number of open positions").unwrap()
});

pub static CASH: Lazy<Gauge> =
    Lazy::new(|| register_gauge!("pm_cash", "Current broker cash balance").unwrap());

pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pm_signals_total",
        "Signals emitted by the signal engine, by decision",
        &["decision"]
    )
    .unwrap()
});

pub static OPENS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pm_opens_total",
        "Positions opened, by strategy",
        &["strategy"]
    )
    .unwrap()
});

pub static CLOSES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pm_closes_total",
        "Positions closed, by exit reason",
        &["reason"]
    )
    .unwrap()
});

pub static EDGE_PNL: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pm_close_pnl",
        "Realized pnl per close, by strategy",
        &["strategy"]
    )
    .unwrap()
});

pub static SCANNER_SCORE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pm_scanner_score",
        "Scanner composite score, by strategy",
        &["strategy"]
    )
    .unwrap()
});
