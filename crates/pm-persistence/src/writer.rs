//! CSV Event Sink: the only persistence this system owns. Everything else
//! (trade history across restarts, order replay) is explicitly out of
//! scope per spec.md §1.
//!
//! Adapted from the teacher's `hip3-persistence::writer::JsonLinesWriter`
//! buffered-append shape, swapping JSON Lines for CSV rows per spec.md §6's
//! trade-record contract and `examples/original_source/monitor.py`'s tee'd
//! trigger/outlier CSV rows for the signal audit log.

use std::fs::{File, OpenOptions};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;

/// One row of the Broker output contract (spec.md §6): a record per open
/// and per close.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub event: &'static str, // "OPEN" | "CLOSE"
    pub slug: String,
    pub side: String,
    pub qty: f64,
    pub entry_mid: f64,
    pub exit_mid: Option<f64>,
    pub pnl: Option<f64>,
    pub cash_after: f64,
    pub reason: Option<String>,
    pub fee: f64,
    pub z_score: f64,
    pub strategy: String,
}

/// One row of the signal audit log (every ACCEPT/REJECT decision).
#[derive(Debug, Clone, Serialize)]
pub struct SignalRecord {
    pub timestamp: DateTime<Utc>,
    pub slug: String,
    pub decision: String,
    pub reason: Option<String>,
    pub mid: f64,
    pub abs_z: f64,
    pub direction_strength: f64,
    pub strategy_hint: Option<String>,
    pub game_phase: String,
}

fn open_append(path: &Path) -> std::io::Result<(File, bool)> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let existed = path.exists() && path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok((file, existed))
}

struct CsvSink<T> {
    writer: csv::Writer<File>,
    writes_since_flush: usize,
    flush_every: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Serialize> CsvSink<T> {
    fn open(path: &Path, flush_every: usize) -> Result<Self> {
        let (file, existed) = open_append(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(!existed)
            .from_writer(file);
        Ok(Self {
            writer,
            writes_since_flush: 0,
            flush_every,
            _marker: std::marker::PhantomData,
        })
    }

    fn write(&mut self, record: &T) -> Result<()> {
        self.writer.serialize(record)?;
        self.writes_since_flush += 1;
        if self.writes_since_flush >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writes_since_flush = 0;
        Ok(())
    }
}

/// Trade + signal + rejection CSV sink, shared by the Broker and the Signal
/// Engine caller. One mutex per file: the shutdown path calls `flush_all`
/// under the same locks the open/close path uses, never nested, so a plain
/// `parking_lot::Mutex` (not a reentrant one) is sufficient here.
pub struct EventSink {
    trades: Mutex<CsvSink<TradeRecord>>,
    signals: Option<Mutex<CsvSink<SignalRecord>>>,
    rejections: Option<Mutex<CsvSink<SignalRecord>>>,
}

impl EventSink {
    pub fn new(
        trade_log_path: &str,
        signal_log_path: Option<&str>,
        rejection_log_path: Option<&str>,
    ) -> Result<Self> {
        let trades = Mutex::new(CsvSink::open(Path::new(trade_log_path), 1)?);
        let signals = signal_log_path
            .map(|p| CsvSink::open(Path::new(p), 20).map(Mutex::new))
            .transpose()?;
        let rejections = rejection_log_path
            .map(|p| CsvSink::open(Path::new(p), 20).map(Mutex::new))
            .transpose()?;
        Ok(Self {
            trades,
            signals,
            rejections,
        })
    }

    pub fn write_trade_event(&self, record: TradeRecord) {
        if let Err(e) = self.trades.lock().write(&record) {
            warn!(error = %e, "failed to write trade event");
        }
    }

    pub fn write_signal(&self, record: SignalRecord) {
        if let Some(sink) = &self.signals {
            if let Err(e) = sink.lock().write(&record) {
                warn!(error = %e, "failed to write signal record");
            }
        }
    }

    pub fn write_rejection(&self, record: SignalRecord) {
        if let Some(sink) = &self.rejections {
            if let Err(e) = sink.lock().write(&record) {
                warn!(error = %e, "failed to write rejection record");
            }
        }
    }

    /// Flush every open writer. Called once from the shutdown path.
    pub fn flush_all(&self) {
        if let Err(e) = self.trades.lock().flush() {
            warn!(error = %e, "failed to flush trade log");
        }
        if let Some(sink) = &self.signals {
            let _ = sink.lock().flush();
        }
        if let Some(sink) = &self.rejections {
            let _ = sink.lock().flush();
        }
    }
}
