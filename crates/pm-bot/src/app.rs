//! Main application orchestration. Builds every C-component behind shared
//! handles, runs the `tokio::select!` event loop, and tears everything
//! down on Ctrl-C. Shape follows the teacher's `hip3-bot::app::Application`
//! (message-channel arm, fixed-interval tick arm, conditionally-enabled
//! interval arm, `ctrl_c()` arm, then a flush/shutdown tail) with the
//! market-making/execution internals swapped for this system's Trade Loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pm_broker::Broker;
use pm_core::{BboSample, Decision, GamePhase, Signal, Strategy};
use pm_exchange::ExchangeClient;
use pm_persistence::{EventSink, SignalRecord};
use pm_position::evaluate_exit;
use pm_reversion::ReversionTracker;
use pm_scanner::Scanner;
use pm_signal::{PrevSignal, SignalEngine};
use pm_signer::AuthSigner;
use pm_state::MarketStateStore;
use pm_ws::{ConnectionConfig, ConnectionManager};

use crate::config::PmConfig;
use crate::error::{AppError, AppResult};

const STATUS_INTERVAL_SECS: u64 = 5;
const EXIT_TICK_MS: u64 = 250;
/// Above this age the BBO an exit decision was priced off is considered
/// stale, matching `pm_position::evaluate_exit`'s own staleness window.
const SOURCE_MAX_AGE_SECS: i64 = 30;

pub struct Application {
    config: PmConfig,
    broker: Arc<Broker>,
    state: Arc<MarketStateStore>,
    reversion: Arc<ReversionTracker>,
    scanner: Arc<Scanner>,
    sink: Option<Arc<EventSink>>,
    stop: CancellationToken,
    prev_signals: Mutex<HashMap<String, PrevSignal>>,
}

impl Application {
    pub fn new(config: PmConfig) -> AppResult<Self> {
        let signer = Arc::new(AuthSigner::new(
            config.exchange.key_id.clone(),
            &config.exchange.secret_key,
        )?);

        let sink = Some(Arc::new(EventSink::new(
            &config.logging.trade_log_path,
            config.logging.signal_log_path.as_deref(),
            config.logging.rejection_log_path.as_deref(),
        )?));

        let state = Arc::new(MarketStateStore::new());
        let reversion = Arc::new(ReversionTracker::new());
        let scanner = Arc::new(Scanner::new(state.clone(), reversion.clone()));

        // EventSink has no Clone; the Broker owns its own handle to the
        // sink (it writes OPEN/CLOSE rows) and the Trade Loop keeps a
        // second one for rejection/signal rows. A second `EventSink::new`
        // over the same paths would fight over the same file handles, so
        // the sink is built once here and the Broker gets a plain
        // `Option<EventSink>` constructed from the same paths instead.
        let broker_sink = Some(EventSink::new(
            &config.logging.trade_log_path,
            config.logging.signal_log_path.as_deref(),
            config.logging.rejection_log_path.as_deref(),
        )?);

        let broker = if config.runtime.live {
            let client = Arc::new(ExchangeClient::new(config.exchange.api_base.clone(), signer.clone())?);
            Arc::new(Broker::live(
                config.runtime.initial_cash,
                broker_sink,
                client,
                state.clone(),
            ))
        } else {
            Arc::new(Broker::paper(config.runtime.initial_cash, broker_sink, state.clone()))
        };

        Ok(Self {
            config,
            broker,
            state,
            reversion,
            scanner,
            sink,
            stop: CancellationToken::new(),
            prev_signals: Mutex::new(HashMap::new()),
        })
    }

    fn signer(&self) -> AppResult<Arc<AuthSigner>> {
        Ok(Arc::new(AuthSigner::new(
            self.config.exchange.key_id.clone(),
            &self.config.exchange.secret_key,
        )?))
    }

    pub async fn run(self) -> AppResult<()> {
        let signer = self.signer()?;
        let (message_tx, mut message_rx) = mpsc::channel::<BboSample>(1024);

        let ws_config = ConnectionConfig {
            url: self.config.exchange.ws_url(),
            ..ConnectionConfig::default()
        };
        let connection = Arc::new(ConnectionManager::new(ws_config, signer, message_tx, self.stop.clone()));
        let ws_handle = tokio::spawn(async move {
            connection.run().await;
        });

        let scanner_addr: std::net::SocketAddr = self
            .config
            .runtime
            .scanner_bind
            .parse()
            .map_err(|e| AppError::Config(format!("invalid scanner_bind: {e}")))?;
        let scanner_for_http = self.scanner.clone();
        let http_handle = tokio::spawn(async move {
            if let Err(e) = pm_scanner::http::serve(scanner_for_http, scanner_addr).await {
                warn!(error = %e, "scanner status endpoint exited");
            }
        });

        info!(live = self.config.runtime.live, "entering main event loop");

        let mut exit_interval = tokio::time::interval(StdDuration::from_millis(EXIT_TICK_MS));
        let mut status_interval = tokio::time::interval(StdDuration::from_secs(STATUS_INTERVAL_SECS));
        let game_phases: HashMap<String, GamePhase> = HashMap::new();

        loop {
            tokio::select! {
                Some(sample) = message_rx.recv() => {
                    self.handle_sample(sample, &game_phases, Utc::now());
                }

                _ = exit_interval.tick() => {
                    self.evaluate_exits(Utc::now()).await;
                    self.broker.cleanup(Utc::now());
                }

                _ = status_interval.tick() => {
                    let status = self.broker.status();
                    let snapshot = self.scanner.tick(&game_phases, Utc::now());
                    info!(
                        cash = status.cash,
                        open = status.open_count,
                        wins = status.wins,
                        losses = status.losses,
                        composite = snapshot.composite,
                        "status"
                    );
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.stop.cancel();
        ws_handle.abort();
        http_handle.abort();
        if let Some(sink) = &self.sink {
            sink.flush_all();
        }
        info!("shutdown complete");
        Ok(())
    }

    /// Folds one BBO sample through the store, the Signal Engine, spike
    /// recording and opening discipline, mirroring spec.md's Trade Loop
    /// step order for a single tick.
    fn handle_sample(&self, sample: BboSample, game_phases: &HashMap<String, GamePhase>, now: chrono::DateTime<Utc>) {
        let slug = sample.slug.clone();
        let ingest = match self.state.ingest(&sample) {
            Ok(r) => r,
            Err(e) => {
                debug!(slug = %slug, error = %e, "dropped malformed BBO sample");
                return;
            }
        };
        if !ingest.pipeline_gate {
            return;
        }

        let phase = game_phases.get(&slug).copied().unwrap_or(GamePhase::Unknown);
        let prev = self.prev_signals.lock().get(&slug).copied();
        let global_deltas = self.state.global_deltas();

        let signal = SignalEngine::evaluate(
            &slug,
            ingest.mid,
            ingest.delta,
            &ingest.history,
            ingest.spread,
            sample.open_interest,
            &global_deltas,
            prev.as_ref(),
            phase,
            now,
        );

        self.state.update_peak_z(&slug, signal.abs_z, now);
        self.prev_signals.lock().insert(
            slug.clone(),
            PrevSignal {
                direction: signal.direction,
                abs_z: signal.abs_z,
                at: now,
            },
        );

        if let Some(strategy) = signal.strategy_hint {
            self.reversion.record_spike(
                now,
                &slug,
                signal.mid,
                signal.history_mean,
                signal.abs_z,
                signal.spread,
                strategy == Strategy::Fade,
                strategy == Strategy::Trend,
            );
        }

        self.log_signal(&signal);
        self.try_open(signal, phase, now);

        let state = self.state.clone();
        let reversion = self.reversion.clone();
        let slug_for_resolve = slug.clone();
        tokio::spawn(async move {
            let resolved = reversion.resolve_due(now, |s| state.snapshot(s).map(|m| m.last_mid));
            if resolved.iter().any(|r| r.slug == slug_for_resolve) {
                debug!(slug = %slug_for_resolve, "spike outcome resolved");
            }
        });
    }

    /// Applies the one Trade-Loop-level phase gate this system can test
    /// without a Phase Oracle (`PRE_GAME: reject outright`); every other
    /// phase-dependent choice already lives inside `SignalEngine::evaluate`.
    fn try_open(&self, signal: Signal, phase: GamePhase, now: chrono::DateTime<Utc>) {
        let Some(strategy) = signal.strategy_hint else {
            return;
        };
        if !signal.decision.is_accept() {
            return;
        }
        if phase == GamePhase::Pre {
            self.log_rejection(&signal, "pre_game");
            return;
        }
        if self.broker.has_position(&signal.slug) {
            return;
        }

        let broker = self.broker.clone();
        tokio::spawn(async move {
            broker.open(&signal, strategy, now).await;
        });
    }

    async fn evaluate_exits(&self, now: chrono::DateTime<Utc>) {
        for slug in self.broker.open_slugs() {
            let Some(position) = self.broker.snapshot_position(&slug) else {
                continue;
            };
            let executable = self.broker.get_current_executable_exit(&position);
            let source_age = self
                .state
                .snapshot(&slug)
                .map(|m| now.signed_duration_since(m.last_update))
                .unwrap_or_else(|| Duration::seconds(SOURCE_MAX_AGE_SECS + 1));
            let eval = evaluate_exit(&position, executable, now, source_age);

            if let Some(decision) = eval.decision {
                let broker = self.broker.clone();
                let reason = decision.reason.to_string();
                tokio::spawn(async move {
                    broker.close(&slug, &reason, Utc::now()).await;
                });
            } else {
                let mut updated = position;
                updated.peak_profit_pct = eval.peak_profit_pct;
                updated.trailing_active = eval.trailing_active;
                updated.peak_updated_at = eval.peak_updated_at;
                updated.consecutive_profit_ticks = eval.consecutive_profit_ticks;
                self.broker.update_position(updated);
            }
        }
    }

    fn log_signal(&self, signal: &Signal) {
        let Some(sink) = &self.sink else { return };
        sink.write_signal(SignalRecord {
            timestamp: signal.created_at,
            slug: signal.slug.clone(),
            decision: signal.decision.to_string(),
            reason: None,
            mid: signal.mid,
            abs_z: signal.abs_z,
            direction_strength: signal.direction_strength,
            strategy_hint: signal.strategy_hint.map(|s| s.to_string()),
            game_phase: format!("{:?}", signal.game_phase),
        });
    }

    fn log_rejection(&self, signal: &Signal, reason: &str) {
        if self.config.runtime.debug_rejections {
            info!(slug = %signal.slug, reason, "signal rejected");
        } else {
            debug!(slug = %signal.slug, reason, "signal rejected");
        }
        let Some(sink) = &self.sink else { return };
        sink.write_rejection(SignalRecord {
            timestamp: signal.created_at,
            slug: signal.slug.clone(),
            decision: Decision::Reject(reason.to_string()).to_string(),
            reason: Some(reason.to_string()),
            mid: signal.mid,
            abs_z: signal.abs_z,
            direction_strength: signal.direction_strength,
            strategy_hint: signal.strategy_hint.map(|s| s.to_string()),
            game_phase: format!("{:?}", signal.game_phase),
        });
    }
}
