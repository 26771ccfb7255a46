//! C3 BBO Stream: long-lived subscription transport. Structurally follows
//! the teacher's `hip3-ws::connection::ConnectionManager` (reconnect loop
//! with exponential backoff + jitter, a `HeartbeatManager`, a message
//! channel fed from the read half) generalized from Hyperliquid's
//! per-coin `bbo`/`activeAssetCtx` subscriptions to this exchange's single
//! wildcard subscribe frame (spec.md §4.3), with a batched-subscribe
//! fallback if the wildcard is rejected.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use pm_core::BboSample;
use pm_signer::AuthSigner;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, WsError};
use crate::heartbeat::HeartbeatManager;
use crate::parser::{parse_frame, Frame};

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    /// Used only for the batched-subscribe fallback; the steady-state
    /// path sends a single wildcard subscribe frame.
    pub market_slugs: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 60_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 10_000,
            market_slugs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    signer: Arc<AuthSigner>,
    state: Arc<RwLock<ConnectionState>>,
    heartbeat: Arc<HeartbeatManager>,
    message_tx: mpsc::Sender<BboSample>,
    reconnects: AtomicU32,
    stop: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        signer: Arc<AuthSigner>,
        message_tx: mpsc::Sender<BboSample>,
        stop: CancellationToken,
    ) -> Self {
        let heartbeat = Arc::new(HeartbeatManager::new(
            config.heartbeat_interval_ms,
            config.heartbeat_timeout_ms,
        ));
        Self {
            config,
            signer,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            heartbeat,
            message_tx,
            reconnects: AtomicU32::new(0),
            stop,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Connects and reconnects forever (exponential backoff, jittered,
    /// capped) until the cancellation token fires. On every reconnect,
    /// subscription state is cleared and rebuilt from scratch — the server
    /// is never assumed to have preserved it (spec.md §4.3).
    pub async fn run(self: Arc<Self>) {
        let mut attempt = 0u32;
        loop {
            if self.stop.is_cancelled() {
                *self.state.write() = ConnectionState::Disconnected;
                return;
            }

            *self.state.write() = ConnectionState::Connecting;
            match self.try_connect().await {
                Ok(()) => info!("bbo stream closed normally"),
                Err(e) => error!(error = %e, "bbo stream connection error"),
            }

            if self.stop.is_cancelled() {
                *self.state.write() = ConnectionState::Disconnected;
                return;
            }

            attempt += 1;
            self.reconnects.store(attempt, Ordering::SeqCst);
            *self.state.write() = ConnectionState::Reconnecting;
            let delay = self.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting bbo stream");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.stop.cancelled() => {
                    *self.state.write() = ConnectionState::Disconnected;
                    return;
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);
        Duration::from_millis(delay + jitter_ms())
    }

    async fn try_connect(&self) -> Result<()> {
        let headers = self.signer.sign_now("GET", "/v1/ws/markets");

        let mut request = self
            .config
            .url
            .clone()
            .into_client_request()
            .map_err(WsError::Transport)?;
        let hdrs = request.headers_mut();
        hdrs.insert(
            "X-PM-Access-Key",
            headers.access_key.parse().expect("header value"),
        );
        hdrs.insert(
            "X-PM-Timestamp",
            headers.timestamp_ms.to_string().parse().expect("header value"),
        );
        hdrs.insert(
            "X-PM-Signature",
            headers.signature_b64.parse().expect("header value"),
        );

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        self.reconnects.store(0, Ordering::SeqCst);
        info!("bbo stream connected");

        self.subscribe_wildcard(&mut write).await?;
        self.heartbeat.reset();

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_message();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "normal close".to_string()));
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        Some(Ok(_)) => {}
                        None => return Ok(()),
                    }
                }
                _ = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_ping() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        debug!("sent heartbeat ping");
                    }
                }
            }
        }
    }

    async fn subscribe_wildcard<S>(&self, write: &mut S) -> Result<()>
    where
        S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let frame = json!({
            "subscribe": {
                "request_id": "sub_1",
                "subscription_type": 2,
                "market_slugs": Vec::<String>::new(),
            }
        });
        write.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    /// Fallback used by the caller if the wildcard subscribe is rejected:
    /// batches `market_slugs` into groups of 100 (spec.md §4.3).
    pub async fn subscribe_batched<S>(&self, write: &mut S) -> Result<()>
    where
        S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        for (i, chunk) in self.config.market_slugs.chunks(100).enumerate() {
            let frame = json!({
                "subscribe": {
                    "request_id": format!("sub_batch_{i}"),
                    "subscription_type": 2,
                    "market_slugs": chunk,
                }
            });
            write.send(Message::Text(frame.to_string())).await?;
        }
        Ok(())
    }

    async fn handle_text(&self, text: &str) -> Result<()> {
        self.heartbeat.record_message();
        let value: serde_json::Value = serde_json::from_str(text)?;
        match parse_frame(&value) {
            Frame::Heartbeat | Frame::SubscriptionAck | Frame::Unrecognized => {}
            Frame::Data(updates) => {
                for update in updates {
                    if self.message_tx.send(update).await.is_err() {
                        warn!("bbo message receiver dropped");
                    }
                }
            }
        }
        Ok(())
    }
}

fn jitter_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec() {
        let c = ConnectionConfig::default();
        assert_eq!(c.reconnect_base_delay_ms, 1_000);
        assert_eq!(c.reconnect_max_delay_ms, 60_000);
        assert_eq!(c.heartbeat_interval_ms, 30_000);
        assert_eq!(c.heartbeat_timeout_ms, 10_000);
    }

    #[test]
    fn backoff_delay_grows_and_caps() {
        let (tx, _rx) = mpsc::channel(1);
        let signer = Arc::new(
            AuthSigner::new(
                "k",
                &base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [0u8; 32]),
            )
            .unwrap(),
        );
        let mgr = ConnectionManager::new(
            ConnectionConfig::default(),
            signer,
            tx,
            CancellationToken::new(),
        );
        let d1 = mgr.backoff_delay(1).as_millis();
        let d2 = mgr.backoff_delay(2).as_millis();
        assert!(d1 >= 1000 && d1 < 2000);
        assert!(d2 >= 2000 && d2 < 3000);
        let d_big = mgr.backoff_delay(20).as_millis();
        assert!(d_big < 61_000);
    }
}
