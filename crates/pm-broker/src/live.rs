//! Live variant: crosses the book for an immediate fill, reconciles via
//! dual polling (order status + portfolio), and retries close with a
//! portfolio-presence check inverted from the open path. Grounded on the
//! teacher's `hip3-executor::executor` dual-confirmation shape, adapted
//! from the maker-quote lifecycle to a marketable IOC lifecycle.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use pm_core::{Decision, Side, Signal, Strategy};
use pm_exchange::types::{Execution, SubmitOrderRequest, SubmitOrderResponse};
use pm_exchange::ExchangeClient;
use pm_position::{thresholds, Position};
use pm_state::MarketStateStore;

use crate::core::{fee, pnl_gross, size_cash, BrokerCore, BrokerStatus};

const FILL_POLL_ATTEMPTS: u32 = 10;
const FILL_POLL_INTERVAL: StdDuration = StdDuration::from_secs(1);
const PORTFOLIO_CHECK_EVERY: u32 = 3;
const CLOSE_RETRY_ATTEMPTS: u32 = 3;
const CLOSE_RETRY_DELAY: StdDuration = StdDuration::from_secs(2);
const CLOSE_SLIPPAGE_BIPS: u32 = 300;
const CROSS_OFFSET: f64 = 0.005;

pub struct LiveBroker {
    core: BrokerCore,
    client: Arc<ExchangeClient>,
    state: Arc<MarketStateStore>,
}

impl LiveBroker {
    pub fn new(core: BrokerCore, client: Arc<ExchangeClient>, state: Arc<MarketStateStore>) -> Self {
        Self { core, client, state }
    }

    pub async fn open(&self, signal: &Signal, strategy: Strategy, now: DateTime<Utc>) -> Option<Position> {
        if self.core.evaluate_opening(signal, strategy, now) != Decision::Accept {
            return None;
        }
        let side = signal.side?;

        let (bid, ask) = match self.client.get_bbo(&signal.slug).await {
            Ok(v) => v,
            Err(e) => {
                warn!(slug = %signal.slug, error = %e, "bbo fetch failed, aborting open");
                return None;
            }
        };

        let order_price = crossing_price(side, bid, ask);
        let ideal_unit_cost = side.unit_cost(signal.mid);
        let unit_cost = side.unit_cost(order_price);
        let tolerance = (thresholds(strategy).tp / 2.0).min(0.03);
        if ideal_unit_cost > 0.0 && ((unit_cost - ideal_unit_cost).abs() / ideal_unit_cost) > tolerance {
            warn!(slug = %signal.slug, "entry slippage exceeds tolerance, aborting open");
            return None;
        }

        let cash_size = size_cash(self.core.equity());
        let fee_open = fee(cash_size);
        let qty = (cash_size - fee_open) / unit_cost;

        let request = SubmitOrderRequest {
            slug: signal.slug.clone(),
            side: side.to_string(),
            price: order_price,
            qty,
            order_type: "IOC".to_string(),
        };
        let response = match self.client.submit_order(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(slug = %signal.slug, error = %e, "submit_order failed, aborting open");
                return None;
            }
        };

        let fill_price = match self.confirm_open_fill(&signal.slug, &response).await {
            Some(p) => p,
            None => {
                let _ = self.client.cancel_order(&response.order_id, &signal.slug).await;
                warn!(slug = %signal.slug, "no fill confirmed within poll deadline, order cancelled");
                return None;
            }
        };

        self.sync_cash().await;

        let position = Position {
            slug: signal.slug.clone(),
            side,
            qty,
            entry_mid: fill_price,
            entry_time: now,
            fill_price,
            cost_basis: cash_size,
            fee_open,
            z_score: signal.abs_z,
            peak_profit_pct: 0.0,
            trailing_active: false,
            peak_updated_at: now,
            consecutive_profit_ticks: 0,
            strategy,
            order_id: Some(response.order_id),
        };

        self.core.insert_position(position.clone(), now);
        self.core
            .log_open(&position.slug, side, qty, fill_price, fee_open, signal.abs_z, strategy, now);
        Some(position)
    }

    async fn confirm_open_fill(&self, slug: &str, response: &SubmitOrderResponse) -> Option<f64> {
        if let Some(price) = weighted_execution_price(&response.executions) {
            return Some(price);
        }
        for attempt in 1..=FILL_POLL_ATTEMPTS {
            tokio::time::sleep(FILL_POLL_INTERVAL).await;
            if let Ok(status) = self.client.get_order_status(&response.order_id).await {
                if let Some(price) = weighted_execution_price(&status.executions) {
                    return Some(price);
                }
                if let Some(avg) = &status.avg_price {
                    if status.state.eq_ignore_ascii_case("filled") {
                        return Some(avg.as_f64());
                    }
                }
            }
            if attempt % PORTFOLIO_CHECK_EVERY == 0 {
                if let Ok(positions) = self.client.get_positions().await {
                    if let Some(entry) = positions.get(slug) {
                        if entry.net_position.as_f64().abs() > 1e-9 {
                            return Some(entry.avg_price.as_f64());
                        }
                    }
                }
            }
        }
        None
    }

    /// Best-bid for a YES-long, best-ask for a NO-long — never the mid.
    /// Reads the BBO stream's cached snapshot rather than issuing a fresh
    /// REST call on every exit-evaluation tick; the stream already keeps
    /// this current for every subscribed slug.
    pub fn get_current_executable_exit(&self, position: &Position) -> f64 {
        match self.state.snapshot(&position.slug) {
            Some(snap) => match position.side {
                Side::BuyYes => snap.last_bid,
                Side::BuyNo => snap.last_ask,
            },
            None => position.entry_mid,
        }
    }

    pub async fn close(&self, slug: &str, reason: &str, now: DateTime<Utc>) -> Option<(Position, f64)> {
        let position = self.core.snapshot_position(slug)?;
        let mut mid = self.current_mid(slug).await.unwrap_or(position.entry_mid);

        for attempt in 1..=CLOSE_RETRY_ATTEMPTS {
            if let Some(exit_price) = self.try_close_once(&position, mid).await {
                self.sync_cash().await;
                let gross = pnl_gross(position.side, position.entry_mid, exit_price, position.qty);
                let exit_notional = position.qty * position.side.unit_cost(exit_price);
                let fee_close = fee(exit_notional);
                let pnl = gross - fee_close;

                self.core.remove_position(slug);
                self.core.record_close_outcome(slug, pnl, now);
                self.core.log_close(&position, exit_price, pnl, fee_close, reason, now);
                return Some((position, pnl));
            }
            if attempt < CLOSE_RETRY_ATTEMPTS {
                tokio::time::sleep(CLOSE_RETRY_DELAY).await;
                mid = self.current_mid(slug).await.unwrap_or(mid);
            }
        }

        error!(slug, "close failed after all retries; leaving position open");
        None
    }

    async fn try_close_once(&self, position: &Position, mid: f64) -> Option<f64> {
        let convenience = self
            .client
            .close_position(&position.slug, CLOSE_SLIPPAGE_BIPS, mid)
            .await;

        let response = match convenience {
            Ok(r) => r,
            Err(e) => {
                warn!(slug = %position.slug, error = %e, "close-position convenience call failed, falling back to IOC");
                let opposite = position.side.opposite();
                let order_price = crossing_price(opposite, mid - CROSS_OFFSET, mid + CROSS_OFFSET);
                let request = SubmitOrderRequest {
                    slug: position.slug.clone(),
                    side: opposite.to_string(),
                    price: order_price,
                    qty: position.qty,
                    order_type: "IOC".to_string(),
                };
                match self.client.submit_order(&request).await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(slug = %position.slug, error = %e, "ioc close submit failed");
                        return None;
                    }
                }
            }
        };

        self.confirm_close_fill(&position.slug, &response, position.entry_mid).await
    }

    async fn confirm_close_fill(
        &self,
        slug: &str,
        response: &SubmitOrderResponse,
        entry_mid: f64,
    ) -> Option<f64> {
        if let Some(price) = weighted_execution_price(&response.executions) {
            return Some(price);
        }
        for attempt in 1..=FILL_POLL_ATTEMPTS {
            tokio::time::sleep(FILL_POLL_INTERVAL).await;
            if let Ok(status) = self.client.get_order_status(&response.order_id).await {
                if let Some(price) = weighted_execution_price(&status.executions) {
                    return Some(price);
                }
            }
            if attempt % PORTFOLIO_CHECK_EVERY == 0 {
                if let Ok(positions) = self.client.get_positions().await {
                    let gone = positions
                        .get(slug)
                        .map(|e| e.net_position.as_f64().abs() < 1e-9)
                        .unwrap_or(true);
                    if gone {
                        warn!(slug, "close confirmed via portfolio with no execution price; booking at entry_mid");
                        return Some(entry_mid);
                    }
                }
            }
        }
        None
    }

    async fn current_mid(&self, slug: &str) -> Option<f64> {
        self.client.get_bbo(slug).await.ok().map(|(bid, ask)| (bid + ask) / 2.0)
    }

    async fn sync_cash(&self) {
        if let Ok(balances) = self.client.get_balances().await {
            if let Some(primary) = balances.first() {
                self.core.set_cash(primary.current_balance.as_f64());
            }
        }
    }

    pub fn cleanup(&self, now: DateTime<Utc>) {
        self.core.cleanup(now);
    }

    pub fn status(&self) -> BrokerStatus {
        self.core.status()
    }

    pub fn has_position(&self, slug: &str) -> bool {
        self.core.has_position(slug)
    }

    pub fn open_slugs(&self) -> Vec<String> {
        self.core.open_slugs()
    }

    pub fn snapshot_position(&self, slug: &str) -> Option<Position> {
        self.core.snapshot_position(slug)
    }

    pub fn update_position(&self, position: Position) {
        self.core.update_position(position);
    }
}

fn crossing_price(side: Side, bid: f64, ask: f64) -> f64 {
    match side {
        Side::BuyYes => (ask + CROSS_OFFSET).min(0.999),
        Side::BuyNo => (bid - CROSS_OFFSET).max(0.001),
    }
}

fn weighted_execution_price(executions: &[Execution]) -> Option<f64> {
    if executions.is_empty() {
        return None;
    }
    let (mut notional, mut qty) = (0.0, 0.0);
    for e in executions {
        let p = e.price.as_f64();
        let q = e.qty.as_f64();
        notional += p * q;
        qty += q;
    }
    if qty <= 0.0 {
        None
    } else {
        Some(notional / qty)
    }
}
