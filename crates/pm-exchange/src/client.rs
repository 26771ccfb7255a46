//! C2 Exchange Client: authenticated REST facade over the prediction
//! market API. Structurally follows the teacher's
//! `hip3-registry::client::MetaClient` (typed request structs,
//! `reqwest::Client` with a fixed timeout, status-checked `.send().await`,
//! JSON body parsing with a `serde_json::Value` fallback for loosely
//! specified shapes) generalized from a single read-only `info` endpoint to
//! the full catalog/book/order/portfolio surface spec.md §4.2 describes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pm_core::{Market, MarketState};
use pm_signer::AuthSigner;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ExchangeError, Result};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    Balance, MarketDto, OrderBook, OrderStatus, PositionEntry, SubmitOrderRequest,
    SubmitOrderResponse,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12);
const MAX_ATTEMPTS: u32 = 3;

pub struct ExchangeClient {
    http: Client,
    base_url: String,
    signer: Arc<AuthSigner>,
    rate_limiter: RateLimiter,
}

impl ExchangeClient {
    pub fn new(base_url: impl Into<String>, signer: Arc<AuthSigner>) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ExchangeError::Transport)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            signer,
            rate_limiter: RateLimiter::new(40, 1),
        })
    }

    /// Sends a signed request to `path`, retrying up to `MAX_ATTEMPTS` times
    /// on 429/5xx with exponential backoff. 4xx auth/validation errors are
    /// surfaced immediately, never retried.
    async fn request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.rate_limiter.acquire().await;

            let headers = self.signer.sign_now(method.as_str(), path);
            let url = format!("{}{path}", self.base_url);
            let mut req = self
                .http
                .request(method.clone(), &url)
                .header("X-PM-Access-Key", &headers.access_key)
                .header("X-PM-Timestamp", headers.timestamp_ms.to_string())
                .header("X-PM-Signature", &headers.signature_b64);
            if let Some(b) = body {
                req = req.json(b);
            }

            let response = req.send().await;
            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(ExchangeError::RetriesExhausted {
                            attempts: attempt,
                            last: e.to_string(),
                        });
                    }
                    backoff_sleep(attempt).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.json::<Value>().await.map_err(ExchangeError::from);
            }

            let body_text = response.text().await.unwrap_or_default();
            let err = ExchangeError::Status {
                status: status.as_u16(),
                body: body_text,
            };

            if err.is_retriable() && attempt < MAX_ATTEMPTS {
                warn!(status = %status, attempt, "retriable exchange error, backing off");
                backoff_sleep(attempt).await;
                continue;
            }
            if err.is_retriable() {
                return Err(ExchangeError::RetriesExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }
            return Err(err);
        }
    }

    fn unwrap_envelope(value: Value, key: &str) -> Value {
        if let Some(inner) = value.get(key) {
            inner.clone()
        } else {
            value
        }
    }

    pub async fn list_markets(
        &self,
        limit: Option<u32>,
        active: Option<bool>,
        closed: Option<bool>,
    ) -> Result<Vec<Market>> {
        let mut markets = Vec::new();
        let mut offset = 0u32;
        let page_size = 100u32;
        loop {
            let mut path = format!("/v1/markets?limit={page_size}&offset={offset}");
            if let Some(a) = active {
                path.push_str(&format!("&active={a}"));
            }
            if let Some(c) = closed {
                path.push_str(&format!("&closed={c}"));
            }
            let value = self.request::<()>(Method::GET, &path, None).await?;
            let raw = value
                .get("markets")
                .cloned()
                .unwrap_or(value)
                .as_array()
                .cloned()
                .ok_or_else(|| {
                    ExchangeError::MalformedPayload("markets response is not an array".into())
                })?;
            if raw.is_empty() {
                break;
            }
            for entry in &raw {
                let dto: MarketDto = serde_json::from_value(entry.clone())?;
                markets.push(to_market(dto)?);
            }
            offset += raw.len() as u32;
            if raw.len() < page_size as usize {
                break;
            }
            if let Some(limit) = limit {
                if markets.len() as u32 >= limit {
                    markets.truncate(limit as usize);
                    break;
                }
            }
        }
        Ok(markets)
    }

    pub async fn get_market(&self, slug: &str) -> Result<Market> {
        let path = format!("/v1/market/slug/{slug}");
        let value = self.request::<()>(Method::GET, &path, None).await?;
        let unwrapped = Self::unwrap_envelope(value, "market");
        let dto: MarketDto = serde_json::from_value(unwrapped)?;
        to_market(dto)
    }

    pub async fn get_order_book(&self, slug: &str) -> Result<OrderBook> {
        let path = format!("/v1/markets/{slug}/book");
        let value = self.request::<()>(Method::GET, &path, None).await?;
        let data = value.get("marketData").cloned().unwrap_or(value);
        Ok(serde_json::from_value(data)?)
    }

    pub async fn get_bbo(&self, slug: &str) -> Result<(f64, f64)> {
        let book = self.get_order_book(slug).await?;
        let bid = book
            .bids
            .first()
            .ok_or_else(|| ExchangeError::MalformedPayload("empty bid book".into()))?
            .px
            .as_f64();
        let ask = book
            .offers
            .first()
            .ok_or_else(|| ExchangeError::MalformedPayload("empty ask book".into()))?
            .px
            .as_f64();
        Ok((bid, ask))
    }

    pub async fn get_balances(&self) -> Result<Vec<Balance>> {
        let value = self
            .request::<()>(Method::GET, "/v1/account/balances", None)
            .await?;
        let arr = value
            .get("balances")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        arr.into_iter()
            .map(|e| serde_json::from_value(e).map_err(ExchangeError::from))
            .collect()
    }

    /// Returns every open position, keyed by slug. Spec.md §4.2: this
    /// endpoint does not accept a per-market filter; callers look up the
    /// slug they care about.
    pub async fn get_positions(&self) -> Result<std::collections::HashMap<String, PositionEntry>> {
        let value = self
            .request::<()>(Method::GET, "/v1/account/positions", None)
            .await?;
        let map = value
            .get("positions")
            .cloned()
            .unwrap_or(value)
            .as_object()
            .cloned()
            .ok_or_else(|| {
                ExchangeError::MalformedPayload("positions response is not an object".into())
            })?;
        let mut out = std::collections::HashMap::new();
        for (slug, v) in map {
            out.insert(slug, serde_json::from_value(v)?);
        }
        Ok(out)
    }

    pub async fn submit_order(&self, order: &SubmitOrderRequest) -> Result<SubmitOrderResponse> {
        let value = self
            .request(Method::POST, "/v1/orders", Some(order))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn cancel_order(&self, order_id: &str, slug: &str) -> Result<()> {
        #[derive(Serialize)]
        struct CancelBody<'a> {
            order_id: &'a str,
            slug: &'a str,
        }
        self.request(
            Method::POST,
            "/v1/orders/cancel",
            Some(&CancelBody { order_id, slug }),
        )
        .await?;
        Ok(())
    }

    pub async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus> {
        let path = format!("/v1/orders/{order_id}");
        let value = self.request::<()>(Method::GET, &path, None).await?;
        let unwrapped = Self::unwrap_envelope(value, "order");
        Ok(serde_json::from_value(unwrapped)?)
    }

    /// Convenience close; falls back to an explicit IOC limit is the
    /// Broker's responsibility (this method only wraps the single
    /// convenience endpoint, per spec.md §4.2).
    pub async fn close_position(
        &self,
        slug: &str,
        slippage_bips: u32,
        current_price: f64,
    ) -> Result<SubmitOrderResponse> {
        #[derive(Serialize)]
        struct CloseBody<'a> {
            slug: &'a str,
            slippage_bips: u32,
            current_price: f64,
        }
        let path = format!("/v1/markets/{slug}/close");
        let value = self
            .request(
                Method::POST,
                &path,
                Some(&CloseBody {
                    slug,
                    slippage_bips,
                    current_price,
                }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn rate_limiter_remaining(&self) -> u32 {
        self.rate_limiter.remaining_capacity()
    }
}

fn to_market(dto: MarketDto) -> Result<Market> {
    let state: MarketState = dto
        .state
        .parse()
        .map_err(|_| ExchangeError::MalformedPayload(format!("unknown market state {}", dto.state)))?;
    Ok(Market {
        slug: dto.slug,
        question: dto.question,
        end_time: dto.end_time,
        state,
    })
}

async fn backoff_sleep(attempt: u32) {
    let millis = 250u64 * 2u64.pow(attempt.saturating_sub(1));
    debug!(millis, "backing off before retry");
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

/// Extra `DateTime<Utc>` helper kept here rather than pulled into pm-core:
/// only the exchange client needs "now in millis" framing for logging.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_envelope_falls_through_when_key_absent() {
        let v = serde_json::json!({"slug": "x"});
        let unwrapped = ExchangeClient::unwrap_envelope(v.clone(), "market");
        assert_eq!(unwrapped, v);
    }

    #[test]
    fn unwrap_envelope_unwraps_when_present() {
        let v = serde_json::json!({"market": {"slug": "x"}});
        let unwrapped = ExchangeClient::unwrap_envelope(v, "market");
        assert_eq!(unwrapped, serde_json::json!({"slug": "x"}));
    }
}
