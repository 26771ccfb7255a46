//! Tolerant parsing of inbound BBO frames (spec.md §4.3 rules 1-5).
//!
//! Mirrors the teacher's flexible-ingest convention (its `hip3-feed`
//! parser tries several field-name candidates before giving up) and
//! `examples/original_source/basic.py`'s `marketDataLite` shape: a frame is
//! either a heartbeat, a subscription ack (has a `request_id`), or one/many
//! market-data updates carrying `bestBid`/`bestAsk` (or a nested `bbo`, or
//! the top of `bids`/`asks`), `openInterest`, and `state`, in either
//! snake_case or camelCase.

use std::str::FromStr;

use chrono::Utc;
use pm_core::{BboSample, MarketState};
use serde_json::Value;

const SYNTHETIC_HALF_SPREAD: f64 = 0.005;

pub enum Frame {
    Heartbeat,
    SubscriptionAck,
    Data(Vec<BboSample>),
    Unrecognized,
}

pub fn parse_frame(value: &Value) -> Frame {
    if value.get("heartbeat").is_some() {
        return Frame::Heartbeat;
    }
    if value.get("request_id").is_some() && value.get("marketDataLite").is_none() {
        return Frame::SubscriptionAck;
    }

    if let Some(payload) = value.get("marketDataLite").or_else(|| value.get("market_data_lite")) {
        return match payload {
            Value::Array(items) => {
                Frame::Data(items.iter().filter_map(parse_single_update).collect())
            }
            obj @ Value::Object(_) => match parse_single_update(obj) {
                Some(s) => Frame::Data(vec![s]),
                None => Frame::Unrecognized,
            },
            _ => Frame::Unrecognized,
        };
    }

    // Flat single update (no wrapper envelope).
    match parse_single_update(value) {
        Some(s) => Frame::Data(vec![s]),
        None => Frame::Unrecognized,
    }
}

fn first_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| value.get(*k))
}

fn as_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(_) => value
            .get("value")
            .and_then(|v| v.as_f64()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_single_update(value: &Value) -> Option<BboSample> {
    let slug = first_field(value, &["marketSlug", "market_slug", "slug"])?
        .as_str()?
        .to_string();

    let state = first_field(value, &["state", "marketState", "market_state"])
        .and_then(|v| v.as_str())
        .and_then(|s| MarketState::from_str(s).ok())
        .unwrap_or(MarketState::Open);

    let open_interest = first_field(value, &["openInterest", "open_interest"])
        .and_then(as_price)
        .unwrap_or(0.0);

    let explicit_bid = first_field(value, &["bestBid", "best_bid"]).and_then(as_price);
    let explicit_ask = first_field(value, &["bestAsk", "best_ask"]).and_then(as_price);

    let (best_bid, best_ask) = if let (Some(bid), Some(ask)) = (explicit_bid, explicit_ask) {
        (bid, ask)
    } else if let Some(bbo) = value.get("bbo") {
        let bid = first_field(bbo, &["bestBid", "best_bid", "bid"]).and_then(as_price)?;
        let ask = first_field(bbo, &["bestAsk", "best_ask", "ask"]).and_then(as_price)?;
        (bid, ask)
    } else if let (Some(bids), Some(asks)) = (value.get("bids"), value.get("asks")) {
        let bid = bids.as_array()?.first().and_then(top_of_book_price)?;
        let ask = asks.as_array()?.first().and_then(top_of_book_price)?;
        (bid, ask)
    } else if let Some(last) = first_field(value, &["lastTradePx", "last_price", "lastPrice"])
        .and_then(as_price)
    {
        (last - SYNTHETIC_HALF_SPREAD, last + SYNTHETIC_HALF_SPREAD)
    } else {
        return None;
    };

    Some(BboSample {
        slug,
        best_bid,
        best_ask,
        open_interest,
        state,
        received_at: Utc::now(),
    })
}

fn top_of_book_price(level: &Value) -> Option<f64> {
    first_field(level, &["px", "price"]).and_then(as_price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn discards_heartbeat() {
        let v = json!({"heartbeat": true});
        assert!(matches!(parse_frame(&v), Frame::Heartbeat));
    }

    #[test]
    fn discards_subscription_ack() {
        let v = json!({"request_id": "sub_1", "status": "ok"});
        assert!(matches!(parse_frame(&v), Frame::SubscriptionAck));
    }

    #[test]
    fn parses_flat_camelcase_update() {
        let v = json!({
            "marketSlug": "nba-lal-bos",
            "bestBid": 0.40,
            "bestAsk": 0.42,
            "openInterest": 1500,
            "state": "OPEN",
        });
        match parse_frame(&v) {
            Frame::Data(updates) => {
                assert_eq!(updates.len(), 1);
                assert_eq!(updates[0].slug, "nba-lal-bos");
                assert!((updates[0].best_bid - 0.40).abs() < 1e-9);
            }
            _ => panic!("expected data frame"),
        }
    }

    #[test]
    fn parses_wrapped_single_snake_case() {
        let v = json!({
            "market_data_lite": {
                "market_slug": "nfl-kc-sf",
                "best_bid": 0.10,
                "best_ask": 0.12,
                "open_interest": 200,
            }
        });
        match parse_frame(&v) {
            Frame::Data(updates) => assert_eq!(updates.len(), 1),
            _ => panic!("expected data frame"),
        }
    }

    #[test]
    fn parses_batched_array() {
        let v = json!({
            "marketDataLite": [
                {"marketSlug": "a", "bestBid": 0.3, "bestAsk": 0.32},
                {"marketSlug": "b", "bestBid": 0.6, "bestAsk": 0.62},
            ]
        });
        match parse_frame(&v) {
            Frame::Data(updates) => assert_eq!(updates.len(), 2),
            _ => panic!("expected data frame"),
        }
    }

    #[test]
    fn parses_nested_bbo_object() {
        let v = json!({"slug": "x", "bbo": {"bid": 0.2, "ask": 0.25}});
        match parse_frame(&v) {
            Frame::Data(updates) => assert!((updates[0].best_ask - 0.25).abs() < 1e-9),
            _ => panic!("expected data frame"),
        }
    }

    #[test]
    fn parses_book_top_of_book() {
        let v = json!({
            "slug": "x",
            "bids": [{"px": 0.44, "qty": 10}],
            "asks": [{"px": 0.46, "qty": 5}],
        });
        match parse_frame(&v) {
            Frame::Data(updates) => {
                assert!((updates[0].best_bid - 0.44).abs() < 1e-9);
                assert!((updates[0].best_ask - 0.46).abs() < 1e-9);
            }
            _ => panic!("expected data frame"),
        }
    }

    #[test]
    fn synthesizes_spread_from_last_price_only() {
        let v = json!({"slug": "x", "lastTradePx": 0.50});
        match parse_frame(&v) {
            Frame::Data(updates) => {
                assert!((updates[0].best_bid - 0.495).abs() < 1e-9);
                assert!((updates[0].best_ask - 0.505).abs() < 1e-9);
            }
            _ => panic!("expected data frame"),
        }
    }

    #[test]
    fn amount_object_price_accepted() {
        let v = json!({
            "slug": "x",
            "bestBid": {"value": 0.3, "currency": "USD"},
            "bestAsk": 0.32,
        });
        match parse_frame(&v) {
            Frame::Data(updates) => assert!((updates[0].best_bid - 0.3).abs() < 1e-9),
            _ => panic!("expected data frame"),
        }
    }
}
