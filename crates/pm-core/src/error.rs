use thiserror::Error;

/// Errors raised by shared domain types. Every other crate's error enum
/// wraps this one via `#[from]` rather than redefining the same cases.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid mid price: {0}")]
    InvalidMid(f64),

    #[error("invalid bbo: best_ask ({ask}) must be > best_bid ({bid})")]
    InvalidBbo { bid: f64, ask: f64 },

    #[error("invalid quantity: {0}")]
    InvalidQty(f64),

    #[error("unknown market state: {0}")]
    UnknownMarketState(String),

    #[error("unrecognized amount shape: {0}")]
    BadAmount(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
