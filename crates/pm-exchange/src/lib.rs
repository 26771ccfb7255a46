pub mod client;
pub mod error;
pub mod rate_limiter;
pub mod types;

pub use client::{now_ms, ExchangeClient};
pub use error::{ExchangeError, Result};
pub use rate_limiter::RateLimiter;
