pub mod error;
pub mod stats;
pub mod types;

pub use error::{CoreError, Result};
pub use types::{
    AmountLike, BboSample, Decision, Direction, GamePhase, Market, MarketState, Severity, Signal,
    Side, Strategy,
};
