pub mod error;
pub mod writer;

pub use error::{PersistenceError, Result};
pub use writer::{EventSink, SignalRecord, TradeRecord};
