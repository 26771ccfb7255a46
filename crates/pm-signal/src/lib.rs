pub mod adaptive;
pub mod engine;

pub use engine::{PrevSignal, SignalEngine, BURST_WINDOW_SECS, BURST_Z_MIN};
