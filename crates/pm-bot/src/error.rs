//! Top-level error aggregation, mirroring the teacher's
//! `hip3-bot::error::AppError` — one variant per sub-crate error plus a
//! couple of string-carrying variants for failures that don't originate
//! from a typed sub-crate error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("signer error: {0}")]
    Signer(#[from] pm_signer::SignerError),

    #[error("exchange error: {0}")]
    Exchange(#[from] pm_exchange::ExchangeError),

    #[error("ws error: {0}")]
    Ws(#[from] pm_ws::WsError),

    #[error("persistence error: {0}")]
    Persistence(#[from] pm_persistence::PersistenceError),

    #[error("preflight error: {0}")]
    Preflight(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shutdown requested")]
    Shutdown,
}

pub type AppResult<T> = std::result::Result<T, AppError>;
