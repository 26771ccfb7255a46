use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("exchange error: {0}")]
    Exchange(#[from] pm_exchange::ExchangeError),

    #[error("no quote available for {0}")]
    NoQuote(String),

    #[error("order not filled within the poll deadline")]
    NoFill,

    #[error("close failed after all retries")]
    CloseFailed,
}

pub type Result<T> = std::result::Result<T, BrokerError>;
