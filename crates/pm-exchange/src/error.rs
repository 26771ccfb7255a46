use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("signer error: {0}")]
    Signer(#[from] pm_signer::SignerError),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("exchange returned a malformed payload: {0}")]
    MalformedPayload(String),

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl ExchangeError {
    /// 429 and 5xx are retriable per spec.md §4.2; everything else
    /// (auth 4xx, malformed bodies) is surfaced immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ExchangeError::Status { status, .. } if *status == 429 || *status >= 500)
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
