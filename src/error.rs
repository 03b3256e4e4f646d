use thiserror::Error;

/// Failure to retrieve a listing page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("failed to fetch {url}: status {status}")]
    Status { url: String, status: u16 },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

/// Rejection of a URL submitted by a subscriber
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("subscriber is not entering a URL")]
    NotAwaitingUrl,

    #[error("invalid listing URL: {0}")]
    InvalidUrl(String),
}
