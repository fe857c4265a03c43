use thiserror::Error;

use beacon_db::StoreError;

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("destination {uri:?} rejected: {reason}")]
    InvalidDestination { uri: String, reason: &'static str },

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("target resolution failed: {0}")]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("federation enqueue failed: {0}")]
    Enqueue(String),
}

impl FederationError {
    pub(crate) fn rejected(uri: &str, reason: &'static str) -> Self {
        Self::InvalidDestination {
            uri: uri.to_string(),
            reason,
        }
    }
}
