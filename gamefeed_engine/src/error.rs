use thiserror::Error;

/// Failures the engine distinguishes. Remote failures never escape the engine;
/// they are folded into a [`crate::engine::Notice`] instead.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("{0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("authentication required: {0}")]
    Auth(String),
    #[error("another change to this item is still in flight")]
    InFlight,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl FeedError {
    /// Short copy suitable for an inline message next to the affected item.
    pub fn user_message(&self) -> String {
        match self {
            FeedError::Network(_) => "Connection problem, please try again.".into(),
            FeedError::Validation(msg) => msg.clone(),
            FeedError::NotFound(_) => "This item is no longer available.".into(),
            FeedError::Auth(_) => "Please sign in again.".into(),
            FeedError::InFlight => "Please wait for the previous action to finish.".into(),
            FeedError::Storage(_) => "Could not access local storage.".into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, FeedError::Auth(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
