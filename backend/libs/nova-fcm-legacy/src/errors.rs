use thiserror::Error;

use crate::response::SendOutcome;

/// FCM Client Error Types
#[derive(Error, Debug)]
pub enum FCMError {
    #[error("Failed to encode FCM request: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("FCM request failed: {0}")]
    Transport(String),

    #[error("Failed to parse FCM response (status {status_code}): {source}")]
    Decode {
        status_code: u16,
        retry_after: Option<String>,
        #[source]
        source: serde_json::Error,
    },

    #[error("FCM delivery failed with retryable status {}", .0.status_code)]
    RetryableDelivery(Box<SendOutcome>),

    #[error("FCM delivery rejected with status {}", .0.status_code)]
    PermanentDelivery(Box<SendOutcome>),

    #[error("FCM retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        last: Box<SendOutcome>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("FCM send cancelled")]
    Cancelled,

    #[error("Invalid FCM configuration: {0}")]
    Config(String),
}

impl FCMError {
    /// The last gateway reply attached to this error, if any.
    pub fn outcome(&self) -> Option<&SendOutcome> {
        match self {
            FCMError::RetryableDelivery(outcome) | FCMError::PermanentDelivery(outcome) => {
                Some(outcome)
            }
            FCMError::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }
}

impl From<FCMError> for String {
    fn from(err: FCMError) -> Self {
        err.to_string()
    }
}
