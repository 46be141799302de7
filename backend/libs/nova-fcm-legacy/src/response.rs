use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::FCMError;
use crate::message::Message;

/// Per-recipient error codes worth another attempt
pub const RETRYABLE_ERRORS: [&str; 2] = ["Unavailable", "InternalServerError"];

/// Whether a gateway error code names a transient condition.
pub fn is_retryable_error(code: &str) -> bool {
    RETRYABLE_ERRORS.contains(&code)
}

/// Outcome for one recipient of a send request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecipientResult {
    Failure {
        error: String,
    },
    Success {
        message_id: String,
        /// Canonical registration id the caller should switch to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registration_id: Option<String>,
    },
}

impl RecipientResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RecipientResult::Success { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            RecipientResult::Failure { error } => is_retryable_error(error),
            RecipientResult::Success { .. } => false,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RecipientResult::Failure { error } => Some(error),
            RecipientResult::Success { .. } => None,
        }
    }
}

/// Gateway reply for a single send attempt
///
/// `status_code` and `retry_after` come from the HTTP layer; the remaining
/// fields come from the JSON body. Multicast and single-device sends fill
/// `results`, topic and condition sends fill `message_id` or `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub ok: bool,
    pub status_code: u16,
    pub retry_after: Option<String>,
    pub multicast_id: i64,
    pub success: u32,
    pub failure: u32,
    pub canonical_ids: u32,
    pub results: Vec<RecipientResult>,
    pub message_id: Option<i64>,
    pub error: Option<String>,
}

/// JSON body of a send reply
#[derive(Debug, Deserialize)]
struct ReplyBody {
    #[serde(default)]
    multicast_id: i64,
    #[serde(default)]
    success: u32,
    #[serde(default)]
    failure: u32,
    #[serde(default)]
    canonical_ids: u32,
    #[serde(default)]
    results: Vec<RecipientResult>,
    message_id: Option<i64>,
    error: Option<String>,
}

impl SendOutcome {
    /// Outcome carrying only the HTTP-level fields, before the body is read.
    pub fn new(status_code: u16, retry_after: Option<String>) -> Self {
        Self {
            ok: status_code == 200,
            status_code,
            retry_after,
            ..Default::default()
        }
    }

    /// Build an outcome from a complete reply.
    ///
    /// A 200 body must be valid JSON. Error replies from the gateway are
    /// frequently plain text, so a non-200 body that does not decode is kept
    /// as the `error` diagnostic instead.
    pub fn from_reply(
        status_code: u16,
        retry_after: Option<String>,
        body: &[u8],
    ) -> Result<Self, FCMError> {
        let mut outcome = Self::new(status_code, retry_after);

        if status_code == 200 {
            outcome.parse_body(body)?;
        } else if outcome.parse_body(body).is_err() {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if !text.is_empty() {
                outcome.error = Some(text);
            }
        }

        Ok(outcome)
    }

    /// Decode a reply body into this outcome.
    ///
    /// On failure the HTTP-level fields are left untouched and reported in
    /// the error.
    pub fn parse_body(&mut self, body: &[u8]) -> Result<(), FCMError> {
        let reply: ReplyBody =
            serde_json::from_slice(body).map_err(|source| FCMError::Decode {
                status_code: self.status_code,
                retry_after: self.retry_after.clone(),
                source,
            })?;

        self.multicast_id = reply.multicast_id;
        self.success = reply.success;
        self.failure = reply.failure;
        self.canonical_ids = reply.canonical_ids;
        self.results = reply.results;
        self.message_id = reply.message_id;
        self.error = reply.error;
        Ok(())
    }

    /// Whether another attempt could succeed.
    ///
    /// Any status above 500 is retryable. A 200 is retryable when at least
    /// one recipient (or the topic) failed with a transient error code, even
    /// if other recipients succeeded.
    pub fn is_retryable(&self) -> bool {
        if self.status_code > 500 {
            return true;
        }
        if self.status_code == 200 {
            return self.results.iter().any(RecipientResult::is_retryable)
                || self.error.as_deref().is_some_and(is_retryable_error);
        }
        false
    }

    /// Classify this outcome for the retry loop.
    pub fn into_result(self) -> Result<SendOutcome, FCMError> {
        if self.is_retryable() {
            Err(FCMError::RetryableDelivery(Box::new(self)))
        } else if self.status_code == 200 {
            Ok(self)
        } else {
            Err(FCMError::PermanentDelivery(Box::new(self)))
        }
    }

    /// Tokens from `message` whose result row carries a transient error,
    /// in request order. These are the ones worth resubmitting.
    pub fn retryable_recipients(&self, message: &Message) -> Vec<String> {
        message
            .registration_ids()
            .into_iter()
            .zip(&self.results)
            .filter(|(_, result)| result.is_retryable())
            .map(|(token, _)| token.to_string())
            .collect()
    }

    /// `(old, new)` registration id pairs for every recipient the gateway
    /// reported a canonical id for.
    pub fn canonical_replacements(&self, message: &Message) -> Vec<(String, String)> {
        message
            .registration_ids()
            .into_iter()
            .zip(&self.results)
            .filter_map(|(token, result)| match result {
                RecipientResult::Success {
                    registration_id: Some(canonical),
                    ..
                } => Some((token.to_string(), canonical.clone())),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status={} ok={} success={} failure={} canonical_ids={}",
            self.status_code, self.ok, self.success, self.failure, self.canonical_ids
        )?;
        if let Some(id) = self.message_id {
            write!(f, " message_id={}", id)?;
        }
        if let Some(error) = &self.error {
            write!(f, " error={}", error)?;
        }
        Ok(())
    }
}
