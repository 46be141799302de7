//! Instance ID service models: token info, topic subscriptions and APNs
//! token import
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::FCMError;
use crate::response::is_retryable_error;
use crate::transport::TransportResponse;

pub const TOPICS_PREFIX: &str = "/topics/";

/// Strip a `/topics/` prefix (any case) from a topic name.
///
/// `"/topics/news"` and `"/TOPICS/news"` both become `"news"`; names without
/// the prefix are returned unchanged.
pub fn normalize_topic(topic: &str) -> &str {
    if !topic.to_lowercase().contains(TOPICS_PREFIX) {
        return topic;
    }
    match topic.rfind('/') {
        Some(idx) => &topic[idx + 1..],
        None => topic,
    }
}

/// Batch error codes worth resubmitting, in addition to the send vocabulary
const BATCH_RETRYABLE_ERRORS: [&str; 2] = ["INTERNAL", "UNAVAILABLE"];

/// Error recorded for a token the reply has no row for
pub const MISSING_RESULT: &str = "MissingResult";

fn is_retryable_batch_error(code: &str) -> bool {
    is_retryable_error(code) || BATCH_RETRYABLE_ERRORS.contains(&code)
}

/// Decode a reply body. Non-200 bodies that are not JSON are handed to
/// `on_text` instead of failing.
pub(crate) fn decode_reply<T, F>(response: &TransportResponse, on_text: F) -> Result<T, FCMError>
where
    T: DeserializeOwned + Default,
    F: FnOnce(&mut T, String),
{
    match serde_json::from_slice::<T>(&response.body) {
        Ok(value) => Ok(value),
        Err(source) if response.status == 200 => Err(FCMError::Decode {
            status_code: response.status,
            retry_after: None,
            source,
        }),
        Err(_) => {
            let mut value = T::default();
            let text = String::from_utf8_lossy(&response.body).trim().to_string();
            if !text.is_empty() {
                on_text(&mut value, text);
            }
            Ok(value)
        }
    }
}

/// Token details returned by `iid/info`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_signer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attest_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<Relations>,
}

/// Relations of a token; only topic subscriptions are reported
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relations {
    #[serde(default)]
    pub topics: HashMap<String, TopicRelation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRelation {
    #[serde(rename = "addDate")]
    pub add_date: String,
}

impl InstanceIdInfo {
    pub fn parse(body: &[u8]) -> Result<Self, FCMError> {
        serde_json::from_slice(body).map_err(|source| FCMError::Decode {
            status_code: 200,
            retry_after: None,
            source,
        })
    }

    /// Names of the topics this token is subscribed to, sorted.
    pub fn subscribed_topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self
            .rel
            .iter()
            .flat_map(|rel| rel.topics.keys().map(String::as_str))
            .collect();
        topics.sort_unstable();
        topics
    }
}

/// Reply to a single-token topic subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub status: String,
    #[serde(skip)]
    pub status_code: u16,
}

impl SubscribeResponse {
    pub fn is_success(&self) -> bool {
        self.status_code == 200 && self.error.is_none()
    }
}

/// Body of `batchAdd` / `batchRemove`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub to: String,
    pub registration_tokens: Vec<String>,
}

impl BatchRequest {
    /// Wrap `tokens` under `/topics/<topic>`. The gateway caps the number
    /// of tokens per call; that limit is left to the caller.
    pub fn new(tokens: &[String], topic: &str) -> Self {
        Self {
            to: format!("{}{}", TOPICS_PREFIX, normalize_topic(topic)),
            registration_tokens: tokens.to_vec(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, FCMError> {
        serde_json::to_vec(self).map_err(FCMError::Encoding)
    }
}

/// One row of a batch reply; an empty row means the token was accepted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRowResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to `batchAdd` / `batchRemove`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Vec<BatchRowResult>,
    #[serde(skip)]
    pub status: String,
    #[serde(skip)]
    pub status_code: u16,
}

/// Tokens of a batch call split by what the caller should do next
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchClassification {
    pub succeeded: Vec<String>,
    /// Worth resubmitting in a later batch
    pub retryable: Vec<(String, String)>,
    /// Permanently refused, e.g. `NOT_FOUND` or `TOO_MANY_TOPICS`
    pub rejected: Vec<(String, String)>,
}

impl BatchClassification {
    pub fn retryable_tokens(&self) -> Vec<String> {
        self.retryable.iter().map(|(token, _)| token.clone()).collect()
    }
}

impl BatchResponse {
    /// Split the tokens of `request` by their row outcome.
    ///
    /// Rows are matched to tokens by position. A server error (status above
    /// 500), or a failed reply without rows, applies to every token. Tokens
    /// past the last row are retryable with [`MISSING_RESULT`].
    pub fn classify(&self, request: &BatchRequest) -> BatchClassification {
        let mut classification = BatchClassification::default();
        let tokens = request.registration_tokens.iter().cloned();

        let envelope_error = if self.status_code > 500 {
            Some(self.error.clone().unwrap_or_else(|| "Unavailable".to_string()))
        } else if self.results.is_empty() && (self.error.is_some() || self.status_code != 200) {
            Some(
                self.error
                    .clone()
                    .unwrap_or_else(|| format!("HTTP {}", self.status_code)),
            )
        } else {
            None
        };

        if let Some(error) = envelope_error {
            let retryable = self.status_code > 500 || is_retryable_batch_error(&error);
            for token in tokens {
                if retryable {
                    classification.retryable.push((token, error.clone()));
                } else {
                    classification.rejected.push((token, error.clone()));
                }
            }
            return classification;
        }

        for (index, token) in tokens.enumerate() {
            match self.results.get(index).map(|row| row.error.as_deref()) {
                Some(None) => classification.succeeded.push(token),
                Some(Some(code)) if is_retryable_batch_error(code) => {
                    classification.retryable.push((token, code.to_string()))
                }
                Some(Some(code)) => classification.rejected.push((token, code.to_string())),
                None => classification
                    .retryable
                    .push((token, MISSING_RESULT.to_string())),
            }
        }
        classification
    }
}

impl fmt::Display for BatchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.results.iter().filter(|r| r.error.is_some()).count();
        write!(
            f,
            "status={} rows={} failed={}",
            self.status_code,
            self.results.len(),
            failed
        )?;
        if let Some(error) = &self.error {
            write!(f, " error={}", error)?;
        }
        Ok(())
    }
}

/// Body of `batchImport`: register APNs tokens with FCM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApnsBatchRequest {
    pub application: String,
    #[serde(default)]
    pub sandbox: bool,
    pub apns_tokens: Vec<String>,
}

impl ApnsBatchRequest {
    pub fn new(application: impl Into<String>, sandbox: bool, apns_tokens: &[String]) -> Self {
        Self {
            application: application.into(),
            sandbox,
            apns_tokens: apns_tokens.to_vec(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, FCMError> {
        serde_json::to_vec(self).map_err(FCMError::Encoding)
    }
}

/// One row of a `batchImport` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApnsImportResult {
    pub apns_token: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_token: Option<String>,
}

impl ApnsImportResult {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }

    pub fn is_retryable(&self) -> bool {
        !self.is_ok() && is_retryable_batch_error(&self.status)
    }
}

/// Reply to `batchImport`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApnsBatchResponse {
    #[serde(default)]
    pub results: Vec<ApnsImportResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub status: String,
    #[serde(skip)]
    pub status_code: u16,
}

impl ApnsBatchResponse {
    /// `(apns_token, registration_token)` pairs for every imported token.
    pub fn registrations(&self) -> Vec<(&str, &str)> {
        self.results
            .iter()
            .filter(|r| r.is_ok())
            .filter_map(|r| {
                r.registration_token
                    .as_deref()
                    .map(|reg| (r.apns_token.as_str(), reg))
            })
            .collect()
    }
}
