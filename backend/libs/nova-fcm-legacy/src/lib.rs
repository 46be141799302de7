//! Nova FCM Legacy Library
//!
//! This library provides a Firebase Cloud Messaging client for the legacy
//! HTTP API (`fcm/send`, server-key authorization) and the Instance ID
//! service used for topic management.
//!
//! It handles:
//! - Single-device, multicast (registration id list), topic and condition sends
//! - Reply classification: per-recipient transient vs permanent errors
//! - Bounded retries with jittered exponential backoff and `Retry-After` hints
//! - Cooperative cancellation of in-flight sends and backoff waits
//! - Token info lookup, topic subscribe/unsubscribe (single and batch)
//! - APNs token batch import
//!
//! # Example
//!
//! ```rust,no_run
//! use nova_fcm_legacy::{FcmClient, FcmConfig, Message};
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nova_fcm_legacy::FCMError> {
//!     let client = FcmClient::new(FcmConfig::from_env()?)?;
//!     let data = HashMap::from([("msg".to_string(), "Hello World".to_string())]);
//!
//!     let outcome = client.send(&Message::to_topic("news", data)).await?;
//!     println!("{}", outcome);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod errors;
pub mod instance_id;
pub mod message;
pub mod response;
pub mod retry;
pub mod transport;

pub use backoff::{Backoff, BackoffPolicy};
pub use client::FcmClient;
pub use config::FcmConfig;
pub use errors::FCMError;
pub use instance_id::{
    normalize_topic, ApnsBatchRequest, ApnsBatchResponse, ApnsImportResult, BatchClassification,
    BatchRequest, BatchResponse, BatchRowResult, InstanceIdInfo, SubscribeResponse, MISSING_RESULT,
};
pub use message::{Message, NotificationPayload, Priority, Target, MAX_TTL};
pub use response::{is_retryable_error, RecipientResult, SendOutcome, RETRYABLE_ERRORS};
pub use retry::{parse_retry_after, RetryController, RetryPhase, RetryState};
pub use tokio_util::sync::CancellationToken;
pub use transport::{HttpTransport, ReqwestTransport, TransportRequest, TransportResponse};
