use reqwest::Method;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FcmConfig;
use crate::errors::FCMError;
use crate::instance_id::{
    decode_reply, normalize_topic, ApnsBatchRequest, ApnsBatchResponse, BatchRequest,
    BatchResponse, InstanceIdInfo, SubscribeResponse,
};
use crate::message::Message;
use crate::response::SendOutcome;
use crate::retry::RetryController;
use crate::transport::{HttpTransport, ReqwestTransport, TransportRequest, TransportResponse};

const BATCH_ADD_PATH: &str = "/iid/v1:batchAdd";
const BATCH_REMOVE_PATH: &str = "/iid/v1:batchRemove";
const BATCH_IMPORT_PATH: &str = "/iid/v1:batchImport";

/// Firebase Cloud Messaging legacy HTTP client
///
/// Sends notifications through the legacy `fcm/send` endpoint with bounded
/// retries, and manages topic subscriptions through the Instance ID service.
/// Cheap to share: all sends go through one pooled transport.
#[derive(Clone)]
pub struct FcmClient {
    config: FcmConfig,
    transport: Arc<dyn HttpTransport>,
}

impl FcmClient {
    /// Create a client backed by a pooled `reqwest::Client`
    pub fn new(config: FcmConfig) -> Result<Self, FCMError> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over any transport (mocks, custom pools)
    pub fn with_transport(config: FcmConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &FcmConfig {
        &self.config
    }

    /// Send with the configured retry budget.
    pub async fn send(&self, message: &Message) -> Result<SendOutcome, FCMError> {
        self.send_with_retries(message, self.config.max_retries)
            .await
    }

    /// Send with an explicit retry budget (`0` means a single attempt).
    pub async fn send_with_retries(
        &self,
        message: &Message,
        max_retries: i32,
    ) -> Result<SendOutcome, FCMError> {
        self.send_with_cancel(message, max_retries, &CancellationToken::new())
            .await
    }

    /// Send, giving up with [`FCMError::Cancelled`] as soon as `cancel` fires.
    pub async fn send_with_cancel(
        &self,
        message: &Message,
        max_retries: i32,
        cancel: &CancellationToken,
    ) -> Result<SendOutcome, FCMError> {
        let body = message.encode()?;
        let request = TransportRequest::new(Method::POST, &self.config.send_url, &self.config.api_key)?
            .with_body(body);

        debug!(
            "Sending FCM message to {} target (max retries: {})",
            message.target().kind(),
            max_retries
        );

        RetryController::new(self.transport.as_ref(), &self.config.backoff)
            .run(&request, max_retries, cancel)
            .await
    }

    /// Look up what the Instance ID service knows about a token.
    pub async fn get_info(
        &self,
        instance_id_token: &str,
        with_details: bool,
    ) -> Result<InstanceIdInfo, FCMError> {
        let mut path = format!("/iid/info/{}", instance_id_token);
        if with_details {
            path.push_str("?details=true");
        }

        let response = self.exchange(Method::GET, &path, None).await?;
        decode_reply(&response, |info: &mut InstanceIdInfo, text| {
            info.error = Some(text)
        })
    }

    /// Subscribe one token to a topic.
    pub async fn subscribe_to_topic(
        &self,
        instance_id_token: &str,
        topic: &str,
    ) -> Result<SubscribeResponse, FCMError> {
        let path = format!(
            "/iid/v1/{}/rel/topics/{}",
            instance_id_token,
            normalize_topic(topic)
        );

        let response = self.exchange(Method::POST, &path, None).await?;
        let mut result = decode_reply(&response, |r: &mut SubscribeResponse, text| {
            r.error = Some(text)
        })?;
        result.status = response.status_line();
        result.status_code = response.status;

        if !result.is_success() {
            warn!(
                "Topic subscription for {} failed: {} {:?}",
                topic, result.status, result.error
            );
        }
        Ok(result)
    }

    /// Subscribe many tokens to a topic in one call.
    ///
    /// Single-shot; use [`BatchResponse::classify`] to pick the tokens worth
    /// resubmitting.
    pub async fn batch_subscribe(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<BatchResponse, FCMError> {
        self.batch(BATCH_ADD_PATH, &BatchRequest::new(tokens, topic))
            .await
    }

    /// Unsubscribe many tokens from a topic in one call.
    pub async fn batch_unsubscribe(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<BatchResponse, FCMError> {
        self.batch(BATCH_REMOVE_PATH, &BatchRequest::new(tokens, topic))
            .await
    }

    /// Exchange APNs device tokens for FCM registration tokens.
    pub async fn apns_batch_import(
        &self,
        request: &ApnsBatchRequest,
    ) -> Result<ApnsBatchResponse, FCMError> {
        let response = self
            .exchange(Method::POST, BATCH_IMPORT_PATH, Some(request.encode()?))
            .await?;

        let mut result = decode_reply(&response, |r: &mut ApnsBatchResponse, text| {
            r.error = Some(text)
        })?;
        result.status = response.status_line();
        result.status_code = response.status;

        info!(
            "APNs batch import for {}: {} of {} tokens imported",
            request.application,
            result.registrations().len(),
            request.apns_tokens.len()
        );
        Ok(result)
    }

    async fn batch(
        &self,
        path: &str,
        request: &BatchRequest,
    ) -> Result<BatchResponse, FCMError> {
        let response = self
            .exchange(Method::POST, path, Some(request.encode()?))
            .await?;

        let mut result = decode_reply(&response, |r: &mut BatchResponse, text| {
            r.error = Some(text)
        })?;
        result.status = response.status_line();
        result.status_code = response.status;

        info!("Batch {} for {}: {}", path, request.to, result);
        Ok(result)
    }

    async fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse, FCMError> {
        let mut request =
            TransportRequest::new(method, self.config.iid_url(path), &self.config.api_key)?;
        if let Some(body) = body {
            request = request.with_body(body);
        }
        self.transport.do_request(&request).await
    }
}
