//! Retry loop for a single logical FCM send
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::errors::FCMError;
use crate::response::SendOutcome;
use crate::transport::{HttpTransport, TransportRequest};

pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Phase of a logical send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Idle,
    Attempting,
    Retrying,
    Succeeded,
    Failed,
}

/// Bookkeeping for one call to [`RetryController::run`]
#[derive(Debug)]
pub struct RetryState {
    pub attempts: u32,
    pub phase: RetryPhase,
    pub last_outcome: Option<SendOutcome>,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempts: 0,
            phase: RetryPhase::Idle,
            last_outcome: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, RetryPhase::Succeeded | RetryPhase::Failed)
    }

    fn transition(&mut self, next: RetryPhase) {
        debug!("FCM send {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.transition(RetryPhase::Attempting);
    }

    fn fail(&mut self, err: FCMError) -> FCMError {
        self.transition(RetryPhase::Failed);
        err
    }

    fn exhausted(&mut self) -> FCMError {
        self.transition(RetryPhase::Failed);
        FCMError::RetriesExhausted {
            attempts: self.attempts,
            last: Box::new(self.last_outcome.take().unwrap_or_default()),
        }
    }
}

/// Parse a `Retry-After` value.
///
/// Accepts whole or fractional seconds (`"120"`, `"1.5"`) and unit-suffixed
/// durations such as `"500ms"`, `"5s"` or `"1m30s"`. Returns `None` for
/// anything unparseable or not strictly positive.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|d| !d.is_zero());
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let number: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_end..];

        total = total.checked_add(Duration::try_from_secs_f64(number * scale).ok()?)?;
    }

    Some(total).filter(|d| !d.is_zero())
}

/// Drives attempts of one prepared request until it succeeds, is rejected,
/// runs out of retries or is cancelled.
pub struct RetryController<'a> {
    transport: &'a dyn HttpTransport,
    policy: &'a BackoffPolicy,
}

impl<'a> RetryController<'a> {
    pub fn new(transport: &'a dyn HttpTransport, policy: &'a BackoffPolicy) -> Self {
        Self { transport, policy }
    }

    /// Send `request` up to `max_retries + 1` times.
    ///
    /// Only replies classified retryable are retried. Transport failures and
    /// undecodable replies end the call immediately. The wait between
    /// attempts is the server's `Retry-After` hint when valid, otherwise the
    /// next backoff delay. `cancel` is honored during the request and the wait.
    pub async fn run(
        &self,
        request: &TransportRequest,
        max_retries: i32,
        cancel: &CancellationToken,
    ) -> Result<SendOutcome, FCMError> {
        if max_retries < 0 {
            return Err(FCMError::InvalidArgument(format!(
                "max_retries must be non-negative, got {}",
                max_retries
            )));
        }

        let max_attempts = max_retries as u32 + 1;
        let mut state = RetryState::new();
        let mut backoff = self.policy.start();

        loop {
            state.begin_attempt();
            debug!(
                "FCM attempt {}/{} to {}",
                state.attempts, max_attempts, request.url
            );

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("FCM send cancelled during attempt {}", state.attempts);
                    return Err(state.fail(FCMError::Cancelled));
                }
                response = self.transport.do_request(request) => response,
            };

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    error!("FCM transport failure on attempt {}: {}", state.attempts, e);
                    return Err(state.fail(e));
                }
            };

            let outcome = match SendOutcome::from_reply(
                response.status,
                response.header(RETRY_AFTER_HEADER),
                &response.body,
            ) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("FCM reply could not be decoded: {}", e);
                    return Err(state.fail(e));
                }
            };

            match outcome.into_result() {
                Ok(outcome) => {
                    state.transition(RetryPhase::Succeeded);
                    info!("FCM send completed after {} attempt(s): {}", state.attempts, outcome);
                    return Ok(outcome);
                }
                Err(FCMError::RetryableDelivery(outcome)) => {
                    let hint = outcome.retry_after.as_deref().and_then(parse_retry_after);
                    state.last_outcome = Some(*outcome);

                    if state.attempts >= max_attempts {
                        error!("FCM retries exhausted after {} attempt(s)", state.attempts);
                        return Err(state.exhausted());
                    }

                    let delay = hint.unwrap_or_else(|| backoff.next_delay());
                    state.transition(RetryPhase::Retrying);
                    warn!(
                        "FCM attempt {}/{} retryable, waiting {:?}",
                        state.attempts, max_attempts, delay
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            warn!("FCM send cancelled during backoff");
                            return Err(state.fail(FCMError::Cancelled));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    warn!("FCM delivery rejected: {}", e);
                    return Err(state.fail(e));
                }
            }
        }
    }
}
