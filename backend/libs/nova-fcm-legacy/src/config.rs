use std::env;
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::errors::FCMError;

pub const DEFAULT_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";
pub const DEFAULT_IID_BASE_URL: &str = "https://iid.googleapis.com";
pub const DEFAULT_MAX_RETRIES: i32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// FCM legacy client configuration
#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub api_key: String,
    pub send_url: String,
    pub iid_base_url: String,
    pub backoff: BackoffPolicy,
    pub max_retries: i32,
    pub request_timeout: Duration,
}

impl FcmConfig {
    /// Create configuration with production endpoints
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            send_url: DEFAULT_SEND_URL.to_string(),
            iid_base_url: DEFAULT_IID_BASE_URL.to_string(),
            backoff: BackoffPolicy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_send_url(mut self, url: impl Into<String>) -> Self {
        self.send_url = url.into();
        self
    }

    pub fn with_iid_base_url(mut self, url: impl Into<String>) -> Self {
        self.iid_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Load from `FCM_*` environment variables (a `.env` file is honored).
    ///
    /// `FCM_API_KEY` is required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, FCMError> {
        dotenvy::dotenv().ok();

        let api_key = env::var("FCM_API_KEY")
            .map_err(|_| FCMError::Config("FCM_API_KEY must be set".to_string()))?;
        let mut config = FcmConfig::new(api_key);

        if let Ok(url) = env::var("FCM_SEND_URL") {
            config = config.with_send_url(url);
        }
        if let Ok(url) = env::var("FCM_IID_BASE_URL") {
            config = config.with_iid_base_url(url);
        }

        let min = env_parse::<u64>("FCM_MIN_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or(config.backoff.min);
        let max = env_parse::<u64>("FCM_MAX_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or(config.backoff.max);
        if min.is_zero() {
            return Err(FCMError::Config(
                "FCM_MIN_BACKOFF_MS must be greater than zero".to_string(),
            ));
        }
        if max < min {
            return Err(FCMError::Config(format!(
                "FCM_MAX_BACKOFF_MS ({:?}) must not be below FCM_MIN_BACKOFF_MS ({:?})",
                max, min
            )));
        }
        config.backoff = BackoffPolicy::new(min, max);

        if let Some(max_retries) = env_parse::<i32>("FCM_MAX_RETRIES")? {
            if max_retries < 0 {
                return Err(FCMError::Config(
                    "FCM_MAX_RETRIES must be non-negative".to_string(),
                ));
            }
            config.max_retries = max_retries;
        }
        if let Some(secs) = env_parse::<u64>("FCM_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub(crate) fn iid_url(&self, path: &str) -> String {
        format!("{}{}", self.iid_base_url, path)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, FCMError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| FCMError::Config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 7] = [
        "FCM_API_KEY",
        "FCM_SEND_URL",
        "FCM_IID_BASE_URL",
        "FCM_MIN_BACKOFF_MS",
        "FCM_MAX_BACKOFF_MS",
        "FCM_MAX_RETRIES",
        "FCM_REQUEST_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = FcmConfig::new("key");
        assert_eq!(config.send_url, DEFAULT_SEND_URL);
        assert_eq!(config.iid_url("/iid/v1:batchAdd"), "https://iid.googleapis.com/iid/v1:batchAdd");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff.min, Duration::from_secs(1));
        assert_eq!(config.backoff.max, Duration::from_secs(10));
    }

    #[test]
    fn test_iid_base_url_trailing_slash() {
        let config = FcmConfig::new("key").with_iid_base_url("http://localhost:8080/");
        assert_eq!(config.iid_url("/iid/info/t"), "http://localhost:8080/iid/info/t");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("FCM_API_KEY", "env-key");
        env::set_var("FCM_SEND_URL", "http://localhost:9000/fcm/send");
        env::set_var("FCM_MIN_BACKOFF_MS", "200");
        env::set_var("FCM_MAX_BACKOFF_MS", "800");
        env::set_var("FCM_MAX_RETRIES", "5");

        let config = FcmConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.api_key, "env-key");
        assert_eq!(config.send_url, "http://localhost:9000/fcm/send");
        assert_eq!(config.backoff.min, Duration::from_millis(200));
        assert_eq!(config.backoff.max, Duration::from_millis(800));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    #[serial]
    fn test_from_env_requires_api_key() {
        clear_env();
        assert!(matches!(FcmConfig::from_env(), Err(FCMError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        clear_env();
        env::set_var("FCM_API_KEY", "env-key");
        env::set_var("FCM_MAX_RETRIES", "-1");
        assert!(matches!(FcmConfig::from_env(), Err(FCMError::Config(_))));

        env::set_var("FCM_MAX_RETRIES", "three");
        assert!(matches!(FcmConfig::from_env(), Err(FCMError::Config(_))));

        env::remove_var("FCM_MAX_RETRIES");
        env::set_var("FCM_MIN_BACKOFF_MS", "0");
        assert!(matches!(FcmConfig::from_env(), Err(FCMError::Config(_))));

        env::set_var("FCM_MIN_BACKOFF_MS", "5000");
        env::set_var("FCM_MAX_BACKOFF_MS", "100");
        assert!(matches!(FcmConfig::from_env(), Err(FCMError::Config(_))));
        clear_env();
    }
}
