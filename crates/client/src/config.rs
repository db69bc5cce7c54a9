//! Client configuration.

use std::time::Duration;

use uuid::Uuid;

use payrail_core::{ClientResult, Error};

/// Production API endpoint.
pub const PRODUCTION_BASE_URL: &str = "https://api.payrail.com/v1";

/// Sandbox API endpoint (test credentials, no real money movement).
pub const SANDBOX_BASE_URL: &str = "https://uat.api.payrail.com/v1";

/// Retry behavior for failed requests.
///
/// Only network failures and 5xx responses retry; 4xx responses fail
/// immediately. The delay doubles per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Disable retries entirely.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }
}

/// Everything needed to construct a [`crate::Client`].
///
/// `new` targets the sandbox; call [`ClientConfig::production`] to point at
/// the live API. The device fingerprint is generated when not supplied;
/// reuse a stored fingerprint to keep user OAuth sessions stable across
/// processes.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    /// End-user IP forwarded upstream in `X-SP-USER-IP`.
    pub ip_address: String,
    /// Device fingerprint forwarded in `X-SP-USER`.
    pub fingerprint: String,
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        ip_address: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ip_address: ip_address.into(),
            fingerprint: Uuid::new_v4().to_string(),
            base_url: SANDBOX_BASE_URL.to_owned(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn production(mut self) -> Self {
        self.base_url = PRODUCTION_BASE_URL.to_owned();
        self
    }

    pub fn sandbox(mut self) -> Self {
        self.base_url = SANDBOX_BASE_URL.to_owned();
        self
    }

    /// Point at an explicit endpoint (e.g. a local mock in tests).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn validate(&self) -> ClientResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::config("client_id cannot be empty"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(Error::config("client_secret cannot be empty"));
        }
        if self.ip_address.trim().is_empty() {
            return Err(Error::config("ip_address cannot be empty"));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::config("base_url cannot be empty"));
        }
        Ok(())
    }
}
