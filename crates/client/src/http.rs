//! HTTP transport: header assembly, retries, error translation.
//!
//! Every call carries the platform gateway credentials plus the active
//! user's OAuth key (empty until a session is established). Request and
//! response bodies are never logged; they carry PII.

use std::sync::RwLock;

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use payrail_core::{ClientResult, Error};

use crate::config::ClientConfig;

/// Gateway credentials header: `client_id|client_secret`.
const HEADER_GATEWAY: &str = "X-SP-GATEWAY";
/// User session header: `oauth_key|fingerprint`.
const HEADER_USER: &str = "X-SP-USER";
/// End-user IP header.
const HEADER_USER_IP: &str = "X-SP-USER-IP";
/// Idempotency key header for create operations.
const HEADER_IDEMPOTENCY: &str = "X-SP-IDEMPOTENCY-KEY";

/// Transport wrapper around `reqwest::Client`.
///
/// Holds the OAuth key of the active user session behind a lock; the key is
/// swapped by the `/oauth/{id}` refresh flow and included in every
/// subsequent request.
pub struct HttpClient {
    http: reqwest::Client,
    config: ClientConfig,
    oauth_key: RwLock<String>,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            oauth_key: RwLock::new(String::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn fingerprint(&self) -> &str {
        &self.config.fingerprint
    }

    /// Install the OAuth key for the active user session.
    pub fn set_oauth_key(&self, oauth_key: impl Into<String>) {
        *self.oauth_key.write().expect("oauth key lock poisoned") = oauth_key.into();
    }

    /// Drop the active user session.
    pub fn clear_oauth_key(&self) {
        self.oauth_key.write().expect("oauth key lock poisoned").clear();
    }

    /// Whether a user OAuth session is currently installed.
    pub fn has_session(&self) -> bool {
        !self.oauth_key.read().expect("oauth key lock poisoned").is_empty()
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> ClientResult<Value> {
        self.request(Method::GET, path, query, None, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> ClientResult<Value> {
        self.request(Method::POST, path, &[], Some(body), None).await
    }

    /// POST with an idempotency key, for create operations that must not
    /// double-apply when retried.
    pub async fn post_idempotent(
        &self,
        path: &str,
        body: &Value,
        idempotency_key: &str,
    ) -> ClientResult<Value> {
        self.request(Method::POST, path, &[], Some(body), Some(idempotency_key))
            .await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> ClientResult<Value> {
        self.request(Method::PATCH, path, &[], Some(body), None).await
    }

    pub async fn delete(&self, path: &str) -> ClientResult<Value> {
        self.request(Method::DELETE, path, &[], None, None).await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        idempotency_key: Option<&str>,
    ) -> ClientResult<Value> {
        let url = format!("{}{}", self.config.base_url, path);
        let headers = self.headers(idempotency_key)?;

        let max_retries = self.config.retry.max_retries;
        let mut delay = self.config.retry.base_delay;

        for attempt in 0..=max_retries {
            let mut req = self.http.request(method.clone(), &url).headers(headers.clone());
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            tracing::debug!(%method, path, attempt, "sending API request");

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return decode_body(resp).await;
                    }

                    if status.is_server_error() && attempt < max_retries {
                        tracing::warn!(%method, path, %status, attempt, "server error, retrying");
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }

                    let err = error_from_response(resp).await;
                    tracing::error!(%method, path, %status, "API request failed");
                    return Err(err);
                }
                Err(e) => {
                    if attempt < max_retries {
                        tracing::warn!(%method, path, error = %e, attempt, "network error, retrying");
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }

                    tracing::error!(%method, path, error = %e, "network error, giving up");
                    return Err(Error::network(e.to_string()));
                }
            }
        }

        Err(Error::network("retry budget exhausted"))
    }

    fn headers(&self, idempotency_key: Option<&str>) -> ClientResult<HeaderMap> {
        let gateway = format!("{}|{}", self.config.client_id, self.config.client_secret);
        let user = format!(
            "{}|{}",
            self.oauth_key.read().expect("oauth key lock poisoned"),
            self.config.fingerprint
        );

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_GATEWAY, header_value(&gateway)?);
        headers.insert(HEADER_USER, header_value(&user)?);
        headers.insert(HEADER_USER_IP, header_value(&self.config.ip_address)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            header_value(&format!("payrail-rust/{}", crate::VERSION))?,
        );
        if let Some(key) = idempotency_key {
            headers.insert(HEADER_IDEMPOTENCY, header_value(key)?);
        }

        Ok(headers)
    }
}

fn header_value(value: &str) -> ClientResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::config(format!("header value contains invalid characters: {value:?}")))
}

async fn decode_body(resp: reqwest::Response) -> ClientResult<Value> {
    let text = resp
        .text()
        .await
        .map_err(|e| Error::network(e.to_string()))?;

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&text).map_err(|e| Error::decode(e.to_string()))
}

async fn error_from_response(resp: reqwest::Response) -> Error {
    let status = resp.status().as_u16();
    let body = match resp.text().await {
        Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Err(_) => Value::Null,
    };
    Error::from_response(status, body)
}
