//! Error model shared across the SDK.

use serde_json::Value;
use thiserror::Error;

/// Result type used across the SDK.
pub type ClientResult<T> = Result<T, Error>;

/// Error payload returned by the API alongside a non-success status.
///
/// The API wraps failures in an envelope of the form
/// `{"error": {"en": "..."}, "error_code": "...", "http_code": "..."}`.
/// The raw body is preserved so callers can inspect fields the envelope
/// does not cover.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiErrorBody {
    /// HTTP status code of the response.
    pub http_code: u16,
    /// API-specific error code, when the envelope carries one.
    pub error_code: Option<String>,
    /// Human-readable message extracted from the envelope.
    pub message: String,
    /// Raw response body.
    pub response: Value,
}

impl ApiErrorBody {
    fn from_body(http_code: u16, body: Value) -> Self {
        let message = body
            .get("error")
            .and_then(|e| e.get("en"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| body.to_string());
        let error_code = body
            .get("error_code")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Self {
            http_code,
            error_code,
            message,
            response: body,
        }
    }
}

impl core::fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.error_code {
            Some(code) => write!(f, "{} (http {}, code {})", self.message, self.http_code, code),
            None => write!(f, "{} (http {})", self.message, self.http_code),
        }
    }
}

/// SDK-level error.
///
/// One variant per API failure class (mirroring the upstream status-code
/// contract), plus client-side variants for transport and decoding
/// failures.
#[derive(Debug, Error)]
pub enum Error {
    /// 400: malformed request payload.
    #[error("bad request: {0}")]
    BadRequest(ApiErrorBody),

    /// 401: bad gateway credentials or a stale/missing OAuth key.
    #[error("unauthorized: {0}")]
    Unauthorized(ApiErrorBody),

    /// 402: the platform declined the request.
    #[error("request declined: {0}")]
    RequestDeclined(ApiErrorBody),

    /// 404: no resource at this path.
    #[error("not found: {0}")]
    NotFound(ApiErrorBody),

    /// 406: unacceptable content negotiation.
    #[error("not acceptable: {0}")]
    NotAcceptable(ApiErrorBody),

    /// 409: the resource changed underneath this request.
    #[error("conflict: {0}")]
    Conflict(ApiErrorBody),

    /// 415: unsupported media type.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(ApiErrorBody),

    /// 422: the payload parsed but failed upstream validation.
    #[error("unprocessable entity: {0}")]
    UnprocessableEntity(ApiErrorBody),

    /// 429: rate limited.
    #[error("too many requests: {0}")]
    TooManyRequests(ApiErrorBody),

    /// 500.
    #[error("internal server error: {0}")]
    InternalServerError(ApiErrorBody),

    /// 502.
    #[error("bad gateway: {0}")]
    BadGateway(ApiErrorBody),

    /// 503.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(ApiErrorBody),

    /// 504.
    #[error("gateway timeout: {0}")]
    GatewayTimeout(ApiErrorBody),

    /// Any other non-success status.
    #[error("API error: {0}")]
    Api(ApiErrorBody),

    /// The request never produced a response (DNS, connect, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded as JSON.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A field the SDK relies on was absent from the response.
    #[error("missing field in response: {0}")]
    MissingField(&'static str),

    /// The client was constructed with invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A user-scoped operation was attempted without an OAuth session.
    #[error("no authenticated user session")]
    Unauthenticated,
}

impl Error {
    /// Map a non-success response onto the matching error variant.
    pub fn from_response(http_code: u16, body: Value) -> Self {
        let body = ApiErrorBody::from_body(http_code, body);
        match http_code {
            400 => Error::BadRequest(body),
            401 => Error::Unauthorized(body),
            402 => Error::RequestDeclined(body),
            404 => Error::NotFound(body),
            406 => Error::NotAcceptable(body),
            409 => Error::Conflict(body),
            415 => Error::UnsupportedMediaType(body),
            422 => Error::UnprocessableEntity(body),
            429 => Error::TooManyRequests(body),
            500 => Error::InternalServerError(body),
            502 => Error::BadGateway(body),
            503 => Error::ServiceUnavailable(body),
            504 => Error::GatewayTimeout(body),
            _ => Error::Api(body),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The API error envelope, when this error came from a response.
    pub fn api_body(&self) -> Option<&ApiErrorBody> {
        match self {
            Error::BadRequest(b)
            | Error::Unauthorized(b)
            | Error::RequestDeclined(b)
            | Error::NotFound(b)
            | Error::NotAcceptable(b)
            | Error::Conflict(b)
            | Error::UnsupportedMediaType(b)
            | Error::UnprocessableEntity(b)
            | Error::TooManyRequests(b)
            | Error::InternalServerError(b)
            | Error::BadGateway(b)
            | Error::ServiceUnavailable(b)
            | Error::GatewayTimeout(b)
            | Error::Api(b) => Some(b),
            _ => None,
        }
    }

    /// HTTP status code, when this error came from a response.
    pub fn http_code(&self) -> Option<u16> {
        self.api_body().map(|b| b.http_code)
    }
}
