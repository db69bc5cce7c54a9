//! Top-level client facade.

use payrail_core::ClientResult;

use crate::api::{NodesApi, TransactionsApi, UsersApi};
use crate::config::ClientConfig;
use crate::http::HttpClient;

/// Entry point for the SDK.
///
/// Owns the HTTP transport and hands out per-resource endpoint bindings.
/// One user OAuth session is active at a time (established through
/// `users().refresh(..)` or the model-layer `User::authenticate`); the
/// session key rides on every subsequent request until replaced.
pub struct Client {
    http: HttpClient,
}

impl Client {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    pub fn users(&self) -> UsersApi<'_> {
        UsersApi::new(&self.http)
    }

    pub fn nodes(&self) -> NodesApi<'_> {
        NodesApi::new(&self.http)
    }

    pub fn transactions(&self) -> TransactionsApi<'_> {
        TransactionsApi::new(&self.http)
    }

    /// Direct transport access, for session management and raw calls.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }
}
