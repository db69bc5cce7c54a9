//! `/users/{id}/nodes/{id}/trans` endpoint bindings.

use serde_json::Value;

use payrail_core::{ClientResult, NodeId, Page, TransactionId, UserId};

use crate::http::HttpClient;

/// Endpoint bindings for transaction resources under a node.
pub struct TransactionsApi<'a> {
    http: &'a HttpClient,
}

impl<'a> TransactionsApi<'a> {
    pub(crate) fn new(http: &'a HttpClient) -> Self {
        Self { http }
    }

    /// POST `/users/{uid}/nodes/{nid}/trans`.
    ///
    /// Pass an idempotency key so a retried create cannot move money twice.
    pub async fn create(
        &self,
        user_id: &UserId,
        node_id: &NodeId,
        payload: &Value,
        idempotency_key: Option<&str>,
    ) -> ClientResult<Value> {
        let path = format!("/users/{user_id}/nodes/{node_id}/trans");
        match idempotency_key {
            Some(key) => self.http.post_idempotent(&path, payload, key).await,
            None => self.http.post(&path, payload).await,
        }
    }

    /// GET `/users/{uid}/nodes/{nid}/trans/{tid}`.
    pub async fn get(
        &self,
        user_id: &UserId,
        node_id: &NodeId,
        transaction_id: &TransactionId,
    ) -> ClientResult<Value> {
        self.http
            .get(
                &format!("/users/{user_id}/nodes/{node_id}/trans/{transaction_id}"),
                &[],
            )
            .await
    }

    /// GET `/users/{uid}/nodes/{nid}/trans`.
    pub async fn list(
        &self,
        user_id: &UserId,
        node_id: &NodeId,
        page: &Page,
    ) -> ClientResult<Value> {
        self.http
            .get(
                &format!("/users/{user_id}/nodes/{node_id}/trans"),
                &page.to_query(),
            )
            .await
    }

    /// PATCH `/users/{uid}/nodes/{nid}/trans/{tid}`: comment on the
    /// transaction's status.
    pub async fn update(
        &self,
        user_id: &UserId,
        node_id: &NodeId,
        transaction_id: &TransactionId,
        payload: &Value,
    ) -> ClientResult<Value> {
        self.http
            .patch(
                &format!("/users/{user_id}/nodes/{node_id}/trans/{transaction_id}"),
                payload,
            )
            .await
    }

    /// DELETE `/users/{uid}/nodes/{nid}/trans/{tid}`: cancel while still
    /// cancellable.
    pub async fn cancel(
        &self,
        user_id: &UserId,
        node_id: &NodeId,
        transaction_id: &TransactionId,
    ) -> ClientResult<Value> {
        self.http
            .delete(&format!(
                "/users/{user_id}/nodes/{node_id}/trans/{transaction_id}"
            ))
            .await
    }
}
