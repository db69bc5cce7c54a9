//! `/users/{id}/nodes` endpoint bindings.

use serde_json::Value;

use payrail_core::{ClientResult, NodeId, Page, UserId};

use crate::http::HttpClient;

/// Endpoint bindings for node (account/instrument) resources.
pub struct NodesApi<'a> {
    http: &'a HttpClient,
}

impl<'a> NodesApi<'a> {
    pub(crate) fn new(http: &'a HttpClient) -> Self {
        Self { http }
    }

    /// POST `/users/{uid}/nodes`.
    pub async fn create(&self, user_id: &UserId, payload: &Value) -> ClientResult<Value> {
        self.http.post(&format!("/users/{user_id}/nodes"), payload).await
    }

    /// GET `/users/{uid}/nodes/{nid}`.
    pub async fn get(&self, user_id: &UserId, node_id: &NodeId) -> ClientResult<Value> {
        self.http
            .get(&format!("/users/{user_id}/nodes/{node_id}"), &[])
            .await
    }

    /// GET `/users/{uid}/nodes`, optionally filtered by node type.
    pub async fn list(
        &self,
        user_id: &UserId,
        page: &Page,
        type_filter: Option<&str>,
    ) -> ClientResult<Value> {
        let mut params = page.to_query();
        if let Some(node_type) = type_filter {
            params.push(("type", node_type.to_owned()));
        }
        self.http.get(&format!("/users/{user_id}/nodes"), &params).await
    }

    /// PATCH `/users/{uid}/nodes/{nid}`: micro-deposit verification.
    pub async fn update(
        &self,
        user_id: &UserId,
        node_id: &NodeId,
        payload: &Value,
    ) -> ClientResult<Value> {
        self.http
            .patch(&format!("/users/{user_id}/nodes/{node_id}"), payload)
            .await
    }

    /// DELETE `/users/{uid}/nodes/{nid}`.
    pub async fn delete(&self, user_id: &UserId, node_id: &NodeId) -> ClientResult<Value> {
        self.http
            .delete(&format!("/users/{user_id}/nodes/{node_id}"))
            .await
    }
}
