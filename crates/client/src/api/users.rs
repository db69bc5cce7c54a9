//! `/users` endpoint bindings.

use serde_json::{Value, json};

use payrail_core::{ClientResult, Page, UserId};

use crate::http::HttpClient;

/// Endpoint bindings for the `/users` resource, including the
/// `/oauth/{id}` session exchange.
pub struct UsersApi<'a> {
    http: &'a HttpClient,
}

impl<'a> UsersApi<'a> {
    pub(crate) fn new(http: &'a HttpClient) -> Self {
        Self { http }
    }

    /// POST `/users`.
    pub async fn create(&self, payload: &Value) -> ClientResult<Value> {
        self.http.post("/users", payload).await
    }

    /// GET `/users/{id}`.
    pub async fn get(&self, user_id: &UserId) -> ClientResult<Value> {
        self.http.get(&format!("/users/{user_id}"), &[]).await
    }

    /// GET `/users`, optionally filtered by a name/email query.
    pub async fn list(&self, page: &Page, query: Option<&str>) -> ClientResult<Value> {
        let mut params = page.to_query();
        if let Some(query) = query {
            params.push(("query", query.to_owned()));
        }
        self.http.get("/users", &params).await
    }

    /// PATCH `/users/{id}`.
    pub async fn update(&self, user_id: &UserId, payload: &Value) -> ClientResult<Value> {
        self.http.patch(&format!("/users/{user_id}"), payload).await
    }

    /// POST `/oauth/{id}`: exchange a refresh token for an OAuth key.
    ///
    /// On success the new key is installed on the transport, so subsequent
    /// user-scoped calls carry it.
    pub async fn refresh(&self, user_id: &UserId, refresh_token: &str) -> ClientResult<Value> {
        let payload = json!({ "refresh_token": refresh_token });
        let response = self.http.post(&format!("/oauth/{user_id}"), &payload).await?;

        if let Some(key) = response.get("oauth_key").and_then(Value::as_str) {
            self.http.set_oauth_key(key);
        }

        Ok(response)
    }
}
