//! In-process mock of the upstream payment API.
//!
//! Implements just enough of the wire contract to drive the SDK end to
//! end: gateway-credential checks, user CRUD, the OAuth refresh exchange,
//! CIP document aggregation (with server-side id re-issue on update),
//! nodes with micro-deposit verification, and transactions with a status
//! timeline. State lives in memory; ids and timestamps come from a
//! counter so runs are deterministic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

pub const CLIENT_ID: &str = "test_client_id";
pub const CLIENT_SECRET: &str = "test_client_secret";

const CATEGORIES: [&str; 3] = ["social_docs", "virtual_docs", "physical_docs"];

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiError>;
type SharedState = Arc<Mutex<MockState>>;

#[derive(Default)]
struct MockState {
    users: HashMap<String, Value>,
    nodes: HashMap<String, Value>,
    transactions: HashMap<String, Value>,
    /// Issued OAuth keys, keyed by the key itself.
    oauth_keys: HashMap<String, String>,
    /// Idempotency keys seen on transaction creates.
    idempotency: HashMap<String, String>,
    /// Remaining 503s to serve for the flaky user, exercising retries.
    flaky_remaining: u32,
    counter: u64,
}

impl MockState {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn timestamp(&mut self) -> i64 {
        1_700_000_000_000 + (self.next() as i64) * 1_000
    }
}

pub struct TestServer {
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        init_tracing();

        let state: SharedState = Arc::new(Mutex::new(MockState {
            flaky_remaining: 2,
            ..MockState::default()
        }));
        let app = router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/:id", get(get_user).patch(patch_user))
        .route("/oauth/:id", post(oauth))
        .route("/users/:id/nodes", post(create_node).get(list_nodes))
        .route(
            "/users/:id/nodes/:nid",
            get(get_node).patch(patch_node).delete(delete_node),
        )
        .route(
            "/users/:id/nodes/:nid/trans",
            post(create_transaction).get(list_transactions),
        )
        .route(
            "/users/:id/nodes/:nid/trans/:tid",
            get(get_transaction).patch(patch_transaction).delete(delete_transaction),
        )
        .with_state(state)
}

fn error_body(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(json!({
            "error": { "en": message },
            "error_code": status.as_u16().to_string(),
            "http_code": status.as_u16().to_string(),
            "success": false,
        })),
    )
}

fn check_gateway(headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = format!("{CLIENT_ID}|{CLIENT_SECRET}");
    let gateway = headers
        .get("X-SP-GATEWAY")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if gateway != expected {
        return Err(error_body(
            StatusCode::UNAUTHORIZED,
            "invalid gateway credentials",
        ));
    }
    Ok(())
}

/// User-scoped endpoints additionally require an issued OAuth key in the
/// first segment of `X-SP-USER`.
fn check_session(state: &MockState, headers: &HeaderMap) -> Result<(), ApiError> {
    let user_header = headers
        .get("X-SP-USER")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let oauth_key = user_header.split('|').next().unwrap_or_default();
    if oauth_key.is_empty() || !state.oauth_keys.contains_key(oauth_key) {
        return Err(error_body(
            StatusCode::UNAUTHORIZED,
            "authentication required",
        ));
    }
    Ok(())
}

// ---- users ----

async fn create_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    check_gateway(&headers)?;
    let mut state = state.lock().unwrap();

    let n = state.next();
    let id = format!("user_{n}");
    let logins: Vec<Value> = body
        .get("logins")
        .and_then(Value::as_array)
        .map(|logins| {
            logins
                .iter()
                .map(|login| {
                    json!({
                        "email": login.get("email").cloned().unwrap_or(json!("")),
                        "scope": "READ_AND_WRITE",
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let user = json!({
        "_id": id,
        "logins": logins,
        "phone_numbers": body.get("phone_numbers").cloned().unwrap_or(json!([])),
        "legal_names": body.get("legal_names").cloned().unwrap_or(json!([])),
        "extra": body.get("extra").cloned().unwrap_or(json!({})),
        "permission": "UNVERIFIED",
        "refresh_token": format!("refresh_{n}"),
        "documents": [],
    });
    state.users.insert(id, user.clone());
    Ok(Json(user))
}

async fn get_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    check_gateway(&headers)?;
    let mut state = state.lock().unwrap();

    if id == "user_flaky" {
        if state.flaky_remaining > 0 {
            state.flaky_remaining -= 1;
            return Err(error_body(
                StatusCode::SERVICE_UNAVAILABLE,
                "temporarily unavailable",
            ));
        }
        return Ok(Json(json!({
            "_id": "user_flaky",
            "logins": [],
            "phone_numbers": [],
            "legal_names": ["Flaky Fred"],
            "permission": "UNVERIFIED",
            "refresh_token": "refresh_flaky",
            "documents": [],
        })));
    }

    state
        .users
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| error_body(StatusCode::NOT_FOUND, "user not found"))
}

async fn list_users(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    check_gateway(&headers)?;
    let state = state.lock().unwrap();

    let users: Vec<Value> = state
        .users
        .values()
        .filter(|user| match params.get("query") {
            Some(query) => user.to_string().contains(query.as_str()),
            None => true,
        })
        .cloned()
        .collect();

    Ok(Json(json!({
        "users": users,
        "page": 1,
        "page_count": 1,
        "success": true,
    })))
}

async fn patch_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    check_gateway(&headers)?;
    let mut state = state.lock().unwrap();

    if !state.users.contains_key(&id) {
        return Err(error_body(StatusCode::NOT_FOUND, "user not found"));
    }

    if let Some(documents) = body.get("documents").and_then(Value::as_array).cloned() {
        apply_documents(&mut state, &id, &documents);
    } else if let Some(update) = body.get("update") {
        apply_user_update(&mut state, &id, update);
    }

    let user = state.users.get(&id).cloned().unwrap();
    Ok(Json(user))
}

async fn oauth(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    check_gateway(&headers)?;
    let mut state = state.lock().unwrap();

    let supplied = body
        .get("refresh_token")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let current = state
        .users
        .get(&id)
        .and_then(|user| user.get("refresh_token"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| error_body(StatusCode::NOT_FOUND, "user not found"))?;

    if supplied != current {
        return Err(error_body(StatusCode::UNAUTHORIZED, "invalid refresh token"));
    }

    let n = state.next();
    let oauth_key = format!("oauth_{n}");
    state.oauth_keys.insert(oauth_key.clone(), id.clone());

    // Refresh tokens are single-use: rotate on every exchange.
    let rotated = format!("refresh_{}", state.next());
    if let Some(user) = state.users.get_mut(&id) {
        user["refresh_token"] = json!(rotated);
    }

    Ok(Json(json!({
        "oauth_key": oauth_key,
        "expires_in": "7200",
        "user_id": id,
    })))
}

fn apply_user_update(state: &mut MockState, id: &str, update: &Value) {
    let Some(user) = state.users.get_mut(id) else { return };

    if let Some(phone_number) = update.get("phone_number").and_then(Value::as_str) {
        user["phone_numbers"]
            .as_array_mut()
            .unwrap()
            .push(json!(phone_number));
    }
    if let Some(removed) = update.get("remove_phone_number").and_then(Value::as_str) {
        user["phone_numbers"]
            .as_array_mut()
            .unwrap()
            .retain(|value| value != removed);
    }
    if let Some(legal_name) = update.get("legal_name").and_then(Value::as_str) {
        user["legal_names"]
            .as_array_mut()
            .unwrap()
            .push(json!(legal_name));
    }
    if let Some(login) = update.get("login") {
        user["logins"].as_array_mut().unwrap().push(json!({
            "email": login.get("email").cloned().unwrap_or(json!("")),
            "scope": "READ_AND_WRITE",
        }));
    }
    if let Some(removed) = update.get("remove_login") {
        let email = removed.get("email").cloned().unwrap_or(json!(""));
        user["logins"]
            .as_array_mut()
            .unwrap()
            .retain(|login| login["email"] != email);
    }
    if let Some(cip_tag) = update.get("cip_tag") {
        user["extra"]["cip_tag"] = cip_tag.clone();
    }
}

/// CIP document handling. A submission without an `id` appends a new
/// document; one with an `id` updates it in place — and the server
/// re-issues the document id when contents change, which the SDK must
/// adopt.
fn apply_documents(state: &mut MockState, user_id: &str, submitted: &[Value]) {
    for doc in submitted {
        match doc.get("id").and_then(Value::as_str).map(str::to_owned) {
            Some(doc_id) => update_document(state, user_id, &doc_id, doc),
            None => append_document(state, user_id, doc),
        }
    }
}

fn append_document(state: &mut MockState, user_id: &str, submitted: &Value) {
    let doc_id = format!("doc_{}", state.next());
    let mut entry = json!({
        "id": doc_id,
        "name": submitted.get("name").cloned().unwrap_or(json!("")),
        "permission_scope": "UNVERIFIED",
        "social_docs": [],
        "virtual_docs": [],
        "physical_docs": [],
    });

    for category in CATEGORIES {
        if let Some(docs) = submitted.get(category).and_then(Value::as_array) {
            for doc in docs {
                let sub = new_sub_document(state, doc, "SUBMITTED|REVIEWING");
                entry[category].as_array_mut().unwrap().push(sub);
            }
        }
    }

    if let Some(user) = state.users.get_mut(user_id) {
        user["documents"].as_array_mut().unwrap().push(entry);
    }
}

fn update_document(state: &mut MockState, user_id: &str, doc_id: &str, submitted: &Value) {
    let reissued = format!("doc_{}", state.next());

    // Collect the sub-document mutations first; `state` can't be borrowed
    // while the user entry is held.
    let mut new_subs: Vec<(String, Value)> = Vec::new();
    let mut updated_subs: Vec<(String, String, i64)> = Vec::new();
    for category in CATEGORIES {
        if let Some(docs) = submitted.get(category).and_then(Value::as_array) {
            for doc in docs {
                match doc.get("id").and_then(Value::as_str) {
                    Some(sub_id) => {
                        let at = state.timestamp();
                        updated_subs.push((category.to_owned(), sub_id.to_owned(), at));
                    }
                    None => {
                        let sub = new_sub_document(state, doc, "SUBMITTED|REVIEWING");
                        new_subs.push((category.to_owned(), sub));
                    }
                }
            }
        }
    }

    let Some(user) = state.users.get_mut(user_id) else { return };
    let Some(entry) = user["documents"]
        .as_array_mut()
        .unwrap()
        .iter_mut()
        .find(|entry| entry["id"] == doc_id)
    else {
        return;
    };

    entry["id"] = json!(reissued);
    if let Some(name) = submitted.get("name") {
        entry["name"] = name.clone();
    }

    for (category, sub_id, at) in updated_subs {
        if let Some(sub) = entry[category.as_str()]
            .as_array_mut()
            .unwrap()
            .iter_mut()
            .find(|sub| sub["id"] == sub_id.as_str())
        {
            sub["status"] = json!("SUBMITTED|VALID");
            sub["last_updated"] = json!(at);
        }
    }
    for (category, sub) in new_subs {
        entry[category.as_str()].as_array_mut().unwrap().push(sub);
    }
}

fn new_sub_document(state: &mut MockState, submitted: &Value, status: &str) -> Value {
    json!({
        "id": format!("sub_{}", state.next()),
        "document_type": submitted.get("document_type").cloned().unwrap_or(json!("")),
        "status": status,
        "last_updated": state.timestamp(),
    })
}

// ---- nodes ----

async fn create_node(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    check_gateway(&headers)?;
    let mut state = state.lock().unwrap();
    check_session(&state, &headers)?;

    if !state.users.contains_key(&user_id) {
        return Err(error_body(StatusCode::NOT_FOUND, "user not found"));
    }

    let id = format!("node_{}", state.next());
    let mut info = body.get("info").cloned().unwrap_or(json!({}));
    // Account numbers come back masked to the last four digits.
    let masked = info
        .get("account_num")
        .and_then(Value::as_str)
        .map(|account| account[account.len().saturating_sub(4)..].to_owned());
    if let Some(masked) = masked {
        info["account_num"] = json!(masked);
    }
    // Unverified bank accounts start credit-only until micro-deposits clear.
    let allowed = if info.get("account_num").is_some() {
        "CREDIT"
    } else {
        "CREDIT-AND-DEBIT"
    };

    let node = json!({
        "_id": id,
        "user_id": user_id,
        "type": body.get("type").cloned().unwrap_or(json!("")),
        "info": info,
        "extra": body.get("extra").cloned().unwrap_or(json!({})),
        "is_active": true,
        "allowed": allowed,
    });
    state.nodes.insert(id, node.clone());

    Ok(Json(json!({ "success": true, "nodes": [node] })))
}

async fn get_node(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((_user_id, node_id)): Path<(String, String)>,
) -> ApiResult {
    check_gateway(&headers)?;
    let state = state.lock().unwrap();
    check_session(&state, &headers)?;

    state
        .nodes
        .get(&node_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| error_body(StatusCode::NOT_FOUND, "node not found"))
}

async fn list_nodes(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    check_gateway(&headers)?;
    let state = state.lock().unwrap();
    check_session(&state, &headers)?;

    let nodes: Vec<Value> = state
        .nodes
        .values()
        .filter(|node| node["user_id"] == user_id.as_str())
        .filter(|node| match params.get("type") {
            Some(node_type) => node["type"] == node_type.as_str(),
            None => true,
        })
        .cloned()
        .collect();

    Ok(Json(json!({ "nodes": nodes, "success": true })))
}

async fn patch_node(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((_user_id, node_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult {
    check_gateway(&headers)?;
    let mut state = state.lock().unwrap();
    check_session(&state, &headers)?;

    let Some(node) = state.nodes.get_mut(&node_id) else {
        return Err(error_body(StatusCode::NOT_FOUND, "node not found"));
    };

    if let Some(micro) = body.get("micro") {
        if micro == &json!([0.1, 0.1]) {
            node["allowed"] = json!("CREDIT-AND-DEBIT");
        } else {
            return Err(error_body(
                StatusCode::CONFLICT,
                "micro deposits do not match",
            ));
        }
    }

    Ok(Json(node.clone()))
}

async fn delete_node(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((_user_id, node_id)): Path<(String, String)>,
) -> ApiResult {
    check_gateway(&headers)?;
    let mut state = state.lock().unwrap();
    check_session(&state, &headers)?;

    let Some(node) = state.nodes.get_mut(&node_id) else {
        return Err(error_body(StatusCode::NOT_FOUND, "node not found"));
    };
    node["is_active"] = json!(false);
    Ok(Json(node.clone()))
}

// ---- transactions ----

async fn create_transaction(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((_user_id, node_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult {
    check_gateway(&headers)?;
    let mut state = state.lock().unwrap();
    check_session(&state, &headers)?;

    if !state.nodes.contains_key(&node_id) {
        return Err(error_body(StatusCode::NOT_FOUND, "node not found"));
    }

    // Replay of a known idempotency key returns the original resource.
    let idempotency_key = headers
        .get("X-SP-IDEMPOTENCY-KEY")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if let Some(key) = &idempotency_key {
        if let Some(existing) = state.idempotency.get(key) {
            let trans = state.transactions.get(existing).cloned().unwrap();
            return Ok(Json(trans));
        }
    }

    let id = format!("trans_{}", state.next());
    let at = state.timestamp();
    let status = json!({
        "status": "CREATED",
        "status_id": "1",
        "note": "Transaction created.",
        "date": at,
    });
    let mut extra = body.get("extra").cloned().unwrap_or(json!({}));
    extra["created_on"] = json!(at);

    let trans = json!({
        "_id": id,
        "node_id": node_id,
        "amount": body.get("amount").cloned().unwrap_or(json!({})),
        "to": body.get("to").cloned().unwrap_or(json!({})),
        "from": { "id": node_id },
        "extra": extra,
        "fees": body.get("fees").cloned().unwrap_or(json!([])),
        "recent_status": status,
        "timeline": [status],
    });
    state.transactions.insert(id.clone(), trans.clone());
    if let Some(key) = idempotency_key {
        state.idempotency.insert(key, id);
    }

    Ok(Json(trans))
}

async fn get_transaction(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((_user_id, _node_id, trans_id)): Path<(String, String, String)>,
) -> ApiResult {
    check_gateway(&headers)?;
    let state = state.lock().unwrap();
    check_session(&state, &headers)?;

    state
        .transactions
        .get(&trans_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| error_body(StatusCode::NOT_FOUND, "transaction not found"))
}

async fn list_transactions(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((_user_id, node_id)): Path<(String, String)>,
) -> ApiResult {
    check_gateway(&headers)?;
    let state = state.lock().unwrap();
    check_session(&state, &headers)?;

    let trans: Vec<Value> = state
        .transactions
        .values()
        .filter(|t| t["node_id"] == node_id.as_str())
        .cloned()
        .collect();

    Ok(Json(json!({ "trans": trans, "success": true })))
}

async fn patch_transaction(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((_user_id, _node_id, trans_id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> ApiResult {
    check_gateway(&headers)?;
    let mut state = state.lock().unwrap();
    check_session(&state, &headers)?;

    let at = state.timestamp();
    let Some(trans) = state.transactions.get_mut(&trans_id) else {
        return Err(error_body(StatusCode::NOT_FOUND, "transaction not found"));
    };

    if let Some(comment) = body.get("comment").and_then(Value::as_str) {
        let current = trans["recent_status"]["status"].clone();
        let record = json!({
            "status": current,
            "note": comment,
            "date": at,
        });
        trans["timeline"].as_array_mut().unwrap().push(record.clone());
        trans["recent_status"] = record;
    }

    Ok(Json(json!({ "trans": trans.clone(), "success": true })))
}

async fn delete_transaction(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((_user_id, _node_id, trans_id)): Path<(String, String, String)>,
) -> ApiResult {
    check_gateway(&headers)?;
    let mut state = state.lock().unwrap();
    check_session(&state, &headers)?;

    let at = state.timestamp();
    let Some(trans) = state.transactions.get_mut(&trans_id) else {
        return Err(error_body(StatusCode::NOT_FOUND, "transaction not found"));
    };

    let record = json!({
        "status": "CANCELED",
        "note": "Transaction canceled.",
        "date": at,
    });
    trans["timeline"].as_array_mut().unwrap().push(record.clone());
    trans["recent_status"] = record;

    Ok(Json(json!({ "trans": trans.clone(), "success": true })))
}
