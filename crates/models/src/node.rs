//! Node (account/instrument) resource model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use payrail_client::Client;
use payrail_core::{ClientResult, Error, NodeId, Page, UserId};

/// Balance section of a node's `info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: f64,
    pub currency: String,
}

/// Typed view of a node's `info` section. Account and routing numbers come
/// back masked.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default, rename = "account_num")]
    pub account_number: Option<String>,
    #[serde(default, rename = "routing_num")]
    pub routing_number: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub balance: Option<Balance>,
    /// `PERSONAL` or `BUSINESS`.
    #[serde(default, rename = "type")]
    pub account_type: Option<String>,
    /// `CHECKING` or `SAVINGS`.
    #[serde(default, rename = "class")]
    pub account_class: Option<String>,
}

/// A financial account or instrument attached to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub user_id: UserId,
    /// Node type, e.g. `ACH-US`.
    pub node_type: String,
    pub info: NodeInfo,
    /// Open-ended section the API echoes back (`supp_id` and friends).
    pub extra: Value,
    pub is_active: bool,
    /// Server-assigned permission, e.g. `CREDIT-AND-DEBIT`.
    pub allowed: Option<String>,
}

/// Fields for attaching a new node.
#[derive(Debug, Clone)]
pub struct NodeCreate {
    pub node_type: String,
    pub nickname: String,
    pub account_number: Option<String>,
    pub routing_number: Option<String>,
    pub account_type: Option<String>,
    pub account_class: Option<String>,
    pub supp_id: Option<String>,
}

impl NodeCreate {
    pub fn new(node_type: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            nickname: nickname.into(),
            account_number: None,
            routing_number: None,
            account_type: None,
            account_class: None,
            supp_id: None,
        }
    }

    pub(crate) fn payload(&self) -> Value {
        let mut info = Map::new();
        info.insert("nickname".to_owned(), json!(self.nickname));
        if let Some(account_number) = &self.account_number {
            info.insert("account_num".to_owned(), json!(account_number));
        }
        if let Some(routing_number) = &self.routing_number {
            info.insert("routing_num".to_owned(), json!(routing_number));
        }
        if let Some(account_type) = &self.account_type {
            info.insert("type".to_owned(), json!(account_type));
        }
        if let Some(account_class) = &self.account_class {
            info.insert("class".to_owned(), json!(account_class));
        }

        let mut payload = json!({
            "type": self.node_type,
            "info": Value::Object(info),
        });
        if let Some(supp_id) = &self.supp_id {
            payload["extra"] = json!({ "supp_id": supp_id });
        }

        payload
    }
}

impl Node {
    /// Attach a new node to `user_id`.
    pub async fn create(client: &Client, user_id: &UserId, create: NodeCreate) -> ClientResult<Node> {
        tracing::debug!(%user_id, node_type = %create.node_type, "creating node");
        let response = client.nodes().create(user_id, &create.payload()).await?;

        // Create responds with a one-element `nodes` array.
        let entry = response
            .get("nodes")
            .and_then(Value::as_array)
            .and_then(|nodes| nodes.first())
            .ok_or(Error::MissingField("nodes"))?;
        Node::from_response(user_id, entry)
    }

    /// Fetch a node by id.
    pub async fn find(client: &Client, user_id: &UserId, node_id: &NodeId) -> ClientResult<Node> {
        let response = client.nodes().get(user_id, node_id).await?;
        Node::from_response(user_id, &response)
    }

    /// List a user's nodes, optionally filtered by type.
    pub async fn all(
        client: &Client,
        user_id: &UserId,
        page: Page,
        type_filter: Option<&str>,
    ) -> ClientResult<Vec<Node>> {
        let response = client.nodes().list(user_id, &page, type_filter).await?;
        response
            .get("nodes")
            .and_then(Value::as_array)
            .ok_or(Error::MissingField("nodes"))?
            .iter()
            .map(|entry| Node::from_response(user_id, entry))
            .collect()
    }

    /// Verify the micro-deposit amounts sent to this account.
    ///
    /// A wrong pair is a `Conflict` from the server; the node stays
    /// unverified and the call can be repeated.
    pub async fn verify_micro_deposits(
        &mut self,
        client: &Client,
        amounts: &[f64; 2],
    ) -> ClientResult<()> {
        let payload = json!({ "micro": amounts });
        let response = client.nodes().update(&self.user_id, &self.id, &payload).await?;
        self.apply_response(&response)
    }

    /// Deactivate this node. The server keeps the resource but stops
    /// allowing transactions through it.
    pub async fn deactivate(&mut self, client: &Client) -> ClientResult<()> {
        let response = client.nodes().delete(&self.user_id, &self.id).await?;
        if response.get("_id").is_some() {
            self.apply_response(&response)?;
        } else {
            self.is_active = false;
        }
        Ok(())
    }

    /// Supplemental id from the `extra` section, when present.
    pub fn supp_id(&self) -> Option<&str> {
        self.extra.get("supp_id").and_then(Value::as_str)
    }

    pub(crate) fn from_response(user_id: &UserId, entry: &Value) -> ClientResult<Node> {
        let id = entry
            .get("_id")
            .and_then(Value::as_str)
            .ok_or(Error::MissingField("_id"))?;

        let mut node = Node {
            id: NodeId::new(id),
            user_id: user_id.clone(),
            node_type: String::new(),
            info: NodeInfo::default(),
            extra: Value::Null,
            is_active: true,
            allowed: None,
        };
        node.apply_response(entry)?;
        Ok(node)
    }

    fn apply_response(&mut self, entry: &Value) -> ClientResult<()> {
        if let Some(id) = entry.get("_id").and_then(Value::as_str) {
            self.id = NodeId::new(id);
        }
        if let Some(node_type) = entry.get("type").and_then(Value::as_str) {
            self.node_type = node_type.to_owned();
        }
        if let Some(info) = entry.get("info") {
            self.info = serde_json::from_value(info.clone())
                .map_err(|e| Error::decode(format!("node info: {e}")))?;
        }
        if let Some(extra) = entry.get("extra") {
            self.extra = extra.clone();
        }
        if let Some(is_active) = entry.get("is_active").and_then(Value::as_bool) {
            self.is_active = is_active;
        }
        if let Some(allowed) = entry.get("allowed").and_then(Value::as_str) {
            self.allowed = Some(allowed.to_owned());
        }
        Ok(())
    }
}
