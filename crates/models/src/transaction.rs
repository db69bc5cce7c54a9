//! Transaction resource model.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use payrail_client::Client;
use payrail_core::{ClientResult, Error, NodeId, Page, TransactionId, UserId};

/// One entry of a transaction's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: String,
    #[serde(default)]
    pub status_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub date: Option<i64>,
}

/// A fee line attached to a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Fee {
    /// Fee amount in the transaction currency; negative charges the
    /// sender.
    pub fee: f64,
    pub note: Option<String>,
    /// Node the fee is paid to.
    pub to_node: Option<NodeId>,
}

impl Fee {
    pub fn new(fee: f64, note: Option<String>, to_node: Option<NodeId>) -> Self {
        Self { fee, note, to_node }
    }

    fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("fee".to_owned(), json!(self.fee));
        if let Some(note) = &self.note {
            payload.insert("note".to_owned(), json!(note));
        }
        if let Some(to_node) = &self.to_node {
            payload.insert("to".to_owned(), json!({ "id": to_node.as_str() }));
        }
        Value::Object(payload)
    }

    fn from_entry(entry: &Value) -> Self {
        Self {
            fee: entry.get("fee").and_then(Value::as_f64).unwrap_or_default(),
            note: entry.get("note").and_then(Value::as_str).map(str::to_owned),
            to_node: entry
                .get("to")
                .and_then(|to| to.get("id"))
                .and_then(Value::as_str)
                .map(NodeId::new),
        }
    }
}

/// A money movement from one node to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    /// Sending node.
    pub node_id: NodeId,
    /// Receiving side, as reported by the server.
    pub to_type: Option<String>,
    pub to_id: Option<NodeId>,
    pub amount: f64,
    pub currency: String,
    pub ip: Option<String>,
    /// Most recent status.
    pub status: Option<StatusRecord>,
    /// Full status history, oldest first.
    pub timeline: Vec<StatusRecord>,
    pub fees: Vec<Fee>,
    pub note: Option<String>,
    pub supp_id: Option<String>,
    /// Processing delay in days, echoed from the create payload.
    pub process_on: Option<i64>,
    /// Epoch milliseconds.
    pub created_on: Option<i64>,
}

/// Fields for creating a transaction from a node.
#[derive(Debug, Clone)]
pub struct TransactionCreate {
    /// Receiving node type, e.g. `ACH-US`.
    pub to_type: String,
    pub to_id: NodeId,
    /// Amount in decimal currency units, as the wire expects.
    pub amount: f64,
    pub currency: String,
    pub ip: String,
    pub note: Option<String>,
    pub supp_id: Option<String>,
    /// Days from now the transaction should process.
    pub process_on: Option<i64>,
    pub fees: Vec<Fee>,
    /// Guards against double-apply when a create is retried.
    pub idempotency_key: Option<String>,
}

impl TransactionCreate {
    pub fn new(
        to_type: impl Into<String>,
        to_id: NodeId,
        amount: f64,
        currency: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            to_type: to_type.into(),
            to_id,
            amount,
            currency: currency.into(),
            ip: ip.into(),
            note: None,
            supp_id: None,
            process_on: None,
            fees: Vec::new(),
            idempotency_key: None,
        }
    }

    /// Attach a generated idempotency key.
    pub fn with_generated_idempotency_key(mut self) -> Self {
        self.idempotency_key = Some(Uuid::new_v4().to_string());
        self
    }

    pub(crate) fn payload(&self) -> Value {
        let mut extra = Map::new();
        extra.insert("ip".to_owned(), json!(self.ip));
        if let Some(note) = &self.note {
            extra.insert("note".to_owned(), json!(note));
        }
        if let Some(supp_id) = &self.supp_id {
            extra.insert("supp_id".to_owned(), json!(supp_id));
        }
        if let Some(process_on) = self.process_on {
            extra.insert("process_on".to_owned(), json!(process_on));
        }

        let mut payload = json!({
            "to": {
                "type": self.to_type,
                "id": self.to_id.as_str(),
            },
            "amount": {
                "amount": self.amount,
                "currency": self.currency,
            },
            "extra": Value::Object(extra),
        });
        if !self.fees.is_empty() {
            payload["fees"] = Value::Array(self.fees.iter().map(Fee::to_payload).collect());
        }

        payload
    }
}

impl Transaction {
    /// Create a transaction from `node_id`.
    pub async fn create(
        client: &Client,
        user_id: &UserId,
        node_id: &NodeId,
        create: TransactionCreate,
    ) -> ClientResult<Transaction> {
        tracing::debug!(%user_id, %node_id, amount = create.amount, "creating transaction");
        let response = client
            .transactions()
            .create(
                user_id,
                node_id,
                &create.payload(),
                create.idempotency_key.as_deref(),
            )
            .await?;
        Transaction::from_response(user_id, node_id, &response)
    }

    /// Fetch a transaction by id.
    pub async fn find(
        client: &Client,
        user_id: &UserId,
        node_id: &NodeId,
        transaction_id: &TransactionId,
    ) -> ClientResult<Transaction> {
        let response = client
            .transactions()
            .get(user_id, node_id, transaction_id)
            .await?;
        Transaction::from_response(user_id, node_id, &response)
    }

    /// List transactions sent from a node.
    pub async fn all(
        client: &Client,
        user_id: &UserId,
        node_id: &NodeId,
        page: Page,
    ) -> ClientResult<Vec<Transaction>> {
        let response = client.transactions().list(user_id, node_id, &page).await?;
        response
            .get("trans")
            .and_then(Value::as_array)
            .ok_or(Error::MissingField("trans"))?
            .iter()
            .map(|entry| Transaction::from_response(user_id, node_id, entry))
            .collect()
    }

    /// Append a comment to the transaction's status.
    pub async fn add_comment(&mut self, client: &Client, comment: &str) -> ClientResult<()> {
        let payload = json!({ "comment": comment });
        let response = client
            .transactions()
            .update(&self.user_id, &self.node_id, &self.id, &payload)
            .await?;
        self.apply_response(&response)
    }

    /// Cancel the transaction while it is still cancellable.
    pub async fn cancel(&mut self, client: &Client) -> ClientResult<()> {
        let response = client
            .transactions()
            .cancel(&self.user_id, &self.node_id, &self.id)
            .await?;
        self.apply_response(&response)
    }

    /// Creation time, when the server reported one.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_on
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    pub(crate) fn from_response(
        user_id: &UserId,
        node_id: &NodeId,
        response: &Value,
    ) -> ClientResult<Transaction> {
        // PATCH/DELETE wrap the resource in a `trans` object.
        let entry = response.get("trans").filter(|t| t.is_object()).unwrap_or(response);

        let id = entry
            .get("_id")
            .and_then(Value::as_str)
            .ok_or(Error::MissingField("_id"))?;

        let mut transaction = Transaction {
            id: TransactionId::new(id),
            user_id: user_id.clone(),
            node_id: node_id.clone(),
            to_type: None,
            to_id: None,
            amount: 0.0,
            currency: String::new(),
            ip: None,
            status: None,
            timeline: Vec::new(),
            fees: Vec::new(),
            note: None,
            supp_id: None,
            process_on: None,
            created_on: None,
        };
        transaction.apply_entry(entry)?;
        Ok(transaction)
    }

    fn apply_response(&mut self, response: &Value) -> ClientResult<()> {
        let entry = response.get("trans").filter(|t| t.is_object()).unwrap_or(response);
        self.apply_entry(entry)
    }

    fn apply_entry(&mut self, entry: &Value) -> ClientResult<()> {
        if let Some(id) = entry.get("_id").and_then(Value::as_str) {
            self.id = TransactionId::new(id);
        }
        if let Some(to) = entry.get("to") {
            if let Some(to_type) = to.get("type").and_then(Value::as_str) {
                self.to_type = Some(to_type.to_owned());
            }
            if let Some(to_id) = to.get("id").and_then(Value::as_str) {
                self.to_id = Some(NodeId::new(to_id));
            }
        }
        if let Some(amount) = entry.get("amount") {
            if let Some(value) = amount.get("amount").and_then(Value::as_f64) {
                self.amount = value;
            }
            if let Some(currency) = amount.get("currency").and_then(Value::as_str) {
                self.currency = currency.to_owned();
            }
        }
        if let Some(status) = entry.get("recent_status") {
            self.status = serde_json::from_value(status.clone())
                .map_err(|e| Error::decode(format!("recent_status: {e}")))
                .map(Some)?;
        }
        if let Some(timeline) = entry.get("timeline") {
            self.timeline = serde_json::from_value(timeline.clone())
                .map_err(|e| Error::decode(format!("timeline: {e}")))?;
        }
        if let Some(fees) = entry.get("fees").and_then(Value::as_array) {
            self.fees = fees.iter().map(Fee::from_entry).collect();
        }
        if let Some(extra) = entry.get("extra") {
            if let Some(ip) = extra.get("ip").and_then(Value::as_str) {
                self.ip = Some(ip.to_owned());
            }
            if let Some(note) = extra.get("note").and_then(Value::as_str) {
                self.note = Some(note.to_owned());
            }
            if let Some(supp_id) = extra.get("supp_id").and_then(Value::as_str) {
                self.supp_id = Some(supp_id.to_owned());
            }
            if let Some(process_on) = extra.get("process_on").and_then(Value::as_i64) {
                self.process_on = Some(process_on);
            }
            if let Some(created_on) = extra.get("created_on").and_then(Value::as_i64) {
                self.created_on = Some(created_on);
            }
        }
        Ok(())
    }
}
