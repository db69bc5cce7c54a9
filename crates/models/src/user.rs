//! User resource model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use payrail_client::Client;
use payrail_core::{ClientResult, Error, Page, UserId};

use crate::cip::{CipDocument, CipDocumentCreate};

/// A login credential attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Login {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            scope: None,
        }
    }
}

/// A user of the payment platform.
///
/// Server-assigned fields (`id`, `permission`, `refresh_token`, document
/// ids/statuses) mirror the last successful response; `cip_documents` is
/// rebuilt from every response that carries a `documents` array.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub logins: Vec<Login>,
    pub phone_numbers: Vec<String>,
    pub legal_names: Vec<String>,
    pub note: Option<String>,
    pub supp_id: Option<String>,
    pub is_business: Option<bool>,
    pub cip_tag: Option<u32>,
    /// Server-assigned permission level (e.g. `UNVERIFIED`).
    pub permission: Option<String>,
    pub refresh_token: Option<String>,
    /// OAuth key of the active session, set by `authenticate`.
    pub oauth_key: Option<String>,
    pub oauth_expires_in: Option<String>,
    pub cip_documents: Vec<CipDocument>,
}

/// Fields for registering a new user.
#[derive(Debug, Clone, Default)]
pub struct UserCreate {
    pub logins: Vec<Login>,
    pub phone_numbers: Vec<String>,
    pub legal_names: Vec<String>,
    pub note: Option<String>,
    pub supp_id: Option<String>,
    pub is_business: Option<bool>,
    pub cip_tag: Option<u32>,
}

impl UserCreate {
    pub(crate) fn payload(&self) -> Value {
        let mut payload = json!({
            "logins": self.logins,
            "phone_numbers": self.phone_numbers,
            "legal_names": self.legal_names,
        });

        let mut extra = Map::new();
        if let Some(note) = &self.note {
            extra.insert("note".to_owned(), json!(note));
        }
        if let Some(supp_id) = &self.supp_id {
            extra.insert("supp_id".to_owned(), json!(supp_id));
        }
        if let Some(is_business) = self.is_business {
            extra.insert("is_business".to_owned(), json!(is_business));
        }
        if let Some(cip_tag) = self.cip_tag {
            extra.insert("cip_tag".to_owned(), json!(cip_tag));
        }
        if !extra.is_empty() {
            payload["extra"] = Value::Object(extra);
        }

        payload
    }
}

/// A partial user update. Unset fields are left out of the patch.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    /// Add a login credential.
    pub login: Option<Login>,
    /// Remove the login with this email.
    pub remove_login: Option<String>,
    /// Add a phone number.
    pub phone_number: Option<String>,
    /// Remove this phone number.
    pub remove_phone_number: Option<String>,
    /// Add a legal name.
    pub legal_name: Option<String>,
    pub cip_tag: Option<u32>,
}

impl UserUpdate {
    /// Wire form: `{"refresh_token": ..., "update": {...}}`.
    pub(crate) fn payload(&self, refresh_token: &str) -> Value {
        let mut update = Map::new();
        if let Some(login) = &self.login {
            update.insert("login".to_owned(), json!(login));
        }
        if let Some(email) = &self.remove_login {
            update.insert("remove_login".to_owned(), json!({ "email": email }));
        }
        if let Some(phone_number) = &self.phone_number {
            update.insert("phone_number".to_owned(), json!(phone_number));
        }
        if let Some(phone_number) = &self.remove_phone_number {
            update.insert("remove_phone_number".to_owned(), json!(phone_number));
        }
        if let Some(legal_name) = &self.legal_name {
            update.insert("legal_name".to_owned(), json!(legal_name));
        }
        if let Some(cip_tag) = self.cip_tag {
            update.insert("cip_tag".to_owned(), json!(cip_tag));
        }

        json!({
            "refresh_token": refresh_token,
            "update": Value::Object(update),
        })
    }
}

impl User {
    /// Register a new user.
    pub async fn create(client: &Client, create: UserCreate) -> ClientResult<User> {
        tracing::debug!("creating user");
        let response = client.users().create(&create.payload()).await?;
        User::from_response(&response)
    }

    /// Fetch a user by id.
    pub async fn find(client: &Client, user_id: &UserId) -> ClientResult<User> {
        let response = client.users().get(user_id).await?;
        User::from_response(&response)
    }

    /// List users on the platform.
    pub async fn all(client: &Client, page: Page) -> ClientResult<Vec<User>> {
        Self::list(client, page, None).await
    }

    /// Search users by name or email.
    pub async fn search(client: &Client, query: &str, page: Page) -> ClientResult<Vec<User>> {
        Self::list(client, page, Some(query)).await
    }

    async fn list(client: &Client, page: Page, query: Option<&str>) -> ClientResult<Vec<User>> {
        let response = client.users().list(&page, query).await?;
        response
            .get("users")
            .and_then(Value::as_array)
            .ok_or(Error::MissingField("users"))?
            .iter()
            .map(User::from_response)
            .collect()
    }

    /// Establish an OAuth session for this user.
    ///
    /// Fetches the user for a fresh refresh token (they are single-use
    /// upstream), exchanges it at `/oauth/{id}`, and installs the returned
    /// key on the transport. The session stays active until another user
    /// authenticates on the same client.
    pub async fn authenticate(&mut self, client: &Client) -> ClientResult<()> {
        let response = client.users().get(&self.id).await?;
        self.apply_response(&response)?;

        let refresh_token = self
            .refresh_token
            .clone()
            .ok_or(Error::MissingField("refresh_token"))?;
        let response = client.users().refresh(&self.id, &refresh_token).await?;

        self.oauth_key = response
            .get("oauth_key")
            .and_then(Value::as_str)
            .map(str::to_owned);
        self.oauth_expires_in = response
            .get("expires_in")
            .and_then(Value::as_str)
            .map(str::to_owned);
        if self.oauth_key.is_none() {
            return Err(Error::MissingField("oauth_key"));
        }

        tracing::debug!(user_id = %self.id, "user session established");
        Ok(())
    }

    /// Apply a partial update to this user.
    pub async fn update(&mut self, client: &Client, update: UserUpdate) -> ClientResult<()> {
        let refresh_token = self
            .refresh_token
            .clone()
            .ok_or(Error::MissingField("refresh_token"))?;
        let payload = update.payload(&refresh_token);
        let response = client.users().update(&self.id, &payload).await?;
        self.apply_response(&response)
    }

    /// Submit a new CIP document for this user.
    pub async fn add_cip_document(
        &mut self,
        client: &Client,
        create: CipDocumentCreate,
    ) -> ClientResult<CipDocument> {
        CipDocument::create(client, self, create).await
    }

    /// Build a user from an API response.
    pub fn from_response(response: &Value) -> ClientResult<User> {
        let id = response
            .get("_id")
            .and_then(Value::as_str)
            .ok_or(Error::MissingField("_id"))?;

        let mut user = User {
            id: UserId::new(id),
            logins: Vec::new(),
            phone_numbers: Vec::new(),
            legal_names: Vec::new(),
            note: None,
            supp_id: None,
            is_business: None,
            cip_tag: None,
            permission: None,
            refresh_token: None,
            oauth_key: None,
            oauth_expires_in: None,
            cip_documents: Vec::new(),
        };
        user.apply_response(response)?;
        Ok(user)
    }

    /// Map a user response onto this instance. Fields the response does
    /// not carry are left alone.
    pub(crate) fn apply_response(&mut self, response: &Value) -> ClientResult<()> {
        if let Some(id) = response.get("_id").and_then(Value::as_str) {
            self.id = UserId::new(id);
        }
        if let Some(logins) = response.get("logins") {
            self.logins = serde_json::from_value(logins.clone())
                .map_err(|e| Error::decode(format!("logins: {e}")))?;
        }
        if let Some(values) = response.get("phone_numbers").and_then(Value::as_array) {
            self.phone_numbers = values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect();
        }
        if let Some(values) = response.get("legal_names").and_then(Value::as_array) {
            self.legal_names = values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect();
        }
        if let Some(permission) = response.get("permission").and_then(Value::as_str) {
            self.permission = Some(permission.to_owned());
        }
        if let Some(token) = response.get("refresh_token").and_then(Value::as_str) {
            self.refresh_token = Some(token.to_owned());
        }
        if let Some(extra) = response.get("extra") {
            if let Some(note) = extra.get("note").and_then(Value::as_str) {
                self.note = Some(note.to_owned());
            }
            if let Some(supp_id) = extra.get("supp_id").and_then(Value::as_str) {
                self.supp_id = Some(supp_id.to_owned());
            }
            if let Some(is_business) = extra.get("is_business").and_then(Value::as_bool) {
                self.is_business = Some(is_business);
            }
            if let Some(cip_tag) = extra.get("cip_tag").and_then(Value::as_u64) {
                self.cip_tag = Some(cip_tag as u32);
            }
        }
        if let Some(documents) = response.get("documents").and_then(Value::as_array) {
            self.cip_documents = documents.iter().map(CipDocument::from_entry).collect();
        }
        Ok(())
    }
}
