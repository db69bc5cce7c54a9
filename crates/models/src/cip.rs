//! CIP compliance document aggregation.
//!
//! A CIP document is a compliance record composed of base KYC fields and
//! three ordered sub-document collections (social, virtual, physical). It
//! has no endpoint of its own: it is created and updated by PATCHing the
//! owning user with a `documents` array, and the server's user response is
//! the source of truth for every identifier and status afterwards.
//!
//! Reconciliation is the delicate part. The server masks document values,
//! may re-issue the document id when contents change, and returns sub-
//! document entries that only carry `id`, `document_type`, `status` and
//! `last_updated`. Local entries are matched by id first and then by type
//! among unclaimed entries.

use serde_json::{Map, Value, json};

use payrail_client::Client;
use payrail_core::{ClientResult, DocumentId, Error};

use crate::document::{PhysicalDocument, SocialDocument, SubDocument, VirtualDocument};
use crate::user::User;

/// A CIP compliance record attached to a user.
///
/// Base fields are `Option` because the server does not echo PII back:
/// after a round-trip, a locally constructed document keeps its fields
/// while a server-originated one only has what the response carried.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CipDocument {
    pub id: Option<DocumentId>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub ip: Option<String>,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub entity_type: Option<String>,
    pub entity_scope: Option<String>,
    pub birth_day: Option<u32>,
    pub birth_month: Option<u32>,
    pub birth_year: Option<i32>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_subdivision: Option<String>,
    pub address_postal_code: Option<String>,
    pub address_country_code: Option<String>,
    /// Server-assigned permission scope of this document.
    pub permission_scope: Option<String>,
    pub social_documents: Vec<SocialDocument>,
    pub virtual_documents: Vec<VirtualDocument>,
    pub physical_documents: Vec<PhysicalDocument>,
}

/// Fields for submitting a new CIP document. All base fields are required
/// by the API; `alias` and the sub-document collections are not.
#[derive(Debug, Clone)]
pub struct CipDocumentCreate {
    pub email: String,
    pub phone_number: String,
    pub ip: String,
    pub name: String,
    pub alias: Option<String>,
    pub entity_type: String,
    pub entity_scope: String,
    pub birth_day: u32,
    pub birth_month: u32,
    pub birth_year: i32,
    pub address_street: String,
    pub address_city: String,
    pub address_subdivision: String,
    pub address_postal_code: String,
    pub address_country_code: String,
    pub social_documents: Vec<SocialDocument>,
    pub virtual_documents: Vec<VirtualDocument>,
    pub physical_documents: Vec<PhysicalDocument>,
}

/// A partial update. Unset fields and empty collections are left out of
/// the patch entirely; supplied sub-documents must carry their server id
/// when they correspond to existing entries.
#[derive(Debug, Clone, Default)]
pub struct CipDocumentUpdate {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub ip: Option<String>,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub entity_type: Option<String>,
    pub entity_scope: Option<String>,
    pub birth_day: Option<u32>,
    pub birth_month: Option<u32>,
    pub birth_year: Option<i32>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_subdivision: Option<String>,
    pub address_postal_code: Option<String>,
    pub address_country_code: Option<String>,
    pub social_documents: Vec<SocialDocument>,
    pub virtual_documents: Vec<VirtualDocument>,
    pub physical_documents: Vec<PhysicalDocument>,
}

impl CipDocument {
    /// Submit a new CIP document for `user`.
    ///
    /// PATCHes the user with the full document payload, then maps the
    /// server's identifiers and statuses back onto the returned document
    /// and refreshes the user from the same response.
    pub async fn create(
        client: &Client,
        user: &mut User,
        create: CipDocumentCreate,
    ) -> ClientResult<CipDocument> {
        let mut doc = CipDocument::from_create(create);
        let payload = json!({ "documents": [doc.create_payload()] });

        tracing::debug!(user_id = %user.id, "submitting CIP document");
        let response = client.users().update(&user.id, &payload).await?;

        doc.apply_user_response(&response)?;
        user.apply_response(&response)?;
        Ok(doc)
    }

    /// Apply a partial update to an already-submitted document.
    ///
    /// Fails with `MissingField("id")` if the document never round-tripped.
    pub async fn update(
        &mut self,
        client: &Client,
        user: &mut User,
        update: CipDocumentUpdate,
    ) -> ClientResult<()> {
        let id = self.id.clone().ok_or(Error::MissingField("id"))?;
        let payload = json!({ "documents": [update_payload(&update, &id)] });

        tracing::debug!(user_id = %user.id, document_id = %id, "updating CIP document");
        let response = client.users().update(&user.id, &payload).await?;

        self.merge_update(update);
        self.apply_user_response(&response)?;
        user.apply_response(&response)?;
        Ok(())
    }

    fn from_create(create: CipDocumentCreate) -> Self {
        Self {
            id: None,
            email: Some(create.email),
            phone_number: Some(create.phone_number),
            ip: Some(create.ip),
            name: Some(create.name),
            alias: create.alias,
            entity_type: Some(create.entity_type),
            entity_scope: Some(create.entity_scope),
            birth_day: Some(create.birth_day),
            birth_month: Some(create.birth_month),
            birth_year: Some(create.birth_year),
            address_street: Some(create.address_street),
            address_city: Some(create.address_city),
            address_subdivision: Some(create.address_subdivision),
            address_postal_code: Some(create.address_postal_code),
            address_country_code: Some(create.address_country_code),
            permission_scope: None,
            social_documents: create.social_documents,
            virtual_documents: create.virtual_documents,
            physical_documents: create.physical_documents,
        }
    }

    /// Full wire payload for initial submission. Birth fields use the
    /// `day`/`month`/`year` wire keys; empty sub-document categories are
    /// omitted.
    pub(crate) fn create_payload(&self) -> Value {
        let mut payload = Map::new();
        insert_str(&mut payload, "email", &self.email);
        insert_str(&mut payload, "phone_number", &self.phone_number);
        insert_str(&mut payload, "ip", &self.ip);
        insert_str(&mut payload, "name", &self.name);
        insert_str(&mut payload, "alias", &self.alias);
        insert_str(&mut payload, "entity_type", &self.entity_type);
        insert_str(&mut payload, "entity_scope", &self.entity_scope);
        if let Some(day) = self.birth_day {
            payload.insert("day".to_owned(), json!(day));
        }
        if let Some(month) = self.birth_month {
            payload.insert("month".to_owned(), json!(month));
        }
        if let Some(year) = self.birth_year {
            payload.insert("year".to_owned(), json!(year));
        }
        insert_str(&mut payload, "address_street", &self.address_street);
        insert_str(&mut payload, "address_city", &self.address_city);
        insert_str(&mut payload, "address_subdivision", &self.address_subdivision);
        insert_str(&mut payload, "address_postal_code", &self.address_postal_code);
        insert_str(&mut payload, "address_country_code", &self.address_country_code);
        insert_docs(&mut payload, &self.social_documents);
        insert_docs(&mut payload, &self.virtual_documents);
        insert_docs(&mut payload, &self.physical_documents);
        Value::Object(payload)
    }

    /// Merge a partial update into local state after the server accepted it.
    fn merge_update(&mut self, update: CipDocumentUpdate) {
        merge_field(&mut self.email, update.email);
        merge_field(&mut self.phone_number, update.phone_number);
        merge_field(&mut self.ip, update.ip);
        merge_field(&mut self.name, update.name);
        merge_field(&mut self.alias, update.alias);
        merge_field(&mut self.entity_type, update.entity_type);
        merge_field(&mut self.entity_scope, update.entity_scope);
        merge_field(&mut self.birth_day, update.birth_day);
        merge_field(&mut self.birth_month, update.birth_month);
        merge_field(&mut self.birth_year, update.birth_year);
        merge_field(&mut self.address_street, update.address_street);
        merge_field(&mut self.address_city, update.address_city);
        merge_field(&mut self.address_subdivision, update.address_subdivision);
        merge_field(&mut self.address_postal_code, update.address_postal_code);
        merge_field(&mut self.address_country_code, update.address_country_code);
        merge_docs(&mut self.social_documents, update.social_documents);
        merge_docs(&mut self.virtual_documents, update.virtual_documents);
        merge_docs(&mut self.physical_documents, update.physical_documents);
    }

    /// Reconcile this document against a user response.
    ///
    /// Locates the matching entry in `documents` (by id, then by name,
    /// then the most recently appended entry), adopts the server's id and
    /// permission scope, and reconciles every sub-document category.
    pub(crate) fn apply_user_response(&mut self, response: &Value) -> ClientResult<()> {
        let documents = response
            .get("documents")
            .and_then(Value::as_array)
            .ok_or(Error::MissingField("documents"))?;

        let entry = self
            .find_entry(documents)
            .ok_or(Error::MissingField("documents"))?
            .clone();

        if let Some(id) = entry.get("id").and_then(Value::as_str) {
            let id = DocumentId::new(id);
            if self.id.as_ref().is_some_and(|old| *old != id) {
                tracing::debug!(%id, "server re-issued CIP document id");
            }
            self.id = Some(id);
        }
        if let Some(scope) = entry.get("permission_scope").and_then(Value::as_str) {
            self.permission_scope = Some(scope.to_owned());
        }
        if let Some(name) = entry.get("name").and_then(Value::as_str) {
            self.name = Some(name.to_owned());
        }

        reconcile(&mut self.social_documents, &entry);
        reconcile(&mut self.virtual_documents, &entry);
        reconcile(&mut self.physical_documents, &entry);
        Ok(())
    }

    fn find_entry<'a>(&self, documents: &'a [Value]) -> Option<&'a Value> {
        if let Some(id) = &self.id {
            if let Some(entry) = documents
                .iter()
                .find(|d| d.get("id").and_then(Value::as_str) == Some(id.as_str()))
            {
                return Some(entry);
            }
        }
        if let Some(name) = &self.name {
            if let Some(entry) = documents
                .iter()
                .find(|d| d.get("name").and_then(Value::as_str) == Some(name.as_str()))
            {
                return Some(entry);
            }
        }
        // A create appends, and the server re-issues ids on update.
        documents.last()
    }

    /// Build a document wholly from a user-response entry.
    pub(crate) fn from_entry(entry: &Value) -> CipDocument {
        let mut doc = CipDocument {
            id: entry.get("id").and_then(Value::as_str).map(DocumentId::new),
            name: entry.get("name").and_then(Value::as_str).map(str::to_owned),
            permission_scope: entry
                .get("permission_scope")
                .and_then(Value::as_str)
                .map(str::to_owned),
            ..Default::default()
        };
        doc.social_documents = remote_docs(entry);
        doc.virtual_documents = remote_docs(entry);
        doc.physical_documents = remote_docs(entry);
        doc
    }
}

/// Partial wire payload: the document id plus only the supplied fields.
fn update_payload(update: &CipDocumentUpdate, id: &DocumentId) -> Value {
    let mut payload = Map::new();
    payload.insert("id".to_owned(), json!(id.as_str()));
    insert_str(&mut payload, "email", &update.email);
    insert_str(&mut payload, "phone_number", &update.phone_number);
    insert_str(&mut payload, "ip", &update.ip);
    insert_str(&mut payload, "name", &update.name);
    insert_str(&mut payload, "alias", &update.alias);
    insert_str(&mut payload, "entity_type", &update.entity_type);
    insert_str(&mut payload, "entity_scope", &update.entity_scope);
    if let Some(day) = update.birth_day {
        payload.insert("day".to_owned(), json!(day));
    }
    if let Some(month) = update.birth_month {
        payload.insert("month".to_owned(), json!(month));
    }
    if let Some(year) = update.birth_year {
        payload.insert("year".to_owned(), json!(year));
    }
    insert_str(&mut payload, "address_street", &update.address_street);
    insert_str(&mut payload, "address_city", &update.address_city);
    insert_str(&mut payload, "address_subdivision", &update.address_subdivision);
    insert_str(&mut payload, "address_postal_code", &update.address_postal_code);
    insert_str(&mut payload, "address_country_code", &update.address_country_code);
    insert_docs(&mut payload, &update.social_documents);
    insert_docs(&mut payload, &update.virtual_documents);
    insert_docs(&mut payload, &update.physical_documents);
    Value::Object(payload)
}

fn insert_str(map: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_owned(), json!(value));
    }
}

fn insert_docs<T: SubDocument>(map: &mut Map<String, Value>, docs: &[T]) {
    let entries: Vec<Value> = docs.iter().filter_map(SubDocument::to_payload).collect();
    if !entries.is_empty() {
        map.insert(T::CATEGORY.wire_key().to_owned(), Value::Array(entries));
    }
}

fn merge_field<T>(field: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *field = update;
    }
}

/// Fold updated sub-documents into the local collection: replace by id,
/// append otherwise. Entries absent from the update are untouched.
fn merge_docs<T: SubDocument>(local: &mut Vec<T>, updated: Vec<T>) {
    for doc in updated {
        let existing = doc
            .id()
            .and_then(|id| local.iter().position(|l| l.id() == Some(id)));
        match existing {
            Some(index) => local[index] = doc,
            None => local.push(doc),
        }
    }
}

/// Match response entries onto local sub-documents and copy the server-
/// assigned fields. Ids win where both sides have them; the rest match by
/// `document_type` among unclaimed entries (the server masks values, so
/// type is all there is to go on). Entries with no local counterpart are
/// appended as server-originated documents.
fn reconcile<T: SubDocument>(local: &mut Vec<T>, entry: &Value) {
    let Some(remote) = entry.get(T::CATEGORY.wire_key()).and_then(Value::as_array) else {
        return;
    };

    let mut claimed = vec![false; remote.len()];
    let mut matched = vec![false; local.len()];

    for (li, doc) in local.iter_mut().enumerate() {
        let Some(id) = doc.id().cloned() else { continue };
        let found = remote
            .iter()
            .position(|r| r.get("id").and_then(Value::as_str) == Some(id.as_str()));
        if let Some(ri) = found {
            if !claimed[ri] {
                claimed[ri] = true;
                matched[li] = true;
                doc.apply_remote(&remote[ri]);
            }
        }
    }

    for (li, doc) in local.iter_mut().enumerate() {
        if matched[li] {
            continue;
        }
        let found = remote.iter().enumerate().find(|(ri, r)| {
            !claimed[*ri]
                && r.get("document_type").and_then(Value::as_str) == Some(doc.doc_type())
        });
        if let Some((ri, r)) = found {
            claimed[ri] = true;
            matched[li] = true;
            doc.apply_remote(r);
        }
    }

    for (ri, r) in remote.iter().enumerate() {
        if !claimed[ri] {
            local.push(T::from_remote(r));
        }
    }
}

fn remote_docs<T: SubDocument>(entry: &Value) -> Vec<T> {
    entry
        .get(T::CATEGORY.wire_key())
        .and_then(Value::as_array)
        .map(|docs| docs.iter().map(T::from_remote).collect())
        .unwrap_or_default()
}
