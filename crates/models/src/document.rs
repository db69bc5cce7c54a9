//! Identity-evidence sub-documents attached to a CIP document.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use payrail_core::SubDocumentId;

/// Evidence category of a sub-document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentCategory {
    Social,
    Virtual,
    Physical,
}

impl DocumentCategory {
    /// Wire key of the per-category array inside a CIP document.
    pub fn wire_key(self) -> &'static str {
        match self {
            DocumentCategory::Social => "social_docs",
            DocumentCategory::Virtual => "virtual_docs",
            DocumentCategory::Physical => "physical_docs",
        }
    }
}

/// Behavior shared by the three evidence categories.
///
/// `id`, `status` and `last_updated` are server-assigned and stay empty
/// until the owning CIP document has round-tripped.
pub trait SubDocument: Sized {
    const CATEGORY: DocumentCategory;

    fn doc_type(&self) -> &str;
    fn value(&self) -> Option<&str>;
    fn id(&self) -> Option<&SubDocumentId>;
    fn set_id(&mut self, id: SubDocumentId);
    fn set_status(&mut self, status: String);
    fn set_last_updated(&mut self, at: i64);

    /// Build from a response entry. The server masks document values, so
    /// the local value stays unset.
    fn from_remote(entry: &Value) -> Self;

    /// Wire form `{document_value, document_type}`, plus `id` for an entry
    /// the server already knows. Entries without a local value cannot be
    /// submitted.
    fn to_payload(&self) -> Option<Value> {
        let value = self.value()?;
        let mut payload = json!({
            "document_value": value,
            "document_type": self.doc_type(),
        });
        if let Some(id) = self.id() {
            payload["id"] = json!(id.as_str());
        }
        Some(payload)
    }

    /// Copy the server-assigned fields from a matched response entry.
    fn apply_remote(&mut self, entry: &Value) {
        if let Some(id) = entry.get("id").and_then(Value::as_str) {
            self.set_id(SubDocumentId::new(id));
        }
        if let Some(status) = entry.get("status").and_then(Value::as_str) {
            self.set_status(status.to_owned());
        }
        if let Some(at) = entry.get("last_updated").and_then(Value::as_i64) {
            self.set_last_updated(at);
        }
    }
}

macro_rules! sub_document {
    ($t:ident, $category:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq)]
        pub struct $t {
            pub doc_type: String,
            /// Evidence value. `None` for entries that came back from the
            /// server without ever being constructed locally.
            pub value: Option<String>,
            pub id: Option<SubDocumentId>,
            pub status: Option<String>,
            /// Epoch milliseconds of the server's last change.
            pub last_updated: Option<i64>,
        }

        impl $t {
            pub fn new(doc_type: impl Into<String>, value: impl Into<String>) -> Self {
                Self {
                    doc_type: doc_type.into(),
                    value: Some(value.into()),
                    id: None,
                    status: None,
                    last_updated: None,
                }
            }
        }

        impl SubDocument for $t {
            const CATEGORY: DocumentCategory = $category;

            fn doc_type(&self) -> &str {
                &self.doc_type
            }

            fn value(&self) -> Option<&str> {
                self.value.as_deref()
            }

            fn id(&self) -> Option<&SubDocumentId> {
                self.id.as_ref()
            }

            fn set_id(&mut self, id: SubDocumentId) {
                self.id = Some(id);
            }

            fn set_status(&mut self, status: String) {
                self.status = Some(status);
            }

            fn set_last_updated(&mut self, at: i64) {
                self.last_updated = Some(at);
            }

            fn from_remote(entry: &Value) -> Self {
                Self {
                    doc_type: entry
                        .get("document_type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    value: None,
                    id: entry.get("id").and_then(Value::as_str).map(SubDocumentId::new),
                    status: entry.get("status").and_then(Value::as_str).map(str::to_owned),
                    last_updated: entry.get("last_updated").and_then(Value::as_i64),
                }
            }
        }
    };
}

sub_document!(
    SocialDocument,
    DocumentCategory::Social,
    "Social evidence: profile links and contact points (e.g. `FACEBOOK`, `PHONE_NUMBER`)."
);
sub_document!(
    VirtualDocument,
    DocumentCategory::Virtual,
    "Virtual evidence: government identifiers supplied as plain values (e.g. `SSN`)."
);
sub_document!(
    PhysicalDocument,
    DocumentCategory::Physical,
    "Physical evidence: scanned images supplied as base64 data URIs (e.g. `GOVT_ID`)."
);

impl PhysicalDocument {
    /// Build from raw file bytes, encoding them into a `data:` URI.
    pub fn from_bytes(doc_type: impl Into<String>, mime_type: &str, bytes: &[u8]) -> Self {
        let encoded = BASE64.encode(bytes);
        Self::new(doc_type, format!("data:{mime_type};base64,{encoded}"))
    }
}
