//! `payrail-models` — typed resource models over the raw endpoint bindings.
//!
//! Each model wraps payload construction for its resource and maps API
//! responses back onto local state. The server is the source of truth for
//! identifiers and status fields after every successful call.

pub mod cip;
pub mod document;
pub mod node;
pub mod transaction;
pub mod user;

pub use cip::{CipDocument, CipDocumentCreate, CipDocumentUpdate};
pub use document::{
    DocumentCategory, PhysicalDocument, SocialDocument, SubDocument, VirtualDocument,
};
pub use node::{Balance, Node, NodeCreate, NodeInfo};
pub use transaction::{Fee, StatusRecord, Transaction, TransactionCreate};
pub use user::{Login, User, UserCreate, UserUpdate};
