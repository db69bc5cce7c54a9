//! Raw resource endpoint bindings.
//!
//! Each binding builds paths and query strings for one API resource and
//! returns the raw JSON body; the typed models in `payrail-models` sit on
//! top of these.

mod nodes;
mod transactions;
mod users;

pub use nodes::NodesApi;
pub use transactions::TransactionsApi;
pub use users::UsersApi;
