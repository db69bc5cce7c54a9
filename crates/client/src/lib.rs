//! `payrail-client` — authenticated HTTP access to the payment API.
//!
//! This crate owns everything between a typed model operation and the wire:
//! configuration, header assembly, retries, status-code → error translation,
//! and the raw per-resource endpoint bindings. The typed resource models
//! live in `payrail-models`.

pub mod api;
pub mod client;
pub mod config;
pub mod http;

pub use client::Client;
pub use config::{ClientConfig, PRODUCTION_BASE_URL, RetryPolicy, SANDBOX_BASE_URL};
pub use http::HttpClient;

/// SDK version reported in the `User-Agent` header.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
