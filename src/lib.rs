//! Enterprise application inventory collector for Microsoft Entra ID.
//!
//! Harvests service principal inventory and sign-in activity from the
//! Microsoft Graph API, applies local allow/deny filtering, and persists a
//! deduplicated, upsertable snapshot into PostgreSQL for later analysis
//! (stale credentials, unused apps, expiring certificates).
//!
//! # Features
//!
//! - `OAuth2` client credentials authentication with token caching
//! - Cursor-based pagination over Graph collections
//! - Retry with `Retry-After` backoff on throttling (429/503)
//! - Per-app enrichment: 30-day sign-in counts and certificate validity
//! - Local hide-tag / owner / publisher exclusion rules
//! - Idempotent batched upserts keyed on the directory object ID

pub mod auth;
pub mod certs;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod graph;
pub mod record;

// Re-exports
pub use auth::TokenCache;
pub use certs::{analyze_certificates, CertStatus, KeyCredential};
pub use collector::{Collector, RecordSink, BATCH_SIZE};
pub use config::{AppConfig, AzureConfig, FilterConfig};
pub use db::AppStore;
pub use error::{Error, Result};
pub use filter::FilterRules;
pub use graph::{GraphClient, PageCursor};
pub use record::ServicePrincipalRecord;
