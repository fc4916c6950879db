//! Application configuration loaded from environment variables.
//!
//! Configuration is fail-fast: required variables must be present and valid
//! or startup aborts with a clear error.

use std::collections::HashSet;
use std::env;

use secrecy::SecretString;

use crate::error::{Error, Result};

/// Default Graph API base URL (v1.0 endpoint).
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default Azure AD login endpoint.
pub const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";

/// Default OAuth2 scope for client-credentials tokens.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Server-side filter applied to the service principal listing.
pub const DEFAULT_SP_FILTER: &str = "servicePrincipalType eq 'Application'";

/// Azure AD tenant and client credentials.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    /// Graph API base URL including the API version segment.
    pub graph_base_url: String,
    /// Login endpoint used for token acquisition.
    pub login_url: String,
    /// OAuth2 scope requested for access tokens.
    pub scope: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Local post-retrieval exclusion rules.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    /// Drop service principals carrying the `HideApp` tag.
    pub exclude_hidden: bool,
    /// Owner organization IDs to drop, lowercased.
    pub excluded_owner_org_ids: HashSet<String>,
    /// Publisher names to drop, lowercased.
    pub excluded_publishers: HashSet<String>,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub azure: AzureConfig,
    pub database_url: String,
    /// Sign-in activity lookback window in days.
    pub lookback_days: i64,
    /// Page size for Graph collection requests, clamped to [1, 999].
    pub page_size: u32,
    /// Server-side `$filter` expression for the service principal listing.
    pub sp_filter: String,
    pub filter: FilterConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`
    /// - `DATABASE_URL`
    ///
    /// Optional:
    /// - `GRAPH_BASE_URL`, `GRAPH_LOGIN_URL`, `GRAPH_SCOPE`, `GRAPH_TIMEOUT_SECS`
    /// - `LOOKBACK_DAYS` (default 30), `GRAPH_PAGE_SIZE` (default 100)
    /// - `SP_FILTER`
    /// - `EXCLUDE_HIDDEN_APPS`, `EXCLUDED_OWNER_ORG_IDS`, `EXCLUDED_PUBLISHERS`
    pub fn from_env() -> Result<Self> {
        let azure = AzureConfig {
            tenant_id: required("AZURE_TENANT_ID")?,
            client_id: required("AZURE_CLIENT_ID")?,
            client_secret: SecretString::from(required("AZURE_CLIENT_SECRET")?),
            graph_base_url: optional("GRAPH_BASE_URL", DEFAULT_GRAPH_BASE_URL),
            login_url: optional("GRAPH_LOGIN_URL", DEFAULT_LOGIN_URL),
            scope: optional("GRAPH_SCOPE", DEFAULT_SCOPE),
            timeout_secs: parse_var("GRAPH_TIMEOUT_SECS", 30)?,
        };

        let lookback_days = parse_var("LOOKBACK_DAYS", 30)?;
        let page_size: u32 = parse_var("GRAPH_PAGE_SIZE", 100)?;

        Ok(Self {
            azure,
            database_url: required("DATABASE_URL")?,
            lookback_days,
            page_size: page_size.clamp(1, 999),
            sp_filter: optional("SP_FILTER", DEFAULT_SP_FILTER),
            filter: FilterConfig {
                exclude_hidden: parse_var("EXCLUDE_HIDDEN_APPS", false)?,
                excluded_owner_org_ids: csv_set(&optional("EXCLUDED_OWNER_ORG_IDS", "")),
                excluded_publishers: csv_set(&optional("EXCLUDED_PUBLISHERS", "")),
            },
        })
    }
}

fn required(var: &str) -> Result<String> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::ConfigMissing {
            var: var.to_string(),
        }),
    }
}

fn optional(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(var: &str, default: T) -> Result<T> {
    match env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| Error::ConfigInvalid {
            var: var.to_string(),
            reason: format!("cannot parse {value:?}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Splits a comma-separated list into a lowercased set, dropping blanks.
fn csv_set(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}
