//! The persisted service principal snapshot record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::certs::parse_graph_datetime;
use crate::error::{Error, Result};

/// Service principal fields requested from Graph. `publisherName` is used
/// only by the local filter and is not persisted.
pub const SP_SELECT_FIELDS: &str = "id,appId,displayName,accountEnabled,keyCredentials,\
    appDescription,appOwnerOrganizationId,appRoleAssignmentRequired,createdDateTime,\
    description,homepage,loginUrl,notes,notificationEmailAddresses,\
    samlSingleSignOnSettings,preferredSingleSignOnMode,tags,publisherName";

/// One enterprise application snapshot row.
///
/// Constructed once per entity per run and immutable afterwards; persisted
/// via upsert keyed on `app_object_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePrincipalRecord {
    /// Directory object ID, the primary key.
    pub app_object_id: String,
    /// Application (client) ID.
    pub app_id: Option<String>,
    pub display_name: String,
    pub account_enabled: bool,
    /// Sign-in events counted over the configured lookback window.
    pub user_signins_last_30_days: i64,
    pub has_valid_certificate: bool,
    pub nearest_cert_expiry: Option<DateTime<Utc>>,
    /// The run-wide snapshot instant; identical for every record of a run.
    pub sampled_until: DateTime<Utc>,
    pub app_description: Option<String>,
    pub app_owner_organization_id: Option<String>,
    pub app_role_assignment_required: Option<bool>,
    pub created_datetime: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub login_url: Option<String>,
    pub notes: Option<String>,
    pub notification_emails: Option<Vec<String>>,
    pub saml_sso_settings: Option<Value>,
    pub preferred_single_sign_on_mode: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ServicePrincipalRecord {
    /// Maps the descriptive fields of a raw service principal payload.
    ///
    /// The computed enrichment fields (`user_signins_last_30_days`,
    /// certificate status) start zeroed; the collector fills them in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedEntity`] when the payload has no `id`;
    /// this aborts the whole run, there is no per-entity recovery.
    pub fn from_json(value: &Value, sampled_until: DateTime<Utc>) -> Result<Self> {
        let app_object_id = value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::MalformedEntity("service principal payload missing id".into()))?
            .to_string();

        Ok(Self {
            app_object_id,
            app_id: string_field(value, "appId"),
            display_name: value
                .get("displayName")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string(),
            account_enabled: value
                .get("accountEnabled")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            user_signins_last_30_days: 0,
            has_valid_certificate: false,
            nearest_cert_expiry: None,
            sampled_until,
            app_description: string_field(value, "appDescription"),
            app_owner_organization_id: string_field(value, "appOwnerOrganizationId"),
            app_role_assignment_required: value
                .get("appRoleAssignmentRequired")
                .and_then(Value::as_bool),
            created_datetime: value
                .get("createdDateTime")
                .and_then(Value::as_str)
                .and_then(parse_graph_datetime),
            description: string_field(value, "description"),
            homepage: string_field(value, "homepage"),
            login_url: string_field(value, "loginUrl"),
            notes: string_field(value, "notes"),
            notification_emails: string_array_field(value, "notificationEmailAddresses"),
            saml_sso_settings: value
                .get("samlSingleSignOnSettings")
                .filter(|v| !v.is_null())
                .cloned(),
            preferred_single_sign_on_mode: string_field(value, "preferredSingleSignOnMode"),
            tags: string_array_field(value, "tags"),
        })
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(String::from)
}

fn string_array_field(value: &Value, field: &str) -> Option<Vec<String>> {
    value.get(field).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect()
    })
}
