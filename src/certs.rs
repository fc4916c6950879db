//! Certificate validity analysis over service principal key credentials.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

/// Credential type tag Graph uses for X.509 certificates.
const X509_CERT_TYPE: &str = "AsymmetricX509Cert";

/// A key credential descriptor as returned under `keyCredentials`.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyCredential {
    #[serde(rename = "type")]
    pub credential_type: Option<String>,
    #[serde(rename = "endDateTime")]
    pub end_date_time: Option<String>,
}

/// Outcome of analyzing a service principal's key credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertStatus {
    /// True iff some parseable X.509 credential expires strictly after `now`.
    pub has_valid_certificate: bool,
    /// Minimum parseable X.509 expiry, valid or not.
    pub nearest_expiry: Option<DateTime<Utc>>,
}

/// Computes certificate validity and the nearest expiry at the given instant.
///
/// Credentials that are not X.509 certificates are ignored, as are entries
/// whose expiry fails to parse (logged as warnings, never errors).
#[must_use]
pub fn analyze_certificates(credentials: &[KeyCredential], now: DateTime<Utc>) -> CertStatus {
    let mut has_valid = false;
    let mut nearest_expiry: Option<DateTime<Utc>> = None;

    for credential in credentials {
        if credential.credential_type.as_deref() != Some(X509_CERT_TYPE) {
            continue;
        }
        let Some(expiry) = credential
            .end_date_time
            .as_deref()
            .and_then(parse_graph_datetime)
        else {
            continue;
        };

        if expiry > now {
            has_valid = true;
        }
        if nearest_expiry.is_none_or(|nearest| expiry < nearest) {
            nearest_expiry = Some(expiry);
        }
    }

    CertStatus {
        has_valid_certificate: has_valid,
        nearest_expiry,
    }
}

/// Parses an ISO-8601 timestamp from a Graph payload.
///
/// Returns `None` on failure after logging a warning; malformed timestamps
/// are treated as absent throughout the pipeline.
pub(crate) fn parse_graph_datetime(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            warn!(value, %err, "Unable to parse timestamp");
            None
        }
    }
}
