//! Local post-retrieval filtering of service principals.
//!
//! These rules run client-side after the full listing is retrieved, and are
//! independent of any server-side `$filter` expression. An entity is dropped
//! if any rule matches; empty blocklists match nothing.

use std::collections::HashSet;

use serde_json::Value;

use crate::config::FilterConfig;

/// Tag Microsoft Entra uses to hide an application from user portals.
const HIDE_APP_TAG: &str = "HideApp";

/// Compiled local exclusion rules.
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    exclude_hidden: bool,
    owner_blocklist: HashSet<String>,
    publisher_blocklist: HashSet<String>,
}

impl FilterRules {
    /// Builds rules from configuration; blocklists are expected lowercased.
    #[must_use]
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            exclude_hidden: config.exclude_hidden,
            owner_blocklist: config.excluded_owner_org_ids.clone(),
            publisher_blocklist: config.excluded_publishers.clone(),
        }
    }

    /// Retains entities not matched by any exclusion rule.
    #[must_use]
    pub fn apply(&self, entities: Vec<Value>) -> Vec<Value> {
        entities
            .into_iter()
            .filter(|entity| !self.is_excluded(entity))
            .collect()
    }

    fn is_excluded(&self, entity: &Value) -> bool {
        self.has_hide_tag(entity) || self.owner_blocked(entity) || self.publisher_blocked(entity)
    }

    fn has_hide_tag(&self, entity: &Value) -> bool {
        if !self.exclude_hidden {
            return false;
        }
        entity
            .get("tags")
            .and_then(Value::as_array)
            .is_some_and(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .any(|tag| tag.eq_ignore_ascii_case(HIDE_APP_TAG))
            })
    }

    fn owner_blocked(&self, entity: &Value) -> bool {
        if self.owner_blocklist.is_empty() {
            return false;
        }
        entity
            .get("appOwnerOrganizationId")
            .and_then(Value::as_str)
            .is_some_and(|owner| self.owner_blocklist.contains(&owner.to_lowercase()))
    }

    fn publisher_blocked(&self, entity: &Value) -> bool {
        if self.publisher_blocklist.is_empty() {
            return false;
        }
        entity
            .get("publisherName")
            .and_then(Value::as_str)
            .is_some_and(|publisher| self.publisher_blocklist.contains(&publisher.to_lowercase()))
    }
}
