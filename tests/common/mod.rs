//! Shared helpers for wiremock-based integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

use entra_inventory::{AppConfig, AzureConfig, FilterConfig, GraphClient, TokenCache};

pub const TEST_TENANT: &str = "test-tenant";

/// Mounts the token endpoint returning a static bearer token.
pub async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/{TEST_TENANT}/oauth2/v2.0/token")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-access-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

pub fn azure_config(server: &MockServer) -> AzureConfig {
    AzureConfig {
        tenant_id: TEST_TENANT.to_string(),
        client_id: "test-client".to_string(),
        client_secret: SecretString::from("test-secret".to_string()),
        graph_base_url: format!("{}/v1.0", server.uri()),
        login_url: server.uri(),
        scope: "https://graph.microsoft.com/.default".to_string(),
        timeout_secs: 5,
    }
}

pub fn graph_client(server: &MockServer) -> GraphClient {
    let config = azure_config(server);
    let tokens = Arc::new(TokenCache::new(config.clone()));
    GraphClient::new(tokens, &config.graph_base_url, Duration::from_secs(5))
        .expect("failed to build graph client")
}

pub fn app_config(server: &MockServer) -> AppConfig {
    AppConfig {
        azure: azure_config(server),
        database_url: "postgres://unused".to_string(),
        lookback_days: 30,
        page_size: 100,
        sp_filter: "servicePrincipalType eq 'Application'".to_string(),
        filter: FilterConfig::default(),
    }
}

/// Builds an OData collection page, optionally carrying a continuation link.
pub fn odata_page(items: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut page = json!({ "value": items });
    if let Some(link) = next_link {
        page["@odata.nextLink"] = json!(link);
    }
    page
}

/// Responder that replays a fixed sequence of responses, repeating the last
/// one on extra requests.
pub struct SequenceResponder {
    responses: Vec<ResponseTemplate>,
    position: Arc<AtomicUsize>,
}

impl SequenceResponder {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        Self {
            responses,
            position: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle onto the number of requests served so far.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.position)
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let index = self.position.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(index)
            .or_else(|| self.responses.last())
            .cloned()
            .expect("SequenceResponder requires at least one response")
    }
}
