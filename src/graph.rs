//! Microsoft Graph HTTP client with cursor pagination and throttle retry.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::auth::TokenCache;
use crate::error::{Error, Result};

/// Query parameter pairs sent with the first request of a collection.
pub type QueryParams = Vec<(String, String)>;

/// Header pairs merged over the fixed `Authorization` and `Accept` headers.
pub type ExtraHeaders = Vec<(String, String)>;

/// Maximum request attempts for a throttled call, first try included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Backoff used when a throttling response carries no parseable `Retry-After`.
const THROTTLE_FALLBACK: Duration = Duration::from_secs(5);

const NEXT_LINK_FIELD: &str = "@odata.nextLink";

/// Microsoft Graph API client.
#[derive(Debug)]
pub struct GraphClient {
    http_client: reqwest::Client,
    tokens: Arc<TokenCache>,
    base_url: String,
    max_attempts: u32,
}

impl GraphClient {
    /// Creates a new Graph client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(tokens: Arc<TokenCache>, base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    /// Overrides the maximum attempt count for throttled requests.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Performs an authenticated GET request and returns the parsed JSON body.
    ///
    /// `resource` is resolved against the configured base URL unless
    /// `absolute` is set, in which case it is requested verbatim
    /// (continuation links are already fully qualified).
    ///
    /// Throttling responses (429 and 503) are retried after the server's
    /// `Retry-After` interval, or a fixed fallback when the header is absent
    /// or unparseable, until the attempt budget is spent. Any other error
    /// status fails immediately with [`Error::Api`].
    #[instrument(skip(self, query, headers))]
    pub async fn get(
        &self,
        resource: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
        absolute: bool,
    ) -> Result<Value> {
        let url = if absolute {
            resource.to_string()
        } else {
            format!("{}/{}", self.base_url, resource.trim_start_matches('/'))
        };

        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let token = self.tokens.get_token().await?;

            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, "application/json");

            if !query.is_empty() {
                request = request.query(query);
            }
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request.send().await?;
            let status = response.status();

            if is_throttled(status) && attempts < self.max_attempts {
                let delay = retry_after(&response).unwrap_or(THROTTLE_FALLBACK);
                warn!(
                    "Throttled with {}, attempt {}/{}, retrying after {:?}",
                    status, attempts, self.max_attempts, delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if status.as_u16() < 400 {
                return response.json().await.map_err(Error::from);
            }

            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Graph request failed");
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
    }

    /// Returns a cursor over the elements of a paginated collection.
    #[must_use]
    pub fn paginate(
        &self,
        resource: &str,
        query: QueryParams,
        headers: ExtraHeaders,
    ) -> PageCursor<'_> {
        PageCursor {
            client: self,
            headers,
            state: CursorState::Start {
                resource: resource.to_string(),
                query,
            },
        }
    }
}

/// Cursor over the `value` elements of a paginated Graph collection.
///
/// The first request uses the supplied resource and query parameters; every
/// subsequent request follows the server's `@odata.nextLink` URL verbatim
/// with no query parameters. The cursor is finite and not restartable;
/// draining it again would issue fresh network requests.
#[derive(Debug)]
pub struct PageCursor<'a> {
    client: &'a GraphClient,
    headers: ExtraHeaders,
    state: CursorState,
}

#[derive(Debug)]
enum CursorState {
    Start { resource: String, query: QueryParams },
    Next { url: String },
    Done,
}

impl PageCursor<'_> {
    /// Returns false once the server has omitted the continuation link.
    #[must_use]
    pub fn has_more(&self) -> bool {
        !matches!(self.state, CursorState::Done)
    }

    /// Fetches the next page and returns its elements, or `None` when the
    /// collection is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>> {
        let payload = match std::mem::replace(&mut self.state, CursorState::Done) {
            CursorState::Done => return Ok(None),
            CursorState::Start { resource, query } => {
                self.client.get(&resource, &query, &self.headers, false).await?
            }
            CursorState::Next { url } => self.client.get(&url, &[], &self.headers, true).await?,
        };

        if let Some(next) = payload.get(NEXT_LINK_FIELD).and_then(Value::as_str) {
            self.state = CursorState::Next {
                url: next.to_string(),
            };
        }

        let items = match payload {
            Value::Object(mut map) => match map.remove("value") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        debug!("Fetched page with {} elements", items.len());
        Ok(Some(items))
    }

    /// Drains the cursor, concatenating every element in page order.
    pub async fn collect_all(mut self) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}

fn is_throttled(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    // Retry-After can be seconds or an HTTP-date; only seconds is honored.
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
