//! Collection pipeline: list, filter, enrich, batch, persist.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::certs::{analyze_certificates, KeyCredential};
use crate::config::AppConfig;
use crate::error::Result;
use crate::filter::FilterRules;
use crate::graph::GraphClient;
use crate::record::{ServicePrincipalRecord, SP_SELECT_FIELDS};

/// Records accumulated before each flush to the sink.
pub const BATCH_SIZE: usize = 100;

/// Destination for assembled snapshot batches.
///
/// Implementations upsert each record keyed on `app_object_id`, overwriting
/// every field on conflict and refreshing the sink's synced-at marker. An
/// empty batch must be a no-op. Batches take ownership so the accumulating
/// buffer and the flushed one never alias.
#[async_trait]
pub trait RecordSink {
    async fn upsert(&self, records: Vec<ServicePrincipalRecord>) -> Result<()>;
}

/// Drives one ingestion run end to end.
///
/// Strictly sequential: one entity at a time, no fan-out across entities or
/// pages. Retries live inside [`GraphClient`]; any error reaching this level
/// aborts the run, leaving previously flushed batches persisted.
pub struct Collector<S> {
    config: AppConfig,
    graph: GraphClient,
    sink: S,
    rules: FilterRules,
}

impl<S: RecordSink> Collector<S> {
    /// Creates a collector over the given client and sink.
    pub fn new(config: AppConfig, graph: GraphClient, sink: S) -> Self {
        let rules = FilterRules::new(&config.filter);
        Self {
            config,
            graph,
            sink,
            rules,
        }
    }

    /// Runs the full pipeline once.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        let service_principals = self.fetch_service_principals().await?;
        if service_principals.is_empty() {
            info!("No service principals returned, nothing to do");
            return Ok(());
        }
        info!("Retrieved {} service principals", service_principals.len());

        let survivors = self.rules.apply(service_principals);
        if survivors.is_empty() {
            info!("All service principals excluded by local filters, nothing to do");
            return Ok(());
        }
        info!(
            "{} service principals remain after local filtering",
            survivors.len()
        );

        // One snapshot instant shared by every record of this run.
        let sampled_until = Utc::now();

        let mut batch = Vec::with_capacity(BATCH_SIZE);
        let mut upserted = 0usize;

        for sp in &survivors {
            let record = self.build_record(sp, sampled_until).await?;
            batch.push(record);
            if batch.len() >= BATCH_SIZE {
                upserted += batch.len();
                let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
                self.sink.upsert(full).await?;
            }
        }
        if !batch.is_empty() {
            upserted += batch.len();
            self.sink.upsert(batch).await?;
        }

        info!("Upserted {} enterprise app rows", upserted);
        Ok(())
    }

    /// Retrieves the full service principal listing across all pages.
    async fn fetch_service_principals(&self) -> Result<Vec<Value>> {
        let query = vec![
            ("$select".to_string(), SP_SELECT_FIELDS.to_string()),
            ("$filter".to_string(), self.config.sp_filter.clone()),
            ("$top".to_string(), self.config.page_size.to_string()),
        ];
        self.graph
            .paginate("/servicePrincipals", query, Vec::new())
            .collect_all()
            .await
    }

    /// Assembles one record: descriptive mapping plus enrichment.
    async fn build_record(
        &self,
        sp: &Value,
        sampled_until: DateTime<Utc>,
    ) -> Result<ServicePrincipalRecord> {
        let mut record = ServicePrincipalRecord::from_json(sp, sampled_until)?;

        record.user_signins_last_30_days = match record.app_id.as_deref() {
            Some(app_id) => self.signin_count(app_id).await?,
            None => 0,
        };

        let credentials: Vec<KeyCredential> = match sp.get("keyCredentials") {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone())
                .unwrap_or_else(|err| {
                    warn!(app_object_id = %record.app_object_id, %err,
                        "Ignoring unparseable keyCredentials");
                    Vec::new()
                }),
            _ => Vec::new(),
        };
        let status = analyze_certificates(&credentials, sampled_until);
        record.has_valid_certificate = status.has_valid_certificate;
        record.nearest_cert_expiry = status.nearest_expiry;

        debug!(
            app_object_id = %record.app_object_id,
            signins = record.user_signins_last_30_days,
            "Assembled record"
        );
        Ok(record)
    }

    /// Counts sign-in events for an application within the lookback window.
    ///
    /// The count is the number of elements enumerated across every page of
    /// the sign-in log, never a server-provided count field.
    #[instrument(skip(self))]
    async fn signin_count(&self, app_id: &str) -> Result<i64> {
        let window_start = Utc::now() - Duration::days(self.config.lookback_days);
        let start_iso = window_start.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let query = vec![
            (
                "$filter".to_string(),
                format!("appId eq '{app_id}' and createdDateTime ge {start_iso}"),
            ),
            ("$top".to_string(), self.config.page_size.to_string()),
        ];
        let headers = vec![("ConsistencyLevel".to_string(), "eventual".to_string())];

        let mut cursor = self.graph.paginate("/auditLogs/signIns", query, headers);
        let mut total = 0i64;
        while let Some(page) = cursor.next_page().await? {
            total += page.len() as i64;
        }
        Ok(total)
    }
}
