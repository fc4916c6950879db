//! PostgreSQL persistence for enterprise application snapshots.
//!
//! The `enterprise_apps` table layout is a fixed external contract; the
//! bootstrap statements here only bring an existing database up to it.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::collector::RecordSink;
use crate::error::Result;
use crate::record::ServicePrincipalRecord;

const CREATE_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS enterprise_apps (
    app_object_id TEXT PRIMARY KEY,
    app_id TEXT,
    display_name TEXT,
    account_enabled BOOLEAN,
    user_signins_last_30_days INTEGER,
    has_valid_certificate BOOLEAN,
    nearest_cert_expiry TIMESTAMPTZ,
    sampled_until TIMESTAMPTZ NOT NULL,
    app_description TEXT,
    app_owner_organization_id TEXT,
    app_role_assignment_required BOOLEAN,
    created_datetime TIMESTAMPTZ,
    description TEXT,
    homepage TEXT,
    login_url TEXT,
    notes TEXT,
    notification_emails JSONB,
    saml_sso_settings JSONB,
    preferred_single_sign_on_mode TEXT,
    tags JSONB,
    synced_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
";

// Additive migrations for tables created by older releases.
const ALTER_STATEMENTS: &[&str] = &[
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS app_description TEXT",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS app_owner_organization_id TEXT",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS app_role_assignment_required BOOLEAN",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS created_datetime TIMESTAMPTZ",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS description TEXT",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS homepage TEXT",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS login_url TEXT",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS notes TEXT",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS notification_emails JSONB",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS saml_sso_settings JSONB",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS preferred_single_sign_on_mode TEXT",
    "ALTER TABLE enterprise_apps ADD COLUMN IF NOT EXISTS tags JSONB",
];

const UPSERT_SQL: &str = r"
INSERT INTO enterprise_apps (
    app_object_id,
    app_id,
    display_name,
    account_enabled,
    user_signins_last_30_days,
    has_valid_certificate,
    nearest_cert_expiry,
    sampled_until,
    app_description,
    app_owner_organization_id,
    app_role_assignment_required,
    created_datetime,
    description,
    homepage,
    login_url,
    notes,
    notification_emails,
    saml_sso_settings,
    preferred_single_sign_on_mode,
    tags
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
ON CONFLICT (app_object_id) DO UPDATE SET
    app_id = EXCLUDED.app_id,
    display_name = EXCLUDED.display_name,
    account_enabled = EXCLUDED.account_enabled,
    user_signins_last_30_days = EXCLUDED.user_signins_last_30_days,
    has_valid_certificate = EXCLUDED.has_valid_certificate,
    nearest_cert_expiry = EXCLUDED.nearest_cert_expiry,
    sampled_until = EXCLUDED.sampled_until,
    app_description = EXCLUDED.app_description,
    app_owner_organization_id = EXCLUDED.app_owner_organization_id,
    app_role_assignment_required = EXCLUDED.app_role_assignment_required,
    created_datetime = EXCLUDED.created_datetime,
    description = EXCLUDED.description,
    homepage = EXCLUDED.homepage,
    login_url = EXCLUDED.login_url,
    notes = EXCLUDED.notes,
    notification_emails = EXCLUDED.notification_emails,
    saml_sso_settings = EXCLUDED.saml_sso_settings,
    preferred_single_sign_on_mode = EXCLUDED.preferred_single_sign_on_mode,
    tags = EXCLUDED.tags,
    synced_at = NOW()
";

/// Snapshot store backed by a PostgreSQL connection pool.
///
/// One pool is shared by every batch of a run and closed at run end.
#[derive(Debug, Clone)]
pub struct AppStore {
    pool: PgPool,
}

impl AppStore {
    /// Connects to the database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Brings the `enterprise_apps` table up to the expected layout.
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        debug!("Ensuring enterprise_apps table exists");
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        for statement in ALTER_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Closes the pool, waiting for connections to be released.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RecordSink for AppStore {
    /// Upserts a batch in one transaction; an empty batch is a no-op.
    #[instrument(skip(self, records), fields(batch_size = records.len()))]
    async fn upsert(&self, records: Vec<ServicePrincipalRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in &records {
            sqlx::query(UPSERT_SQL)
                .bind(&record.app_object_id)
                .bind(&record.app_id)
                .bind(&record.display_name)
                .bind(record.account_enabled)
                .bind(record.user_signins_last_30_days)
                .bind(record.has_valid_certificate)
                .bind(record.nearest_cert_expiry)
                .bind(record.sampled_until)
                .bind(&record.app_description)
                .bind(&record.app_owner_organization_id)
                .bind(record.app_role_assignment_required)
                .bind(record.created_datetime)
                .bind(&record.description)
                .bind(&record.homepage)
                .bind(&record.login_url)
                .bind(&record.notes)
                .bind(record.notification_emails.clone().map(Json))
                .bind(record.saml_sso_settings.clone().map(Json))
                .bind(&record.preferred_single_sign_on_mode)
                .bind(record.tags.clone().map(Json))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Upserted {} enterprise apps", records.len());
        Ok(())
    }
}
