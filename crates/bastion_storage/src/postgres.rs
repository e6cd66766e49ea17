//! PostgreSQL store.

use crate::SecurityStore;
use crate::models::{AuditRow, CredentialRow, EventRow, NewEventRow, RuleRow};
use crate::schema::{credentials, rate_limit_rules, security_audits, security_events};
use async_trait::async_trait;
use bastion_core::{Credential, RateLimitRule, SecurityAudit, SecurityEvent};
use bastion_error::{StorageError, StorageErrorKind, StorageResult};
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument};

/// Schema migrations for the security tables.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Store backed by a PostgreSQL connection pool.
///
/// Diesel is synchronous, so every operation runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct PgSecurityStore {
    pool: PgPool,
}

impl PgSecurityStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool for `database_url`.
    #[instrument(name = "storage.connect", skip(database_url))]
    pub fn connect(database_url: &str, max_size: u32) -> StorageResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder().max_size(max_size).build(manager).map_err(|e| {
            tracing::error!(error = %e, "Failed to create connection pool");
            StorageError::new(StorageErrorKind::Connection(e.to_string()))
        })?;
        Ok(Self::new(pool))
    }

    /// Build a pool from the `DATABASE_URL` environment variable.
    pub fn from_env() -> StorageResult<Self> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| {
            tracing::error!("DATABASE_URL environment variable not set");
            StorageError::new(StorageErrorKind::Connection(
                "DATABASE_URL environment variable not set".to_string(),
            ))
        })?;
        Self::connect(&database_url, 10)
    }

    /// Apply pending schema migrations.
    #[instrument(name = "storage.migrate", skip(self))]
    pub async fn run_migrations(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            let applied = conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
                StorageError::new(StorageErrorKind::Query(format!("Migration failed: {}", e)))
            })?;
            info!(count = applied.len(), "Applied migrations");
            Ok(())
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> StorageResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StorageError::new(StorageErrorKind::Unavailable(format!(
                "Storage task failed: {}",
                e
            )))
        })?
    }
}

#[async_trait]
impl SecurityStore for PgSecurityStore {
    async fn insert_credential(&self, credential: &Credential) -> StorageResult<()> {
        let row = CredentialRow::try_from(credential)?;
        self.with_conn(move |conn| {
            diesel::insert_into(credentials::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_credential(&self, credential: &Credential) -> StorageResult<()> {
        let row = CredentialRow::try_from(credential)?;
        self.with_conn(move |conn| {
            let updated = diesel::update(credentials::table.find(row.id.clone()))
                .set(&row)
                .execute(conn)?;
            if updated == 0 {
                return Err(StorageError::new(StorageErrorKind::Query(format!(
                    "Credential {} does not exist",
                    row.id
                ))));
            }
            Ok(())
        })
        .await
    }

    async fn get_credential(&self, id: &str) -> StorageResult<Option<Credential>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            credentials::table
                .find(id)
                .select(CredentialRow::as_select())
                .first::<CredentialRow>(conn)
                .optional()?
                .map(Credential::try_from)
                .transpose()
        })
        .await
    }

    async fn list_credentials(&self) -> StorageResult<Vec<Credential>> {
        self.with_conn(|conn| {
            credentials::table
                .order((credentials::created_at.asc(), credentials::id.asc()))
                .select(CredentialRow::as_select())
                .load::<CredentialRow>(conn)?
                .into_iter()
                .map(Credential::try_from)
                .collect()
        })
        .await
    }

    async fn append_events(&self, events: &[SecurityEvent]) -> StorageResult<()> {
        let rows = events
            .iter()
            .map(NewEventRow::try_from)
            .collect::<StorageResult<Vec<_>>>()?;
        if rows.is_empty() {
            return Ok(());
        }
        self.with_conn(move |conn| {
            let inserted = diesel::insert_into(security_events::table)
                .values(&rows)
                .execute(conn)?;
            debug!(inserted, "Appended events");
            Ok(())
        })
        .await
    }

    async fn events_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<SecurityEvent>> {
        self.with_conn(move |conn| {
            security_events::table
                .filter(security_events::occurred_at.ge(since))
                .order(security_events::seq.asc())
                .select(EventRow::as_select())
                .load::<EventRow>(conn)?
                .into_iter()
                .map(SecurityEvent::try_from)
                .collect()
        })
        .await
    }

    async fn purge_events_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        self.with_conn(move |conn| {
            let removed = diesel::delete(
                security_events::table.filter(security_events::occurred_at.lt(cutoff)),
            )
            .execute(conn)?;
            info!(removed, "Purged events");
            Ok(removed)
        })
        .await
    }

    async fn replace_rate_limit_rules(&self, rules: &[RateLimitRule]) -> StorageResult<()> {
        let rows = rules
            .iter()
            .enumerate()
            .map(|(position, rule)| RuleRow::from_rule(position, rule))
            .collect::<StorageResult<Vec<_>>>()?;
        self.with_conn(move |conn| {
            conn.transaction::<_, StorageError, _>(|conn| {
                diesel::delete(rate_limit_rules::table).execute(conn)?;
                if !rows.is_empty() {
                    diesel::insert_into(rate_limit_rules::table)
                        .values(&rows)
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn load_rate_limit_rules(&self) -> StorageResult<Vec<RateLimitRule>> {
        self.with_conn(|conn| {
            rate_limit_rules::table
                .order(rate_limit_rules::position.asc())
                .select(RuleRow::as_select())
                .load::<RuleRow>(conn)?
                .into_iter()
                .map(RuleRow::into_rule)
                .collect()
        })
        .await
    }

    async fn insert_audit(&self, audit: &SecurityAudit) -> StorageResult<()> {
        let row = AuditRow::try_from(audit)?;
        self.with_conn(move |conn| {
            diesel::insert_into(security_audits::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn latest_audit(&self) -> StorageResult<Option<SecurityAudit>> {
        self.with_conn(|conn| {
            security_audits::table
                .order(security_audits::started_at.desc())
                .select(AuditRow::as_select())
                .first::<AuditRow>(conn)
                .optional()?
                .map(SecurityAudit::try_from)
                .transpose()
        })
        .await
    }

    async fn list_audits(&self) -> StorageResult<Vec<SecurityAudit>> {
        self.with_conn(|conn| {
            security_audits::table
                .order(security_audits::started_at.asc())
                .select(AuditRow::as_select())
                .load::<AuditRow>(conn)?
                .into_iter()
                .map(SecurityAudit::try_from)
                .collect()
        })
        .await
    }
}
