//! # Database Migration System
//!
//! Embedded, ordered SQL migrations applied once per database.
//!
//! ## Concurrency Control
//!
//! Several worker processes may start at the same time. The runner takes a
//! session-level PostgreSQL advisory lock on a dedicated connection, so only
//! one process applies migrations while the others wait on the lock and then
//! find nothing outstanding:
//!
//! ```sql
//! SELECT pg_advisory_lock(7301415926535897)
//! ```
//!
//! Applied versions are tracked in `notifier_schema_migrations`.

use std::collections::HashSet;

use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info};

/// A single embedded migration
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version timestamp (YYYYMMDDHHMMSS format)
    pub version: &'static str,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Migrations in apply order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "20250301000001",
        name: "create delivery ledger",
        sql: include_str!("../../migrations/20250301000001_create_delivery_ledger.sql"),
    },
    Migration {
        version: "20250301000002",
        name: "create appointments",
        sql: include_str!("../../migrations/20250301000002_create_appointments.sql"),
    },
];

const LOCK_KEY: i64 = 7_301_415_926_535_897;

pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Apply every outstanding migration, returning the versions applied
    pub async fn run_all(pool: &PgPool) -> Result<Vec<&'static str>, sqlx::Error> {
        let mut conn = pool.acquire().await?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        let result = Self::run_outstanding_migrations(&mut conn).await;

        // Always release the lock
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        result
    }

    async fn run_outstanding_migrations(
        conn: &mut PgConnection,
    ) -> Result<Vec<&'static str>, sqlx::Error> {
        Self::ensure_migration_table(conn).await?;
        let applied = Self::get_applied_migrations(conn).await?;

        let mut newly_applied = Vec::new();
        for migration in MIGRATIONS {
            if applied.contains(migration.version) {
                debug!(version = migration.version, "Migration already applied");
                continue;
            }

            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            sqlx::raw_sql(migration.sql).execute(&mut *conn).await?;
            sqlx::query("INSERT INTO notifier_schema_migrations (version) VALUES ($1)")
                .bind(migration.version)
                .execute(&mut *conn)
                .await?;
            newly_applied.push(migration.version);
        }

        Ok(newly_applied)
    }

    async fn ensure_migration_table(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS notifier_schema_migrations (
                version VARCHAR(14) PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn get_applied_migrations(conn: &mut PgConnection) -> Result<HashSet<String>, sqlx::Error> {
        let rows = sqlx::query("SELECT version FROM notifier_schema_migrations")
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("version"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_and_unique() {
        let versions: Vec<_> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
        assert!(versions.iter().all(|v| v.len() == 14));
    }

    #[test]
    fn test_ledger_migration_declares_unique_unit() {
        let ledger = MIGRATIONS[0].sql;
        assert!(ledger.contains("UNIQUE (event_id, recipient, event_kind)"));
        assert!(ledger.contains("'pending', 'sending', 'sent', 'failed'"));
    }
}
