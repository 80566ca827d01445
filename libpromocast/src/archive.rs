//! SQLite archive of publish runs
//!
//! Stores each run's bundle and each platform's terminal outcome once it is
//! known. Timestamps are Unix seconds.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::{ContentBundle, JobState, ReportEntry, RunSummary};

/// A stored run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub bundle: ContentBundle,
    pub summary: RunSummary,
}

#[derive(Clone)]
pub struct Archive {
    pool: SqlitePool,
}

impl Archive {
    /// Open (creating if needed) the archive at `db_path`, `~` expanded
    pub async fn open(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub async fn record_run(&self, run: &RunRecord) -> Result<()> {
        let bundle = serde_json::to_string(&run.bundle).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO runs (id, created_at, scheduled_at, dry_run, title, bundle, summary)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(run.created_at.timestamp())
        .bind(run.scheduled_at.map(|at| at.timestamp()))
        .bind(run.dry_run)
        .bind(&run.bundle.title)
        .bind(bundle)
        .bind(run.summary.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn update_summary(&self, run_id: &str, summary: RunSummary) -> Result<()> {
        sqlx::query("UPDATE runs SET summary = ? WHERE id = ?")
            .bind(summary.as_str())
            .bind(run_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Insert or replace one platform's outcome
    pub async fn record_outcome(&self, run_id: &str, entry: &ReportEntry) -> Result<()> {
        let metadata = serde_json::to_string(&entry.metadata).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO job_outcomes
                (run_id, platform, state, external_id, error, attempts, metadata, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id, platform) DO UPDATE SET
                state = excluded.state,
                external_id = excluded.external_id,
                error = excluded.error,
                attempts = excluded.attempts,
                metadata = excluded.metadata,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(run_id)
        .bind(&entry.platform)
        .bind(entry.state.as_str())
        .bind(&entry.external_id)
        .bind(&entry.error)
        .bind(i64::from(entry.attempts))
        .bind(metadata)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, created_at, scheduled_at, dry_run, bundle, summary
            FROM runs WHERE id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|row| run_from_row(&row)).transpose()
    }

    /// Most recent runs first, optionally only those with `summary`
    pub async fn list_runs(&self, summary: Option<RunSummary>, limit: u32) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, created_at, scheduled_at, dry_run, bundle, summary
            FROM runs
            WHERE ? IS NULL OR summary = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(summary.map(|s| s.as_str()))
        .bind(summary.map(|s| s.as_str()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(run_from_row).collect()
    }

    /// Outcomes of a run, ordered by platform name
    pub async fn outcomes_for_run(&self, run_id: &str) -> Result<Vec<ReportEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT platform, state, external_id, error, attempts, metadata
            FROM job_outcomes
            WHERE run_id = ?
            ORDER BY platform
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(outcome_from_row).collect()
    }

    /// Delete runs created more than `days` days before now, with their outcomes.
    ///
    /// Returns the number of runs deleted.
    pub async fn cleanup_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = Utc::now().timestamp() - i64::from(days) * 24 * 3600;

        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;
        sqlx::query(
            "DELETE FROM job_outcomes WHERE run_id IN (SELECT id FROM runs WHERE created_at < ?)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;
        let deleted = sqlx::query("DELETE FROM runs WHERE created_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?
            .rows_affected();
        tx.commit().await.map_err(DbError::SqlxError)?;

        Ok(deleted)
    }
}

fn run_from_row(row: &SqliteRow) -> Result<RunRecord> {
    let bundle: String = row.get("bundle");
    let summary: String = row.get("summary");

    Ok(RunRecord {
        id: row.get("id"),
        created_at: from_timestamp(row.get("created_at")),
        scheduled_at: row.get::<Option<i64>, _>("scheduled_at").map(from_timestamp),
        dry_run: row.get("dry_run"),
        bundle: serde_json::from_str(&bundle).map_err(DbError::Serialization)?,
        summary: summary.parse().unwrap_or(RunSummary::InProgress),
    })
}

fn outcome_from_row(row: &SqliteRow) -> Result<ReportEntry> {
    let state: String = row.get("state");
    let metadata: String = row.get("metadata");
    let metadata: BTreeMap<String, String> =
        serde_json::from_str(&metadata).map_err(DbError::Serialization)?;

    let mut entry = ReportEntry::new(
        row.get::<String, _>("platform"),
        state.parse().unwrap_or(JobState::Failed),
    );
    entry.external_id = row.get("external_id");
    entry.error = row.get("error");
    entry.attempts = u32::try_from(row.get::<i64, _>("attempts")).unwrap_or(0);
    entry.metadata = metadata;
    Ok(entry)
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
