//! Database operations for `crawl_runs` and `crawl_run_bloggers`.
//!
//! Every external crawler invocation gets one `crawl_runs` row; the bloggers
//! it covered get one `crawl_run_bloggers` row each.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Why the crawler was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunType {
    Collect,
    Resume,
    Fans,
    Discover,
}

impl RunType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunType::Collect => "collect",
            RunType::Resume => "resume",
            RunType::Fans => "fans",
            RunType::Discover => "discover",
        }
    }
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `crawl_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CrawlRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `crawl_run_bloggers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CrawlRunBloggerRow {
    pub id: i64,
    pub crawl_run_id: i64,
    pub user_id: String,
    pub status: String,
    pub records_processed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// crawl_runs operations
// ---------------------------------------------------------------------------

/// Creates a new crawl run in `queued` status and returns the full row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_crawl_run(
    pool: &PgPool,
    run_type: RunType,
    trigger_source: &str,
) -> Result<CrawlRunRow, DbError> {
    let row = sqlx::query_as::<_, CrawlRunRow>(
        "INSERT INTO crawl_runs (public_id, run_type, trigger_source, status) \
         VALUES ($1, $2, $3, 'queued') \
         RETURNING id, public_id, run_type, trigger_source, status, \
                   started_at, completed_at, records_processed, error_message, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(run_type.as_str())
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `queued`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn start_crawl_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE crawl_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` with the number of notes it stored.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn complete_crawl_run(
    pool: &PgPool,
    id: i64,
    records_processed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE crawl_runs \
         SET status = 'succeeded', completed_at = NOW(), records_processed = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(records_processed)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed` with an error message.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn fail_crawl_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE crawl_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_crawl_run(pool: &PgPool, id: i64) -> Result<CrawlRunRow, DbError> {
    sqlx::query_as::<_, CrawlRunRow>(
        "SELECT id, public_id, run_type, trigger_source, status, \
                started_at, completed_at, records_processed, error_message, created_at \
         FROM crawl_runs \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_crawl_runs(pool: &PgPool, limit: i64) -> Result<Vec<CrawlRunRow>, DbError> {
    let rows = sqlx::query_as::<_, CrawlRunRow>(
        "SELECT id, public_id, run_type, trigger_source, status, \
                started_at, completed_at, records_processed, error_message, created_at \
         FROM crawl_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// crawl_run_bloggers operations
// ---------------------------------------------------------------------------

/// Inserts or updates the per-blogger result row for a crawl run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_crawl_run_blogger(
    pool: &PgPool,
    run_id: i64,
    user_id: &str,
    status: &str,
    records_processed: Option<i32>,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO crawl_run_bloggers \
             (crawl_run_id, user_id, status, records_processed, error_message) \
         VALUES ($1, $2, $3, COALESCE($4, 0), $5) \
         ON CONFLICT (crawl_run_id, user_id) DO UPDATE SET \
             status            = EXCLUDED.status, \
             records_processed = EXCLUDED.records_processed, \
             error_message     = EXCLUDED.error_message",
    )
    .bind(run_id)
    .bind(user_id)
    .bind(status)
    .bind(records_processed)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns all blogger-level result rows for a crawl run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_crawl_run_bloggers(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<CrawlRunBloggerRow>, DbError> {
    let rows = sqlx::query_as::<_, CrawlRunBloggerRow>(
        "SELECT id, crawl_run_id, user_id, status, records_processed, \
                error_message, created_at \
         FROM crawl_run_bloggers \
         WHERE crawl_run_id = $1 \
         ORDER BY id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
