//! Database operations for the `bloggers` table, including the scrape
//! progress columns.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use redlens_core::{DiscoveredBlogger, ProgressUpdate, ScrapeStatus};
use sqlx::PgPool;

use crate::DbError;

const BLOGGER_COLUMNS: &str = "user_id, nickname, avatar_url, initial_fans, current_fans, \
     source_keyword, scrape_status, notes_collected, notes_target, failure_reason, \
     last_scrape_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `bloggers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BloggerRow {
    pub user_id: String,
    pub nickname: String,
    pub avatar_url: Option<String>,
    pub initial_fans: i64,
    /// Refreshed by the fans filter; `0` until first looked up.
    pub current_fans: i64,
    pub source_keyword: Option<String>,
    #[sqlx(try_from = "String")]
    pub scrape_status: ScrapeStatus,
    pub notes_collected: i32,
    pub notes_target: i32,
    pub failure_reason: Option<String>,
    pub last_scrape_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BloggerRow {
    /// Best known follower count: the refreshed value, else the one recorded
    /// at discovery.
    #[must_use]
    pub fn fans(&self) -> i64 {
        if self.current_fans > 0 {
            self.current_fans
        } else {
            self.initial_fans
        }
    }
}

/// Optional narrowing for [`list_bloggers`].
#[derive(Debug, Clone, Default)]
pub struct BloggerFilter<'a> {
    pub status: Option<ScrapeStatus>,
    /// Substring match against `source_keyword`.
    pub keyword: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Inserts and reads
// ---------------------------------------------------------------------------

/// Inserts a newly discovered blogger in `not_started` state.
///
/// Existing bloggers are left untouched. Returns `true` if a row was added.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_blogger(
    pool: &PgPool,
    blogger: &DiscoveredBlogger,
    notes_target: i32,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO bloggers (user_id, nickname, avatar_url, source_keyword, notes_target) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(&blogger.user_id)
    .bind(&blogger.nickname)
    .bind(&blogger.avatar_url)
    .bind(&blogger.source_keyword)
    .bind(notes_target)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns a single blogger by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_blogger(pool: &PgPool, user_id: &str) -> Result<Option<BloggerRow>, DbError> {
    let row = sqlx::query_as::<_, BloggerRow>(&format!(
        "SELECT {BLOGGER_COLUMNS} FROM bloggers WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the bloggers matching `user_ids`, in the order the ids were given.
///
/// Unknown ids are silently absent from the result; duplicates in the input
/// yield a single row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_bloggers_by_ids(
    pool: &PgPool,
    user_ids: &[String],
) -> Result<Vec<BloggerRow>, DbError> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, BloggerRow>(&format!(
        "SELECT {BLOGGER_COLUMNS} FROM bloggers WHERE user_id = ANY($1)"
    ))
    .bind(user_ids)
    .fetch_all(pool)
    .await?;

    let mut by_id: HashMap<String, BloggerRow> = rows
        .into_iter()
        .map(|row| (row.user_id.clone(), row))
        .collect();

    Ok(user_ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// Returns bloggers waiting to be collected, oldest first.
///
/// Always includes `not_started`; `partial` and stale `in_progress` rows are
/// included only when `include_resumable` is set. `keyword` narrows by
/// substring match on `source_keyword`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pending_bloggers(
    pool: &PgPool,
    limit: i64,
    keyword: Option<&str>,
    include_resumable: bool,
) -> Result<Vec<BloggerRow>, DbError> {
    let mut statuses = vec![ScrapeStatus::NotStarted.as_str()];
    if include_resumable {
        statuses.push(ScrapeStatus::Partial.as_str());
        statuses.push(ScrapeStatus::InProgress.as_str());
    }

    let rows = sqlx::query_as::<_, BloggerRow>(&format!(
        "SELECT {BLOGGER_COLUMNS} FROM bloggers \
         WHERE scrape_status = ANY($1) \
           AND ($2::TEXT IS NULL OR source_keyword LIKE '%' || $2 || '%') \
         ORDER BY created_at ASC, user_id ASC \
         LIMIT $3"
    ))
    .bind(&statuses)
    .bind(keyword)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists bloggers, most recently updated first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_bloggers(
    pool: &PgPool,
    filter: &BloggerFilter<'_>,
) -> Result<Vec<BloggerRow>, DbError> {
    let rows = sqlx::query_as::<_, BloggerRow>(&format!(
        "SELECT {BLOGGER_COLUMNS} FROM bloggers \
         WHERE ($1::TEXT IS NULL OR scrape_status = $1) \
           AND ($2::TEXT IS NULL OR source_keyword LIKE '%' || $2 || '%') \
         ORDER BY updated_at DESC, user_id ASC"
    ))
    .bind(filter.status.map(ScrapeStatus::as_str))
    .bind(filter.keyword)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the number of bloggers in each status. Statuses with no bloggers
/// are reported as zero.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_bloggers_by_status(pool: &PgPool) -> Result<Vec<(ScrapeStatus, i64)>, DbError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT scrape_status, COUNT(*) FROM bloggers GROUP BY scrape_status",
    )
    .fetch_all(pool)
    .await?;

    let counts: HashMap<String, i64> = rows.into_iter().collect();
    Ok(ScrapeStatus::ALL
        .into_iter()
        .map(|status| (status, counts.get(status.as_str()).copied().unwrap_or(0)))
        .collect())
}

// ---------------------------------------------------------------------------
// Progress writes
// ---------------------------------------------------------------------------

/// Stores a refreshed follower count.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the blogger does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_current_fans(pool: &PgPool, user_id: &str, fans: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE bloggers SET current_fans = $1, updated_at = NOW() WHERE user_id = $2",
    )
    .bind(fans)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Moves a blogger into `in_progress` ahead of a crawler invocation.
///
/// `notes_collected` is left as is; `notes_target` is set to the target the
/// run is working toward. Stamps `last_scrape_at`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the blogger does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_scrape_started(
    pool: &PgPool,
    user_id: &str,
    notes_target: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE bloggers \
         SET scrape_status = $1, notes_target = $2, failure_reason = NULL, \
             last_scrape_at = NOW(), updated_at = NOW() \
         WHERE user_id = $3",
    )
    .bind(ScrapeStatus::InProgress.as_str())
    .bind(notes_target)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Writes the progress columns of one blogger.
///
/// Only status, collected, target and failure reason are touched. The reason
/// is cleared for states that do not carry one.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the blogger does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_scrape_progress(
    pool: &PgPool,
    user_id: &str,
    update: &ProgressUpdate,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE bloggers \
         SET scrape_status = $1, notes_collected = $2, notes_target = $3, \
             failure_reason = $4, last_scrape_at = NOW(), updated_at = NOW() \
         WHERE user_id = $5",
    )
    .bind(update.status.as_str())
    .bind(update.notes_collected)
    .bind(update.notes_target)
    .bind(update.effective_reason())
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Operator actions
// ---------------------------------------------------------------------------

/// Deletes every note of a blogger and returns it to `not_started` with zero
/// progress. Both writes happen in one transaction.
///
/// Returns `false` if the blogger does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement fails.
pub async fn reset_blogger(pool: &PgPool, user_id: &str) -> Result<bool, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM notes WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query(
        "UPDATE bloggers \
         SET scrape_status = $1, notes_collected = 0, failure_reason = NULL, \
             updated_at = NOW() \
         WHERE user_id = $2",
    )
    .bind(ScrapeStatus::NotStarted.as_str())
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes a blogger; their notes go with them via `ON DELETE CASCADE`.
///
/// Returns `false` if the blogger does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_blogger(pool: &PgPool, user_id: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM bloggers WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
