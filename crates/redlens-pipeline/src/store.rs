//! The persistence seam used by the pipeline.
//!
//! [`ProgressStore`] covers exactly what collection, discovery and analysis
//! need from storage. [`PgStore`] backs it with Postgres through
//! [`redlens_db`]; tests use an in-memory implementation.

use async_trait::async_trait;
use redlens_core::{DiscoveredBlogger, NormalizedNote, ProgressUpdate, ScrapeStatus};
use redlens_db::{BloggerFilter, BloggerNoteStats, BloggerRow, DbError, RunType};
use sqlx::PgPool;

/// Progress columns of one blogger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloggerProgress {
    pub user_id: String,
    pub status: ScrapeStatus,
    pub notes_collected: i32,
    pub notes_target: i32,
}

impl From<BloggerRow> for BloggerProgress {
    fn from(row: BloggerRow) -> Self {
        Self {
            user_id: row.user_id,
            status: row.scrape_status,
            notes_collected: row.notes_collected,
            notes_target: row.notes_target,
        }
    }
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Progress for `user_ids`, in input order. Unknown ids are absent.
    async fn load_progress(&self, user_ids: &[String]) -> Result<Vec<BloggerProgress>, DbError>;

    async fn pending(
        &self,
        limit: i64,
        keyword: Option<&str>,
        include_resumable: bool,
    ) -> Result<Vec<BloggerProgress>, DbError>;

    async fn with_status(&self, status: ScrapeStatus) -> Result<Vec<BloggerProgress>, DbError>;

    /// Adds a discovered blogger; returns `false` if it already existed.
    async fn insert_blogger(
        &self,
        blogger: &DiscoveredBlogger,
        notes_target: i32,
    ) -> Result<bool, DbError>;

    async fn update_fans(&self, user_id: &str, fans: i64) -> Result<(), DbError>;

    /// Sets `in_progress` and the target being worked toward, leaving the
    /// collected count alone.
    async fn mark_started(&self, user_id: &str, notes_target: i32) -> Result<(), DbError>;

    async fn update_progress(&self, user_id: &str, update: &ProgressUpdate) -> Result<(), DbError>;

    /// Up to `limit` stored note ids, most recent first.
    async fn recent_note_ids(&self, user_id: &str, limit: usize) -> Result<Vec<String>, DbError>;

    /// Insert-or-replace by note id; `true` only for a new note.
    async fn upsert_note(&self, note: &NormalizedNote) -> Result<bool, DbError>;

    async fn count_notes(&self, user_id: &str) -> Result<i64, DbError>;

    async fn note_stats(&self, user_id: &str) -> Result<BloggerNoteStats, DbError>;

    async fn mark_outliers(&self, user_id: &str, threshold: f64) -> Result<i64, DbError>;

    /// Opens a crawl-run ledger entry in `running` state.
    async fn open_run(&self, run_type: RunType) -> Result<i64, DbError>;

    async fn record_run_blogger(
        &self,
        run_id: i64,
        user_id: &str,
        status: ScrapeStatus,
        notes_added: i32,
        message: Option<&str>,
    ) -> Result<(), DbError>;

    /// Closes a ledger entry as succeeded, or failed when `error` is set.
    async fn close_run(&self, run_id: i64, notes_added: i32, error: Option<&str>)
        -> Result<(), DbError>;
}

/// [`ProgressStore`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn load_progress(&self, user_ids: &[String]) -> Result<Vec<BloggerProgress>, DbError> {
        let rows = redlens_db::list_bloggers_by_ids(&self.pool, user_ids).await?;
        Ok(rows.into_iter().map(BloggerProgress::from).collect())
    }

    async fn pending(
        &self,
        limit: i64,
        keyword: Option<&str>,
        include_resumable: bool,
    ) -> Result<Vec<BloggerProgress>, DbError> {
        let rows =
            redlens_db::list_pending_bloggers(&self.pool, limit, keyword, include_resumable).await?;
        Ok(rows.into_iter().map(BloggerProgress::from).collect())
    }

    async fn with_status(&self, status: ScrapeStatus) -> Result<Vec<BloggerProgress>, DbError> {
        let filter = BloggerFilter {
            status: Some(status),
            keyword: None,
        };
        let rows = redlens_db::list_bloggers(&self.pool, &filter).await?;
        Ok(rows.into_iter().map(BloggerProgress::from).collect())
    }

    async fn insert_blogger(
        &self,
        blogger: &DiscoveredBlogger,
        notes_target: i32,
    ) -> Result<bool, DbError> {
        redlens_db::insert_blogger(&self.pool, blogger, notes_target).await
    }

    async fn update_fans(&self, user_id: &str, fans: i64) -> Result<(), DbError> {
        redlens_db::update_current_fans(&self.pool, user_id, fans).await
    }

    async fn mark_started(&self, user_id: &str, notes_target: i32) -> Result<(), DbError> {
        redlens_db::mark_scrape_started(&self.pool, user_id, notes_target).await
    }

    async fn update_progress(&self, user_id: &str, update: &ProgressUpdate) -> Result<(), DbError> {
        redlens_db::update_scrape_progress(&self.pool, user_id, update).await
    }

    async fn recent_note_ids(&self, user_id: &str, limit: usize) -> Result<Vec<String>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        redlens_db::recent_note_ids(&self.pool, user_id, limit).await
    }

    async fn upsert_note(&self, note: &NormalizedNote) -> Result<bool, DbError> {
        redlens_db::upsert_note(&self.pool, note).await
    }

    async fn count_notes(&self, user_id: &str) -> Result<i64, DbError> {
        redlens_db::count_notes_by_user(&self.pool, user_id).await
    }

    async fn note_stats(&self, user_id: &str) -> Result<BloggerNoteStats, DbError> {
        redlens_db::blogger_note_stats(&self.pool, user_id).await
    }

    async fn mark_outliers(&self, user_id: &str, threshold: f64) -> Result<i64, DbError> {
        redlens_db::mark_outliers(&self.pool, user_id, threshold).await
    }

    async fn open_run(&self, run_type: RunType) -> Result<i64, DbError> {
        let run = redlens_db::create_crawl_run(&self.pool, run_type, "cli").await?;
        redlens_db::start_crawl_run(&self.pool, run.id).await?;
        Ok(run.id)
    }

    async fn record_run_blogger(
        &self,
        run_id: i64,
        user_id: &str,
        status: ScrapeStatus,
        notes_added: i32,
        message: Option<&str>,
    ) -> Result<(), DbError> {
        redlens_db::upsert_crawl_run_blogger(
            &self.pool,
            run_id,
            user_id,
            status.as_str(),
            Some(notes_added),
            message,
        )
        .await
    }

    async fn close_run(
        &self,
        run_id: i64,
        notes_added: i32,
        error: Option<&str>,
    ) -> Result<(), DbError> {
        match error {
            Some(message) => redlens_db::fail_crawl_run(&self.pool, run_id, message).await,
            None => redlens_db::complete_crawl_run(&self.pool, run_id, notes_added).await,
        }
    }
}
