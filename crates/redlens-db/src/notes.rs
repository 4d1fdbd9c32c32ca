//! Database operations for the `notes` table.

use chrono::{DateTime, Utc};
use redlens_core::{NormalizedNote, NoteKind};
use sqlx::PgPool;

use crate::DbError;

const NOTE_COLUMNS: &str = "note_id, user_id, title, description, note_type, likes, collects, \
     comments, create_time, crawled_at, cover_url, note_url, local_cover_path, is_outlier";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `notes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NoteRow {
    pub note_id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub note_type: NoteKind,
    pub likes: i64,
    pub collects: i64,
    pub comments: i64,
    pub create_time: Option<DateTime<Utc>>,
    pub crawled_at: DateTime<Utc>,
    pub cover_url: Option<String>,
    pub note_url: String,
    pub local_cover_path: Option<String>,
    pub is_outlier: bool,
}

/// Aggregate engagement figures for one blogger's stored notes.
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct BloggerNoteStats {
    pub total_notes: i64,
    pub total_likes: i64,
    pub total_collects: i64,
    pub total_comments: i64,
    pub avg_likes: f64,
    pub outlier_count: i64,
    pub image_count: i64,
    pub video_count: i64,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts a note, or refreshes its content and counters if it is already
/// stored.
///
/// The owning `user_id` is never changed on conflict, and the derived
/// `is_outlier` / `local_cover_path` columns are preserved. Returns `true`
/// only when a new row was created, so re-inserting a known note id does not
/// count twice.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails (e.g. unknown owner).
pub async fn upsert_note(pool: &PgPool, note: &NormalizedNote) -> Result<bool, DbError> {
    let inserted: bool = sqlx::query_scalar(
        "INSERT INTO notes \
             (note_id, user_id, title, description, note_type, likes, collects, comments, \
              create_time, cover_url, note_url) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (note_id) DO UPDATE SET \
             title       = EXCLUDED.title, \
             description = EXCLUDED.description, \
             note_type   = EXCLUDED.note_type, \
             likes       = EXCLUDED.likes, \
             collects    = EXCLUDED.collects, \
             comments    = EXCLUDED.comments, \
             create_time = EXCLUDED.create_time, \
             cover_url   = EXCLUDED.cover_url, \
             note_url    = EXCLUDED.note_url, \
             crawled_at  = NOW() \
         RETURNING (xmax = 0)",
    )
    .bind(&note.note_id)
    .bind(&note.user_id)
    .bind(&note.title)
    .bind(&note.description)
    .bind(note.kind.as_str())
    .bind(note.likes)
    .bind(note.collects)
    .bind(note.comments)
    .bind(note.create_time)
    .bind(&note.cover_url)
    .bind(&note.note_url)
    .fetch_one(pool)
    .await?;

    Ok(inserted)
}

/// Flags notes at or above `threshold` likes as outliers and clears the flag
/// on the rest. Returns the number of notes flagged.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_outliers(pool: &PgPool, user_id: &str, threshold: f64) -> Result<i64, DbError> {
    let flags: Vec<bool> = sqlx::query_scalar(
        "UPDATE notes SET is_outlier = (likes::DOUBLE PRECISION >= $2) \
         WHERE user_id = $1 \
         RETURNING is_outlier",
    )
    .bind(user_id)
    .bind(threshold)
    .fetch_all(pool)
    .await?;

    Ok(flags.into_iter().filter(|f| *f).count().try_into().unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Counts a blogger's stored notes. This is the source of truth for
/// `bloggers.notes_collected`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_notes_by_user(pool: &PgPool, user_id: &str) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Returns up to `limit` stored note ids for a blogger, newest first.
///
/// Notes without a publish time sort after dated ones, then by crawl time.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn recent_note_ids(
    pool: &PgPool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<String>, DbError> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT note_id FROM notes \
         WHERE user_id = $1 \
         ORDER BY create_time DESC NULLS LAST, crawled_at DESC, note_id ASC \
         LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Returns all notes for a blogger, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_notes_by_user(pool: &PgPool, user_id: &str) -> Result<Vec<NoteRow>, DbError> {
    let rows = sqlx::query_as::<_, NoteRow>(&format!(
        "SELECT {NOTE_COLUMNS} FROM notes \
         WHERE user_id = $1 \
         ORDER BY create_time DESC NULLS LAST, note_id ASC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns outlier notes by descending likes, optionally for one blogger.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_outlier_notes(
    pool: &PgPool,
    user_id: Option<&str>,
) -> Result<Vec<NoteRow>, DbError> {
    let rows = sqlx::query_as::<_, NoteRow>(&format!(
        "SELECT {NOTE_COLUMNS} FROM notes \
         WHERE is_outlier = TRUE AND ($1::TEXT IS NULL OR user_id = $1) \
         ORDER BY likes DESC, note_id ASC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Aggregates engagement over a blogger's stored notes.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn blogger_note_stats(pool: &PgPool, user_id: &str) -> Result<BloggerNoteStats, DbError> {
    let stats = sqlx::query_as::<_, BloggerNoteStats>(
        "SELECT COUNT(*)                                            AS total_notes, \
                COALESCE(SUM(likes), 0)::BIGINT                     AS total_likes, \
                COALESCE(SUM(collects), 0)::BIGINT                  AS total_collects, \
                COALESCE(SUM(comments), 0)::BIGINT                  AS total_comments, \
                COALESCE(AVG(likes), 0)::DOUBLE PRECISION           AS avg_likes, \
                COUNT(*) FILTER (WHERE is_outlier)                  AS outlier_count, \
                COUNT(*) FILTER (WHERE note_type = 'image')         AS image_count, \
                COUNT(*) FILTER (WHERE note_type = 'video')         AS video_count \
         FROM notes WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(stats)
}
