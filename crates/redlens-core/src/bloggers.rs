//! Blogger-side domain types: the scrape-progress state machine and the
//! shapes used to move progress in and out of storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Notes to collect per blogger when the caller does not say otherwise.
pub const DEFAULT_NOTES_TARGET: i32 = 100;

/// Collection status of a tracked blogger.
///
/// ```text
/// not_started -> in_progress -> completed
///                            -> partial  -> in_progress (resume)
///                            -> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    NotStarted,
    InProgress,
    Partial,
    Completed,
    Failed,
}

impl ScrapeStatus {
    pub const ALL: [ScrapeStatus; 5] = [
        ScrapeStatus::NotStarted,
        ScrapeStatus::InProgress,
        ScrapeStatus::Partial,
        ScrapeStatus::Completed,
        ScrapeStatus::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeStatus::NotStarted => "not_started",
            ScrapeStatus::InProgress => "in_progress",
            ScrapeStatus::Partial => "partial",
            ScrapeStatus::Completed => "completed",
            ScrapeStatus::Failed => "failed",
        }
    }

    /// Whether a blogger in this state may be picked up again to continue
    /// from its stored progress. `in_progress` only survives a run that was
    /// interrupted before reconciliation, so it is treated like `partial`.
    #[must_use]
    pub fn is_resumable(self) -> bool {
        matches!(self, ScrapeStatus::Partial | ScrapeStatus::InProgress)
    }

    /// Whether the blogger may carry a failure reason in this state.
    #[must_use]
    pub fn carries_reason(self) -> bool {
        matches!(self, ScrapeStatus::Partial | ScrapeStatus::Failed)
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(ScrapeStatus::NotStarted),
            "in_progress" => Ok(ScrapeStatus::InProgress),
            "partial" => Ok(ScrapeStatus::Partial),
            "completed" => Ok(ScrapeStatus::Completed),
            "failed" => Ok(ScrapeStatus::Failed),
            other => Err(CoreError::InvalidScrapeStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for ScrapeStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A partial write of one blogger's progress columns.
///
/// Only the fields named here are touched; nickname, fans and keyword are
/// never overwritten by a progress write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub status: ScrapeStatus,
    pub notes_collected: i32,
    pub notes_target: i32,
    /// Dropped on write unless `status` carries a reason.
    pub failure_reason: Option<String>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(status: ScrapeStatus, notes_collected: i32, notes_target: i32) -> Self {
        Self {
            status,
            notes_collected,
            notes_target,
            failure_reason: None,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    /// The reason that should actually be persisted for this transition.
    #[must_use]
    pub fn effective_reason(&self) -> Option<&str> {
        if self.status.carries_reason() {
            self.failure_reason.as_deref()
        } else {
            None
        }
    }
}

/// A blogger surfaced by keyword discovery, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredBlogger {
    pub user_id: String,
    pub nickname: String,
    pub avatar_url: Option<String>,
    pub source_keyword: Option<String>,
    /// Likes on the note that surfaced this blogger.
    pub sample_likes: i64,
}
