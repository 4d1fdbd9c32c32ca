//! Summary returned by batch operations.

use std::fmt;

use redlens_crawler::{ArtifactError, CrawlerError};

/// What a batch collection did. Every failure is folded in here instead of
/// being returned as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Bloggers that ended the run completed, or partial with new notes.
    pub scraped: usize,
    /// Bloggers whose crawl could not produce anything this run.
    pub failed: usize,
    pub notes_added: usize,
    pub skipped_low_fans: usize,
    /// Bloggers that continued from earlier progress.
    pub resumed: usize,
    pub errors: Vec<StatsError>,
}

impl CollectionStats {
    pub(crate) fn record(&mut self, scope: ErrorScope, kind: FailureKind, message: impl Into<String>) {
        self.errors.push(StatsError {
            scope,
            kind,
            message: message.into(),
        });
    }
}

impl fmt::Display for CollectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scraped={} failed={} notes_added={} skipped_low_fans={} resumed={} errors={}",
            self.scraped,
            self.failed,
            self.notes_added,
            self.skipped_low_fans,
            self.resumed,
            self.errors.len()
        )
    }
}

/// One failure recorded during a batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsError {
    pub scope: ErrorScope,
    pub kind: FailureKind,
    pub message: String,
}

/// What a [`StatsError`] applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorScope {
    /// Zero-based batch index within the operation.
    Batch(usize),
    Blogger(String),
    FansLookup,
    /// Loading the candidate list itself.
    Selection,
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorScope::Batch(i) => write!(f, "batch {}", i + 1),
            ErrorScope::Blogger(id) => write!(f, "blogger {id}"),
            ErrorScope::FansLookup => f.write_str("fans lookup"),
            ErrorScope::Selection => f.write_str("candidate selection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The crawler could not be started.
    Launch,
    Timeout,
    NonZeroExit,
    NoResultFile,
    CorruptResult,
    PermissionDenied,
    Io,
    Store,
    UnknownBlogger,
}

impl FailureKind {
    #[must_use]
    pub fn from_crawler(error: &CrawlerError) -> Self {
        match error {
            CrawlerError::Spawn { .. }
            | CrawlerError::RequestFile(_)
            | CrawlerError::ConfigPatch { .. } => FailureKind::Launch,
            CrawlerError::Timeout { .. } => FailureKind::Timeout,
            CrawlerError::NonZeroExit { .. } => FailureKind::NonZeroExit,
            CrawlerError::Artifact(ArtifactError::NotFound { .. }) => FailureKind::NoResultFile,
            CrawlerError::Artifact(ArtifactError::Corrupt { .. }) => FailureKind::CorruptResult,
            CrawlerError::Artifact(ArtifactError::PermissionDenied { .. }) => {
                FailureKind::PermissionDenied
            }
            CrawlerError::Artifact(ArtifactError::Io { .. }) => FailureKind::Io,
        }
    }
}
