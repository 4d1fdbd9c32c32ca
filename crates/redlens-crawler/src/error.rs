use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("failed to launch crawler `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("exited with status {}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    NonZeroExit { code: Option<i32> },

    #[error("failed to write crawl request: {0}")]
    RequestFile(#[source] std::io::Error),

    #[error("failed to patch crawler config {path}: {reason}")]
    ConfigPatch { path: PathBuf, reason: String },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl CrawlerError {
    /// True when the crawler never got to run, as opposed to running and
    /// then timing out, failing or producing nothing usable.
    #[must_use]
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            CrawlerError::Spawn { .. }
                | CrawlerError::RequestFile(_)
                | CrawlerError::ConfigPatch { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no result file matching {}", pattern.display())]
    NotFound { pattern: PathBuf },

    #[error("permission denied reading {path}")]
    PermissionDenied { path: PathBuf },

    #[error("corrupt result file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    /// Classifies an I/O error on `path`, separating missing files and
    /// permission problems from everything else.
    pub(crate) fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => ArtifactError::NotFound { pattern: path },
            std::io::ErrorKind::PermissionDenied => ArtifactError::PermissionDenied { path },
            _ => ArtifactError::Io { path, source },
        }
    }
}

/// A single crawler record that could not be turned into a stored note.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("record is missing `{field}`")]
    MissingField { field: &'static str },

    #[error("unparseable count {value:?} in `{field}`")]
    InvalidCount { field: &'static str, value: String },

    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}
