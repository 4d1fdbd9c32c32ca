//! Locating and loading the crawler's JSON output files.
//!
//! The crawler does not report where it wrote its results, so the freshest
//! file with the expected prefix is taken, provided it was written during
//! the invocation being processed.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::de::DeserializeOwned;

use crate::error::ArtifactError;

/// The kinds of artifact the crawler writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Notes of specific creators.
    CreatorContents,
    /// Creator profiles, including follower counts.
    CreatorCreators,
    /// Notes found by keyword search.
    SearchContents,
}

impl ArtifactKind {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::CreatorContents => "creator_contents_",
            ArtifactKind::CreatorCreators => "creator_creators_",
            ArtifactKind::SearchContents => "search_contents_",
        }
    }

    fn matches(self, file_name: &str) -> bool {
        file_name.starts_with(self.prefix())
            && Path::new(file_name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }
}

/// Returns the most recently modified `kind` artifact in `dir`.
///
/// With `since` set, files modified before it are ignored, so output left
/// over from an earlier invocation is never mistaken for this one's.
///
/// # Errors
///
/// Returns [`ArtifactError::NotFound`] if the directory does not exist or
/// holds no qualifying file, [`ArtifactError::PermissionDenied`] if it
/// cannot be listed, or [`ArtifactError::Io`] for other listing failures.
pub fn find_freshest_artifact(
    dir: &Path,
    kind: ArtifactKind,
    since: Option<SystemTime>,
) -> Result<PathBuf, ArtifactError> {
    scan(dir, kind, since)?
        .into_iter()
        .next()
        .ok_or_else(|| not_found(dir, kind))
}

/// Returns every `kind` artifact in `dir`, newest first.
///
/// # Errors
///
/// Same as [`find_freshest_artifact`]; an empty match is
/// [`ArtifactError::NotFound`].
pub fn list_artifacts(dir: &Path, kind: ArtifactKind) -> Result<Vec<PathBuf>, ArtifactError> {
    let paths = scan(dir, kind, None)?;
    if paths.is_empty() {
        return Err(not_found(dir, kind));
    }
    Ok(paths)
}

fn not_found(dir: &Path, kind: ArtifactKind) -> ArtifactError {
    ArtifactError::NotFound {
        pattern: dir.join(format!("{}*.json", kind.prefix())),
    }
}

/// Matching files modified at or after `since`, newest first. Ties break on
/// path, highest first.
fn scan(
    dir: &Path,
    kind: ArtifactKind,
    since: Option<SystemTime>,
) -> Result<Vec<PathBuf>, ArtifactError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => not_found(dir, kind),
        _ => ArtifactError::from_io(dir.to_path_buf(), e),
    })?;

    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ArtifactError::from_io(dir.to_path_buf(), e))?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !kind.matches(name) {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), error = %e, "skipping unreadable artifact");
                continue;
            }
        };
        if since.is_some_and(|since| modified < since) {
            continue;
        }
        found.push((modified, entry.path()));
    }

    found.sort_by(|a, b| b.cmp(a));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Loads a JSON array artifact, deserializing each element independently.
///
/// Elements that do not fit `T` are logged and skipped; the rest of the
/// file is still returned.
///
/// # Errors
///
/// Returns [`ArtifactError::NotFound`] / [`ArtifactError::PermissionDenied`]
/// / [`ArtifactError::Io`] if the file cannot be read, and
/// [`ArtifactError::Corrupt`] if it is not a JSON array.
pub fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ArtifactError> {
    let bytes = std::fs::read(path).map_err(|e| ArtifactError::from_io(path.to_path_buf(), e))?;
    let values: Vec<serde_json::Value> =
        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

    let total = values.len();
    let records: Vec<T> = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), index, error = %e, "skipping malformed record");
                None
            }
        })
        .collect();

    tracing::debug!(path = %path.display(), total, loaded = records.len(), "loaded artifact");
    Ok(records)
}
