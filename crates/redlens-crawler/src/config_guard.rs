//! Scoped patching of the crawler's own config file.
//!
//! Some crawler builds only read their parameters from a Python config
//! module. [`ConfigPatchGuard`] rewrites the relevant assignments for one
//! invocation and puts the original back when dropped, whichever way the
//! invocation ends. A backup left behind by a crashed process is restored
//! before anything else is written.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::error::CrawlerError;
use crate::request::{CrawlMode, CrawlRequest};

const BACKUP_SUFFIX: &str = ".redlens_backup";

static CRAWLER_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^CRAWLER_TYPE\s*=\s*"[^"\n]*""#).expect("valid regex"));
static CREATOR_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^XHS_CREATOR_ID_LIST\s*=\s*\[.*?\]").expect("valid regex"));
static MAX_NOTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^CRAWLER_MAX_NOTES_COUNT\s*=\s*\d+").expect("valid regex"));
static COMMENTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^ENABLE_GET_COMMENTS\s*=\s*(True|False)").expect("valid regex")
});
static KEYWORDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^KEYWORDS\s*=\s*"[^"\n]*""#).expect("valid regex"));

/// Holds a patched crawler config file and restores it on drop.
#[derive(Debug)]
pub struct ConfigPatchGuard {
    path: PathBuf,
    backup: PathBuf,
    restored: bool,
}

impl ConfigPatchGuard {
    /// Backs up `path` and rewrites it for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlerError::ConfigPatch`] if the file or its backup
    /// cannot be read or written. The file is left in its original state.
    pub fn apply(path: &Path, request: &CrawlRequest) -> Result<Self, CrawlerError> {
        let backup = backup_path(path);
        let patch_err = |reason: String| CrawlerError::ConfigPatch {
            path: path.to_path_buf(),
            reason,
        };

        if backup.exists() {
            tracing::warn!(
                path = %path.display(),
                "found crawler config backup from an earlier run; restoring it first"
            );
            std::fs::rename(&backup, path)
                .map_err(|e| patch_err(format!("restoring stale backup: {e}")))?;
        }

        let original = std::fs::read_to_string(path)
            .map_err(|e| patch_err(format!("reading config: {e}")))?;
        std::fs::write(&backup, &original)
            .map_err(|e| patch_err(format!("writing backup: {e}")))?;

        let guard = Self {
            path: path.to_path_buf(),
            backup,
            restored: false,
        };

        std::fs::write(path, patch_config(&original, request))
            .map_err(|e| patch_err(format!("writing patched config: {e}")))?;

        tracing::debug!(
            path = %path.display(),
            mode = request.mode.as_str(),
            max_notes = request.max_notes,
            "patched crawler config"
        );
        Ok(guard)
    }

    /// Restores the original file now, reporting any failure.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlerError::ConfigPatch`] if the backup cannot be moved
    /// back into place.
    pub fn restore(mut self) -> Result<(), CrawlerError> {
        self.restore_inner().map_err(|e| CrawlerError::ConfigPatch {
            path: self.path.clone(),
            reason: format!("restoring original: {e}"),
        })
    }

    fn restore_inner(&mut self) -> std::io::Result<()> {
        if self.restored {
            return Ok(());
        }
        std::fs::rename(&self.backup, &self.path)?;
        self.restored = true;
        Ok(())
    }
}

impl Drop for ConfigPatchGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore_inner() {
            tracing::error!(
                path = %self.path.display(),
                backup = %self.backup.display(),
                error = %e,
                "failed to restore crawler config"
            );
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Rewrites the crawler settings in a config module's source text.
/// Assignments that are not present are left alone.
pub(crate) fn patch_config(content: &str, request: &CrawlRequest) -> String {
    let mut patched = CRAWLER_TYPE_RE
        .replace_all(
            content,
            NoExpand(&format!("CRAWLER_TYPE = {}", py_str(request.mode.as_str()))),
        )
        .into_owned();

    patched = MAX_NOTES_RE
        .replace_all(
            &patched,
            NoExpand(&format!("CRAWLER_MAX_NOTES_COUNT = {}", request.max_notes)),
        )
        .into_owned();

    let comments = if request.enable_comments { "True" } else { "False" };
    patched = COMMENTS_RE
        .replace_all(&patched, NoExpand(&format!("ENABLE_GET_COMMENTS = {comments}")))
        .into_owned();

    match request.mode {
        CrawlMode::Creator => {
            let mut list = String::from("XHS_CREATOR_ID_LIST = [\n");
            for url in &request.creator_urls {
                list.push_str("    ");
                list.push_str(&py_str(url));
                list.push_str(",\n");
            }
            list.push(']');
            patched = CREATOR_LIST_RE
                .replace_all(&patched, NoExpand(&list))
                .into_owned();
        }
        CrawlMode::Search => {
            let keywords = py_str(&request.keywords.join(","));
            patched = KEYWORDS_RE
                .replace_all(&patched, NoExpand(&format!("KEYWORDS = {keywords}")))
                .into_owned();
        }
    }

    patched
}

/// A double-quoted Python string literal.
fn py_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
