//! The external crawler boundary.
//!
//! [`Crawler`] is the seam the collection pipeline talks to. [`MediaCrawler`]
//! implements it by launching the crawler as a subprocess, bounding it with a
//! timeout, and reading back the artifact it leaves on disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redlens_core::AppConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::artifact::{find_freshest_artifact, list_artifacts, load_records, ArtifactKind};
use crate::config_guard::ConfigPatchGuard;
use crate::error::CrawlerError;
use crate::request::CrawlRequest;
use crate::types::{RawCreator, RawNote};

/// Environment variable holding the path of the JSON-encoded [`CrawlRequest`].
pub const REQUEST_ENV: &str = "REDLENS_CRAWL_REQUEST";

/// One crawler session. Implementations must not be invoked concurrently.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Fetches notes for the creators in `request`.
    async fn collect_notes(
        &self,
        request: &CrawlRequest,
        timeout: Duration,
    ) -> Result<Vec<RawNote>, CrawlerError>;

    /// Fetches creator profiles (follower counts) for `request`.
    async fn lookup_creators(
        &self,
        request: &CrawlRequest,
        timeout: Duration,
    ) -> Result<Vec<RawCreator>, CrawlerError>;

    /// Runs a keyword search.
    async fn search_notes(
        &self,
        request: &CrawlRequest,
        timeout: Duration,
    ) -> Result<Vec<RawNote>, CrawlerError>;

    /// Reads every search result file already on disk, newest first,
    /// without running the crawler.
    async fn stored_search_notes(&self) -> Result<Vec<RawNote>, CrawlerError>;
}

/// Runs the external crawler as a child process.
#[derive(Debug, Clone)]
pub struct MediaCrawler {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
    data_dir: PathBuf,
    config_file: Option<PathBuf>,
}

impl MediaCrawler {
    #[must_use]
    pub fn new(
        program: impl Into<String>,
        workdir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            data_dir: data_dir.into(),
            config_file: None,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Config module to patch for each invocation. Relative paths resolve
    /// against the working directory.
    #[must_use]
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path.map(|p| {
            if p.is_absolute() {
                p
            } else {
                self.workdir.join(p)
            }
        });
        self
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.crawler_program.clone(),
            config.crawler_workdir.clone(),
            config.resolved_data_dir(),
        )
        .with_args(config.crawler_args.clone())
        .with_config_file(config.crawler_config_file.clone())
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Runs the crawler once and returns the artifact of `kind` it wrote.
    async fn invoke(
        &self,
        request: &CrawlRequest,
        timeout: Duration,
        kind: ArtifactKind,
    ) -> Result<PathBuf, CrawlerError> {
        let started = whole_seconds(SystemTime::now());

        let mut request_file = tempfile::Builder::new()
            .prefix("redlens-request-")
            .suffix(".json")
            .tempfile()
            .map_err(CrawlerError::RequestFile)?;
        serde_json::to_writer(&mut request_file, request)
            .map_err(|e| CrawlerError::RequestFile(e.into()))?;
        request_file.flush().map_err(CrawlerError::RequestFile)?;

        let _config_guard = match &self.config_file {
            Some(path) => Some(ConfigPatchGuard::apply(path, request)?),
            None => None,
        };

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--type")
            .arg(request.mode.as_str())
            .current_dir(&self.workdir)
            .env(REQUEST_ENV, request_file.path())
            .env("REDLENS_CRAWLER_TYPE", request.mode.as_str())
            .env("REDLENS_MAX_NOTES", request.max_notes.to_string())
            .env("REDLENS_CREATOR_URLS", request.creator_urls.join(","))
            .env("REDLENS_KEYWORDS", request.keywords.join(","))
            .env(
                "REDLENS_ENABLE_COMMENTS",
                if request.enable_comments { "true" } else { "false" },
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout also takes down anything the
        // launcher (e.g. `uv run`) started.
        #[cfg(unix)]
        command.process_group(0);

        tracing::info!(
            program = %self.program,
            mode = request.mode.as_str(),
            creators = request.creator_count(),
            max_notes = request.max_notes,
            timeout_secs = timeout.as_secs(),
            "launching crawler"
        );

        let mut child = command.spawn().map_err(|source| CrawlerError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(log_lines(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_lines(stderr, "stderr"));
        }

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed waiting for crawler");
                return Err(CrawlerError::NonZeroExit { code: None });
            }
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "crawler timed out; killing it");
                kill_process_group(&child);
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill crawler");
                }
                return Err(CrawlerError::Timeout {
                    secs: timeout.as_secs(),
                });
            }
        };

        if !status.success() {
            return Err(CrawlerError::NonZeroExit {
                code: status.code(),
            });
        }

        let artifact = find_freshest_artifact(&self.data_dir, kind, Some(started))?;
        tracing::debug!(path = %artifact.display(), "crawler artifact located");
        Ok(artifact)
    }
}

#[async_trait]
impl Crawler for MediaCrawler {
    async fn collect_notes(
        &self,
        request: &CrawlRequest,
        timeout: Duration,
    ) -> Result<Vec<RawNote>, CrawlerError> {
        let path = self
            .invoke(request, timeout, ArtifactKind::CreatorContents)
            .await?;
        Ok(load_records(&path)?)
    }

    async fn lookup_creators(
        &self,
        request: &CrawlRequest,
        timeout: Duration,
    ) -> Result<Vec<RawCreator>, CrawlerError> {
        let path = self
            .invoke(request, timeout, ArtifactKind::CreatorCreators)
            .await?;
        Ok(load_records(&path)?)
    }

    async fn search_notes(
        &self,
        request: &CrawlRequest,
        timeout: Duration,
    ) -> Result<Vec<RawNote>, CrawlerError> {
        let path = self
            .invoke(request, timeout, ArtifactKind::SearchContents)
            .await?;
        Ok(load_records(&path)?)
    }

    async fn stored_search_notes(&self) -> Result<Vec<RawNote>, CrawlerError> {
        let paths = list_artifacts(&self.data_dir, ArtifactKind::SearchContents)?;
        let files = paths.len();

        let mut notes = Vec::new();
        let mut first_error = None;
        let mut loaded = 0;
        for path in &paths {
            match load_records::<RawNote>(path) {
                Ok(records) => {
                    loaded += 1;
                    notes.extend(records);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable search results");
                    first_error.get_or_insert(e);
                }
            }
        }

        if loaded == 0 {
            if let Some(e) = first_error {
                return Err(e.into());
            }
        }
        tracing::info!(files, loaded, notes = notes.len(), "using existing search results");
        Ok(notes)
    }
}

/// Sends SIGKILL to the child's whole process group.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::warn!(pid, error = %e, "failed to kill crawler process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

async fn log_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(stream, "{line}");
    }
}

/// Truncates to whole seconds so filesystems with coarse mtimes still see
/// artifacts written right after launch as fresh.
fn whole_seconds(t: SystemTime) -> SystemTime {
    t.duration_since(UNIX_EPOCH)
        .map_or(t, |d| UNIX_EPOCH + Duration::from_secs(d.as_secs()))
}
