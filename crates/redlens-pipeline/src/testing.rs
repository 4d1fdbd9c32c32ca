//! In-memory doubles for [`ProgressStore`] and [`Crawler`].

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redlens_core::{DiscoveredBlogger, NormalizedNote, NoteKind, ProgressUpdate, ScrapeStatus};
use redlens_crawler::{CrawlRequest, Crawler, CrawlerError, RawCount, RawCreator, RawNote};
use redlens_db::{BloggerNoteStats, DbError, RunType};

use crate::collect::{Collector, CollectorSettings};
use crate::store::{BloggerProgress, ProgressStore};

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemBlogger {
    pub progress: BloggerProgress,
    pub fans: i64,
    pub keyword: Option<String>,
    pub reason: Option<String>,
    /// Every status written, in order.
    pub history: Vec<ScrapeStatus>,
}

#[derive(Debug, Clone)]
pub struct MemRun {
    pub run_type: RunType,
    pub bloggers: Vec<(String, ScrapeStatus)>,
    pub closed: Option<Result<i32, String>>,
}

#[derive(Debug, Default)]
struct Inner {
    bloggers: Vec<MemBlogger>,
    notes: Vec<(NormalizedNote, bool)>,
    runs: Vec<MemRun>,
    /// Owners whose note writes fail.
    rejecting: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blogger(self, user_id: &str, status: ScrapeStatus, target: i32) -> Self {
        self.inner.lock().unwrap().bloggers.push(MemBlogger {
            progress: BloggerProgress {
                user_id: user_id.to_string(),
                status,
                notes_collected: 0,
                notes_target: target,
            },
            fans: 0,
            keyword: None,
            reason: None,
            history: Vec::new(),
        });
        self
    }

    /// Stores `count` notes for `user_id` with ids `<user_id>-s<i>` and
    /// syncs the collected counter.
    pub fn with_notes(self, user_id: &str, count: usize) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            for i in 0..count {
                inner
                    .notes
                    .push((stored_note(&format!("{user_id}-s{i}"), user_id, 10), false));
            }
            let total = inner.notes.iter().filter(|(n, _)| n.user_id == user_id).count();
            if let Some(b) = inner.bloggers.iter_mut().find(|b| b.progress.user_id == user_id) {
                b.progress.notes_collected = i32::try_from(total).unwrap();
            }
        }
        self
    }

    pub fn with_keyword(self, user_id: &str, keyword: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(b) = inner.bloggers.iter_mut().find(|b| b.progress.user_id == user_id) {
                b.keyword = Some(keyword.to_string());
            }
        }
        self
    }

    /// Makes every note write for `user_id` fail.
    pub fn rejecting_notes_for(self, user_id: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .rejecting
            .insert(user_id.to_string());
        self
    }

    pub fn blogger(&self, user_id: &str) -> MemBlogger {
        self.inner
            .lock()
            .unwrap()
            .bloggers
            .iter()
            .find(|b| b.progress.user_id == user_id)
            .cloned()
            .unwrap_or_else(|| panic!("no blogger {user_id}"))
    }

    pub fn note_count(&self, user_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .notes
            .iter()
            .filter(|(n, _)| n.user_id == user_id)
            .count()
    }

    pub fn note(&self, note_id: &str) -> Option<(NormalizedNote, bool)> {
        self.inner
            .lock()
            .unwrap()
            .notes
            .iter()
            .find(|(n, _)| n.note_id == note_id)
            .cloned()
    }

    pub fn blogger_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .bloggers
            .iter()
            .map(|b| b.progress.user_id.clone())
            .collect()
    }

    pub fn runs(&self) -> Vec<MemRun> {
        self.inner.lock().unwrap().runs.clone()
    }

    fn with_blogger_mut<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut MemBlogger) -> T,
    ) -> Result<T, DbError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .bloggers
            .iter_mut()
            .find(|b| b.progress.user_id == user_id)
            .map(f)
            .ok_or(DbError::NotFound)
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn load_progress(&self, user_ids: &[String]) -> Result<Vec<BloggerProgress>, DbError> {
        let inner = self.inner.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|id| inner.bloggers.iter().find(|b| &b.progress.user_id == id))
            .map(|b| b.progress.clone())
            .collect())
    }

    async fn pending(
        &self,
        limit: i64,
        keyword: Option<&str>,
        include_resumable: bool,
    ) -> Result<Vec<BloggerProgress>, DbError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .bloggers
            .iter()
            .filter(|b| {
                b.progress.status == ScrapeStatus::NotStarted
                    || (include_resumable && b.progress.status.is_resumable())
            })
            .filter(|b| {
                keyword.is_none_or(|k| b.keyword.as_deref().is_some_and(|bk| bk.contains(k)))
            })
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|b| b.progress.clone())
            .collect())
    }

    async fn with_status(&self, status: ScrapeStatus) -> Result<Vec<BloggerProgress>, DbError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .bloggers
            .iter()
            .filter(|b| b.progress.status == status)
            .map(|b| b.progress.clone())
            .collect())
    }

    async fn insert_blogger(
        &self,
        blogger: &DiscoveredBlogger,
        notes_target: i32,
    ) -> Result<bool, DbError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.bloggers.iter().any(|b| b.progress.user_id == blogger.user_id) {
            return Ok(false);
        }
        inner.bloggers.push(MemBlogger {
            progress: BloggerProgress {
                user_id: blogger.user_id.clone(),
                status: ScrapeStatus::NotStarted,
                notes_collected: 0,
                notes_target,
            },
            fans: 0,
            keyword: blogger.source_keyword.clone(),
            reason: None,
            history: Vec::new(),
        });
        Ok(true)
    }

    async fn update_fans(&self, user_id: &str, fans: i64) -> Result<(), DbError> {
        self.with_blogger_mut(user_id, |b| b.fans = fans)
    }

    async fn mark_started(&self, user_id: &str, notes_target: i32) -> Result<(), DbError> {
        self.with_blogger_mut(user_id, |b| {
            b.progress.status = ScrapeStatus::InProgress;
            b.progress.notes_target = notes_target;
            b.reason = None;
            b.history.push(ScrapeStatus::InProgress);
        })
    }

    async fn update_progress(&self, user_id: &str, update: &ProgressUpdate) -> Result<(), DbError> {
        self.with_blogger_mut(user_id, |b| {
            b.progress.status = update.status;
            b.progress.notes_collected = update.notes_collected;
            b.progress.notes_target = update.notes_target;
            b.reason = update.effective_reason().map(str::to_string);
            b.history.push(update.status);
        })
    }

    async fn recent_note_ids(&self, user_id: &str, limit: usize) -> Result<Vec<String>, DbError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .notes
            .iter()
            .rev()
            .filter(|(n, _)| n.user_id == user_id)
            .take(limit)
            .map(|(n, _)| n.note_id.clone())
            .collect())
    }

    async fn upsert_note(&self, note: &NormalizedNote) -> Result<bool, DbError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.rejecting.contains(&note.user_id) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        if !inner.bloggers.iter().any(|b| b.progress.user_id == note.user_id) {
            return Err(DbError::NotFound);
        }
        if let Some((existing, _)) = inner.notes.iter_mut().find(|(n, _)| n.note_id == note.note_id) {
            let owner = existing.user_id.clone();
            *existing = note.clone();
            existing.user_id = owner;
            return Ok(false);
        }
        inner.notes.push((note.clone(), false));
        Ok(true)
    }

    async fn count_notes(&self, user_id: &str) -> Result<i64, DbError> {
        Ok(i64::try_from(self.note_count(user_id)).unwrap())
    }

    #[allow(clippy::cast_precision_loss)]
    async fn note_stats(&self, user_id: &str) -> Result<BloggerNoteStats, DbError> {
        let inner = self.inner.lock().unwrap();
        let notes: Vec<&(NormalizedNote, bool)> =
            inner.notes.iter().filter(|(n, _)| n.user_id == user_id).collect();
        let total_notes = i64::try_from(notes.len()).unwrap();
        let total_likes: i64 = notes.iter().map(|(n, _)| n.likes).sum();
        Ok(BloggerNoteStats {
            total_notes,
            total_likes,
            total_collects: notes.iter().map(|(n, _)| n.collects).sum(),
            total_comments: notes.iter().map(|(n, _)| n.comments).sum(),
            avg_likes: if total_notes > 0 {
                total_likes as f64 / total_notes as f64
            } else {
                0.0
            },
            outlier_count: i64::try_from(notes.iter().filter(|(_, o)| *o).count()).unwrap(),
            image_count: i64::try_from(
                notes.iter().filter(|(n, _)| n.kind == NoteKind::Image).count(),
            )
            .unwrap(),
            video_count: i64::try_from(
                notes.iter().filter(|(n, _)| n.kind == NoteKind::Video).count(),
            )
            .unwrap(),
        })
    }

    #[allow(clippy::cast_precision_loss)]
    async fn mark_outliers(&self, user_id: &str, threshold: f64) -> Result<i64, DbError> {
        let mut inner = self.inner.lock().unwrap();
        let mut flagged = 0;
        for (note, outlier) in inner.notes.iter_mut().filter(|(n, _)| n.user_id == user_id) {
            *outlier = note.likes as f64 >= threshold;
            if *outlier {
                flagged += 1;
            }
        }
        Ok(flagged)
    }

    async fn open_run(&self, run_type: RunType) -> Result<i64, DbError> {
        let mut inner = self.inner.lock().unwrap();
        inner.runs.push(MemRun {
            run_type,
            bloggers: Vec::new(),
            closed: None,
        });
        Ok(i64::try_from(inner.runs.len()).unwrap())
    }

    async fn record_run_blogger(
        &self,
        run_id: i64,
        user_id: &str,
        status: ScrapeStatus,
        _notes_added: i32,
        _message: Option<&str>,
    ) -> Result<(), DbError> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .get_mut(usize::try_from(run_id - 1).unwrap())
            .ok_or(DbError::NotFound)?;
        run.bloggers.push((user_id.to_string(), status));
        Ok(())
    }

    async fn close_run(
        &self,
        run_id: i64,
        notes_added: i32,
        error: Option<&str>,
    ) -> Result<(), DbError> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .get_mut(usize::try_from(run_id - 1).unwrap())
            .ok_or(DbError::NotFound)?;
        run.closed = Some(match error {
            Some(message) => Err(message.to_string()),
            None => Ok(notes_added),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Call {
    Notes(CrawlRequest, Duration),
    Creators(CrawlRequest, Duration),
    Search(CrawlRequest, Duration),
    Stored,
}

/// Replays scripted responses in order. An exhausted script returns an
/// empty result.
#[derive(Debug, Default)]
pub struct MockCrawler {
    notes: Mutex<VecDeque<Result<Vec<RawNote>, CrawlerError>>>,
    creators: Mutex<VecDeque<Result<Vec<RawCreator>, CrawlerError>>>,
    search: Mutex<VecDeque<Result<Vec<RawNote>, CrawlerError>>>,
    stored: Mutex<VecDeque<Result<Vec<RawNote>, CrawlerError>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockCrawler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_notes(self, response: Result<Vec<RawNote>, CrawlerError>) -> Self {
        self.notes.lock().unwrap().push_back(response);
        self
    }

    pub fn on_creators(self, response: Result<Vec<RawCreator>, CrawlerError>) -> Self {
        self.creators.lock().unwrap().push_back(response);
        self
    }

    pub fn on_search(self, response: Result<Vec<RawNote>, CrawlerError>) -> Self {
        self.search.lock().unwrap().push_back(response);
        self
    }

    pub fn on_stored(self, response: Result<Vec<RawNote>, CrawlerError>) -> Self {
        self.stored.lock().unwrap().push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn note_requests(&self) -> Vec<(CrawlRequest, Duration)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Notes(request, timeout) => Some((request, timeout)),
                _ => None,
            })
            .collect()
    }

    pub fn creator_lookups(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Creators(..)))
            .count()
    }
}

fn next<T>(queue: &Mutex<VecDeque<Result<Vec<T>, CrawlerError>>>) -> Result<Vec<T>, CrawlerError> {
    queue.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
}

#[async_trait]
impl Crawler for MockCrawler {
    async fn collect_notes(
        &self,
        request: &CrawlRequest,
        timeout: Duration,
    ) -> Result<Vec<RawNote>, CrawlerError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Notes(request.clone(), timeout));
        next(&self.notes)
    }

    async fn lookup_creators(
        &self,
        request: &CrawlRequest,
        timeout: Duration,
    ) -> Result<Vec<RawCreator>, CrawlerError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Creators(request.clone(), timeout));
        next(&self.creators)
    }

    async fn search_notes(
        &self,
        request: &CrawlRequest,
        timeout: Duration,
    ) -> Result<Vec<RawNote>, CrawlerError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Search(request.clone(), timeout));
        next(&self.search)
    }

    async fn stored_search_notes(&self) -> Result<Vec<RawNote>, CrawlerError> {
        self.calls.lock().unwrap().push(Call::Stored);
        next(&self.stored)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn raw_note(note_id: &str, user_id: &str, likes: &str) -> RawNote {
    RawNote {
        note_id: Some(note_id.to_string()),
        user_id: Some(user_id.to_string()),
        nickname: Some(format!("nick-{user_id}")),
        title: Some(format!("title {note_id}")),
        note_type: Some("normal".to_string()),
        liked_count: Some(RawCount::from(likes)),
        ..RawNote::default()
    }
}

/// `count` notes for `user_id` with ids `<prefix><i>`.
pub fn raw_notes(user_id: &str, prefix: &str, count: usize) -> Vec<RawNote> {
    (0..count)
        .map(|i| raw_note(&format!("{prefix}{i}"), user_id, "10"))
        .collect()
}

pub fn creator(user_id: &str, fans: &str) -> RawCreator {
    RawCreator {
        user_id: Some(user_id.to_string()),
        nickname: None,
        fans: Some(RawCount::from(fans)),
    }
}

fn stored_note(note_id: &str, user_id: &str, likes: i64) -> NormalizedNote {
    NormalizedNote {
        note_id: note_id.to_string(),
        user_id: user_id.to_string(),
        title: String::new(),
        description: String::new(),
        kind: NoteKind::Image,
        likes,
        collects: 0,
        comments: 0,
        create_time: None,
        cover_url: None,
        note_url: redlens_core::note_url(note_id),
    }
}

pub fn settings() -> CollectorSettings {
    CollectorSettings {
        batch_delay_min_secs: 0,
        batch_delay_max_secs: 0,
        ..CollectorSettings::default()
    }
}

pub fn collector(store: MemoryStore, crawler: MockCrawler) -> Collector<MemoryStore, MockCrawler> {
    Collector::new(store, crawler, settings())
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}
