//! Batch collection and resume.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use redlens_core::{AppConfig, ProgressUpdate, ScrapeStatus, DEFAULT_NOTES_TARGET};
use redlens_crawler::Crawler;
use redlens_db::RunType;

use crate::analysis::OutlierPolicy;
use crate::error::PipelineError;
use crate::executor::{run_batch, Candidate};
use crate::fans::apply_fans_filter;
use crate::ledger::to_i32;
use crate::planner::{plan_batches, TimeoutPolicy};
use crate::stats::{CollectionStats, ErrorScope, FailureKind};
use crate::store::{BloggerProgress, ProgressStore};

/// Knobs shared by every pipeline operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorSettings {
    pub timeout: TimeoutPolicy,
    /// Random pause between batches, inclusive. `max == 0` disables it.
    pub batch_delay_min_secs: u64,
    pub batch_delay_max_secs: u64,
    /// Stored note ids sent per blogger as exclusions; `0` sends all.
    pub exclusion_cap: usize,
    /// Target given to bloggers inserted by discovery.
    pub notes_target: i32,
    pub outlier: OutlierPolicy,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            timeout: TimeoutPolicy::default(),
            batch_delay_min_secs: 10,
            batch_delay_max_secs: 30,
            exclusion_cap: 1000,
            notes_target: DEFAULT_NOTES_TARGET,
            outlier: OutlierPolicy::default(),
        }
    }
}

impl CollectorSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout: TimeoutPolicy::from_app_config(config),
            batch_delay_min_secs: config.batch_delay_min_secs,
            batch_delay_max_secs: config.batch_delay_max_secs,
            exclusion_cap: config.exclusion_cap,
            notes_target: config.notes_target,
            outlier: OutlierPolicy {
                multiplier: config.outlier_multiplier,
                min_likes: config.outlier_min_likes,
            },
        }
    }
}

/// Drives collection against a [`ProgressStore`] with a [`Crawler`].
///
/// Batches run strictly one after another; the crawler is never invoked
/// concurrently.
pub struct Collector<S, C> {
    store: S,
    crawler: C,
    settings: CollectorSettings,
}

impl<S: ProgressStore, C: Crawler> Collector<S, C> {
    #[must_use]
    pub fn new(store: S, crawler: C, settings: CollectorSettings) -> Self {
        Self {
            store,
            crawler,
            settings,
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn crawler(&self) -> &C {
        &self.crawler
    }

    #[must_use]
    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Collects notes for `candidate_ids` in batches of `batch_size`.
    ///
    /// `completed` and `failed` bloggers are skipped. `partial` and
    /// `in_progress` ones are included only when `resume_allowed`, and keep
    /// their stored target. A positive `min_fans_threshold` runs the
    /// follower gate first.
    ///
    /// Never fails: every problem is counted in the returned stats.
    pub async fn run_batch_collection(
        &self,
        candidate_ids: &[String],
        per_entity_budget: i32,
        min_fans_threshold: i64,
        batch_size: usize,
        resume_allowed: bool,
    ) -> CollectionStats {
        let mut stats = CollectionStats::default();
        let snapshots = self.load(candidate_ids, &mut stats).await;

        let eligible: Vec<BloggerProgress> = snapshots
            .into_iter()
            .filter(|p| match p.status {
                ScrapeStatus::NotStarted => true,
                ScrapeStatus::Partial | ScrapeStatus::InProgress => {
                    if !resume_allowed {
                        tracing::debug!(user_id = %p.user_id, status = %p.status, "skipping resumable blogger");
                    }
                    resume_allowed
                }
                ScrapeStatus::Completed | ScrapeStatus::Failed => {
                    tracing::debug!(user_id = %p.user_id, status = %p.status, "skipping finished blogger");
                    false
                }
            })
            .collect();

        if eligible.is_empty() {
            tracing::info!("no eligible bloggers to collect");
            return stats;
        }

        let passed = apply_fans_filter(
            &self.store,
            &self.crawler,
            &self.settings.timeout,
            eligible,
            min_fans_threshold,
            &mut stats,
        )
        .await;

        let candidates = self.prepare(passed, per_entity_budget, &mut stats).await;
        self.run_batches(RunType::Collect, &candidates, batch_size, &mut stats)
            .await;

        tracing::info!(%stats, "batch collection finished");
        stats
    }

    /// Continues collection for `entity_ids` from their stored progress.
    ///
    /// Everything except `completed` is picked up, `failed` included. No
    /// follower gate is applied.
    pub async fn resume(
        &self,
        entity_ids: &[String],
        per_entity_budget: i32,
        batch_size: usize,
    ) -> CollectionStats {
        let mut stats = CollectionStats::default();
        let snapshots = self.load(entity_ids, &mut stats).await;

        let eligible: Vec<BloggerProgress> = snapshots
            .into_iter()
            .filter(|p| {
                let keep = p.status != ScrapeStatus::Completed;
                if !keep {
                    tracing::debug!(user_id = %p.user_id, "skipping completed blogger");
                }
                keep
            })
            .collect();

        if eligible.is_empty() {
            tracing::info!("nothing to resume");
            return stats;
        }

        let candidates = self.prepare(eligible, per_entity_budget, &mut stats).await;
        self.run_batches(RunType::Resume, &candidates, batch_size, &mut stats)
            .await;

        tracing::info!(%stats, "resume finished");
        stats
    }

    /// Loads progress for the deduplicated ids. Unknown ids and a failed
    /// load are counted as failures.
    async fn load(&self, ids: &[String], stats: &mut CollectionStats) -> Vec<BloggerProgress> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let snapshots = match self.store.load_progress(&unique).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                tracing::error!(bloggers = unique.len(), error = %e, "failed to load blogger progress");
                stats.record(ErrorScope::Selection, FailureKind::Store, e.to_string());
                stats.failed += unique.len();
                return Vec::new();
            }
        };

        let known: HashSet<&str> = snapshots.iter().map(|p| p.user_id.as_str()).collect();
        for id in unique.iter().filter(|id| !known.contains(id.as_str())) {
            tracing::warn!(user_id = %id, "unknown blogger");
            stats.record(
                ErrorScope::Blogger(id.clone()),
                FailureKind::UnknownBlogger,
                format!("blogger '{id}' not found"),
            );
            stats.failed += 1;
        }

        snapshots
    }

    /// Turns progress snapshots into candidates with a starting count and a
    /// target. Bloggers already at their target are completed on the spot.
    async fn prepare(
        &self,
        snapshots: Vec<BloggerProgress>,
        per_entity_budget: i32,
        stats: &mut CollectionStats,
    ) -> Vec<Candidate> {
        let budget = per_entity_budget.max(1);
        let mut candidates = Vec::with_capacity(snapshots.len());

        for progress in snapshots {
            let collected = match self.store.count_notes(&progress.user_id).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::error!(user_id = %progress.user_id, error = %e, "failed to count stored notes");
                    stats.record(
                        ErrorScope::Blogger(progress.user_id.clone()),
                        FailureKind::Store,
                        e.to_string(),
                    );
                    stats.failed += 1;
                    continue;
                }
            };

            let target = if progress.status == ScrapeStatus::NotStarted
                || progress.notes_target <= 0
            {
                budget
            } else {
                progress.notes_target
            };

            if matches!(
                progress.status,
                ScrapeStatus::Partial | ScrapeStatus::InProgress | ScrapeStatus::Failed
            ) {
                stats.resumed += 1;
                tracing::info!(user_id = %progress.user_id, collected, target, "resuming blogger");
            }

            let candidate = Candidate::new(progress.user_id, collected, i64::from(target));
            if candidate.remaining() == 0 {
                self.complete_without_crawl(&candidate, stats).await;
                continue;
            }
            candidates.push(candidate);
        }

        candidates
    }

    async fn complete_without_crawl(&self, candidate: &Candidate, stats: &mut CollectionStats) {
        let update = ProgressUpdate::new(
            ScrapeStatus::Completed,
            to_i32(candidate.collected),
            to_i32(candidate.target),
        );
        match self.store.update_progress(&candidate.user_id, &update).await {
            Ok(()) => {
                tracing::info!(user_id = %candidate.user_id, collected = candidate.collected, "target already met");
                stats.scraped += 1;
            }
            Err(e) => {
                stats.record(
                    ErrorScope::Blogger(candidate.user_id.clone()),
                    FailureKind::Store,
                    e.to_string(),
                );
                stats.failed += 1;
            }
        }
    }

    async fn run_batches(
        &self,
        run_type: RunType,
        candidates: &[Candidate],
        batch_size: usize,
        stats: &mut CollectionStats,
    ) {
        let batches = plan_batches(candidates, batch_size);
        let total = batches.len();

        for (index, batch) in batches.iter().enumerate() {
            if index > 0 {
                self.pause_between_batches().await;
            }
            tracing::info!(batch = index + 1, total, size = batch.len(), "starting batch");
            run_batch(
                &self.store,
                &self.crawler,
                &self.settings,
                run_type,
                index,
                batch,
                stats,
            )
            .await;
        }
    }

    async fn pause_between_batches(&self) {
        let (min, max) = (
            self.settings.batch_delay_min_secs,
            self.settings.batch_delay_max_secs,
        );
        if max == 0 {
            return;
        }
        let secs = if min >= max {
            max
        } else {
            rand::rng().random_range(min..=max)
        };
        tracing::debug!(secs, "pausing between batches");
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}

/// Ids of bloggers waiting to be collected, oldest first.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the query fails.
pub async fn pending_candidates<S: ProgressStore + ?Sized>(
    store: &S,
    limit: i64,
    keyword: Option<&str>,
    resume_allowed: bool,
) -> Result<Vec<String>, PipelineError> {
    let pending = store.pending(limit, keyword, resume_allowed).await?;
    Ok(pending.into_iter().map(|p| p.user_id).collect())
}

#[cfg(test)]
#[path = "collect_test.rs"]
mod tests;
