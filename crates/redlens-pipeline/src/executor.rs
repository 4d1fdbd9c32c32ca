//! One crawler invocation for one batch of bloggers.

use redlens_core::{ProgressUpdate, ScrapeStatus};
use redlens_crawler::{CrawlRequest, Crawler, CrawlerError};
use redlens_db::RunType;

use crate::exclusion::build_exclusions;
use crate::ledger::{
    close_run_best_effort, open_run_best_effort, record_blogger_best_effort, to_i32,
};
use crate::reconcile::reconcile_batch;
use crate::stats::{CollectionStats, ErrorScope, FailureKind};
use crate::store::ProgressStore;
use crate::CollectorSettings;

/// A blogger queued for collection, with the count it starts from and the
/// target it works toward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub user_id: String,
    pub collected: i64,
    pub target: i64,
}

impl Candidate {
    pub(crate) fn new(user_id: impl Into<String>, collected: i64, target: i64) -> Self {
        Self {
            user_id: user_id.into(),
            collected,
            target,
        }
    }

    pub(crate) fn remaining(&self) -> i64 {
        (self.target - self.collected).max(0)
    }
}

/// Runs one batch end to end: exclusions, crawl, reconcile. Never fails;
/// everything that goes wrong lands in `stats`.
pub(crate) async fn run_batch<S, C>(
    store: &S,
    crawler: &C,
    settings: &CollectorSettings,
    run_type: RunType,
    index: usize,
    batch: &[Candidate],
    stats: &mut CollectionStats,
) where
    S: ProgressStore + ?Sized,
    C: Crawler + ?Sized,
{
    let user_ids: Vec<String> = batch.iter().map(|c| c.user_id.clone()).collect();
    let exclusions = build_exclusions(store, &user_ids, settings.exclusion_cap, stats).await;

    let budget = batch.iter().map(Candidate::remaining).max().unwrap_or(1).max(1);
    let budget = u32::try_from(budget).unwrap_or(u32::MAX);
    let timeout = settings.timeout.calculate_timeout(batch.len(), budget);

    for candidate in batch {
        if let Err(e) = store
            .mark_started(&candidate.user_id, to_i32(candidate.target))
            .await
        {
            tracing::warn!(user_id = %candidate.user_id, error = %e, "failed to mark blogger in progress");
            stats.record(
                ErrorScope::Blogger(candidate.user_id.clone()),
                FailureKind::Store,
                e.to_string(),
            );
        }
    }

    let run_id = open_run_best_effort(store, run_type).await;
    let request = CrawlRequest::creators(&user_ids, budget).with_exclusions(exclusions);

    tracing::info!(
        batch = index + 1,
        bloggers = batch.len(),
        max_notes = budget,
        timeout_secs = timeout.as_secs(),
        "invoking crawler"
    );

    match crawler.collect_notes(&request, timeout).await {
        Ok(raw) => {
            tracing::info!(batch = index + 1, records = raw.len(), "crawler returned");
            let added = reconcile_batch(store, batch, &raw, run_id, stats).await;
            close_run_best_effort(store, run_id, to_i32(added), None).await;
        }
        Err(e) => {
            fail_batch(store, batch, &e, index, run_id, stats).await;
            close_run_best_effort(store, run_id, 0, Some(&e.to_string())).await;
        }
    }
}

/// Applies a whole-batch crawler failure to every blogger in the batch.
///
/// A crawler that never started leaves them `failed`; anything after launch
/// leaves them `partial` so resume can retry.
async fn fail_batch<S: ProgressStore + ?Sized>(
    store: &S,
    batch: &[Candidate],
    error: &CrawlerError,
    index: usize,
    run_id: Option<i64>,
    stats: &mut CollectionStats,
) {
    let kind = FailureKind::from_crawler(error);
    let (status, reason) = if error.is_launch_failure() {
        (
            ScrapeStatus::Failed,
            format!("crawler could not start: {error}"),
        )
    } else if kind == FailureKind::NoResultFile {
        (ScrapeStatus::Partial, "no result file".to_string())
    } else {
        (ScrapeStatus::Partial, format!("crawler failed: {error}"))
    };

    tracing::error!(batch = index + 1, bloggers = batch.len(), error = %error, "crawler invocation failed");
    stats.record(ErrorScope::Batch(index), kind, error.to_string());
    stats.failed += batch.len();

    for candidate in batch {
        let update = ProgressUpdate::new(
            status,
            to_i32(candidate.collected),
            to_i32(candidate.target),
        )
        .with_reason(reason.clone());
        if let Err(e) = store.update_progress(&candidate.user_id, &update).await {
            tracing::error!(user_id = %candidate.user_id, error = %e, "failed to write progress");
            stats.record(
                ErrorScope::Blogger(candidate.user_id.clone()),
                FailureKind::Store,
                e.to_string(),
            );
        }
        record_blogger_best_effort(store, run_id, &candidate.user_id, status, 0, Some(&reason))
            .await;
    }
}
