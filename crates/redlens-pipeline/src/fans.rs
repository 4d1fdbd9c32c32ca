//! Follower-count gate applied before any crawl budget is spent.

use redlens_core::{ProgressUpdate, ScrapeStatus};
use redlens_crawler::{fans_by_user, CrawlRequest, Crawler, CrawlerError};
use redlens_db::RunType;

use crate::ledger::{close_run_best_effort, open_run_best_effort, record_blogger_best_effort};
use crate::planner::TimeoutPolicy;
use crate::stats::{CollectionStats, ErrorScope, FailureKind};
use crate::store::{BloggerProgress, ProgressStore};

/// Follower check result for one blogger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FansVerdict {
    pub user_id: String,
    /// `None` when no lookup was made.
    pub fans: Option<i64>,
    pub passed: bool,
}

/// Looks up follower counts for all of `user_ids` in one crawler call and
/// checks them against `min_fans`. Verdicts come back in input order.
///
/// A threshold of zero or less passes everyone without a lookup. Bloggers
/// missing from the lookup result count as zero followers.
///
/// # Errors
///
/// Returns [`CrawlerError`] if the lookup invocation itself fails.
pub async fn check_fans<C: Crawler + ?Sized>(
    crawler: &C,
    policy: &TimeoutPolicy,
    user_ids: &[String],
    min_fans: i64,
) -> Result<Vec<FansVerdict>, CrawlerError> {
    if min_fans <= 0 || user_ids.is_empty() {
        return Ok(user_ids
            .iter()
            .map(|id| FansVerdict {
                user_id: id.clone(),
                fans: None,
                passed: true,
            })
            .collect());
    }

    let request = CrawlRequest::profiles(user_ids);
    let timeout = policy.calculate_timeout(user_ids.len(), request.max_notes);
    let creators = crawler.lookup_creators(&request, timeout).await?;
    let counts = fans_by_user(&creators);

    Ok(user_ids
        .iter()
        .map(|id| {
            let fans = counts.get(id).copied().unwrap_or_else(|| {
                tracing::debug!(user_id = %id, "no follower data returned; counting as 0");
                0
            });
            FansVerdict {
                user_id: id.clone(),
                fans: Some(fans),
                passed: fans >= min_fans,
            }
        })
        .collect())
}

/// Runs [`check_fans`], persists every looked-up count, marks rejected
/// bloggers `failed` and returns the ones that passed.
///
/// If the lookup cannot run at all, nobody passes and the bloggers are left
/// in their current state.
pub(crate) async fn apply_fans_filter<S, C>(
    store: &S,
    crawler: &C,
    policy: &TimeoutPolicy,
    candidates: Vec<BloggerProgress>,
    min_fans: i64,
    stats: &mut CollectionStats,
) -> Vec<BloggerProgress>
where
    S: ProgressStore + ?Sized,
    C: Crawler + ?Sized,
{
    if min_fans <= 0 || candidates.is_empty() {
        return candidates;
    }

    let user_ids: Vec<String> = candidates.iter().map(|c| c.user_id.clone()).collect();
    let run_id = open_run_best_effort(store, RunType::Fans).await;

    let verdicts = match check_fans(crawler, policy, &user_ids, min_fans).await {
        Ok(verdicts) => verdicts,
        Err(e) => {
            tracing::error!(bloggers = user_ids.len(), error = %e, "follower lookup failed");
            stats.record(
                ErrorScope::FansLookup,
                FailureKind::from_crawler(&e),
                e.to_string(),
            );
            stats.failed += candidates.len();
            close_run_best_effort(store, run_id, 0, Some(&e.to_string())).await;
            return Vec::new();
        }
    };

    let mut passed = Vec::with_capacity(candidates.len());
    for (candidate, verdict) in candidates.into_iter().zip(verdicts) {
        if let Some(fans) = verdict.fans {
            if let Err(e) = store.update_fans(&candidate.user_id, fans).await {
                tracing::warn!(user_id = %candidate.user_id, error = %e, "failed to store follower count");
                stats.record(
                    ErrorScope::Blogger(candidate.user_id.clone()),
                    FailureKind::Store,
                    e.to_string(),
                );
            }
        }

        if verdict.passed {
            passed.push(candidate);
            continue;
        }

        let fans = verdict.fans.unwrap_or(0);
        let reason = format!("fans {fans} below threshold {min_fans}");
        tracing::info!(user_id = %candidate.user_id, fans, min_fans, "skipping blogger below follower threshold");

        let update = ProgressUpdate::new(
            ScrapeStatus::Failed,
            candidate.notes_collected,
            candidate.notes_target,
        )
        .with_reason(reason.clone());
        if let Err(e) = store.update_progress(&candidate.user_id, &update).await {
            stats.record(
                ErrorScope::Blogger(candidate.user_id.clone()),
                FailureKind::Store,
                e.to_string(),
            );
        }
        stats.skipped_low_fans += 1;
        record_blogger_best_effort(
            store,
            run_id,
            &candidate.user_id,
            ScrapeStatus::Failed,
            0,
            Some(&reason),
        )
        .await;
    }

    close_run_best_effort(store, run_id, 0, None).await;
    passed
}
