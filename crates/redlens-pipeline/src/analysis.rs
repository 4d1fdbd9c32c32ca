//! Per-blogger engagement summary and outlier flagging.

use redlens_core::ScrapeStatus;

use crate::error::PipelineError;
use crate::store::ProgressStore;

/// How an outlier note is defined: at least `multiplier` times the
/// blogger's average likes, and never below `min_likes`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierPolicy {
    pub multiplier: f64,
    pub min_likes: i64,
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        Self {
            multiplier: 3.0,
            min_likes: 500,
        }
    }
}

impl OutlierPolicy {
    /// Like count at or above which a note is an outlier.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn threshold(&self, avg_likes: f64) -> f64 {
        (avg_likes * self.multiplier).max(self.min_likes as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BloggerAnalysis {
    pub user_id: String,
    pub total_notes: i64,
    pub total_likes: i64,
    pub total_collects: i64,
    pub total_comments: i64,
    pub avg_likes: f64,
    pub threshold: f64,
    pub outlier_count: i64,
    /// Share of notes flagged, in `[0, 1]`.
    pub outlier_rate: f64,
    pub image_count: i64,
    pub video_count: i64,
}

/// Re-flags a blogger's outlier notes under `policy` and returns the
/// resulting summary.
///
/// # Errors
///
/// Returns [`PipelineError::UnknownBlogger`] if the blogger is not stored,
/// or [`PipelineError::Db`] on a storage failure.
#[allow(clippy::cast_precision_loss)]
pub async fn analyze_blogger<S: ProgressStore + ?Sized>(
    store: &S,
    user_id: &str,
    policy: &OutlierPolicy,
) -> Result<BloggerAnalysis, PipelineError> {
    let known = store.load_progress(&[user_id.to_string()]).await?;
    if known.is_empty() {
        return Err(PipelineError::UnknownBlogger(user_id.to_string()));
    }

    let before = store.note_stats(user_id).await?;
    let threshold = policy.threshold(before.avg_likes);
    let outlier_count = store.mark_outliers(user_id, threshold).await?;

    let outlier_rate = if before.total_notes > 0 {
        outlier_count as f64 / before.total_notes as f64
    } else {
        0.0
    };

    tracing::info!(user_id, notes = before.total_notes, threshold, outlier_count, "blogger analyzed");

    Ok(BloggerAnalysis {
        user_id: user_id.to_string(),
        total_notes: before.total_notes,
        total_likes: before.total_likes,
        total_collects: before.total_collects,
        total_comments: before.total_comments,
        avg_likes: before.avg_likes,
        threshold,
        outlier_count,
        outlier_rate,
        image_count: before.image_count,
        video_count: before.video_count,
    })
}

/// Analyzes every completed blogger and ranks them by outlier rate,
/// highest first. Bloggers whose analysis fails are logged and left out.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the completed bloggers cannot be listed.
pub async fn analyze_all<S: ProgressStore + ?Sized>(
    store: &S,
    policy: &OutlierPolicy,
) -> Result<Vec<BloggerAnalysis>, PipelineError> {
    let completed = store.with_status(ScrapeStatus::Completed).await?;

    let mut analyses = Vec::with_capacity(completed.len());
    for blogger in &completed {
        match analyze_blogger(store, &blogger.user_id, policy).await {
            Ok(analysis) => analyses.push(analysis),
            Err(e) => {
                tracing::warn!(user_id = %blogger.user_id, error = %e, "skipping blogger in batch analysis");
            }
        }
    }

    analyses.sort_by(|a, b| {
        b.outlier_rate
            .total_cmp(&a.outlier_rate)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    Ok(analyses)
}
