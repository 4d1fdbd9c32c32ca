//! Keyword discovery of new bloggers.

use redlens_crawler::{extract_bloggers, CrawlRequest, Crawler};
use redlens_db::RunType;

use crate::collect::Collector;
use crate::error::PipelineError;
use crate::ledger::{close_run_best_effort, open_run_best_effort, to_i32};
use crate::store::ProgressStore;

/// What a discovery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Distinct bloggers with a note at or above the like threshold.
    pub found: usize,
    /// Of those, how many were new to the store.
    pub inserted: usize,
    /// Whether results came from an earlier search on disk.
    pub used_existing: bool,
}

impl<S: ProgressStore, C: Crawler> Collector<S, C> {
    /// Searches `keywords` and stores every blogger with a note of at least
    /// `min_likes` likes as `not_started`.
    ///
    /// With `use_existing`, or when the search fails, every search results
    /// file already on disk is imported instead; a blogger appearing in
    /// several files is stored once.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Crawler`] if no search results can be read,
    /// or [`PipelineError::Db`] if inserting a blogger fails.
    pub async fn discover(
        &self,
        keywords: &[String],
        min_likes: i64,
        max_notes: u32,
        use_existing: bool,
    ) -> Result<DiscoveryReport, PipelineError> {
        let mut run_id = None;
        let mut search_error = None;

        let fresh = if use_existing || keywords.is_empty() {
            None
        } else {
            run_id = open_run_best_effort(self.store(), RunType::Discover).await;
            let request = CrawlRequest::search(keywords, max_notes);
            let timeout = self
                .settings()
                .timeout
                .calculate_timeout(keywords.len(), max_notes);
            tracing::info!(keywords = keywords.len(), max_notes, timeout_secs = timeout.as_secs(), "searching");

            match self.crawler().search_notes(&request, timeout).await {
                Ok(notes) => Some(notes),
                Err(e) => {
                    tracing::warn!(error = %e, "search failed; falling back to existing results");
                    search_error = Some(e.to_string());
                    None
                }
            }
        };

        let used_existing = fresh.is_none();
        let notes = match fresh {
            Some(notes) => notes,
            None => match self.crawler().stored_search_notes().await {
                Ok(notes) => notes,
                Err(e) => {
                    let message = search_error.unwrap_or_else(|| e.to_string());
                    close_run_best_effort(self.store(), run_id, 0, Some(&message)).await;
                    return Err(e.into());
                }
            },
        };

        let bloggers = extract_bloggers(&notes, min_likes);
        let mut inserted = 0;
        for blogger in &bloggers {
            let added = match self
                .store()
                .insert_blogger(blogger, self.settings().notes_target)
                .await
            {
                Ok(added) => added,
                Err(e) => {
                    close_run_best_effort(self.store(), run_id, to_i32(inserted), Some(&e.to_string()))
                        .await;
                    return Err(e.into());
                }
            };
            if added {
                inserted += 1;
                tracing::info!(
                    user_id = %blogger.user_id,
                    nickname = %blogger.nickname,
                    sample_likes = blogger.sample_likes,
                    "discovered blogger"
                );
            }
        }

        close_run_best_effort(
            self.store(),
            run_id,
            to_i32(inserted),
            search_error.as_deref(),
        )
        .await;

        let report = DiscoveryReport {
            found: bloggers.len(),
            inserted,
            used_existing,
        };
        tracing::info!(
            notes = notes.len(),
            found = report.found,
            inserted = report.inserted,
            used_existing,
            "discovery finished"
        );
        Ok(report)
    }
}
