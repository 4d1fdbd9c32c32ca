//! Turns what a crawl returned into per-blogger progress.
//!
//! Counts are always re-derived from the note store after writing, never
//! trusted from the crawler output.

use std::collections::{HashMap, HashSet};
use std::fmt;

use redlens_core::{NormalizedNote, ProgressUpdate, ScrapeStatus};
use redlens_crawler::{normalize_note, RawNote};

use crate::executor::Candidate;
use crate::ledger::{record_blogger_best_effort, to_i32};
use crate::stats::{CollectionStats, ErrorScope, FailureKind};
use crate::store::ProgressStore;

/// What one blogger looked like before and after a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Stored notes before the crawl.
    pub previously_collected: i64,
    pub target: i64,
    /// Notes the crawl returned for this blogger, after dedupe.
    pub returned: usize,
    /// Returned notes that were not stored before.
    pub new_items: usize,
    /// Stored notes after writing.
    pub total: i64,
    /// Returned notes the store rejected.
    pub store_failures: usize,
}

/// Outcome of reconciling one [`Observation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Target reached.
    Completed,
    /// The source gave fewer new notes than were still needed, so the
    /// blogger is treated as having nothing more to give. The target is
    /// lowered to what is stored.
    ///
    /// A crawl cut short for other reasons looks the same, so this can
    /// close a blogger that had more notes.
    Exhausted { retarget: i64 },
    /// Nothing stored before and nothing returned now.
    NoNotes,
    /// Some notes came back but the target was not reached; resume may
    /// pick up the rest.
    Overlap,
    /// Notes came back but some could not be written. Never read as
    /// exhaustion; resume retries the blogger.
    StoreFailed { failures: usize },
}

impl Verdict {
    #[must_use]
    pub fn status(self) -> ScrapeStatus {
        match self {
            Verdict::Completed | Verdict::Exhausted { .. } => ScrapeStatus::Completed,
            Verdict::NoNotes | Verdict::Overlap | Verdict::StoreFailed { .. } => {
                ScrapeStatus::Partial
            }
        }
    }

    /// The progress write for this verdict.
    #[must_use]
    pub fn progress_update(self, obs: &Observation) -> ProgressUpdate {
        let collected = to_i32(obs.total);
        match self {
            Verdict::Completed => {
                ProgressUpdate::new(ScrapeStatus::Completed, collected, to_i32(obs.target))
            }
            Verdict::Exhausted { retarget } => {
                ProgressUpdate::new(ScrapeStatus::Completed, collected, to_i32(retarget))
            }
            Verdict::NoNotes => {
                ProgressUpdate::new(ScrapeStatus::Partial, collected, to_i32(obs.target))
                    .with_reason("no notes in result")
            }
            Verdict::Overlap => {
                ProgressUpdate::new(ScrapeStatus::Partial, collected, to_i32(obs.target))
                    .with_reason(format!(
                        "{}/{} notes after {} new; results overlapped stored notes",
                        obs.total, obs.target, obs.new_items
                    ))
            }
            Verdict::StoreFailed { failures } => {
                ProgressUpdate::new(ScrapeStatus::Partial, collected, to_i32(obs.target))
                    .with_reason(format!(
                        "store error: {failures} of {} notes could not be saved",
                        obs.returned
                    ))
            }
        }
    }

    /// Whether the blogger counts toward `scraped` rather than `failed`.
    #[must_use]
    pub fn counts_as_scraped(self, obs: &Observation) -> bool {
        match self {
            Verdict::Completed | Verdict::Exhausted { .. } => true,
            Verdict::Overlap => obs.new_items > 0,
            Verdict::NoNotes | Verdict::StoreFailed { .. } => false,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Completed => f.write_str("completed"),
            Verdict::Exhausted { .. } => f.write_str("exhausted"),
            Verdict::NoNotes => f.write_str("no_notes"),
            Verdict::Overlap => f.write_str("overlap"),
            Verdict::StoreFailed { .. } => f.write_str("store_failed"),
        }
    }
}

/// Classifies one blogger's crawl. Rules apply in order; the first match
/// wins.
#[must_use]
pub fn classify(obs: &Observation) -> Verdict {
    if obs.total >= obs.target {
        return Verdict::Completed;
    }
    if obs.store_failures > 0 {
        return Verdict::StoreFailed {
            failures: obs.store_failures,
        };
    }
    if obs.returned == 0 && obs.previously_collected == 0 {
        return Verdict::NoNotes;
    }
    let needed = (obs.target - obs.previously_collected).max(0);
    let new_items = i64::try_from(obs.new_items).unwrap_or(i64::MAX);
    if new_items < needed {
        return Verdict::Exhausted { retarget: obs.total };
    }
    Verdict::Overlap
}

/// Writes a batch's notes and reconciles every blogger in it. Returns the
/// number of new notes stored.
pub(crate) async fn reconcile_batch<S: ProgressStore + ?Sized>(
    store: &S,
    batch: &[Candidate],
    raw: &[RawNote],
    run_id: Option<i64>,
    stats: &mut CollectionStats,
) -> usize {
    let mut grouped = group_notes(batch, raw);
    let mut batch_added = 0;

    for candidate in batch {
        let notes = grouped.remove(candidate.user_id.as_str()).unwrap_or_default();

        let mut new_items = 0;
        let mut store_failures = 0;
        let mut last_store_error = None;
        for note in &notes {
            match store.upsert_note(note).await {
                Ok(true) => new_items += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(note_id = %note.note_id, user_id = %candidate.user_id, error = %e, "failed to store note");
                    store_failures += 1;
                    last_store_error = Some(e.to_string());
                }
            }
        }
        if let Some(error) = last_store_error {
            stats.record(
                ErrorScope::Blogger(candidate.user_id.clone()),
                FailureKind::Store,
                format!("{store_failures} notes not stored: {error}"),
            );
        }
        stats.notes_added += new_items;
        batch_added += new_items;

        let total = match store.count_notes(&candidate.user_id).await {
            Ok(total) => total,
            Err(e) => {
                // Left in_progress, so a later resume picks it up.
                tracing::error!(user_id = %candidate.user_id, error = %e, "failed to count stored notes");
                stats.record(
                    ErrorScope::Blogger(candidate.user_id.clone()),
                    FailureKind::Store,
                    e.to_string(),
                );
                stats.failed += 1;
                continue;
            }
        };

        let obs = Observation {
            previously_collected: candidate.collected,
            target: candidate.target,
            returned: notes.len(),
            new_items,
            total,
            store_failures,
        };
        let verdict = classify(&obs);
        let update = verdict.progress_update(&obs);

        if let Err(e) = store.update_progress(&candidate.user_id, &update).await {
            tracing::error!(user_id = %candidate.user_id, error = %e, "failed to write progress");
            stats.record(
                ErrorScope::Blogger(candidate.user_id.clone()),
                FailureKind::Store,
                e.to_string(),
            );
        }

        if verdict.counts_as_scraped(&obs) {
            stats.scraped += 1;
        } else {
            stats.failed += 1;
        }

        if let Verdict::Exhausted { retarget } = verdict {
            tracing::info!(
                user_id = %candidate.user_id,
                target = obs.target,
                retarget,
                "fewer new notes than needed; treating source as exhausted"
            );
        }
        tracing::info!(
            user_id = %candidate.user_id,
            verdict = %verdict,
            total,
            target = update.notes_target,
            new_items,
            "blogger reconciled"
        );

        record_blogger_best_effort(
            store,
            run_id,
            &candidate.user_id,
            update.status,
            to_i32(new_items),
            update.effective_reason(),
        )
        .await;
    }

    batch_added
}

/// Normalizes raw notes and groups them by owner. Notes that fail to parse,
/// belong to bloggers outside the batch, or repeat an id are dropped.
fn group_notes<'a>(
    batch: &'a [Candidate],
    raw: &[RawNote],
) -> HashMap<&'a str, Vec<NormalizedNote>> {
    let mut grouped: HashMap<&str, Vec<NormalizedNote>> = batch
        .iter()
        .map(|c| (c.user_id.as_str(), Vec::new()))
        .collect();
    let mut seen = HashSet::new();

    for record in raw {
        let note = match normalize_note(record) {
            Ok(note) => note,
            Err(e) => {
                tracing::warn!(note_id = ?record.note_id, error = %e, "skipping unusable note");
                continue;
            }
        };
        let Some(bucket) = grouped.get_mut(note.user_id.as_str()) else {
            tracing::warn!(note_id = %note.note_id, user_id = %note.user_id, "ignoring note for a blogger outside this batch");
            continue;
        };
        if seen.insert(note.note_id.clone()) {
            bucket.push(note);
        }
    }

    grouped
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
