//! Per-blogger sets of already stored note ids, sent to the crawler so it
//! skips what we have.

use std::collections::BTreeMap;

use crate::stats::{CollectionStats, ErrorScope, FailureKind};
use crate::store::ProgressStore;

/// Builds the exclusion map for `user_ids`, keeping at most `cap` ids per
/// blogger (most recent first; `0` means no cap).
///
/// A blogger whose ids cannot be read is crawled without exclusions; the
/// store re-derives counts afterwards, so this only costs duplicate work.
pub(crate) async fn build_exclusions<S: ProgressStore + ?Sized>(
    store: &S,
    user_ids: &[String],
    cap: usize,
    stats: &mut CollectionStats,
) -> BTreeMap<String, Vec<String>> {
    let limit = if cap == 0 { usize::MAX } else { cap };
    let mut exclusions = BTreeMap::new();

    for user_id in user_ids {
        match store.recent_note_ids(user_id, limit).await {
            Ok(ids) => {
                tracing::debug!(user_id = %user_id, excluded = ids.len(), "built exclusion set");
                exclusions.insert(user_id.clone(), ids);
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "failed to load stored note ids");
                stats.record(
                    ErrorScope::Blogger(user_id.clone()),
                    FailureKind::Store,
                    e.to_string(),
                );
            }
        }
    }

    exclusions
}
