//! Best-effort bookkeeping in the crawl-run ledger.
//!
//! Ledger writes never affect collection: failures are logged and dropped.

use redlens_core::ScrapeStatus;
use redlens_db::RunType;

use crate::store::ProgressStore;

pub(crate) async fn open_run_best_effort<S: ProgressStore + ?Sized>(
    store: &S,
    run_type: RunType,
) -> Option<i64> {
    match store.open_run(run_type).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(run_type = %run_type, error = %e, "failed to open crawl run");
            None
        }
    }
}

pub(crate) async fn record_blogger_best_effort<S: ProgressStore + ?Sized>(
    store: &S,
    run_id: Option<i64>,
    user_id: &str,
    status: ScrapeStatus,
    notes_added: i32,
    message: Option<&str>,
) {
    let Some(run_id) = run_id else {
        return;
    };
    if let Err(e) = store
        .record_run_blogger(run_id, user_id, status, notes_added, message)
        .await
    {
        tracing::warn!(run_id, user_id, error = %e, "failed to record crawl run blogger");
    }
}

pub(crate) async fn close_run_best_effort<S: ProgressStore + ?Sized>(
    store: &S,
    run_id: Option<i64>,
    notes_added: i32,
    error: Option<&str>,
) {
    let Some(run_id) = run_id else {
        return;
    };
    if let Err(e) = store.close_run(run_id, notes_added, error).await {
        tracing::warn!(run_id, error = %e, "failed to close crawl run");
    }
}

/// Saturating conversion for counters stored as `INTEGER`.
pub(crate) fn to_i32<T: TryInto<i32>>(value: T) -> i32 {
    value.try_into().unwrap_or(i32::MAX)
}
