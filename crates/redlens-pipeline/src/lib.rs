//! Resumable batch collection of blogger notes.
//!
//! A [`Collector`] pairs a [`ProgressStore`] with a [`Crawler`] and drives
//! bloggers through `not_started -> in_progress -> completed | partial |
//! failed`, one crawler invocation per batch. Batch operations return
//! [`CollectionStats`] instead of failing; single-shot operations
//! (discovery, analysis, candidate listing) return [`PipelineError`].
//!
//! [`Crawler`]: redlens_crawler::Crawler

mod analysis;
mod collect;
mod discovery;
mod error;
mod exclusion;
mod executor;
mod fans;
mod ledger;
mod planner;
mod reconcile;
mod stats;
mod store;

#[cfg(test)]
mod testing;

pub use analysis::{analyze_all, analyze_blogger, BloggerAnalysis, OutlierPolicy};
pub use collect::{pending_candidates, Collector, CollectorSettings};
pub use discovery::DiscoveryReport;
pub use error::PipelineError;
pub use fans::{check_fans, FansVerdict};
pub use planner::{plan_batches, TimeoutPolicy};
pub use reconcile::{classify, Observation, Verdict};
pub use stats::{CollectionStats, ErrorScope, FailureKind, StatsError};
pub use store::{BloggerProgress, PgStore, ProgressStore};
