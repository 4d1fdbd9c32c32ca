//! Collection command handlers: discover, collect, resume and the run
//! ledger listing.
//!
//! Batch failures never abort a command; they are summarized from the
//! returned stats after the run.

use redlens_core::AppConfig;
use redlens_crawler::MediaCrawler;
use redlens_pipeline::{
    pending_candidates, CollectionStats, Collector, CollectorSettings, PgStore, ProgressStore,
};

/// Options for `collect`, resolved against config defaults.
#[derive(Debug, Clone)]
pub(crate) struct CollectOptions {
    pub users: Vec<String>,
    pub limit: i64,
    pub keyword: Option<String>,
    pub budget: i32,
    pub min_fans: i64,
    pub batch_size: usize,
    pub resume: bool,
    pub dry_run: bool,
}

fn build_collector(pool: &sqlx::PgPool, config: &AppConfig) -> Collector<PgStore, MediaCrawler> {
    Collector::new(
        PgStore::new(pool.clone()),
        MediaCrawler::from_app_config(config),
        CollectorSettings::from_app_config(config),
    )
}

/// Search for new bloggers and store the ones above `min_likes`.
///
/// # Errors
///
/// Returns an error if no search results can be read or a blogger cannot
/// be stored.
pub(crate) async fn run_discover(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    keywords: &[String],
    min_likes: i64,
    max_notes: u32,
    use_existing: bool,
) -> anyhow::Result<()> {
    let collector = build_collector(pool, config);
    let report = collector
        .discover(keywords, min_likes, max_notes, use_existing)
        .await?;

    println!(
        "discovered {} blogger(s) with a note at or above {min_likes} likes; {} new{}",
        report.found,
        report.inserted,
        if report.used_existing {
            " (from existing search results)"
        } else {
            ""
        }
    );
    Ok(())
}

/// Collect notes for explicitly named bloggers or the pending queue.
///
/// # Errors
///
/// Returns an error only if the pending queue cannot be read.
pub(crate) async fn run_collect(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    options: &CollectOptions,
) -> anyhow::Result<()> {
    let collector = build_collector(pool, config);

    let candidates = if options.users.is_empty() {
        pending_candidates(
            collector.store(),
            options.limit,
            options.keyword.as_deref(),
            options.resume,
        )
        .await?
    } else {
        options.users.clone()
    };

    if candidates.is_empty() {
        println!("no pending bloggers; run `discover` first");
        return Ok(());
    }

    if options.dry_run {
        println!(
            "dry-run: would collect up to {} notes each for {} blogger(s) in batches of {}",
            options.budget,
            candidates.len(),
            options.batch_size.max(1)
        );
        for id in &candidates {
            println!("  {id}");
        }
        return Ok(());
    }

    tracing::info!(
        bloggers = candidates.len(),
        budget = options.budget,
        min_fans = options.min_fans,
        batch_size = options.batch_size,
        resume = options.resume,
        "starting collection"
    );
    let stats = collector
        .run_batch_collection(
            &candidates,
            options.budget,
            options.min_fans,
            options.batch_size,
            options.resume,
        )
        .await;
    print_stats(&stats);
    Ok(())
}

/// Continue collection for the named bloggers, or for every partial or
/// interrupted one.
///
/// # Errors
///
/// Returns an error only if the resumable bloggers cannot be listed.
pub(crate) async fn run_resume(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    users: Vec<String>,
    limit: i64,
    budget: i32,
    batch_size: usize,
) -> anyhow::Result<()> {
    let collector = build_collector(pool, config);

    let ids = if users.is_empty() {
        collector
            .store()
            .pending(limit, None, true)
            .await?
            .into_iter()
            .filter(|p| p.status.is_resumable())
            .map(|p| p.user_id)
            .collect()
    } else {
        users
    };

    if ids.is_empty() {
        println!("nothing to resume");
        return Ok(());
    }

    tracing::info!(bloggers = ids.len(), budget, batch_size, "resuming collection");
    let stats = collector.resume(&ids, budget, batch_size).await;
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &CollectionStats) {
    println!(
        "scraped {}, failed {}, notes added {}, skipped (low fans) {}, resumed {}",
        stats.scraped, stats.failed, stats.notes_added, stats.skipped_low_fans, stats.resumed
    );
    for error in &stats.errors {
        println!("  {} [{:?}]: {}", error.scope, error.kind, error.message);
    }
}

/// Show the most recent crawler invocations.
///
/// # Errors
///
/// Returns an error if the query fails.
pub(crate) async fn run_runs_list(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = redlens_db::list_crawl_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no crawl runs recorded");
        return Ok(());
    }

    println!(
        "{:<8}{:<10}{:<11}{:<18}{:<8}ERROR",
        "ID", "TYPE", "STATUS", "STARTED", "NOTES"
    );
    for run in &runs {
        println!(
            "{:<8}{:<10}{:<11}{:<18}{:<8}{}",
            run.id,
            run.run_type,
            run.status,
            crate::bloggers::fmt_time(run.started_at),
            run.records_processed,
            run.error_message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
