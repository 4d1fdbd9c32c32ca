//! Blogger inspection, operator actions and outlier analysis.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use redlens_core::{AppConfig, ScrapeStatus};
use redlens_db::BloggerFilter;
use redlens_pipeline::{analyze_all, analyze_blogger, CollectorSettings, PgStore};

/// Sub-commands available under `bloggers`.
#[derive(Debug, Subcommand)]
pub enum BloggerCommands {
    /// List tracked bloggers
    List {
        /// Filter by status (not_started, in_progress, partial, completed, failed)
        #[arg(long)]
        status: Option<ScrapeStatus>,
        /// Filter by source keyword substring
        #[arg(long)]
        keyword: Option<String>,
    },
    /// Show how many bloggers are in each status
    Counts,
    /// Show one blogger and its stored notes
    Show { user_id: String },
    /// Delete a blogger's notes and start it over
    Reset { user_id: String },
    /// Remove a blogger and all its notes
    Delete { user_id: String },
}

/// Format an optional timestamp for display, returning `"-"` when `None`.
pub(crate) fn fmt_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

/// Truncate to `max` characters, appending `...` when cut.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Dispatch a `bloggers` sub-command.
///
/// # Errors
///
/// Returns an error if a query fails or the named blogger does not exist.
pub(crate) async fn run(pool: &sqlx::PgPool, command: BloggerCommands) -> anyhow::Result<()> {
    match command {
        BloggerCommands::List { status, keyword } => {
            run_list(pool, status, keyword.as_deref()).await
        }
        BloggerCommands::Counts => run_counts(pool).await,
        BloggerCommands::Show { user_id } => run_show(pool, &user_id).await,
        BloggerCommands::Reset { user_id } => {
            if !redlens_db::reset_blogger(pool, &user_id).await? {
                anyhow::bail!("blogger '{user_id}' not found");
            }
            println!("reset {user_id} to not_started");
            Ok(())
        }
        BloggerCommands::Delete { user_id } => {
            if !redlens_db::delete_blogger(pool, &user_id).await? {
                anyhow::bail!("blogger '{user_id}' not found");
            }
            println!("deleted {user_id}");
            Ok(())
        }
    }
}

async fn run_list(
    pool: &sqlx::PgPool,
    status: Option<ScrapeStatus>,
    keyword: Option<&str>,
) -> anyhow::Result<()> {
    let rows = redlens_db::list_bloggers(pool, &BloggerFilter { status, keyword }).await?;
    if rows.is_empty() {
        println!("no bloggers found");
        return Ok(());
    }

    println!(
        "{:<26}{:<22}{:<13}{:<11}{:<10}REASON",
        "USER", "NICKNAME", "STATUS", "NOTES", "FANS"
    );
    for row in &rows {
        println!(
            "{:<26}{:<22}{:<13}{:<11}{:<10}{}",
            row.user_id,
            truncate(&row.nickname, 18),
            row.scrape_status,
            format!("{}/{}", row.notes_collected, row.notes_target),
            row.fans(),
            row.failure_reason.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn run_counts(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let counts = redlens_db::count_bloggers_by_status(pool).await?;
    for (status, count) in counts {
        println!("{:<13}{count}", status.as_str());
    }
    Ok(())
}

async fn run_show(pool: &sqlx::PgPool, user_id: &str) -> anyhow::Result<()> {
    let blogger = redlens_db::get_blogger(pool, user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("blogger '{user_id}' not found"))?;
    let notes = redlens_db::list_notes_by_user(pool, user_id).await?;

    println!("{} ({})", blogger.nickname, blogger.user_id);
    println!("status:      {}", blogger.scrape_status);
    println!(
        "notes:       {}/{}",
        blogger.notes_collected, blogger.notes_target
    );
    println!("fans:        {}", blogger.fans());
    println!(
        "keyword:     {}",
        blogger.source_keyword.as_deref().unwrap_or("-")
    );
    println!("last scrape: {}", fmt_time(blogger.last_scrape_at));
    if let Some(reason) = &blogger.failure_reason {
        println!("reason:      {reason}");
    }
    println!();

    for note in &notes {
        println!(
            "{:<26}{:<7}{:>8} likes  {}",
            note.note_id,
            note.note_type,
            note.likes,
            truncate(&note.title, 40)
        );
    }
    Ok(())
}

/// Flag a blogger's outlier notes and print engagement totals.
///
/// # Errors
///
/// Returns an error if the blogger does not exist or a query fails.
pub(crate) async fn run_analyze(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    user_id: &str,
    show_outliers: bool,
) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());
    let policy = CollectorSettings::from_app_config(config).outlier;
    let analysis = analyze_blogger(&store, user_id, &policy).await?;

    println!("blogger:        {}", analysis.user_id);
    println!(
        "notes:          {} ({} image, {} video)",
        analysis.total_notes, analysis.image_count, analysis.video_count
    );
    println!(
        "likes:          {} (avg {:.1})",
        analysis.total_likes, analysis.avg_likes
    );
    println!("collects:       {}", analysis.total_collects);
    println!("comments:       {}", analysis.total_comments);
    println!(
        "outliers:       {} ({:.1}%) at >= {:.0} likes",
        analysis.outlier_count,
        analysis.outlier_rate * 100.0,
        analysis.threshold
    );

    if show_outliers {
        let notes = redlens_db::list_outlier_notes(pool, Some(user_id)).await?;
        println!();
        for note in &notes {
            println!(
                "{:>8} likes  {}  {}",
                note.likes,
                note.note_url,
                truncate(&note.title, 40)
            );
        }
    }
    Ok(())
}


/// Analyze every completed blogger and print them ranked by outlier rate.
///
/// # Errors
///
/// Returns an error if the completed bloggers cannot be listed.
pub(crate) async fn run_analyze_all(pool: &sqlx::PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());
    let policy = CollectorSettings::from_app_config(config).outlier;
    let ranked = analyze_all(&store, &policy).await?;
    if ranked.is_empty() {
        println!("no completed bloggers to analyze");
        return Ok(());
    }

    println!(
        "{:<26}{:>7}{:>11}{:>10}{:>9}",
        "USER", "NOTES", "AVG LIKES", "OUTLIERS", "RATE"
    );
    for analysis in &ranked {
        println!(
            "{:<26}{:>7}{:>11.0}{:>10}{:>8.1}%",
            analysis.user_id,
            analysis.total_notes,
            analysis.avg_likes,
            analysis.outlier_count,
            analysis.outlier_rate * 100.0
        );
    }
    Ok(())
}
