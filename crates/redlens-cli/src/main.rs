mod bloggers;
mod collect;

use anyhow::Context;
use clap::{Parser, Subcommand};
use redlens_core::AppConfig;
use tracing_subscriber::EnvFilter;

use crate::bloggers::BloggerCommands;

#[derive(Debug, Parser)]
#[command(name = "redlens-cli")]
#[command(about = "Collect and analyze notes from tracked bloggers")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Find new bloggers through keyword search
    Discover {
        /// Search keyword; repeat for several
        #[arg(long = "keyword", required_unless_present = "use_existing")]
        keywords: Vec<String>,
        /// Minimum likes on a note for its author to be tracked
        #[arg(long, default_value = "1000")]
        min_likes: i64,
        /// Notes to fetch per keyword
        #[arg(long, default_value = "20")]
        max_notes: u32,
        /// Import every search results file on disk instead of searching
        #[arg(long)]
        use_existing: bool,
    },
    /// Collect notes for pending bloggers
    Collect {
        /// Collect these bloggers instead of the pending queue; repeatable
        #[arg(long = "user")]
        users: Vec<String>,
        /// Maximum bloggers taken from the pending queue
        #[arg(long, default_value = "50")]
        limit: i64,
        /// Only bloggers whose source keyword contains this
        #[arg(long)]
        keyword: Option<String>,
        /// Notes to collect per blogger (defaults to REDLENS_NOTES_TARGET)
        #[arg(long)]
        budget: Option<i32>,
        /// Skip bloggers with fewer followers than this; 0 disables the check
        #[arg(long, default_value = "0")]
        min_fans: i64,
        /// Bloggers per crawler invocation (defaults to REDLENS_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Also pick up partial and interrupted bloggers
        #[arg(long)]
        resume: bool,
        /// Print the selected bloggers without crawling
        #[arg(long)]
        dry_run: bool,
    },
    /// Continue collection from stored progress
    Resume {
        /// Resume these bloggers; defaults to every partial or interrupted one
        #[arg(long = "user")]
        users: Vec<String>,
        #[arg(long, default_value = "50")]
        limit: i64,
        #[arg(long)]
        budget: Option<i32>,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Inspect and manage tracked bloggers
    Bloggers {
        #[command(subcommand)]
        command: BloggerCommands,
    },
    /// Flag outlier notes for a blogger and print engagement totals
    Analyze {
        #[arg(required_unless_present = "all")]
        user_id: Option<String>,
        /// Analyze every completed blogger and rank them by outlier rate
        #[arg(long, conflicts_with = "user_id")]
        all: bool,
        /// Also list the flagged notes
        #[arg(long)]
        show_outliers: bool,
    },
    /// Show recent crawler invocations
    Runs {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("redlens-cli ready; run with --help for commands");
        return Ok(());
    };

    let config = redlens_core::load_app_config_from_env().context("failed to load config")?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config)?)
        .init();

    let pool_config = redlens_db::PoolConfig::from_app_config(&config);
    let pool = redlens_db::connect_pool(&config.database_url, pool_config)
        .await
        .context("failed to connect to database")?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                redlens_db::ping(&pool).await?;
                println!("database reachable");
            }
            DbCommands::Migrate => {
                let applied = redlens_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
        },
        Commands::Discover {
            keywords,
            min_likes,
            max_notes,
            use_existing,
        } => {
            collect::run_discover(&pool, &config, &keywords, min_likes, max_notes, use_existing)
                .await?;
        }
        Commands::Collect {
            users,
            limit,
            keyword,
            budget,
            min_fans,
            batch_size,
            resume,
            dry_run,
        } => {
            let options = collect::CollectOptions {
                users,
                limit,
                keyword,
                budget: budget.unwrap_or(config.notes_target),
                min_fans,
                batch_size: batch_size.unwrap_or(config.batch_size),
                resume,
                dry_run,
            };
            collect::run_collect(&pool, &config, &options).await?;
        }
        Commands::Resume {
            users,
            limit,
            budget,
            batch_size,
        } => {
            collect::run_resume(
                &pool,
                &config,
                users,
                limit,
                budget.unwrap_or(config.notes_target),
                batch_size.unwrap_or(config.batch_size),
            )
            .await?;
        }
        Commands::Bloggers { command } => bloggers::run(&pool, command).await?,
        Commands::Analyze {
            user_id,
            all,
            show_outliers,
        } => match user_id {
            Some(user_id) if !all => {
                bloggers::run_analyze(&pool, &config, &user_id, show_outliers).await?;
            }
            _ => bloggers::run_analyze_all(&pool, &config).await?,
        },
        Commands::Runs { limit } => collect::run_runs_list(&pool, limit).await?,
    }

    Ok(())
}

/// `REDLENS_LOG_LEVEL` wins when set, then `RUST_LOG`, then the configured
/// default.
fn env_filter(config: &AppConfig) -> anyhow::Result<EnvFilter> {
    if std::env::var_os("REDLENS_LOG_LEVEL").is_some() {
        return Ok(EnvFilter::try_new(&config.log_level)?);
    }
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?)
}
