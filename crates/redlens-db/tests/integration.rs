//! Offline unit tests for redlens-db pool configuration and row types.
//! These tests do not require a live database connection.

use redlens_core::{AppConfig, Environment, NoteKind, ScrapeStatus};
use redlens_db::{
    BloggerFilter, BloggerNoteStats, BloggerRow, CrawlRunBloggerRow, CrawlRunRow, NoteRow,
    PoolConfig, RunType,
};
use std::path::PathBuf;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        crawler_program: "uv".to_string(),
        crawler_args: vec!["run".to_string(), "main.py".to_string()],
        crawler_workdir: PathBuf::from("."),
        crawler_data_dir: PathBuf::from("data/xhs/json"),
        crawler_config_file: None,
        notes_target: 100,
        batch_size: 5,
        secs_per_note: 4,
        overhead_per_blogger_secs: 60,
        timeout_multiplier: 1.5,
        timeout_floor_secs: 300,
        timeout_ceiling_secs: 7200,
        batch_delay_min_secs: 10,
        batch_delay_max_secs: 30,
        exclusion_cap: 1000,
        outlier_multiplier: 3.0,
        outlier_min_likes: 500,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn run_type_strings_match_schema_check_constraint() {
    let all = [
        RunType::Collect,
        RunType::Resume,
        RunType::Fans,
        RunType::Discover,
    ];
    let names: Vec<&str> = all.iter().map(|t| t.as_str()).collect();
    assert_eq!(names, ["collect", "resume", "fans", "discover"]);
    assert_eq!(RunType::Fans.to_string(), "fans");
}

/// Compile-time smoke test: confirm that [`CrawlRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn crawl_run_row_has_expected_fields() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = CrawlRunRow {
        id: 1_i64,
        public_id: Uuid::new_v4(),
        run_type: "collect".to_string(),
        trigger_source: "cli".to_string(),
        status: "queued".to_string(),
        started_at: None,
        completed_at: None,
        records_processed: 0_i32,
        error_message: None,
        created_at: Utc::now(),
    };

    assert_eq!(row.id, 1);
    assert_eq!(row.run_type, "collect");
    assert_eq!(row.status, "queued");
    assert!(row.started_at.is_none());

    let child = CrawlRunBloggerRow {
        id: 1,
        crawl_run_id: row.id,
        user_id: "u1".to_string(),
        status: "partial".to_string(),
        records_processed: 3,
        error_message: Some("crawler failed: timed out after 300s".to_string()),
        created_at: Utc::now(),
    };
    assert_eq!(child.crawl_run_id, 1);
    assert_eq!(child.records_processed, 3);
}

fn blogger_row(current_fans: i64, initial_fans: i64) -> BloggerRow {
    use chrono::Utc;

    BloggerRow {
        user_id: "u1".to_string(),
        nickname: "someone".to_string(),
        avatar_url: None,
        initial_fans,
        current_fans,
        source_keyword: Some("coffee".to_string()),
        scrape_status: ScrapeStatus::NotStarted,
        notes_collected: 0,
        notes_target: 100,
        failure_reason: None,
        last_scrape_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn blogger_fans_prefers_refreshed_count() {
    assert_eq!(blogger_row(2_000, 500).fans(), 2_000);
    assert_eq!(blogger_row(0, 500).fans(), 500);
    assert_eq!(blogger_row(0, 0).fans(), 0);
}

#[test]
fn blogger_filter_defaults_to_everything() {
    let filter = BloggerFilter::default();
    assert!(filter.status.is_none());
    assert!(filter.keyword.is_none());
}

#[test]
fn note_row_and_stats_have_expected_fields() {
    use chrono::Utc;

    let row = NoteRow {
        note_id: "n1".to_string(),
        user_id: "u1".to_string(),
        title: "t".to_string(),
        description: String::new(),
        note_type: NoteKind::Video,
        likes: 10,
        collects: 2,
        comments: 1,
        create_time: None,
        crawled_at: Utc::now(),
        cover_url: None,
        note_url: redlens_core::note_url("n1"),
        local_cover_path: None,
        is_outlier: false,
    };
    assert_eq!(row.note_type, NoteKind::Video);
    assert!(row.note_url.ends_with("/explore/n1"));

    let stats = BloggerNoteStats::default();
    assert_eq!(stats.total_notes, 0);
    assert!(stats.avg_likes.abs() < f64::EPSILON);
}
