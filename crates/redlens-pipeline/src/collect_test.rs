use std::path::PathBuf;
use std::time::Duration;

use redlens_core::{profile_url, ScrapeStatus};
use redlens_crawler::{ArtifactError, CrawlerError};
use redlens_db::RunType;

use super::*;
use crate::stats::{ErrorScope, FailureKind};
use crate::testing::{collector, creator, ids, raw_notes, Call, MemoryStore, MockCrawler};

#[tokio::test]
async fn timeout_leaves_whole_batch_partial() {
    let store = MemoryStore::new()
        .with_blogger("A", ScrapeStatus::NotStarted, 0)
        .with_blogger("B", ScrapeStatus::NotStarted, 0);
    let crawler = MockCrawler::new().on_notes(Err(CrawlerError::Timeout { secs: 1380 }));
    let c = collector(store, crawler);

    let stats = c
        .run_batch_collection(&ids(&["A", "B"]), 100, 0, 10, false)
        .await;

    assert_eq!(stats.failed, 2);
    assert_eq!(stats.scraped, 0);
    assert_eq!(stats.notes_added, 0);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].scope, ErrorScope::Batch(0));
    assert_eq!(stats.errors[0].kind, FailureKind::Timeout);

    for id in ["A", "B"] {
        let b = c.store().blogger(id);
        assert_eq!(b.progress.status, ScrapeStatus::Partial);
        assert_eq!(b.progress.notes_collected, 0);
        assert_eq!(b.progress.notes_target, 100);
        assert_eq!(b.reason.as_deref(), Some("crawler failed: timed out after 1380s"));
        assert_eq!(b.history, vec![ScrapeStatus::InProgress, ScrapeStatus::Partial]);
    }

    let runs = c.store().runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_type, RunType::Collect);
    assert!(matches!(runs[0].closed, Some(Err(_))));
    assert_eq!(runs[0].bloggers.len(), 2);
}

#[tokio::test]
async fn fans_filter_rejects_below_threshold() {
    let store = MemoryStore::new()
        .with_blogger("A", ScrapeStatus::NotStarted, 0)
        .with_blogger("B", ScrapeStatus::NotStarted, 0);
    let crawler = MockCrawler::new()
        .on_creators(Ok(vec![creator("A", "500"), creator("B", "2000")]))
        .on_notes(Ok(raw_notes("B", "b", 100)));
    let c = collector(store, crawler);

    let stats = c
        .run_batch_collection(&ids(&["A", "B"]), 100, 1000, 10, false)
        .await;

    assert_eq!(stats.skipped_low_fans, 1);
    assert_eq!(stats.scraped, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.notes_added, 100);

    let a = c.store().blogger("A");
    assert_eq!(a.progress.status, ScrapeStatus::Failed);
    assert_eq!(a.reason.as_deref(), Some("fans 500 below threshold 1000"));
    assert_eq!(a.fans, 500);

    let b = c.store().blogger("B");
    assert_eq!(b.progress.status, ScrapeStatus::Completed);
    assert_eq!(b.fans, 2000);
    assert_eq!(b.progress.notes_collected, 100);

    let requests = c.crawler().note_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0.creator_urls, vec![profile_url("B")]);

    let lookup = c
        .crawler()
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::Creators(request, timeout) => Some((request, timeout)),
            _ => None,
        })
        .unwrap();
    assert_eq!(lookup.0.max_notes, 1);
    assert_eq!(lookup.1, Duration::from_secs(300));

    let runs = c.store().runs();
    assert_eq!(runs[0].run_type, RunType::Fans);
    assert_eq!(runs[0].bloggers, vec![("A".to_string(), ScrapeStatus::Failed)]);
    assert_eq!(runs[1].run_type, RunType::Collect);
    assert_eq!(runs[1].closed, Some(Ok(100)));
}

#[tokio::test]
async fn missing_follower_data_counts_as_zero() {
    let store = MemoryStore::new().with_blogger("A", ScrapeStatus::NotStarted, 0);
    let crawler = MockCrawler::new().on_creators(Ok(Vec::new()));
    let c = collector(store, crawler);

    let stats = c.run_batch_collection(&ids(&["A"]), 10, 1, 10, false).await;

    assert_eq!(stats.skipped_low_fans, 1);
    assert_eq!(c.store().blogger("A").fans, 0);
    assert_eq!(
        c.store().blogger("A").reason.as_deref(),
        Some("fans 0 below threshold 1")
    );
    assert!(c.crawler().note_requests().is_empty());
}

#[tokio::test]
async fn zero_threshold_skips_the_lookup() {
    let store = MemoryStore::new().with_blogger("A", ScrapeStatus::NotStarted, 0);
    let crawler = MockCrawler::new().on_notes(Ok(raw_notes("A", "a", 5)));
    let c = collector(store, crawler);

    let stats = c.run_batch_collection(&ids(&["A"]), 5, 0, 10, false).await;

    assert_eq!(c.crawler().creator_lookups(), 0);
    assert_eq!(stats.scraped, 1);
    assert_eq!(c.store().blogger("A").progress.status, ScrapeStatus::Completed);
}

#[tokio::test]
async fn failed_fans_lookup_collects_nobody() {
    let store = MemoryStore::new()
        .with_blogger("A", ScrapeStatus::NotStarted, 0)
        .with_blogger("B", ScrapeStatus::NotStarted, 0);
    let crawler =
        MockCrawler::new().on_creators(Err(CrawlerError::NonZeroExit { code: Some(1) }));
    let c = collector(store, crawler);

    let stats = c
        .run_batch_collection(&ids(&["A", "B"]), 10, 100, 10, false)
        .await;

    assert_eq!(stats.failed, 2);
    assert_eq!(stats.errors[0].scope, ErrorScope::FansLookup);
    assert!(c.crawler().note_requests().is_empty());
    assert_eq!(c.store().blogger("A").progress.status, ScrapeStatus::NotStarted);
}

#[tokio::test]
async fn reinserted_notes_are_not_counted_twice() {
    let store = MemoryStore::new()
        .with_blogger("A", ScrapeStatus::Partial, 5)
        .with_notes("A", 3);
    let mut returned = raw_notes("A", "A-s", 2);
    returned.extend(raw_notes("A", "new", 2));
    let crawler = MockCrawler::new().on_notes(Ok(returned));
    let c = collector(store, crawler);

    let stats = c.run_batch_collection(&ids(&["A"]), 100, 0, 10, true).await;

    assert_eq!(stats.notes_added, 2);
    assert_eq!(stats.resumed, 1);
    assert_eq!(c.store().note_count("A"), 5);
    let a = c.store().blogger("A");
    assert_eq!(a.progress.status, ScrapeStatus::Completed);
    assert_eq!(a.progress.notes_collected, 5);
    assert_eq!(a.progress.notes_target, 5);
}

#[tokio::test]
async fn short_source_completes_with_lowered_target() {
    let store = MemoryStore::new()
        .with_blogger("A", ScrapeStatus::Partial, 100)
        .with_notes("A", 60);
    let crawler = MockCrawler::new().on_notes(Ok(raw_notes("A", "fresh", 30)));
    let c = collector(store, crawler);

    let stats = c.resume(&ids(&["A"]), 100, 10).await;

    assert_eq!(stats.scraped, 1);
    assert_eq!(stats.notes_added, 30);
    let a = c.store().blogger("A");
    assert_eq!(a.progress.status, ScrapeStatus::Completed);
    assert_eq!(a.progress.notes_collected, 90);
    assert_eq!(a.progress.notes_target, 90);

    // Budget is what was still needed, not the full target.
    let requests = c.crawler().note_requests();
    assert_eq!(requests[0].0.max_notes, 40);
}

#[tokio::test]
async fn store_outage_leaves_blogger_partial_not_completed() {
    let store = MemoryStore::new()
        .with_blogger("A", ScrapeStatus::NotStarted, 0)
        .with_blogger("B", ScrapeStatus::NotStarted, 0)
        .rejecting_notes_for("A");
    let crawler = MockCrawler::new().on_notes(Ok([
        raw_notes("A", "a", 100),
        raw_notes("B", "b", 100),
    ]
    .concat()));
    let c = collector(store, crawler);

    let stats = c
        .run_batch_collection(&ids(&["A", "B"]), 100, 0, 10, false)
        .await;

    assert_eq!(stats.scraped, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.notes_added, 100);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].scope, ErrorScope::Blogger("A".to_string()));
    assert_eq!(stats.errors[0].kind, FailureKind::Store);

    let a = c.store().blogger("A");
    assert_eq!(a.progress.status, ScrapeStatus::Partial);
    assert_eq!(a.progress.notes_collected, 0);
    assert_eq!(a.progress.notes_target, 100);
    assert_eq!(
        a.reason.as_deref(),
        Some("store error: 100 of 100 notes could not be saved")
    );

    let b = c.store().blogger("B");
    assert_eq!(b.progress.status, ScrapeStatus::Completed);

    // Still eligible for resume.
    let pending = c.store().pending(10, None, true).await.unwrap();
    assert!(pending.iter().any(|p| p.user_id == "A"));
}

#[tokio::test]
async fn missing_result_file_is_partial() {
    let store = MemoryStore::new().with_blogger("A", ScrapeStatus::NotStarted, 0);
    let crawler = MockCrawler::new().on_notes(Err(CrawlerError::Artifact(
        ArtifactError::NotFound {
            pattern: PathBuf::from("data/xhs/json/creator_contents_*.json"),
        },
    )));
    let c = collector(store, crawler);

    let stats = c.run_batch_collection(&ids(&["A"]), 10, 0, 10, false).await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.errors[0].kind, FailureKind::NoResultFile);
    let a = c.store().blogger("A");
    assert_eq!(a.progress.status, ScrapeStatus::Partial);
    assert_eq!(a.reason.as_deref(), Some("no result file"));
}

#[tokio::test]
async fn launch_failure_marks_bloggers_failed() {
    let store = MemoryStore::new().with_blogger("A", ScrapeStatus::NotStarted, 0);
    let crawler = MockCrawler::new().on_notes(Err(CrawlerError::Spawn {
        program: "uv".into(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    }));
    let c = collector(store, crawler);

    let stats = c.run_batch_collection(&ids(&["A"]), 10, 0, 10, false).await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.errors[0].kind, FailureKind::Launch);
    let a = c.store().blogger("A");
    assert_eq!(a.progress.status, ScrapeStatus::Failed);
    assert!(a.reason.unwrap().starts_with("crawler could not start"));
}

#[tokio::test]
async fn empty_result_is_partial_with_reason() {
    let store = MemoryStore::new().with_blogger("A", ScrapeStatus::NotStarted, 0);
    let c = collector(store, MockCrawler::new().on_notes(Ok(Vec::new())));

    let stats = c.run_batch_collection(&ids(&["A"]), 10, 0, 10, false).await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.scraped, 0);
    let a = c.store().blogger("A");
    assert_eq!(a.progress.status, ScrapeStatus::Partial);
    assert_eq!(a.reason.as_deref(), Some("no notes in result"));
}

#[tokio::test]
async fn finished_and_resumable_bloggers_are_skipped_without_resume() {
    let store = MemoryStore::new()
        .with_blogger("done", ScrapeStatus::Completed, 10)
        .with_blogger("dead", ScrapeStatus::Failed, 10)
        .with_blogger("half", ScrapeStatus::Partial, 10)
        .with_blogger("new", ScrapeStatus::NotStarted, 0);
    let c = collector(store, MockCrawler::new().on_notes(Ok(raw_notes("new", "n", 10))));

    let stats = c
        .run_batch_collection(&ids(&["done", "dead", "half", "new"]), 10, 0, 10, false)
        .await;

    assert_eq!(stats.scraped, 1);
    assert_eq!(stats.resumed, 0);
    let requests = c.crawler().note_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0.creator_urls, vec![profile_url("new")]);
    assert_eq!(c.store().blogger("half").progress.status, ScrapeStatus::Partial);
}

#[tokio::test]
async fn unknown_and_duplicate_ids_are_handled() {
    let store = MemoryStore::new().with_blogger("A", ScrapeStatus::NotStarted, 0);
    let c = collector(store, MockCrawler::new().on_notes(Ok(raw_notes("A", "a", 3))));

    let stats = c
        .run_batch_collection(&ids(&["A", "ghost", "A"]), 3, 0, 10, false)
        .await;

    assert_eq!(stats.scraped, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.errors[0].kind, FailureKind::UnknownBlogger);
    assert_eq!(c.crawler().note_requests()[0].0.creator_urls.len(), 1);
}

#[tokio::test]
async fn batches_run_in_order_with_sized_timeouts() {
    let mut store = MemoryStore::new();
    for id in ["A", "B", "C", "D", "E"] {
        store = store.with_blogger(id, ScrapeStatus::NotStarted, 0);
    }
    let crawler = MockCrawler::new()
        .on_notes(Ok([raw_notes("A", "a", 100), raw_notes("B", "b", 100)].concat()))
        .on_notes(Ok([raw_notes("C", "c", 100), raw_notes("D", "d", 100)].concat()))
        .on_notes(Ok(raw_notes("E", "e", 100)));
    let c = collector(store, crawler);

    let stats = c
        .run_batch_collection(&ids(&["A", "B", "C", "D", "E"]), 100, 0, 2, false)
        .await;

    assert_eq!(stats.scraped, 5);
    assert_eq!(stats.notes_added, 500);
    let requests = c.crawler().note_requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[0].0.creator_urls,
        vec![profile_url("A"), profile_url("B")]
    );
    assert_eq!(requests[2].0.creator_urls, vec![profile_url("E")]);
    assert_eq!(requests[0].1, Duration::from_secs(1380));
    assert_eq!(requests[2].1, Duration::from_secs(690));
    assert_eq!(c.store().runs().len(), 3);
}

#[tokio::test]
async fn stored_note_ids_are_sent_as_exclusions() {
    let store = MemoryStore::new()
        .with_blogger("A", ScrapeStatus::Partial, 10)
        .with_notes("A", 4);
    let c = collector(store, MockCrawler::new().on_notes(Ok(raw_notes("A", "x", 6))));

    c.run_batch_collection(&ids(&["A"]), 10, 0, 10, true).await;

    let request = &c.crawler().note_requests()[0].0;
    let excluded = &request.exclude_note_ids["A"];
    assert_eq!(excluded.len(), 4);
    assert!(excluded.contains(&"A-s0".to_string()));
    assert_eq!(request.max_notes, 6);
}

#[tokio::test]
async fn resume_picks_up_failed_and_skips_completed() {
    let store = MemoryStore::new()
        .with_blogger("done", ScrapeStatus::Completed, 10)
        .with_blogger("dead", ScrapeStatus::Failed, 10)
        .with_blogger("stuck", ScrapeStatus::InProgress, 10)
        .with_notes("stuck", 2);
    let crawler = MockCrawler::new().on_notes(Ok(
        [raw_notes("dead", "d", 10), raw_notes("stuck", "s", 8)].concat(),
    ));
    let c = collector(store, crawler);

    let stats = c.resume(&ids(&["done", "dead", "stuck"]), 50, 10).await;

    assert_eq!(stats.resumed, 2);
    assert_eq!(stats.scraped, 2);
    assert_eq!(c.crawler().creator_lookups(), 0);
    for id in ["dead", "stuck"] {
        let b = c.store().blogger(id);
        assert_eq!(b.progress.status, ScrapeStatus::Completed);
        assert_eq!(b.progress.notes_collected, 10);
        assert_eq!(b.progress.notes_target, 10);
    }
    assert_eq!(c.store().blogger("done").history, Vec::new());
}

#[tokio::test]
async fn blogger_already_at_target_completes_without_crawl() {
    let store = MemoryStore::new()
        .with_blogger("A", ScrapeStatus::Partial, 3)
        .with_notes("A", 3);
    let c = collector(store, MockCrawler::new());

    let stats = c.resume(&ids(&["A"]), 10, 10).await;

    assert_eq!(stats.scraped, 1);
    assert!(c.crawler().calls().is_empty());
    assert_eq!(c.store().blogger("A").progress.status, ScrapeStatus::Completed);
}

#[tokio::test]
async fn notes_for_other_bloggers_are_ignored() {
    let store = MemoryStore::new()
        .with_blogger("A", ScrapeStatus::NotStarted, 0)
        .with_blogger("B", ScrapeStatus::NotStarted, 0);
    let crawler = MockCrawler::new()
        .on_notes(Ok([raw_notes("A", "a", 2), raw_notes("B", "b", 2)].concat()));
    let c = collector(store, crawler);

    c.run_batch_collection(&ids(&["A"]), 2, 0, 10, false).await;

    assert_eq!(c.store().note_count("A"), 2);
    assert_eq!(c.store().note_count("B"), 0);
    assert_eq!(c.store().blogger("B").progress.status, ScrapeStatus::NotStarted);
}

#[tokio::test]
async fn pending_candidates_filters_by_keyword_and_status() {
    let store = MemoryStore::new()
        .with_blogger("A", ScrapeStatus::NotStarted, 0)
        .with_keyword("A", "coffee beans")
        .with_blogger("B", ScrapeStatus::Partial, 10)
        .with_keyword("B", "coffee")
        .with_blogger("C", ScrapeStatus::NotStarted, 0)
        .with_keyword("C", "tea");

    assert_eq!(
        pending_candidates(&store, 10, Some("coffee"), false).await.unwrap(),
        ids(&["A"])
    );
    assert_eq!(
        pending_candidates(&store, 10, Some("coffee"), true).await.unwrap(),
        ids(&["A", "B"])
    );
    assert_eq!(
        pending_candidates(&store, 1, None, true).await.unwrap(),
        ids(&["A"])
    );
}
