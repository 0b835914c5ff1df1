//! Integration tests for the page walker.
//!
//! Upstream pages are scripted with `MockPageFetcher`; records and
//! checkpoints land in a real SQLite database.

use std::time::Duration;

use db::{
    models::{
        board::{Board, CreateBoard},
        cache_entry::CacheEntry,
        comment::{Comment, CreateComment},
        discussion::{CreateDiscussion, Discussion},
    },
    test_utils::{create_test_pool, reject_inserts_of},
};
use serde_json::{Value, json};
use services::services::{
    checkpoint_cache::CheckpointCache,
    kinds::{ChildKind, CommentKind, DiscussionKind, ParentRef, PopularTagKind},
    page_fetcher::{MockPageFetcher, listing_body},
    pagination::Listing,
    page_walker::{PageWalker, WalkError, WalkOutcome, WalkReport},
    rate_limiter::RateLimiter,
    retry::{FetchError, RetryPolicy},
    talk_client::TalkClientError,
};
use sqlx::SqlitePool;

const PAGE_SIZE: u32 = 50;

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_retries,
        Duration::from_millis(1),
        Duration::from_millis(5),
    )
}

fn comment_items(discussion: &str, ids: std::ops::Range<u32>) -> Vec<Value> {
    ids.map(|n| {
        json!({
            "id": format!("{discussion}-c{n}"),
            "discussion_id": discussion,
            "board_id": "b1",
            "body": format!("comment {n}"),
        })
    })
    .collect()
}

/// Script `total` comments for `discussion`, split into pages of 50.
fn script_comments(fetcher: &MockPageFetcher, discussion: &str, total: u32) {
    let listing = Listing::comments(PAGE_SIZE);
    let page_count = total.div_ceil(PAGE_SIZE);
    if page_count == 0 {
        fetcher.insert_page(
            &listing.page_key(discussion, 1),
            listing_body("comments", vec![], 1, PAGE_SIZE, 0, 0, None),
        );
        return;
    }
    for page in 1..=page_count {
        let start = (page - 1) * PAGE_SIZE;
        let end = (start + PAGE_SIZE).min(total);
        let next = (page < page_count).then_some(page + 1);
        fetcher.insert_page(
            &listing.page_key(discussion, page),
            listing_body(
                "comments",
                comment_items(discussion, start..end),
                page,
                PAGE_SIZE,
                total as u64,
                page_count,
                next,
            ),
        );
    }
}

async fn seed_discussion(pool: &SqlitePool, id: &str, comments_count: i64) -> ParentRef {
    let data: CreateDiscussion = serde_json::from_value(json!({
        "id": id,
        "board_id": "b1",
        "title": format!("Discussion {id}"),
        "comments_count": comments_count,
    }))
    .unwrap();
    let discussion = Discussion::create(pool, &data).await.unwrap();
    ParentRef::from(&discussion)
}

async fn walk<K: ChildKind>(
    pool: &SqlitePool,
    kind: &K,
    fetcher: &MockPageFetcher,
    checkpoints: &mut CheckpointCache,
    retry: &RetryPolicy,
    parent: &ParentRef,
) -> Result<WalkReport, WalkError> {
    let mut limiter = RateLimiter::new(Duration::ZERO);
    let mut walker = PageWalker::new(pool, kind, fetcher, checkpoints, &mut limiter, retry);
    walker.walk(parent).await
}

async fn comment_count(pool: &SqlitePool, discussion: &str) -> i64 {
    Comment::count_by_discussion(pool, discussion).await.unwrap()
}

#[tokio::test]
async fn test_fresh_run_fetches_every_page_once() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "42", 120).await;
    let fetcher = MockPageFetcher::new();
    script_comments(&fetcher, "42", 120);
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    let report = walk(
        &pool,
        &CommentKind::new(PAGE_SIZE),
        &fetcher,
        &mut checkpoints,
        &fast_retry(3),
        &parent,
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Done);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.inserted, 120);
    assert_eq!(report.failed, 0);
    let listing = Listing::comments(PAGE_SIZE);
    assert_eq!(
        fetcher.calls(),
        (1..=3)
            .map(|page| listing.page_key("42", page).cache_key())
            .collect::<Vec<_>>()
    );
    assert_eq!(comment_count(&pool, "42").await, 120);
    assert_eq!(CacheEntry::find_all(&pool).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_restart_resumes_at_first_unfinished_page() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "42", 120).await;
    let fetcher = MockPageFetcher::new();
    script_comments(&fetcher, "42", 120);
    let listing = Listing::comments(PAGE_SIZE);
    let kind = CommentKind::new(PAGE_SIZE);

    // First run dies on page 3.
    fetcher.fail_next(
        &listing.page_key("42", 3),
        TalkClientError::Http {
            status: 403,
            body: "forbidden".to_string(),
        },
    );
    let mut checkpoints = CheckpointCache::empty(pool.clone());
    let err = walk(&pool, &kind, &fetcher, &mut checkpoints, &fast_retry(3), &parent)
        .await
        .unwrap_err();
    assert!(matches!(err, WalkError::Fetch(FetchError::Permanent { .. })));
    assert_eq!(comment_count(&pool, "42").await, 100);

    // A new process starts from the durable checkpoints only.
    fetcher.clear_calls();
    let mut checkpoints = CheckpointCache::load(pool.clone()).await.unwrap();
    let report = walk(&pool, &kind, &fetcher, &mut checkpoints, &fast_retry(3), &parent)
        .await
        .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Done);
    assert_eq!(fetcher.calls(), vec![listing.page_key("42", 3).cache_key()]);
    assert_eq!(report.pages_skipped, 2);
    assert_eq!(report.inserted, 20);
    assert_eq!(comment_count(&pool, "42").await, 120);
}

#[tokio::test]
async fn test_completed_listing_is_not_fetched_again() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "42", 120).await;
    let fetcher = MockPageFetcher::new();
    script_comments(&fetcher, "42", 120);
    let kind = CommentKind::new(PAGE_SIZE);
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    walk(&pool, &kind, &fetcher, &mut checkpoints, &fast_retry(3), &parent)
        .await
        .unwrap();
    fetcher.clear_calls();

    let report = walk(&pool, &kind, &fetcher, &mut checkpoints, &fast_retry(3), &parent)
        .await
        .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Done);
    assert_eq!(report.pages_fetched, 0);
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(comment_count(&pool, "42").await, 120);
    assert_eq!(CacheEntry::find_all(&pool).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_emptied_discussion_is_deleted_with_its_comments() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "42", 0).await;
    let unrelated = seed_discussion(&pool, "420", 1).await;
    let kind = CommentKind::new(PAGE_SIZE);
    let listing = Listing::comments(PAGE_SIZE);

    for item in comment_items("42", 0..2).into_iter().chain(comment_items("420", 0..1)) {
        let data: CreateComment = serde_json::from_value(item).unwrap();
        Comment::create(&pool, &data).await.unwrap();
    }
    let mut checkpoints = CheckpointCache::empty(pool.clone());
    let stale = listing.page_key("42", 2);
    let envelope = services::services::pagination::PageEnvelope {
        page: 2,
        page_size: PAGE_SIZE,
        count: 60,
        page_count: 2,
        previous_page: Some(1),
        next_page: None,
    };
    checkpoints.put(&stale, &envelope).await.unwrap();
    checkpoints
        .put(&listing.page_key("420", 1), &envelope)
        .await
        .unwrap();

    let fetcher = MockPageFetcher::new();
    script_comments(&fetcher, "42", 0);

    let report = walk(&pool, &kind, &fetcher, &mut checkpoints, &fast_retry(3), &parent)
        .await
        .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Deleted);
    assert!(!Discussion::exists(&pool, "42").await.unwrap());
    assert_eq!(comment_count(&pool, "42").await, 0);
    assert!(checkpoints.get(&stale).await.unwrap().is_none());
    assert!(CacheEntry::find_by_key(&pool, &stale.cache_key())
        .await
        .unwrap()
        .is_none());

    // Neighbouring parent with a longer id is untouched.
    assert!(Discussion::exists(&pool, &unrelated.external_id).await.unwrap());
    assert_eq!(comment_count(&pool, "420").await, 1);
    assert!(
        checkpoints
            .get(&listing.page_key("420", 1))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_emptied_board_is_deleted_with_its_subtree() {
    let (pool, _dir) = create_test_pool().await;
    for (id, discussions_count) in [("b1", 1), ("b2", 1)] {
        let data: CreateBoard = serde_json::from_value(json!({
            "id": id,
            "project_id": "p1",
            "title": format!("Board {id}"),
            "discussions_count": discussions_count,
        }))
        .unwrap();
        Board::create(&pool, &data).await.unwrap();
    }
    let d1 = seed_discussion(&pool, "d1", 2).await;
    let other: CreateDiscussion =
        serde_json::from_value(json!({"id": "d2", "board_id": "b2", "title": "Other"})).unwrap();
    let d2 = ParentRef::from(&Discussion::create(&pool, &other).await.unwrap());

    // One comment of d1 carries no board id at all.
    let comments = Listing::comments(PAGE_SIZE);
    let fetcher = MockPageFetcher::new();
    let d1_page = listing_body(
        "comments",
        vec![
            json!({"id": "d1-c0", "discussion_id": "d1", "board_id": "b1"}),
            json!({"id": "d1-c1", "discussion_id": "d1"}),
        ],
        1,
        PAGE_SIZE,
        2,
        1,
        None,
    );
    fetcher.insert_page(&comments.page_key("d1", 1), d1_page);
    script_comments(&fetcher, "d2", 1);

    let mut checkpoints = CheckpointCache::empty(pool.clone());
    let comment_kind = CommentKind::new(PAGE_SIZE);
    let retry = fast_retry(3);
    for parent in [&d1, &d2] {
        walk(&pool, &comment_kind, &fetcher, &mut checkpoints, &retry, parent)
            .await
            .unwrap();
    }
    assert_eq!(comment_count(&pool, "d1").await, 2);

    let discussions = Listing::discussions(PAGE_SIZE);
    fetcher.insert_page(
        &discussions.page_key("b1", 1),
        listing_body("discussions", vec![], 1, PAGE_SIZE, 0, 0, None),
    );
    let board = ParentRef::from(&Board::find_by_external_id(&pool, "b1").await.unwrap().unwrap());
    let report = walk(
        &pool,
        &DiscussionKind::new(PAGE_SIZE, PAGE_SIZE),
        &fetcher,
        &mut checkpoints,
        &retry,
        &board,
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Deleted);
    assert!(!Board::exists(&pool, "b1").await.unwrap());
    assert!(!Discussion::exists(&pool, "d1").await.unwrap());
    assert_eq!(comment_count(&pool, "d1").await, 0);
    let keys: Vec<_> = CacheEntry::find_all(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.key)
        .collect();
    assert_eq!(keys, vec![comments.page_key("d2", 1).cache_key()]);
    assert!(checkpoints.get(&comments.page_key("d1", 1)).await.unwrap().is_none());

    // The neighbouring board keeps its discussion and comments.
    assert!(Board::exists(&pool, "b2").await.unwrap());
    assert_eq!(comment_count(&pool, "d2").await, 1);

    // A discussion that reappears upstream is imported again from page 1.
    let d1 = seed_discussion(&pool, "d1", 2).await;
    fetcher.clear_calls();
    let report = walk(&pool, &comment_kind, &fetcher, &mut checkpoints, &retry, &d1)
        .await
        .unwrap();
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.inserted, 2);
    assert_eq!(comment_count(&pool, "d1").await, 2);
}

#[tokio::test]
async fn test_discussion_known_non_empty_by_recorded_count_is_deleted() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "7", 4).await;
    let fetcher = MockPageFetcher::new();
    script_comments(&fetcher, "7", 0);
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    let report = walk(
        &pool,
        &CommentKind::new(PAGE_SIZE),
        &fetcher,
        &mut checkpoints,
        &fast_retry(3),
        &parent,
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Deleted);
    assert!(!Discussion::exists(&pool, "7").await.unwrap());
}

#[tokio::test]
async fn test_parent_without_children_fetches_one_page() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "9", 0).await;
    let fetcher = MockPageFetcher::new();
    script_comments(&fetcher, "9", 0);
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    let report = walk(
        &pool,
        &CommentKind::new(PAGE_SIZE),
        &fetcher,
        &mut checkpoints,
        &fast_retry(3),
        &parent,
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Done);
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(report.inserted + report.already_present + report.failed, 0);
    assert!(Discussion::exists(&pool, "9").await.unwrap());
}

#[tokio::test]
async fn test_cyclic_next_page_terminates() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "5", 100).await;
    let listing = Listing::comments(PAGE_SIZE);
    let fetcher = MockPageFetcher::new();
    fetcher.insert_page(
        &listing.page_key("5", 1),
        listing_body("comments", comment_items("5", 0..50), 1, PAGE_SIZE, 100, 2, Some(2)),
    );
    fetcher.insert_page(
        &listing.page_key("5", 2),
        listing_body("comments", comment_items("5", 50..100), 2, PAGE_SIZE, 200, 4, Some(1)),
    );
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    let report = walk(
        &pool,
        &CommentKind::new(PAGE_SIZE),
        &fetcher,
        &mut checkpoints,
        &fast_retry(3),
        &parent,
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Done);
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(comment_count(&pool, "5").await, 100);
}

#[tokio::test]
async fn test_next_page_beyond_page_count_terminates() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "6", 60).await;
    let listing = Listing::comments(PAGE_SIZE);
    let fetcher = MockPageFetcher::new();
    fetcher.insert_page(
        &listing.page_key("6", 1),
        listing_body("comments", comment_items("6", 0..50), 1, PAGE_SIZE, 60, 1, Some(2)),
    );
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    let report = walk(
        &pool,
        &CommentKind::new(PAGE_SIZE),
        &fetcher,
        &mut checkpoints,
        &fast_retry(3),
        &parent,
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Done);
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_failing_record_does_not_stop_the_page() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "42", 120).await;
    reject_inserts_of(&pool, "comments", "42-c7").await;
    let fetcher = MockPageFetcher::new();
    script_comments(&fetcher, "42", 120);
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    let report = walk(
        &pool,
        &CommentKind::new(PAGE_SIZE),
        &fetcher,
        &mut checkpoints,
        &fast_retry(3),
        &parent,
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Done);
    assert_eq!(report.failed, 1);
    assert_eq!(report.inserted, 119);
    assert_eq!(comment_count(&pool, "42").await, 119);
    assert!(!Comment::exists(&pool, "42-c7").await.unwrap());
    // The page is still checkpointed.
    assert!(
        checkpoints
            .get(&Listing::comments(PAGE_SIZE).page_key("42", 1))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "3", 10).await;
    let fetcher = MockPageFetcher::new();
    script_comments(&fetcher, "3", 10);
    let key = Listing::comments(PAGE_SIZE).page_key("3", 1);
    fetcher.fail_next(&key, TalkClientError::Timeout);
    fetcher.fail_next(
        &key,
        TalkClientError::Http {
            status: 502,
            body: String::new(),
        },
    );
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    let report = walk(
        &pool,
        &CommentKind::new(PAGE_SIZE),
        &fetcher,
        &mut checkpoints,
        &fast_retry(3),
        &parent,
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Done);
    assert_eq!(fetcher.call_count(), 3);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(comment_count(&pool, "3").await, 10);
}

#[tokio::test]
async fn test_exhausted_retries_surface_without_checkpoint() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "3", 10).await;
    let fetcher = MockPageFetcher::new();
    script_comments(&fetcher, "3", 10);
    let key = Listing::comments(PAGE_SIZE).page_key("3", 1);
    for _ in 0..3 {
        fetcher.fail_next(&key, TalkClientError::Timeout);
    }
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    let err = walk(
        &pool,
        &CommentKind::new(PAGE_SIZE),
        &fetcher,
        &mut checkpoints,
        &fast_retry(2),
        &parent,
    )
    .await
    .unwrap_err();

    match err {
        WalkError::Fetch(FetchError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert!(checkpoints.get(&key).await.unwrap().is_none());
    assert_eq!(comment_count(&pool, "3").await, 0);
}

#[tokio::test]
async fn test_locally_complete_page_is_checkpointed_without_writes() {
    let (pool, _dir) = create_test_pool().await;
    let parent = seed_discussion(&pool, "8", 3).await;
    for item in comment_items("8", 0..3) {
        let data: CreateComment = serde_json::from_value(item).unwrap();
        Comment::create(&pool, &data).await.unwrap();
    }
    let fetcher = MockPageFetcher::new();
    script_comments(&fetcher, "8", 3);
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    let report = walk(
        &pool,
        &CommentKind::new(PAGE_SIZE),
        &fetcher,
        &mut checkpoints,
        &fast_retry(3),
        &parent,
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, WalkOutcome::Done);
    assert_eq!(report.inserted + report.already_present, 0);
    assert_eq!(fetcher.call_count(), 1);
    assert!(
        checkpoints
            .get(&Listing::comments(PAGE_SIZE).page_key("8", 1))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_page_limit_stops_after_first_page() {
    let (pool, _dir) = create_test_pool().await;
    let kind = PopularTagKind::new(20, Some(1));
    let listing = kind.listing().clone();
    let tags: Vec<Value> = (0..20)
        .map(|n| json!({"id": format!("t{n}"), "project_id": "p1", "name": format!("tag{n}")}))
        .collect();
    let fetcher = MockPageFetcher::new();
    fetcher.insert_page(
        &listing.page_key("p1", 1),
        listing_body("popular", tags, 1, 20, 55, 3, Some(2)),
    );
    let parent = ParentRef {
        local_id: 1,
        external_id: "p1".to_string(),
        name: "Project".to_string(),
        expected_children: 0,
    };
    let mut checkpoints = CheckpointCache::empty(pool.clone());

    let report = walk(&pool, &kind, &fetcher, &mut checkpoints, &fast_retry(3), &parent)
        .await
        .unwrap();
    assert_eq!(report.outcome, WalkOutcome::Done);
    assert_eq!(report.inserted, 20);
    assert_eq!(fetcher.call_count(), 1);

    // A rerun is satisfied by the first page's checkpoint.
    fetcher.clear_calls();
    walk(&pool, &kind, &fetcher, &mut checkpoints, &fast_retry(3), &parent)
        .await
        .unwrap();
    assert_eq!(fetcher.call_count(), 0);
}
