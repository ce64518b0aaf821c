//! Storage backend tests
//!
//! Tests for SeaOrmStorage using temporary SQLite databases.

mod common;

use chrono::{Duration, TimeZone, Utc};
use privalytics::index::SimilarityIndex;
use privalytics::storage::{EventKind, EventWithPage, MAX_QUERY_ROWS, Metadata, NewEvent};
use privalytics::utils::{TimeRange, fingerprint};

use common::{create_temp_storage, insert_event};

fn new_event(page_id: &str, visitor_hash: &str, consent: bool) -> NewEvent {
    NewEvent {
        page_id: page_id.to_string(),
        kind: EventKind::Pageview,
        visitor_hash: visitor_hash.to_string(),
        user_agent: "test-agent".to_string(),
        metadata: Metadata::new(),
        consent_given: consent,
    }
}

// =============================================================================
// 页面
// =============================================================================

#[tokio::test]
async fn test_page_creation_is_idempotent() {
    let (storage, _dir) = create_temp_storage().await;

    let first = storage
        .create_page_if_absent("https://example.com/a", Some("A"))
        .await
        .unwrap();
    let second = storage
        .create_page_if_absent("https://example.com/a", Some("Other title"))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    // 已有真实标题时不覆盖
    assert_eq!(second.title, "A");
}

#[tokio::test]
async fn test_concurrent_page_creation_yields_one_row() {
    let (storage, _dir) = create_temp_storage().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            storage
                .create_page_if_absent("https://example.com/race", None)
                .await
                .unwrap()
                .id
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all callers must observe the same page");
}

#[tokio::test]
async fn test_page_title_defaults_to_url_and_is_backfilled() {
    let (storage, _dir) = create_temp_storage().await;

    let page = storage
        .create_page_if_absent("https://example.com/untitled", None)
        .await
        .unwrap();
    assert_eq!(page.title, "https://example.com/untitled");
    assert!(page.has_default_title());

    let page = storage
        .create_page_if_absent("https://example.com/untitled", Some("  Real Title "))
        .await
        .unwrap();
    assert_eq!(page.title, "Real Title");

    let found = storage
        .find_page_by_url("https://example.com/untitled")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.title, "Real Title");
}

// =============================================================================
// 事件
// =============================================================================

#[tokio::test]
async fn test_record_and_find_event() {
    let (storage, _dir) = create_temp_storage().await;
    let visitor = fingerprint("203.0.113.9", "Mozilla/5.0");

    let mut metadata = Metadata::new();
    metadata.insert("button".to_string(), serde_json::json!("signup"));
    let page = storage
        .create_page_if_absent("https://example.com/pricing", Some("Pricing"))
        .await
        .unwrap();
    let event = storage
        .record_event(NewEvent {
            kind: EventKind::Click,
            metadata,
            ..new_event(&page.id, &visitor, true)
        })
        .await
        .unwrap();

    let found = storage.find_event(&event.id).await.unwrap().unwrap();
    assert_eq!(found.event.kind, EventKind::Click);
    assert_eq!(found.event.visitor_hash, visitor);
    assert_eq!(found.event.metadata["button"], "signup");
    assert_eq!(found.page.title, "Pricing");

    assert!(storage.find_event("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_query_events_newest_first_and_consent_filter() {
    let (storage, _dir) = create_temp_storage().await;
    let page = storage
        .create_page_if_absent("https://example.com/", None)
        .await
        .unwrap();

    let base = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
    for (offset, consent) in [(0, true), (1, false), (2, true)] {
        storage
            .record_event_at(
                new_event(&page.id, &format!("{:064x}", offset), consent),
                base + Duration::minutes(offset),
            )
            .await
            .unwrap();
    }

    let all = storage
        .query_events(&TimeRange::unbounded(), false)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert!(
        all.windows(2)
            .all(|w| w[0].event.timestamp >= w[1].event.timestamp)
    );

    let consented = storage
        .query_events(&TimeRange::unbounded(), true)
        .await
        .unwrap();
    assert_eq!(consented.len(), 2);
    assert!(consented.iter().all(|r| r.event.consent_given));

    let recent = storage.recent_events(1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].event.timestamp, base + Duration::minutes(2));
}

#[tokio::test]
async fn test_query_events_is_capped_at_newest_rows() {
    let (storage, _dir) = create_temp_storage().await;
    let page = storage
        .create_page_if_absent("https://example.com/", None)
        .await
        .unwrap();

    let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    let total = MAX_QUERY_ROWS as i64 + 5;
    for i in 0..total {
        storage
            .record_event_at(
                new_event(&page.id, &format!("{:064x}", i), true),
                base + Duration::seconds(i),
            )
            .await
            .unwrap();
    }

    let events = storage
        .query_events(&TimeRange::unbounded(), false)
        .await
        .unwrap();
    assert_eq!(events.len() as u64, MAX_QUERY_ROWS);
    assert_eq!(events[0].event.timestamp, base + Duration::seconds(total - 1));
    assert!(
        events
            .windows(2)
            .all(|w| w[0].event.timestamp > w[1].event.timestamp)
    );
    // 最早的 5 条被截掉
    assert_eq!(
        events.last().unwrap().event.timestamp,
        base + Duration::seconds(5)
    );
}

#[tokio::test]
async fn test_query_events_respects_time_range() {
    let (storage, _dir) = create_temp_storage().await;
    let page = storage
        .create_page_if_absent("https://example.com/", None)
        .await
        .unwrap();

    for day in 1..=3 {
        storage
            .record_event_at(
                new_event(&page.id, &format!("{:064x}", day), false),
                Utc.with_ymd_and_hms(2026, 1, day, 10, 0, 0).unwrap(),
            )
            .await
            .unwrap();
    }

    let range = TimeRange::parse(Some("2026-01-02"), Some("2026-01-02")).unwrap();
    let events = storage.query_events(&range, false).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].event.timestamp,
        Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0).unwrap()
    );
}

// =============================================================================
// 擦除
// =============================================================================

#[tokio::test]
async fn test_delete_by_fingerprint_removes_events_and_embeddings() {
    let (storage, _dir) = create_temp_storage().await;
    let target = fingerprint("198.51.100.4", "agent-a");
    let other = fingerprint("198.51.100.5", "agent-b");

    let (_, erased) = insert_event(&storage, "https://example.com/x", EventKind::Pageview, &target, true).await;
    insert_event(&storage, "https://example.com/y", EventKind::Click, &target, false).await;
    let (_, kept) = insert_event(&storage, "https://example.com/x", EventKind::Pageview, &other, true).await;

    assert!(storage.upsert(&erased.id, &[1.0, 0.0], "erased").await.unwrap());
    assert!(storage.upsert(&kept.id, &[0.0, 1.0], "kept").await.unwrap());

    assert_eq!(storage.count_events_by_fingerprint(&target).await.unwrap(), 2);
    assert_eq!(storage.delete_by_fingerprint(&target).await.unwrap(), 2);
    assert_eq!(storage.count_events_by_fingerprint(&target).await.unwrap(), 0);

    assert!(!storage.contains(&erased.id).await.unwrap());
    assert!(storage.contains(&kept.id).await.unwrap());
    assert_eq!(storage.embedding_count().await.unwrap(), 1);

    // 第二次擦除不再命中任何事件
    assert_eq!(storage.delete_by_fingerprint(&target).await.unwrap(), 0);

    let nearest = storage.nearest(&[1.0, 0.0], 5).await.unwrap();
    assert!(nearest.iter().all(|s| s.event_id != erased.id));
}

// =============================================================================
// 嵌入索引
// =============================================================================

#[tokio::test]
async fn test_pending_embeddings_skip_unconsented_and_embedded() {
    let (storage, _dir) = create_temp_storage().await;
    let visitor = fingerprint("192.0.2.1", "agent");

    let (_, first) = insert_event(&storage, "https://example.com/1", EventKind::Pageview, &visitor, true).await;
    insert_event(&storage, "https://example.com/2", EventKind::Pageview, &visitor, false).await;
    let (_, third) = insert_event(&storage, "https://example.com/3", EventKind::FormSubmit, &visitor, true).await;

    let pending = storage.pending_embedding_events(10).await.unwrap();
    let ids: Vec<_> = pending.iter().map(|r| r.event.id.clone()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.id));
    assert!(ids.contains(&third.id));

    storage.upsert(&first.id, &[0.5, 0.5], "first").await.unwrap();
    let pending = storage.pending_embedding_events(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event.id, third.id);

    assert!(storage.pending_embedding_events(0).await.unwrap().is_empty());

    let coverage = storage.embedding_coverage().await.unwrap();
    assert_eq!(coverage.consented_events, 2);
    assert_eq!(coverage.embedded_events, 1);
    assert!((coverage.ratio() - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_failed_events_move_to_back_of_pending() {
    let (storage, _dir) = create_temp_storage().await;
    let visitor = fingerprint("192.0.2.2", "agent");

    let (_, oldest) = insert_event(&storage, "https://example.com/1", EventKind::Pageview, &visitor, true).await;
    let (_, middle) = insert_event(&storage, "https://example.com/2", EventKind::Pageview, &visitor, true).await;
    let (_, newest) = insert_event(&storage, "https://example.com/3", EventKind::Pageview, &visitor, true).await;

    let ids = |pending: Vec<EventWithPage>| {
        pending.into_iter().map(|r| r.event.id).collect::<Vec<_>>()
    };
    assert_eq!(
        ids(storage.pending_embedding_events(10).await.unwrap()),
        vec![oldest.id.clone(), middle.id.clone(), newest.id.clone()]
    );

    storage.record_embedding_failure(&oldest.id).await.unwrap();
    storage.record_embedding_failure(&oldest.id).await.unwrap();
    storage.record_embedding_failure(&middle.id).await.unwrap();
    assert_eq!(storage.embedding_attempts(&oldest.id).await.unwrap(), Some(2));
    assert_eq!(storage.embedding_attempts(&newest.id).await.unwrap(), Some(0));
    assert_eq!(storage.embedding_attempts("missing").await.unwrap(), None);

    assert_eq!(
        ids(storage.pending_embedding_events(10).await.unwrap()),
        vec![newest.id.clone(), middle.id.clone(), oldest.id.clone()]
    );
    assert_eq!(
        ids(storage.pending_embedding_events(1).await.unwrap()),
        vec![newest.id]
    );
}

#[tokio::test]
async fn test_upsert_first_writer_wins() {
    let (storage, _dir) = create_temp_storage().await;
    let visitor = fingerprint("192.0.2.2", "agent");
    let (_, event) = insert_event(&storage, "https://example.com/", EventKind::Pageview, &visitor, true).await;

    assert!(storage.upsert(&event.id, &[1.0, 0.0], "original").await.unwrap());
    assert!(!storage.upsert(&event.id, &[0.0, 1.0], "replacement").await.unwrap());
    assert_eq!(storage.embedding_count().await.unwrap(), 1);

    let nearest = storage.nearest(&[1.0, 0.0], 1).await.unwrap();
    assert_eq!(nearest[0].summary, "original");
    assert!((nearest[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_nearest_orders_by_similarity() {
    let (storage, _dir) = create_temp_storage().await;
    let visitor = fingerprint("192.0.2.3", "agent");

    let vectors: [(&str, [f32; 3]); 3] = [
        ("exact", [1.0, 0.0, 0.0]),
        ("close", [0.9, 0.1, 0.0]),
        ("far", [0.0, 0.0, 1.0]),
    ];
    for (summary, vector) in vectors {
        let (_, event) = insert_event(
            &storage,
            &format!("https://example.com/{}", summary),
            EventKind::Pageview,
            &visitor,
            true,
        )
        .await;
        storage.upsert(&event.id, &vector, summary).await.unwrap();
    }

    let nearest = storage.nearest(&[1.0, 0.0, 0.0], 2).await.unwrap();
    let summaries: Vec<_> = nearest.iter().map(|s| s.summary.as_str()).collect();
    assert_eq!(summaries, vec!["exact", "close"]);
    assert!(nearest[0].score >= nearest[1].score);

    // 维度不一致的查询不会匹配任何向量
    assert!(storage.nearest(&[1.0, 0.0], 5).await.unwrap().is_empty());
    assert!(storage.nearest(&[1.0, 0.0, 0.0], 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_nearest_on_empty_index() {
    let (storage, _dir) = create_temp_storage().await;
    assert!(storage.nearest(&[0.1, 0.2], 10).await.unwrap().is_empty());
    assert_eq!(storage.embedding_count().await.unwrap(), 0);
}
