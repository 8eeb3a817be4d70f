//! Integration tests for the cancellable iterator

use std::sync::Arc;
use std::time::Duration;

use spam_samples::config::DatabaseConfig;
use spam_samples::{
    CancellationToken, Database, SampleOrigin, SampleRepository, SampleType, Samples, SamplesConfig,
};
use tempfile::TempDir;

async fn open_store() -> (TempDir, Arc<Database>, Samples) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db = Arc::new(Database::new(dir.path().join("samples.db")).expect("Failed to open database"));
    let samples = Samples::new(Arc::clone(&db)).await.expect("Failed to create store");
    (dir, db, samples)
}

/// Wait until every pooled connection is idle again
async fn wait_for_idle_pool(db: &Database) {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let state = db.pool_state();
            if state.idle_connections == state.connections {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection was not returned to the pool");
}

async fn fill(samples: &Samples, count: usize) {
    let data: String = (0..count).map(|i| format!("message {i}\n")).collect();
    let mut source = data.as_bytes();
    samples
        .import(SampleType::Spam, SampleOrigin::User, &mut source, false)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_iterator_yields_newest_first() {
    let (_dir, _db, samples) = open_store().await;
    for message in ["a", "b", "c"] {
        samples.add(SampleType::Ham, SampleOrigin::User, message).await.unwrap();
    }
    // re-adding refreshes recency
    samples.add(SampleType::Ham, SampleOrigin::User, "a").await.unwrap();

    let iter = samples
        .iterator(SampleType::Ham, SampleOrigin::User, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(iter.try_collect().await.unwrap(), vec!["a", "c", "b"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_iterator_filters_origin() {
    let (_dir, _db, samples) = open_store().await;
    samples.add(SampleType::Spam, SampleOrigin::Preset, "p").await.unwrap();
    samples.add(SampleType::Spam, SampleOrigin::User, "u").await.unwrap();
    samples.add(SampleType::Ham, SampleOrigin::User, "h").await.unwrap();

    let all = samples
        .iterator(SampleType::Spam, SampleOrigin::Any, CancellationToken::new())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(all, vec!["u", "p"]);

    let preset = samples
        .iterator(SampleType::Spam, SampleOrigin::Preset, CancellationToken::new())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(preset, vec!["p"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_iterator_empty_partition() {
    let (_dir, _db, samples) = open_store().await;
    let mut iter = samples
        .iterator(SampleType::Ham, SampleOrigin::Any, CancellationToken::new())
        .await
        .unwrap();
    assert!(iter.next().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_iterator_early_drop_releases_connection() {
    let (_dir, db, samples) = open_store().await;
    fill(&samples, 1000).await;

    let mut iter = samples
        .iterator(SampleType::Spam, SampleOrigin::User, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(iter.next().await.unwrap().unwrap(), "message 999");
    drop(iter);

    wait_for_idle_pool(&db).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_iterator_stops_on_cancel() {
    let (_dir, db, samples) = open_store().await;
    fill(&samples, 1000).await;

    let cancel = CancellationToken::new();
    let mut iter = samples
        .iterator(SampleType::Spam, SampleOrigin::User, cancel.clone())
        .await
        .unwrap();
    assert!(iter.next().await.is_some());

    cancel.cancel();
    let end = tokio::time::timeout(Duration::from_secs(1), iter.next())
        .await
        .expect("iterator did not stop after cancel");
    assert!(end.is_none());
    assert!(iter.next().await.is_none());

    wait_for_idle_pool(&db).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_iterator_with_cancelled_token_yields_nothing() {
    let (_dir, _db, samples) = open_store().await;
    fill(&samples, 10).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut iter = samples
        .iterator(SampleType::Spam, SampleOrigin::User, cancel)
        .await
        .unwrap();
    assert!(iter.next().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_iterator_reports_storage_failure() {
    let (_dir, db, samples) = open_store().await;
    db.with_connection(|conn| Ok(conn.execute_batch("DROP TABLE samples")?))
        .unwrap();

    let mut iter = samples
        .iterator(SampleType::Ham, SampleOrigin::Any, CancellationToken::new())
        .await
        .unwrap();
    let first = iter.next().await.expect("expected an error item");
    assert!(first.unwrap_err().is_storage());
    assert!(iter.next().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_writes_proceed_while_iterating() {
    let (_dir, _db, samples) = open_store().await;
    fill(&samples, 500).await;

    let mut iter = samples
        .iterator(SampleType::Spam, SampleOrigin::User, CancellationToken::new())
        .await
        .unwrap();
    assert!(iter.next().await.is_some());

    tokio::time::timeout(
        Duration::from_secs(2),
        samples.add(SampleType::Ham, SampleOrigin::User, "written mid-iteration"),
    )
    .await
    .expect("write blocked behind the iterator")
    .unwrap();

    let mut seen = 1;
    while let Some(item) = iter.next().await {
        item.unwrap();
        seen += 1;
    }
    assert_eq!(seen, 500);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_iterators_do_not_starve_writers() {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let config = DatabaseConfig {
        path: dir.path().join("samples.db").to_string_lossy().into_owned(),
        max_connections: 2,
        connection_timeout_secs: 1,
        ..DatabaseConfig::default()
    };
    let db = Arc::new(Database::open(&config).expect("Failed to open database"));
    let samples = Samples::with_config(
        Arc::clone(&db),
        SamplesConfig {
            stream_page_rows: 16,
            iterator_buffer: 4,
            ..SamplesConfig::default()
        },
    )
    .await
    .expect("Failed to create store");
    fill(&samples, 500).await;

    // twice as many half-read iterators as pooled connections
    let mut iters = Vec::new();
    for _ in 0..4 {
        let mut iter = samples
            .iterator(SampleType::Spam, SampleOrigin::User, CancellationToken::new())
            .await
            .unwrap();
        assert!(iter.next().await.unwrap().is_ok());
        iters.push(iter);
    }

    tokio::time::timeout(
        Duration::from_secs(2),
        samples.add(SampleType::Ham, SampleOrigin::User, "still writable"),
    )
    .await
    .expect("add starved by open iterators")
    .unwrap();
    assert_eq!(samples.stats().await.unwrap().user_ham, 1);

    for iter in iters {
        assert_eq!(iter.try_collect().await.unwrap().len(), 499);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_iteration_across_many_pages() {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db = Arc::new(Database::new(dir.path().join("samples.db")).expect("Failed to open database"));
    let samples = Samples::with_config(
        db,
        SamplesConfig {
            stream_page_rows: 7,
            ..SamplesConfig::default()
        },
    )
    .await
    .unwrap();
    fill(&samples, 100).await;

    let messages = samples
        .iterator(SampleType::Spam, SampleOrigin::User, CancellationToken::new())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let expected: Vec<_> = (0..100).rev().map(|i| format!("message {i}")).collect();
    assert_eq!(messages, expected);
}
