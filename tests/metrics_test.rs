//! Tests for metrics emitted by store operations
//!
//! Installs a process-global recorder, so everything runs in one test.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use spam_samples::metrics::{IMPORTED_LINES_TOTAL, OPERATIONS_TOTAL};
use spam_samples::{CancellationToken, Database, SampleOrigin, SampleRepository, SampleType, Samples};

/// Counts counter increments by name and labels
#[derive(Clone, Default)]
struct CountingRecorder {
    counters: Arc<Mutex<HashMap<String, Arc<AtomicU64>>>>,
}

impl CountingRecorder {
    fn render(key: &Key) -> String {
        let mut rendered = key.name().to_string();
        for label in key.labels() {
            rendered.push_str(&format!(" {}={}", label.key(), label.value()));
        }
        rendered
    }

    fn get(&self, rendered: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(rendered)
            .map_or(0, |value| value.load(Ordering::SeqCst))
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let value = Arc::clone(
            self.counters
                .lock()
                .unwrap()
                .entry(Self::render(key))
                .or_default(),
        );
        Counter::from_arc(value)
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

fn success(operation: &str) -> String {
    format!("{OPERATIONS_TOTAL} operation={operation} status=success")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_every_store_operation_is_counted() {
    let recorder = CountingRecorder::default();
    assert!(metrics::set_global_recorder(recorder.clone()).is_ok());

    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db = Arc::new(Database::new(dir.path().join("samples.db")).expect("Failed to open database"));
    let samples = Samples::new(db).await.expect("Failed to create store");

    samples.add(SampleType::Spam, SampleOrigin::User, "one").await.unwrap();
    let mut source: &[u8] = b"two\nthree\n";
    samples
        .import(SampleType::Spam, SampleOrigin::User, &mut source, false)
        .await
        .unwrap();
    samples.read(SampleType::Spam, SampleOrigin::Any).await.unwrap();

    let iter = samples
        .iterator(SampleType::Spam, SampleOrigin::Any, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(iter.try_collect().await.unwrap().len(), 3);
    samples.reader(SampleType::Spam, SampleOrigin::Any).await.unwrap().close();
    samples.reader(SampleType::Ham, SampleOrigin::Any).await.unwrap().close();

    assert!(samples.delete_message("missing").await.is_err());

    assert_eq!(recorder.get(&success("add")), 1);
    assert_eq!(recorder.get(&success("import")), 1);
    assert_eq!(recorder.get(&success("read")), 1);
    assert_eq!(recorder.get(&success("iterator")), 1);
    assert_eq!(recorder.get(&success("reader")), 2);
    assert!(recorder.get(&success("stats")) >= 1);
    assert_eq!(
        recorder.get(&format!("{OPERATIONS_TOTAL} operation=delete_message status=error")),
        1
    );
    assert_eq!(recorder.get(IMPORTED_LINES_TOTAL), 2);
}
