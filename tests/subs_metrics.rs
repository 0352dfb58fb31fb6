use std::collections::HashSet;
use std::sync::Arc;

use barkeep::infra::telemetry::describe_metrics;
use barkeep::subs::{
    Callbacks, ManualClock, MemoryStore, SubsConfig, SubscriptionCache, SubscriptionError,
    SubscriptionRequest, Tracker,
};
use metrics_util::debugging::DebuggingRecorder;
use time::Duration;

#[test]
fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    describe_metrics();

    let store = MemoryStore::client();
    let clock = Arc::new(ManualClock::default());
    let tracker = Tracker::new();
    let cache = SubscriptionCache::with_clock(
        SubsConfig {
            capacity_limit: 1,
            ..SubsConfig::default()
        },
        Arc::new(store.clone()),
        tracker.clone(),
        clock.clone(),
    );

    // Miss, hit, capacity eviction
    cache.subscribe(None, SubscriptionRequest::new("a"), Callbacks::None);
    cache.subscribe(None, SubscriptionRequest::new("a"), Callbacks::None);
    cache.subscribe(None, SubscriptionRequest::new("b"), Callbacks::None);
    tracker.flush();

    // Error path
    store.fail("b", &SubscriptionError::new("not authorized"));
    tracker.flush();

    // Expiration
    cache.subscribe(None, SubscriptionRequest::new("c"), Callbacks::None);
    tracker.flush();
    clock.advance(Duration::minutes(51));
    cache.subscribe(None, SubscriptionRequest::new("d"), Callbacks::None);
    tracker.flush();

    // Pass-through
    let server = SubscriptionCache::new(
        SubsConfig::default(),
        Arc::new(MemoryStore::server()),
        Tracker::new(),
    );
    server.subscribe(None, SubscriptionRequest::new("products"), Callbacks::None);

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "barkeep_subs_request_total",
        "barkeep_subs_evict_total",
        "barkeep_subs_error_total",
        "barkeep_subs_tracked",
        "barkeep_subs_reconcile_ms",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let labels: HashSet<String> = snapshot
        .iter()
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect::<Vec<_>>()
        })
        .collect();
    for label in [
        "outcome=hit",
        "outcome=miss",
        "outcome=passthrough",
        "reason=capacity",
        "reason=expired",
    ] {
        assert!(labels.contains(label), "missing label: {label}");
    }
}
