//! End-to-end sync pipeline tests.
//!
//! Drive a full [`Tracker`] over a temp-file database: ingest, queueing,
//! batched delivery with reconciliation, and restart persistence.

mod common;

use std::sync::Arc;

use common::{MockTransport, RecordingNotifier, accurate_sample};
use tempfile::TempDir;
use waylog::{LocationSample, MemoryConfig, SendOutcome, Tracker};

fn setup() -> (Tracker<Arc<MockTransport>>, Arc<MockTransport>, TempDir) {
    common::init_test_logging();
    let tmp = TempDir::new().expect("failed to create temp dir");
    let db_path = tmp.path().join("waylog.db");
    let transport = Arc::new(MockTransport::default());
    let tracker = Tracker::open(
        db_path.to_str().unwrap(),
        Arc::new(MemoryConfig::new()),
        transport.clone(),
        Arc::new(RecordingNotifier::default()),
    )
    .expect("failed to open tracker");
    tracker
        .settings()
        .set_endpoint_url("https://example.com/api/input");
    (tracker, transport, tmp)
}

fn samples(n: i64) -> Vec<LocationSample> {
    (0..n)
        .map(|i| accurate_sample(i, 45.0 + i as f64 * 0.001, -122.0))
        .collect()
}

// ============================================================================
// Delivery and reconciliation
// ============================================================================

#[tokio::test]
async fn test_first_ingest_sends_immediately() {
    let (mut tracker, transport, _tmp) = setup();

    let outcome = tracker.ingest(&samples(3)).await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Sent {
            delivered: 3,
            remaining: 0
        }
    );

    let stats = tracker.stats().unwrap();
    assert_eq!(stats.pending, 0);
    assert!(stats.last_sent.is_some());

    let payloads = transport.payloads.lock().unwrap();
    assert_eq!(payloads[0].locations.len(), 3);
    assert!(payloads[0].current.is_none());
}

#[tokio::test]
async fn test_backlog_drains_across_ticks() {
    let (mut tracker, transport, _tmp) = setup();
    tracker.settings().set_points_per_batch(200);

    let outcome = tracker.ingest(&samples(250)).await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Sent {
            delivered: 200,
            remaining: 50
        }
    );

    // Backlog flag lets the next tick fire without waiting out the interval.
    let outcome = tracker.maybe_send().await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Sent {
            delivered: 50,
            remaining: 0
        }
    );

    // Queue drained, interval not elapsed: nothing more to do.
    assert_eq!(tracker.maybe_send().await.unwrap(), SendOutcome::NotDue);

    let payloads = transport.payloads.lock().unwrap();
    // The oversized backlog carries the freshest fix out of band; a batch
    // that empties the queue does not.
    assert!(payloads[0].current.is_some());
    assert!(payloads[1].current.is_none());
}

#[tokio::test]
async fn test_transport_failure_keeps_queue_for_retry() {
    let (mut tracker, transport, _tmp) = setup();
    transport.push(Err("connection refused".to_string()));

    let outcome = tracker.ingest(&samples(5)).await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::TransportFailed("connection refused".to_string())
    );
    assert_eq!(tracker.stats().unwrap().pending, 5);

    // Next attempt (default ack) delivers the same records.
    let outcome = tracker.flush_now().await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Sent {
            delivered: 5,
            remaining: 0
        }
    );
}

#[tokio::test]
async fn test_rejection_surfaces_to_notifier() {
    let tmp = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let mut tracker = Tracker::open(
        tmp.path().join("waylog.db").to_str().unwrap(),
        Arc::new(MemoryConfig::new()),
        transport.clone(),
        notifier.clone(),
    )
    .unwrap();
    tracker
        .settings()
        .set_endpoint_url("https://example.com/api/input");

    transport.push(Ok(
        serde_json::from_str(r#"{"error":"invalid device"}"#).unwrap()
    ));

    let outcome = tracker.ingest(&samples(2)).await.unwrap();
    assert_eq!(outcome, SendOutcome::Rejected("invalid device".to_string()));
    assert_eq!(tracker.stats().unwrap().pending, 2);
    assert_eq!(notifier.messages.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_endpoint_queues_silently() {
    let (mut tracker, transport, _tmp) = setup();
    tracker.settings().set_endpoint_url("");

    let outcome = tracker.ingest(&samples(3)).await.unwrap();
    assert_eq!(outcome, SendOutcome::NoEndpoint);
    assert_eq!(tracker.stats().unwrap().pending, 3);
    assert_eq!(transport.call_count(), 0);
}

// ============================================================================
// Queue semantics
// ============================================================================

#[tokio::test]
async fn test_same_second_samples_coalesce() {
    let (mut tracker, _transport, _tmp) = setup();
    // Disable automatic sending to observe the queue directly.
    tracker.settings().set_send_interval_secs(-1);

    let a = accurate_sample(10, 45.0, -122.0);
    let b = accurate_sample(10, 45.1, -122.1);
    let outcome = tracker.ingest(&[a, b]).await.unwrap();
    assert_eq!(outcome, SendOutcome::NotDue);

    // Same second, same kind: last write wins on the derived key.
    assert_eq!(tracker.stats().unwrap().pending, 1);
}

#[tokio::test]
async fn test_actions_and_visits_ride_along() {
    let (mut tracker, transport, _tmp) = setup();
    tracker.log_action("app_launched").unwrap();
    tracker
        .log_visit(-0.1, 51.5, common::t(0), None)
        .unwrap();

    let outcome = tracker.flush_now().await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Sent {
            delivered: 2,
            remaining: 0
        }
    );

    let payloads = transport.payloads.lock().unwrap();
    let has_action = payloads[0]
        .locations
        .iter()
        .any(|f| f.properties.get("action").is_some());
    let has_visit = payloads[0]
        .locations
        .iter()
        .any(|f| f.properties.get("arrival_date").is_some());
    assert!(has_action);
    assert!(has_visit);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("waylog.db");

    {
        let transport = Arc::new(MockTransport::default());
        transport.push(Err("offline".to_string()));
        let mut tracker = Tracker::open(
            db_path.to_str().unwrap(),
            Arc::new(MemoryConfig::new()),
            transport,
            Arc::new(RecordingNotifier::default()),
        )
        .unwrap();
        tracker
            .settings()
            .set_endpoint_url("https://example.com/api/input");
        tracker.ingest(&samples(4)).await.unwrap();
        assert_eq!(tracker.stats().unwrap().pending, 4);
    }

    // Reopen over the same file: the backlog is still there and deliverable.
    let transport = Arc::new(MockTransport::default());
    let mut tracker = Tracker::open(
        db_path.to_str().unwrap(),
        Arc::new(MemoryConfig::new()),
        transport,
        Arc::new(RecordingNotifier::default()),
    )
    .unwrap();
    tracker
        .settings()
        .set_endpoint_url("https://example.com/api/input");

    assert_eq!(tracker.stats().unwrap().pending, 4);
    let outcome = tracker.flush_now().await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Sent {
            delivered: 4,
            remaining: 0
        }
    );
}

#[tokio::test]
async fn test_geocode_name_reaches_host() {
    let (mut tracker, transport, _tmp) = setup();
    transport.push(Ok(serde_json::from_str(
        r#"{"result":"ok","geocode":{"full_name":"Vienna, Austria"}}"#,
    )
    .unwrap()));

    tracker.ingest(&samples(1)).await.unwrap();
    assert_eq!(
        tracker.last_location_name().as_deref(),
        Some("Vienna, Austria")
    );
}
