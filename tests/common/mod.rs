//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use waylog::{BatchPayload, LocationSample, Notifier, ServerResponse, Transport};

/// Scripted transport: pops one canned reply per call and records the
/// payloads it was asked to deliver. Replies default to a plain ack.
#[derive(Default)]
pub struct MockTransport {
    pub replies: Mutex<VecDeque<Result<ServerResponse, String>>>,
    pub payloads: Mutex<Vec<BatchPayload>>,
}

impl MockTransport {
    pub fn ack() -> Result<ServerResponse, String> {
        Ok(serde_json::from_str(r#"{"result":"ok"}"#).unwrap())
    }

    pub fn push(&self, reply: Result<ServerResponse, String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    fn deliver(
        &self,
        _url: &str,
        payload: &BatchPayload,
    ) -> impl Future<Output = Result<ServerResponse, String>> + Send {
        self.payloads.lock().unwrap().push(payload.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(MockTransport::ack);
        async move { reply }
    }
}

/// Captures notifications for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, title: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((message.to_string(), title.to_string()));
    }
}

/// Opt-in log output for debugging test runs (`RUST_LOG=debug`).
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_756_000_000 + secs, 0).unwrap()
}

/// A sample accurate enough to count toward trip distance.
pub fn accurate_sample(secs: i64, lat: f64, lng: f64) -> LocationSample {
    let mut s = LocationSample::new(t(secs), lat, lng);
    s.horizontal_accuracy = Some(10.0);
    s
}

/// An accurate sample `offset_secs` after the wall clock. Trip starts are
/// stamped with the wall clock, so trip scenarios need samples relative to
/// it rather than to the fixed [`t`] epoch.
pub fn recent_sample(offset_secs: i64, lat: f64, lng: f64) -> LocationSample {
    let ts = Utc::now() + chrono::Duration::seconds(offset_secs);
    let mut s = LocationSample::new(ts, lat, lng);
    s.horizontal_accuracy = Some(10.0);
    s
}
