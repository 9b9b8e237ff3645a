//! Sync engine.
//!
//! Drains the event store in insertion order, posts one bounded batch per
//! attempt, and reconciles the result: acknowledged keys are removed, any
//! failure leaves the queue untouched for the next scheduled attempt.
//! Delivery is at-least-once; the server deduplicates by record key.
//!
//! A single in-flight flag is the sole reentrancy guard. The network call
//! is the only unbounded suspension point; nothing is cancelled once
//! issued, and a stalled send simply blocks further sends until the
//! transport resolves it.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use log::{debug, info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::notify::Notifier;
use crate::payload::{BatchPayload, Feature, ServerResponse, TripSnapshot};
use crate::store::EventStore;

/// Delivery seam. The production implementation is
/// [`crate::http::HttpTransport`]; tests substitute a scripted one.
///
/// `Err` is a transport-level failure (unreachable, timeout, malformed
/// response). A parsed reply that lacks the acknowledgment is an
/// application-level rejection and comes back as `Ok`.
pub trait Transport: Send + Sync {
    fn deliver(
        &self,
        url: &str,
        payload: &BatchPayload,
    ) -> impl Future<Output = std::result::Result<ServerResponse, String>> + Send;
}

/// Shared transports work unchanged; tests keep one handle and hand the
/// engine another.
impl<T: Transport> Transport for Arc<T> {
    fn deliver(
        &self,
        url: &str,
        payload: &BatchPayload,
    ) -> impl Future<Output = std::result::Result<ServerResponse, String>> + Send {
        (**self).deliver(url, payload)
    }
}

/// Terminal state of one send attempt. Failed deliveries are outcomes, not
/// errors: the queue is unchanged and the next tick retries.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Batch acknowledged; the drained keys were removed.
    Sent { delivered: usize, remaining: u64 },
    /// Store was empty; no network call was made.
    NothingToSend,
    /// A send is already in flight; silently ignored.
    AlreadyInFlight,
    /// No endpoint configured; silently skipped.
    NoEndpoint,
    /// Scheduler decided the interval has not elapsed yet.
    NotDue,
    /// Network-level failure; queue unchanged.
    TransportFailed(String),
    /// Server reachable but rejected the batch; queue unchanged.
    Rejected(String),
}

pub struct SyncEngine<T: Transport> {
    store: EventStore,
    settings: Settings,
    transport: T,
    notifier: Arc<dyn Notifier>,
    in_flight: AtomicBool,
    more_pending: AtomicBool,
    last_location_name: Mutex<Option<String>>,
}

impl<T: Transport> SyncEngine<T> {
    pub(crate) fn new(
        store: EventStore,
        settings: Settings,
        transport: T,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            settings,
            transport,
            notifier,
            in_flight: AtomicBool::new(false),
            more_pending: AtomicBool::new(false),
            last_location_name: Mutex::new(None),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether the last acknowledged batch left records behind, so the
    /// scheduler should fire again without waiting out the interval.
    pub fn more_pending(&self) -> bool {
        self.more_pending.load(Ordering::SeqCst)
    }

    /// Server-echoed human-readable location name from the last ack.
    pub fn last_location_name(&self) -> Option<String> {
        self.last_location_name.lock().unwrap().clone()
    }

    /// Send one batch now. Safe to call repeatedly; a concurrent call while
    /// a send is in flight is rejected as a no-op, and the flag is cleared
    /// exactly once on every terminal path.
    pub async fn send_queue_now(&self, trip: Option<TripSnapshot>) -> Result<SendOutcome> {
        let Some(endpoint) = self.settings.endpoint_url() else {
            debug!("[SyncEngine] No endpoint configured, skipping send");
            return Ok(SendOutcome::NoEndpoint);
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("[SyncEngine] Send already in progress");
            return Ok(SendOutcome::AlreadyInFlight);
        }

        let outcome = self.send_batch(&endpoint, trip).await;
        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    async fn send_batch(&self, endpoint: &str, trip: Option<TripSnapshot>) -> Result<SendOutcome> {
        let limit = self.settings.points_per_batch();
        // Batch and count come from one snapshot; a concurrent put cannot
        // make them disagree.
        let (batch, total) = self.store.drain_batch(limit)?;
        if batch.is_empty() {
            self.more_pending.store(false, Ordering::SeqCst);
            return Ok(SendOutcome::NothingToSend);
        }

        // With a backlog larger than one batch the server would otherwise
        // only see stale positions; attach the freshest fix out of band.
        let current = if total > batch.len() as u64 {
            self.store
                .latest_location()?
                .map(|r| Feature::from_record(&r))
        } else {
            None
        };

        let trip = if self.settings.include_tracking_stats() {
            trip
        } else {
            None
        };

        let keys: Vec<String> = batch.iter().map(|(k, _)| k.clone()).collect();
        let locations: Vec<Feature> = batch
            .iter()
            .map(|(_, record)| Feature::from_record(record))
            .collect();
        let delivered = locations.len();
        let payload = BatchPayload {
            locations,
            current,
            trip,
        };

        info!(
            "[SyncEngine] Sending batch of {} ({} queued)",
            delivered, total
        );

        match self.transport.deliver(endpoint, &payload).await {
            Ok(resp) if resp.is_ack() => {
                // Remove exactly the drained keys; records queued while the
                // request was in flight stay put.
                self.store.remove_all(&keys)?;
                let remaining = self.store.count()?;
                self.more_pending.store(remaining > 0, Ordering::SeqCst);
                self.settings.set_last_sent(Utc::now());
                if let Some(name) = resp.geocode.and_then(|g| g.full_name) {
                    *self.last_location_name.lock().unwrap() = Some(name);
                }
                info!(
                    "[SyncEngine] Batch acknowledged, {} records remaining",
                    remaining
                );
                Ok(SendOutcome::Sent {
                    delivered,
                    remaining,
                })
            }
            Ok(resp) => {
                let message = resp.rejection_message();
                warn!("[SyncEngine] Server rejected batch: {}", message);
                self.notifier.notify(&message, "Sync failed");
                Ok(SendOutcome::Rejected(message))
            }
            Err(e) => {
                warn!("[SyncEngine] Transport failure: {}", e);
                self.notifier.notify(&e, "Sync failed");
                Ok(SendOutcome::TransportFailed(e))
            }
        }
    }
}
