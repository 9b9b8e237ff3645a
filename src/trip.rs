//! Trip state machine.
//!
//! Governs the idle/active trip lifecycle, decides which incoming samples
//! count toward the trip, and accumulates great-circle distance over the
//! ledger. Trip existence is derived from the persisted start time, never
//! from an in-memory flag alone, so an active trip survives process restart.
//!
//! Distance is recomputed lazily: appends only mark the cache dirty, and
//! the O(n) ledger walk happens at most once per mutation however often the
//! UI polls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use geo::{Distance, Haversine, Point};
use log::{debug, info};

use crate::config::Settings;
use crate::error::Result;
use crate::ledger::TripLedger;
use crate::notify::Notifier;
use crate::payload::{Feature, TripSnapshot};
use crate::store::EventStore;
use crate::types::{EventRecord, LocationSample, MAX_TRIP_ACCURACY_METERS, TripMode};

pub struct TripTracker {
    settings: Settings,
    store: EventStore,
    ledger: TripLedger,
    notifier: Arc<dyn Notifier>,
    /// One-shot: the next qualifying sample becomes the trip's start location.
    awaiting_start_location: bool,
    distance_cache: f64,
    distance_dirty: bool,
}

impl TripTracker {
    pub(crate) fn new(
        settings: Settings,
        store: EventStore,
        ledger: TripLedger,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let active = settings.trip_start().is_some();
        let awaiting = active && settings.trip_start_location().is_none();
        Self {
            settings,
            store,
            ledger,
            notifier,
            awaiting_start_location: awaiting,
            distance_cache: 0.0,
            // After a restart mid-trip the cache must be rebuilt from the ledger.
            distance_dirty: active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.settings.trip_start().is_some()
    }

    pub fn mode(&self) -> TripMode {
        self.settings.trip_mode()
    }

    /// Start a trip. No-op if one is already active.
    pub fn start(&mut self, mode: TripMode) -> Result<()> {
        self.start_at(mode, Utc::now())
    }

    pub fn start_at(&mut self, mode: TripMode, now: DateTime<Utc>) -> Result<()> {
        if self.is_active() {
            debug!("[TripTracker] start ignored: trip already active");
            return Ok(());
        }

        // A crash between the summary write and the ledger clear can leave
        // stale points behind; they must not leak into the new trip.
        self.ledger.clear()?;

        self.settings.set_trip_mode(mode);
        self.settings.set_trip_start(now);
        self.settings.clear_trip_start_location();
        self.awaiting_start_location = true;
        self.distance_cache = 0.0;
        self.distance_dirty = false;

        info!("[TripTracker] Started {} trip at {}", mode.as_str(), now);
        Ok(())
    }

    /// Feed one inbound sample to the trip bookkeeping. Returns whether the
    /// sample qualified: taken at or after the trip start, with horizontal
    /// accuracy within the threshold. Non-qualifying samples leave all trip
    /// state untouched (including the start-location flag).
    pub fn handle_sample(&mut self, sample: &LocationSample) -> Result<bool> {
        let Some(start) = self.settings.trip_start() else {
            return Ok(false);
        };
        if sample.timestamp < start {
            return Ok(false);
        }
        if sample.horizontal_accuracy.unwrap_or(f64::MAX) > MAX_TRIP_ACCURACY_METERS {
            return Ok(false);
        }

        if self.awaiting_start_location {
            self.settings
                .set_trip_start_location(sample.latitude, sample.longitude);
            self.awaiting_start_location = false;
        }

        self.ledger.append(
            sample.timestamp.timestamp(),
            sample.latitude,
            sample.longitude,
        )?;
        self.distance_dirty = true;
        Ok(true)
    }

    /// End the active trip: queue a summary event, then clear the ledger and
    /// the persisted start state. No-op if no trip is active.
    pub fn end(&mut self, autopause: bool) -> Result<()> {
        self.end_at(Utc::now(), autopause)
    }

    pub fn end_at(&mut self, now: DateTime<Utc>, autopause: bool) -> Result<()> {
        let Some(start) = self.settings.trip_start() else {
            debug!("[TripTracker] end ignored: no active trip");
            return Ok(());
        };

        let distance = self.distance()?;
        let duration = now.signed_duration_since(start).num_seconds();
        let mode = self.settings.trip_mode();
        let geometry = match self.ledger.last_point()? {
            Some(p) => Some((p.longitude, p.latitude)),
            None => self
                .settings
                .trip_start_location()
                .map(|(lat, lng)| (lng, lat)),
        };

        let summary =
            EventRecord::trip_summary(now, mode, start, distance, duration, autopause, geometry);

        // The summary must be durably queued before the ledger is cleared;
        // a crash in between leaves stale points, never a lost summary.
        self.store.put(&summary)?;
        self.ledger.clear()?;

        self.settings.clear_trip_start();
        self.settings.clear_trip_start_location();
        self.awaiting_start_location = false;
        self.distance_cache = 0.0;
        self.distance_dirty = false;

        info!(
            "[TripTracker] Ended {} trip: {:.0}m over {}s (auto: {})",
            mode.as_str(),
            distance,
            duration,
            autopause
        );

        if autopause {
            self.notifier.notify(
                &format!(
                    "Your {} trip ended automatically after {:.1} km",
                    mode.as_str(),
                    distance / 1000.0
                ),
                "Trip ended",
            );
        }
        Ok(())
    }

    /// Accumulated trip distance in meters. Zero while idle; lazily
    /// recomputed from the ledger only after new entries arrived.
    pub fn distance(&mut self) -> Result<f64> {
        if !self.is_active() {
            return Ok(0.0);
        }
        if self.distance_dirty {
            self.distance_cache = self.ledger_distance()?;
            self.distance_dirty = false;
        }
        Ok(self.distance_cache)
    }

    /// Elapsed seconds since trip start; `None` while idle.
    pub fn duration(&self) -> Option<i64> {
        self.duration_at(Utc::now())
    }

    pub fn duration_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.settings
            .trip_start()
            .map(|start| now.signed_duration_since(start).num_seconds())
    }

    /// Snapshot of the active trip for the batch payload; `None` while idle.
    pub fn snapshot(&mut self) -> Result<Option<TripSnapshot>> {
        let Some(start) = self.settings.trip_start() else {
            return Ok(None);
        };
        let distance = self.distance()?;
        let start_location = self
            .settings
            .trip_start_location()
            .map(|(lat, lng)| Feature::point(lng, lat));
        let current_location = self
            .ledger
            .last_point()?
            .map(|p| Feature::point(p.longitude, p.latitude));

        Ok(Some(TripSnapshot {
            mode: self.settings.trip_mode().as_str().to_string(),
            start: start.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            distance,
            start_location,
            current_location,
        }))
    }

    /// Sum of great-circle distances between consecutive ledger entries.
    fn ledger_distance(&self) -> Result<f64> {
        let points = self.ledger.points()?;
        let mut total = 0.0;
        for pair in points.windows(2) {
            total += Haversine::distance(
                Point::new(pair[0].longitude, pair[0].latitude),
                Point::new(pair[1].longitude, pair[1].latitude),
            );
        }
        Ok(total)
    }
}
