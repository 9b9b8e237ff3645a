//! Composition root.
//!
//! A [`Tracker`] is an explicitly constructed, explicitly owned engine
//! instance: the host adapter creates one at startup, feeds it samples and
//! scheduler ticks, and drops it at shutdown. There is no global state; all
//! collaborators (config, transport, notifier) are injected.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::{ConfigProvider, MemoryConfig, Settings, SqliteConfig};
use crate::error::Result;
use crate::ledger::TripLedger;
use crate::migrations;
use crate::notify::{LogNotifier, Notifier};
use crate::scheduler::SyncPolicy;
use crate::store::EventStore;
use crate::sync::{SendOutcome, SyncEngine, Transport};
use crate::trip::TripTracker;
use crate::types::{DeviceContext, EventRecord, LocationSample, TripMode};

/// Queue health snapshot for host UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: u64,
    pub last_sent: Option<DateTime<Utc>>,
    pub trip_active: bool,
}

pub struct Tracker<T: Transport> {
    settings: Settings,
    store: EventStore,
    trip: TripTracker,
    engine: SyncEngine<T>,
    policy: SyncPolicy,
    device: DeviceContext,
}

impl<T: Transport> Tracker<T> {
    /// Open (or create) the database at `db_path` with an injected
    /// configuration provider.
    pub fn open(
        db_path: &str,
        config: Arc<dyn ConfigProvider>,
        transport: T,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        migrations::init_schema(&conn)?;
        Self::from_parts(Arc::new(Mutex::new(conn)), config, transport, notifier)
    }

    /// Open with settings stored in the same database file, so one file
    /// holds all durable state.
    pub fn open_shared_config(
        db_path: &str,
        transport: T,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        migrations::init_schema(&conn)?;
        let db = Arc::new(Mutex::new(conn));
        let config = Arc::new(SqliteConfig::new(db.clone()));
        Self::from_parts(db, config, transport, notifier)
    }

    /// In-memory instance (for testing).
    pub fn in_memory(transport: T) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::init_schema(&conn)?;
        Self::from_parts(
            Arc::new(Mutex::new(conn)),
            Arc::new(MemoryConfig::new()),
            transport,
            Arc::new(LogNotifier),
        )
    }

    fn from_parts(
        db: Arc<Mutex<Connection>>,
        config: Arc<dyn ConfigProvider>,
        transport: T,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let settings = Settings::new(config);
        let store = EventStore::new(db.clone());
        let ledger = TripLedger::new(db);
        let trip = TripTracker::new(
            settings.clone(),
            store.clone(),
            ledger,
            notifier.clone(),
        );
        let engine = SyncEngine::new(store.clone(), settings.clone(), transport, notifier);
        let policy = SyncPolicy::new(settings.clone());

        Ok(Self {
            settings,
            store,
            trip,
            engine,
            policy,
            device: DeviceContext::default(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    // ========================================================================
    // Sample ingestion
    // ========================================================================

    /// Record a batch of one-or-more inbound samples (any producer), feed
    /// the trip bookkeeping, then give the scheduler a tick.
    pub async fn ingest(&mut self, samples: &[LocationSample]) -> Result<SendOutcome> {
        let device_id = self.settings.device_id();
        for sample in samples {
            let record = EventRecord::from_sample(sample, &self.device, device_id.as_deref());
            self.store.put(&record)?;
            self.trip.handle_sample(sample)?;
        }
        self.maybe_send().await
    }

    /// Record a host lifecycle action ("app_launched", "paused", ...).
    pub fn log_action(&mut self, action: &str) -> Result<()> {
        self.store.put(&EventRecord::action(Utc::now(), action, None))
    }

    /// Record a visit (significant-place arrival/departure).
    pub fn log_visit(
        &mut self,
        longitude: f64,
        latitude: f64,
        arrival: DateTime<Utc>,
        departure: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.store.put(&EventRecord::visit(
            Utc::now(),
            longitude,
            latitude,
            arrival,
            departure,
        ))
    }

    /// Update battery/Wi-Fi context merged into subsequent records.
    pub fn update_device(&mut self, device: DeviceContext) {
        self.device = device;
    }

    // ========================================================================
    // Trip control
    // ========================================================================

    pub fn start_trip(&mut self, mode: TripMode) -> Result<()> {
        self.trip.start(mode)
    }

    pub fn end_trip(&mut self, autopause: bool) -> Result<()> {
        self.trip.end(autopause)
    }

    pub fn trip_is_active(&self) -> bool {
        self.trip.is_active()
    }

    /// Accumulated distance of the active trip in meters (0 while idle).
    pub fn trip_distance(&mut self) -> Result<f64> {
        self.trip.distance()
    }

    /// Elapsed seconds of the active trip; `None` while idle.
    pub fn trip_duration(&self) -> Option<i64> {
        self.trip.duration()
    }

    // ========================================================================
    // Sync triggers
    // ========================================================================

    /// Scheduler tick: send if the interval elapsed or a backlog is pending.
    pub async fn maybe_send(&mut self) -> Result<SendOutcome> {
        if !self.policy.should_send(
            Utc::now(),
            self.engine.is_in_flight(),
            self.engine.more_pending(),
        ) {
            return Ok(SendOutcome::NotDue);
        }
        let trip = self.trip.snapshot()?;
        self.engine.send_queue_now(trip).await
    }

    /// Explicit flush (manual, or on suspension): bypasses the interval,
    /// still one send at a time.
    pub async fn flush_now(&mut self) -> Result<SendOutcome> {
        if !self.policy.may_flush(self.engine.is_in_flight()) {
            return Ok(SendOutcome::AlreadyInFlight);
        }
        let trip = self.trip.snapshot()?;
        self.engine.send_queue_now(trip).await
    }

    // ========================================================================
    // Host queries
    // ========================================================================

    pub fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self.store.count()?,
            last_sent: self.settings.last_sent(),
            trip_active: self.trip.is_active(),
        })
    }

    /// Server-echoed display name of the last acknowledged position.
    pub fn last_location_name(&self) -> Option<String> {
        self.engine.last_location_name()
    }

    /// Drop every queued event. Host-triggered reset only.
    pub fn purge_queue(&mut self) -> Result<()> {
        self.store.purge()
    }
}
