//! Waylog - durable location event queue and sync engine
//!
//! This crate provides:
//! - A SQLite-backed queue of location/visit/trip/action events
//! - A batched HTTP sync engine with at-least-once delivery
//! - A trip lifecycle state machine with great-circle distance tracking
//!
//! Hosts construct a [`Tracker`] explicitly, feed it samples and scheduler
//! ticks, and inject platform collaborators (config store, transport,
//! notifier) at the trait seams.

pub mod config;
pub mod error;
pub mod http;
pub mod ledger;
pub mod migrations;
pub mod notify;
pub mod payload;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod tracker;
pub mod trip;
pub mod types;

pub use config::{ConfigProvider, MemoryConfig, Settings, SqliteConfig};
pub use error::{Result, WaylogError};
pub use http::HttpTransport;
pub use notify::{LogNotifier, Notifier};
pub use payload::{BatchPayload, Feature, ServerResponse, TripSnapshot};
pub use store::EventStore;
pub use sync::{SendOutcome, SyncEngine, Transport};
pub use tracker::{QueueStats, Tracker};
pub use trip::TripTracker;
pub use types::{
    DeviceContext, EventKind, EventRecord, LocationSample, SampleSource, TripMode,
};

/// Initialize logging for Android
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("waylog"),
    );
}

/// Initialize logging for iOS (unified logging system)
#[cfg(target_os = "ios")]
pub fn init_logging() {
    let _ = oslog::OsLogger::new("waylog")
        .level_filter(log::LevelFilter::Debug)
        .init();
}

#[cfg(not(any(target_os = "android", target_os = "ios")))]
pub fn init_logging() {
    // Desktop hosts (and tests) wire their own logger.
}
