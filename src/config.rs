//! Injected configuration provider.
//!
//! Persisted settings (endpoint, intervals, trip state) live behind the
//! [`ConfigProvider`] trait so hosts can back them with platform defaults
//! and tests can run against an in-memory map. [`Settings`] layers typed
//! accessors and defaults over the raw string store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::types::TripMode;

/// Default seconds between automatic sends.
pub const DEFAULT_SEND_INTERVAL_SECS: i64 = 300;
/// Default maximum records per network batch.
pub const DEFAULT_POINTS_PER_BATCH: usize = 200;

/// Raw string key/value configuration store.
///
/// Writes are fire-and-forget (platform defaults semantics); a failing
/// backend logs and drops the write rather than erroring.
pub trait ConfigProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Well-known configuration keys.
pub mod keys {
    pub const ENDPOINT_URL: &str = "api_endpoint";
    pub const DEVICE_ID: &str = "device_id";
    pub const SEND_INTERVAL_SECS: &str = "send_interval_secs";
    pub const POINTS_PER_BATCH: &str = "points_per_batch";
    pub const TRIP_MODE: &str = "trip_mode";
    pub const TRIP_START: &str = "trip_start";
    pub const TRIP_START_LAT: &str = "trip_start_lat";
    pub const TRIP_START_LNG: &str = "trip_start_lng";
    pub const LAST_SENT: &str = "last_sent";
    pub const INCLUDE_TRACKING_STATS: &str = "include_tracking_stats";
}

/// Typed view over a [`ConfigProvider`].
#[derive(Clone)]
pub struct Settings {
    provider: Arc<dyn ConfigProvider>,
}

impl Settings {
    pub fn new(provider: Arc<dyn ConfigProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn ConfigProvider> {
        &self.provider
    }

    /// Batch endpoint URL. Absent means sending is skipped entirely.
    pub fn endpoint_url(&self) -> Option<String> {
        self.provider
            .get(keys::ENDPOINT_URL)
            .filter(|s| !s.is_empty())
    }

    pub fn set_endpoint_url(&self, url: &str) {
        self.provider.set(keys::ENDPOINT_URL, url);
    }

    pub fn device_id(&self) -> Option<String> {
        self.provider.get(keys::DEVICE_ID).filter(|s| !s.is_empty())
    }

    pub fn set_device_id(&self, id: &str) {
        self.provider.set(keys::DEVICE_ID, id);
    }

    /// Seconds between automatic sends. Negative disables sending.
    pub fn send_interval_secs(&self) -> i64 {
        self.provider
            .get(keys::SEND_INTERVAL_SECS)
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SEND_INTERVAL_SECS)
    }

    pub fn set_send_interval_secs(&self, secs: i64) {
        self.provider.set(keys::SEND_INTERVAL_SECS, &secs.to_string());
    }

    pub fn points_per_batch(&self) -> usize {
        self.provider
            .get(keys::POINTS_PER_BATCH)
            .and_then(|s| s.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_POINTS_PER_BATCH)
    }

    pub fn set_points_per_batch(&self, n: usize) {
        self.provider.set(keys::POINTS_PER_BATCH, &n.to_string());
    }

    pub fn trip_mode(&self) -> TripMode {
        self.provider
            .get(keys::TRIP_MODE)
            .map(|s| TripMode::parse(&s))
            .unwrap_or_default()
    }

    pub fn set_trip_mode(&self, mode: TripMode) {
        self.provider.set(keys::TRIP_MODE, mode.as_str());
    }

    /// Trip existence is derived from this value being present, so trip
    /// state survives process restart. Stored as epoch seconds.
    pub fn trip_start(&self) -> Option<DateTime<Utc>> {
        self.provider
            .get(keys::TRIP_START)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn set_trip_start(&self, start: DateTime<Utc>) {
        self.provider
            .set(keys::TRIP_START, &start.timestamp().to_string());
    }

    pub fn clear_trip_start(&self) {
        self.provider.remove(keys::TRIP_START);
    }

    /// (latitude, longitude) of the first qualifying sample of the trip.
    pub fn trip_start_location(&self) -> Option<(f64, f64)> {
        let lat = self
            .provider
            .get(keys::TRIP_START_LAT)
            .and_then(|s| s.parse().ok())?;
        let lng = self
            .provider
            .get(keys::TRIP_START_LNG)
            .and_then(|s| s.parse().ok())?;
        Some((lat, lng))
    }

    pub fn set_trip_start_location(&self, latitude: f64, longitude: f64) {
        self.provider.set(keys::TRIP_START_LAT, &latitude.to_string());
        self.provider.set(keys::TRIP_START_LNG, &longitude.to_string());
    }

    pub fn clear_trip_start_location(&self) {
        self.provider.remove(keys::TRIP_START_LAT);
        self.provider.remove(keys::TRIP_START_LNG);
    }

    pub fn last_sent(&self) -> Option<DateTime<Utc>> {
        self.provider
            .get(keys::LAST_SENT)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn set_last_sent(&self, at: DateTime<Utc>) {
        self.provider.set(keys::LAST_SENT, &at.timestamp().to_string());
    }

    /// Whether the active-trip snapshot rides along with batches.
    pub fn include_tracking_stats(&self) -> bool {
        self.provider
            .get(keys::INCLUDE_TRACKING_STATS)
            .map(|s| s == "true" || s == "1")
            .unwrap_or(true)
    }

    pub fn set_include_tracking_stats(&self, include: bool) {
        self.provider
            .set(keys::INCLUDE_TRACKING_STATS, if include { "true" } else { "false" });
    }
}

// ============================================================================
// Providers
// ============================================================================

/// In-memory provider for tests and hosts without a native defaults store.
#[derive(Default)]
pub struct MemoryConfig {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigProvider for MemoryConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }
}

/// Provider backed by a `settings` table, usually in the same database file
/// as the event queue so one file holds all durable state.
pub struct SqliteConfig {
    db: Arc<Mutex<Connection>>,
}

impl SqliteConfig {
    /// Wrap an open connection. The `settings` table is created by
    /// [`crate::migrations::init_schema`].
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

impl ConfigProvider for SqliteConfig {
    fn get(&self, key: &str) -> Option<String> {
        let conn = self.db.lock().unwrap();
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?",
            params![key],
            |row| row.get(0),
        )
        .ok()
    }

    fn set(&self, key: &str, value: &str) {
        let conn = self.db.lock().unwrap();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
            params![key, value],
        ) {
            log::warn!("[SqliteConfig] Failed to set '{}': {:?}", key, e);
        }
    }

    fn remove(&self, key: &str) {
        let conn = self.db.lock().unwrap();
        if let Err(e) = conn.execute("DELETE FROM settings WHERE key = ?", params![key]) {
            log::warn!("[SqliteConfig] Failed to remove '{}': {:?}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::new(Arc::new(MemoryConfig::new()))
    }

    #[test]
    fn test_defaults() {
        let s = settings();
        assert_eq!(s.endpoint_url(), None);
        assert_eq!(s.send_interval_secs(), DEFAULT_SEND_INTERVAL_SECS);
        assert_eq!(s.points_per_batch(), DEFAULT_POINTS_PER_BATCH);
        assert_eq!(s.trip_mode(), TripMode::Walk);
        assert!(s.include_tracking_stats());
        assert_eq!(s.trip_start(), None);
    }

    #[test]
    fn test_trip_start_roundtrip() {
        let s = settings();
        let now = Utc::now();
        s.set_trip_start(now);
        // Second precision is all the store keeps.
        assert_eq!(s.trip_start().map(|t| t.timestamp()), Some(now.timestamp()));
        s.clear_trip_start();
        assert_eq!(s.trip_start(), None);
    }

    #[test]
    fn test_start_location_requires_both_halves() {
        let s = settings();
        s.provider().set(keys::TRIP_START_LAT, "51.5");
        assert_eq!(s.trip_start_location(), None);
        s.provider().set(keys::TRIP_START_LNG, "-0.1");
        assert_eq!(s.trip_start_location(), Some((51.5, -0.1)));
        s.clear_trip_start_location();
        assert_eq!(s.trip_start_location(), None);
    }

    #[test]
    fn test_zero_batch_size_falls_back_to_default() {
        let s = settings();
        s.provider().set(keys::POINTS_PER_BATCH, "0");
        assert_eq!(s.points_per_batch(), DEFAULT_POINTS_PER_BATCH);
    }

    #[test]
    fn test_negative_interval_is_preserved() {
        let s = settings();
        s.set_send_interval_secs(-1);
        assert_eq!(s.send_interval_secs(), -1);
    }
}
