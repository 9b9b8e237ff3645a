//! Core data types for the event queue and trip tracker.
//!
//! These types are data containers shared between the store, the trip state
//! machine and the sync payload. They carry no behavior beyond key
//! derivation and property assembly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Horizontal accuracy threshold (meters) for a sample to count toward
/// trip distance.
pub const MAX_TRIP_ACCURACY_METERS: f64 = 200.0;

// ============================================================================
// Inbound Samples
// ============================================================================

/// Which producer delivered a sample. The failover source feeds the same
/// inbound path as the primary one; records are tagged so the server can
/// tell them apart (last writer wins per derived key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleSource {
    Primary,
    Failover,
}

/// A raw location sample as delivered by the platform location collaborator.
///
/// Samples arrive in batches of one-or-more, in timestamp order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters
    pub altitude: Option<f64>,
    /// Speed in m/s
    pub speed: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub horizontal_accuracy: Option<f64>,
    /// Vertical accuracy in meters
    pub vertical_accuracy: Option<f64>,
    /// Motion/activity flags ("walking", "driving", ...)
    pub motion: Vec<String>,
    pub source: SampleSource,
}

impl LocationSample {
    /// A minimal sample from the primary source. Convenience for hosts and
    /// tests; optional fields default to unknown.
    pub fn new(timestamp: DateTime<Utc>, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude: None,
            speed: None,
            horizontal_accuracy: None,
            vertical_accuracy: None,
            motion: Vec::new(),
            source: SampleSource::Primary,
        }
    }
}

/// Device state captured by host collaborators (battery, Wi-Fi). Merged into
/// outgoing record properties; all fields are unknown until the host reports
/// them.
#[derive(Debug, Clone, Default)]
pub struct DeviceContext {
    pub battery_state: Option<String>,
    /// Battery level 0.0-1.0
    pub battery_level: Option<f64>,
    /// Current Wi-Fi network name
    pub wifi: Option<String>,
}

// ============================================================================
// Trip Mode
// ============================================================================

/// Transport mode for the active trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripMode {
    #[default]
    Walk,
    Run,
    Bicycle,
    Car,
    Car2go,
    Taxi,
    Bus,
    Train,
    Plane,
    Tram,
    Metro,
    Boat,
}

impl TripMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripMode::Walk => "walk",
            TripMode::Run => "run",
            TripMode::Bicycle => "bicycle",
            TripMode::Car => "car",
            TripMode::Car2go => "car2go",
            TripMode::Taxi => "taxi",
            TripMode::Bus => "bus",
            TripMode::Train => "train",
            TripMode::Plane => "plane",
            TripMode::Tram => "tram",
            TripMode::Metro => "metro",
            TripMode::Boat => "boat",
        }
    }

    /// Parse a stored mode string. Unknown values (legacy free-form storage)
    /// fall back to the default rather than erroring.
    pub fn parse(s: &str) -> Self {
        match s {
            "walk" => TripMode::Walk,
            "run" => TripMode::Run,
            "bicycle" => TripMode::Bicycle,
            "car" => TripMode::Car,
            "car2go" => TripMode::Car2go,
            "taxi" => TripMode::Taxi,
            "bus" => TripMode::Bus,
            "train" => TripMode::Train,
            "plane" => TripMode::Plane,
            "tram" => TripMode::Tram,
            "metro" => TripMode::Metro,
            "boat" => TripMode::Boat,
            _ => TripMode::default(),
        }
    }
}

// ============================================================================
// Event Records
// ============================================================================

/// Kind discriminator for queued events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "location")]
    Location,
    #[serde(rename = "visit")]
    Visit,
    #[serde(rename = "trip")]
    TripSummary,
    #[serde(rename = "action")]
    ActionLog,
}

impl EventKind {
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::Location => "location",
            EventKind::Visit => "visit",
            EventKind::TripSummary => "trip",
            EventKind::ActionLog => "action",
        }
    }
}

/// A queued event awaiting delivery.
///
/// Records are keyed by `(timestamp, kind)` at second precision; two records
/// colliding on the key overwrite (last write wins). Deleted only after the
/// server acknowledges the batch containing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// (longitude, latitude), GeoJSON axis order
    pub geometry: Option<(f64, f64)>,
    pub properties: Map<String, Value>,
}

impl EventRecord {
    /// Globally-unique key derived from `(timestamp, kind)`.
    pub fn key(&self) -> String {
        format!(
            "{}-{}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            self.kind.tag()
        )
    }

    /// Build a location record from an inbound sample plus device context.
    pub fn from_sample(
        sample: &LocationSample,
        device: &DeviceContext,
        device_id: Option<&str>,
    ) -> Self {
        let mut props = Map::new();
        props.insert(
            "timestamp".to_string(),
            Value::String(sample.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        props.insert("altitude".to_string(), opt_num(sample.altitude));
        props.insert("speed".to_string(), opt_num(sample.speed));
        props.insert(
            "horizontal_accuracy".to_string(),
            opt_num(sample.horizontal_accuracy),
        );
        props.insert(
            "vertical_accuracy".to_string(),
            opt_num(sample.vertical_accuracy),
        );
        props.insert(
            "motion".to_string(),
            Value::Array(
                sample
                    .motion
                    .iter()
                    .map(|m| Value::String(m.clone()))
                    .collect(),
            ),
        );
        props.insert("battery_state".to_string(), opt_str(&device.battery_state));
        props.insert("battery_level".to_string(), opt_num(device.battery_level));
        props.insert("wifi".to_string(), opt_str(&device.wifi));
        if let Some(id) = device_id {
            props.insert("device_id".to_string(), Value::String(id.to_string()));
        }
        if sample.source == SampleSource::Failover {
            props.insert("source".to_string(), Value::String("failover".to_string()));
        }

        Self {
            kind: EventKind::Location,
            timestamp: sample.timestamp,
            geometry: Some((sample.longitude, sample.latitude)),
            properties: props,
        }
    }

    /// Build a visit record (significant-place arrival/departure).
    pub fn visit(
        timestamp: DateTime<Utc>,
        longitude: f64,
        latitude: f64,
        arrival: DateTime<Utc>,
        departure: Option<DateTime<Utc>>,
    ) -> Self {
        let mut props = Map::new();
        props.insert(
            "timestamp".to_string(),
            Value::String(timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        props.insert(
            "arrival_date".to_string(),
            Value::String(arrival.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        props.insert(
            "departure_date".to_string(),
            match departure {
                Some(d) => Value::String(d.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                None => Value::Null,
            },
        );

        Self {
            kind: EventKind::Visit,
            timestamp,
            geometry: Some((longitude, latitude)),
            properties: props,
        }
    }

    /// Build a trip summary record emitted when a trip ends.
    pub fn trip_summary(
        end: DateTime<Utc>,
        mode: TripMode,
        start: DateTime<Utc>,
        distance_meters: f64,
        duration_secs: i64,
        auto: bool,
        geometry: Option<(f64, f64)>,
    ) -> Self {
        let mut props = Map::new();
        props.insert(
            "timestamp".to_string(),
            Value::String(end.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        props.insert("mode".to_string(), Value::String(mode.as_str().to_string()));
        props.insert(
            "start".to_string(),
            Value::String(start.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        props.insert(
            "end".to_string(),
            Value::String(end.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        props.insert("distance".to_string(), json_f64(distance_meters));
        props.insert("duration".to_string(), Value::from(duration_secs));
        props.insert("auto".to_string(), Value::Bool(auto));

        Self {
            kind: EventKind::TripSummary,
            timestamp: end,
            geometry,
            properties: props,
        }
    }

    /// Build an action-log record (host-reported lifecycle event).
    pub fn action(timestamp: DateTime<Utc>, action: &str, geometry: Option<(f64, f64)>) -> Self {
        let mut props = Map::new();
        props.insert(
            "timestamp".to_string(),
            Value::String(timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        props.insert("action".to_string(), Value::String(action.to_string()));

        Self {
            kind: EventKind::ActionLog,
            timestamp,
            geometry,
            properties: props,
        }
    }
}

fn opt_num(v: Option<f64>) -> Value {
    match v {
        Some(n) => json_f64(n),
        None => Value::Null,
    }
}

fn opt_str(v: &Option<String>) -> Value {
    match v {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    }
}

fn json_f64(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
