//! Outbound batch payload and server response wire formats.
//!
//! One batch is a JSON object `{locations: [Feature...], current?, trip?}`
//! where each queued event becomes a GeoJSON Feature. The server replies
//! `{result: "ok", geocode?: {...}}` on acknowledgment or `{error: "..."}`
//! on application-level rejection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::EventRecord;

/// GeoJSON Point geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub geometry_type: String,
    /// [longitude, latitude]
    pub coordinates: (f64, f64),
}

impl Geometry {
    pub fn point(longitude: f64, latitude: f64) -> Self {
        Self {
            geometry_type: "Point".to_string(),
            coordinates: (longitude, latitude),
        }
    }
}

/// GeoJSON Feature wrapping one event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub feature_type: String,
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn from_record(record: &EventRecord) -> Self {
        Self {
            feature_type: "Feature".to_string(),
            geometry: record.geometry.map(|(lng, lat)| Geometry::point(lng, lat)),
            properties: record.properties.clone(),
        }
    }

    /// A bare point feature with no properties (trip start/current markers).
    pub fn point(longitude: f64, latitude: f64) -> Self {
        Self {
            feature_type: "Feature".to_string(),
            geometry: Some(Geometry::point(longitude, latitude)),
            properties: Map::new(),
        }
    }
}

/// Snapshot of the active trip, attached to batches while one is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripSnapshot {
    pub mode: String,
    /// Trip start, ISO-8601 UTC
    pub start: String,
    /// Accumulated distance in meters
    pub distance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_location: Option<Feature>,
}

/// One network batch. Never sent empty; `current` rides along only when the
/// store holds more than one full batch, so the server knows live position
/// even through a large backlog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPayload {
    pub locations: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip: Option<TripSnapshot>,
}

/// Server-echoed geocode metadata for display.
#[derive(Debug, Clone, Deserialize)]
pub struct Geocode {
    pub full_name: Option<String>,
}

/// Thin view of the server's reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerResponse {
    pub result: Option<String>,
    pub error: Option<String>,
    pub geocode: Option<Geocode>,
}

impl ServerResponse {
    /// Acknowledgment requires an explicit `result: "ok"`; anything else
    /// (including a missing result) is an application-level rejection.
    pub fn is_ack(&self) -> bool {
        self.result.as_deref() == Some("ok")
    }

    /// Rejection message to surface to the notifier.
    pub fn rejection_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "server did not acknowledge batch".to_string())
    }
}
