// src/geofence/event.rs
//! Persisted record of a boundary crossing

use super::engine::{Crossing, Transition};
use crate::gps::Fix;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: Transition,
    pub boundary: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

impl GeofenceEvent {
    /// Build the event for a crossing detected at `fix`
    pub fn from_crossing(fix: &Fix, crossing: Crossing) -> Self {
        Self {
            timestamp: fix.timestamp,
            event_type: crossing.transition,
            boundary: Some(crossing.boundary),
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed: fix.speed,
            heading: fix.heading,
        }
    }

    /// Short human-readable summary used for push notifications
    pub fn summary(&self) -> String {
        let action = match self.event_type {
            Transition::Entry => "ENTERED",
            Transition::Exit => "LEFT",
        };
        let boundary = self.boundary.as_deref().unwrap_or("geofence");

        let mut message = format!(
            "{} {}\nTime: {}\nPosition: {:.5}, {:.5}",
            action,
            boundary,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.latitude,
            self.longitude
        );
        if let Some(speed) = self.speed {
            message.push_str(&format!("\nSpeed: {:.1} km/h", speed));
        }
        message
    }
}
