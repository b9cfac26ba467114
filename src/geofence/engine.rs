// src/geofence/engine.rs
//! Per-boundary membership tracking and crossing detection
//!
//! The engine performs no I/O. It answers "did this position cross a
//! boundary?" and leaves persistence and notification to the caller.

use super::boundary::{load_boundaries, GeofenceBoundary};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Last known relation between the vehicle and a boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Membership {
    #[default]
    Unknown,
    Inside,
    Outside,
}

/// A boundary crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Entry,
    Exit,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Entry => "ENTRY",
            Transition::Exit => "EXIT",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTRY" => Ok(Transition::Entry),
            "EXIT" => Ok(Transition::Exit),
            other => Err(format!("unknown geofence event type '{}'", other)),
        }
    }
}

/// Membership state machine for one boundary.
///
/// The first observation only initialises the state; afterwards a change
/// between `Inside` and `Outside` yields a transition.
#[derive(Debug, Clone, Default)]
pub struct GeofenceState {
    membership: Membership,
}

impl GeofenceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    /// Record a containment result and report any crossing it implies
    pub fn observe(&mut self, inside: bool) -> Option<Transition> {
        let next = if inside {
            Membership::Inside
        } else {
            Membership::Outside
        };

        let transition = match (self.membership, next) {
            (Membership::Outside, Membership::Inside) => Some(Transition::Entry),
            (Membership::Inside, Membership::Outside) => Some(Transition::Exit),
            _ => None,
        };

        self.membership = next;
        transition
    }
}

/// A boundary together with its tracked membership
#[derive(Debug, Clone)]
pub struct Geofence {
    boundary: GeofenceBoundary,
    state: GeofenceState,
}

impl Geofence {
    pub fn new(boundary: GeofenceBoundary) -> Self {
        Self {
            boundary,
            state: GeofenceState::new(),
        }
    }

    pub fn boundary(&self) -> &GeofenceBoundary {
        &self.boundary
    }

    pub fn membership(&self) -> Membership {
        self.state.membership()
    }

    /// Test a position against this boundary and advance the state machine
    pub fn evaluate(&mut self, longitude: f64, latitude: f64) -> Option<Transition> {
        let inside = self.boundary.contains(longitude, latitude);
        self.state.observe(inside)
    }
}

/// One transition on a named boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crossing {
    pub boundary: String,
    pub transition: Transition,
}

/// All configured geofences. An engine without boundaries is a no-op.
#[derive(Debug, Clone, Default)]
pub struct GeofenceEngine {
    fences: Vec<Geofence>,
}

impl GeofenceEngine {
    pub fn new(boundaries: Vec<GeofenceBoundary>) -> Self {
        Self {
            fences: boundaries.into_iter().map(Geofence::new).collect(),
        }
    }

    /// Load boundaries from a GeoJSON file.
    ///
    /// A missing path, file or parse failure disables geofencing rather
    /// than failing startup.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            log::warn!("No geofence file configured, geofencing disabled");
            return Self::default();
        };

        if !path.exists() {
            log::warn!("No geofence file found at {}, geofencing disabled", path.display());
            return Self::default();
        }

        match load_boundaries(path) {
            Ok(boundaries) => {
                log::info!("Loaded {} geofence regions from {}", boundaries.len(), path.display());
                for boundary in &boundaries {
                    log::info!("  - {}", boundary.name());
                }
                Self::new(boundaries)
            }
            Err(e) => {
                log::warn!("Error loading geofence {}: {}, geofencing disabled", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.fences.is_empty()
    }

    pub fn fences(&self) -> &[Geofence] {
        &self.fences
    }

    /// Current membership of the named boundary
    pub fn membership(&self, name: &str) -> Option<Membership> {
        self.fences
            .iter()
            .find(|fence| fence.boundary().name() == name)
            .map(Geofence::membership)
    }

    /// Evaluate every boundary independently; a single position may cross
    /// several at once.
    pub fn evaluate(&mut self, longitude: f64, latitude: f64) -> Vec<Crossing> {
        self.fences
            .iter_mut()
            .filter_map(|fence| {
                fence.evaluate(longitude, latitude).map(|transition| Crossing {
                    boundary: fence.boundary().name().to_string(),
                    transition,
                })
            })
            .collect()
    }
}
