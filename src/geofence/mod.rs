// src/geofence/mod.rs
//! Geofence boundaries, membership state and crossing events

pub mod boundary;
pub mod engine;
pub mod event;

pub use boundary::GeofenceBoundary;
pub use engine::{Crossing, Geofence, GeofenceEngine, GeofenceState, Membership, Transition};
pub use event::GeofenceEvent;
