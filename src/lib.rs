// src/lib.rs
//! Vehicle GPS telemetry logger
//!
//! Reads NMEA sentences from a serial GPS receiver, derives speed, heading
//! and distance, stores every fix in SQLite and raises events when the
//! vehicle crosses a geofence boundary. A separate collector records LTE
//! signal metadata alongside.

pub mod cellular;
pub mod config;
pub mod error;
pub mod geofence;
pub mod gps;
pub mod monitor;
pub mod notify;
pub mod storage;

// Re-export main types for convenience
pub use config::LoggerConfig;
pub use error::{Result, TelemetryError};
pub use geofence::{GeofenceEngine, GeofenceEvent, Transition};
pub use gps::{Fix, MotionState, SentenceKind};
pub use monitor::Pipeline;
pub use notify::Notifier;
pub use storage::TelemetryStore;
