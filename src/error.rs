// src/error.rs
//! Error types for the telemetry logger

use std::fmt;

pub type Result<T> = std::result::Result<T, TelemetryError>;

#[derive(Debug)]
pub enum TelemetryError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Database(rusqlite::Error),
    GeoJson(geojson::Error),
    Http(reqwest::Error),
    Config(String),
    Connection(String),
    Other(String),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Io(e) => write!(f, "IO error: {}", e),
            TelemetryError::Serial(e) => write!(f, "Serial error: {}", e),
            TelemetryError::Json(e) => write!(f, "JSON error: {}", e),
            TelemetryError::Database(e) => write!(f, "Database error: {}", e),
            TelemetryError::GeoJson(e) => write!(f, "GeoJSON error: {}", e),
            TelemetryError::Http(e) => write!(f, "HTTP error: {}", e),
            TelemetryError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TelemetryError::Connection(msg) => write!(f, "Connection error: {}", msg),
            TelemetryError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::Io(e) => Some(e),
            TelemetryError::Serial(e) => Some(e),
            TelemetryError::Json(e) => Some(e),
            TelemetryError::Database(e) => Some(e),
            TelemetryError::GeoJson(e) => Some(e),
            TelemetryError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(error: std::io::Error) -> Self {
        TelemetryError::Io(error)
    }
}

impl From<tokio_serial::Error> for TelemetryError {
    fn from(error: tokio_serial::Error) -> Self {
        TelemetryError::Serial(error)
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(error: serde_json::Error) -> Self {
        TelemetryError::Json(error)
    }
}

impl From<rusqlite::Error> for TelemetryError {
    fn from(error: rusqlite::Error) -> Self {
        TelemetryError::Database(error)
    }
}

impl From<geojson::Error> for TelemetryError {
    fn from(error: geojson::Error) -> Self {
        TelemetryError::GeoJson(error)
    }
}

impl From<reqwest::Error> for TelemetryError {
    fn from(error: reqwest::Error) -> Self {
        TelemetryError::Http(error)
    }
}
