// src/storage/mod.rs
//! SQLite persistence for fixes, geofence events and cell observations
//!
//! Every insert runs in autocommit mode, so each row is durable as soon as
//! the call returns.

use crate::{
    cellular::CellularObservation,
    error::Result,
    geofence::{GeofenceEvent, Transition},
    gps::{Fix, FixType, SentenceKind},
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;

const SCHEMA: &str = include_str!("schema.sql");

const FIX_COLUMNS: &str = "timestamp, latitude, longitude, altitude, speed, heading, satellites, \
     hdop, fix_quality, sentence, climb_rate, distance_traveled, total_distance, pdop, vdop, \
     fix_type, satellites_visible";

/// Sortable text form used for every stored timestamp
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn fix_from_row(row: &Row<'_>) -> rusqlite::Result<Fix> {
    let timestamp: String = row.get(0)?;
    let sentence: Option<String> = row.get(9)?;
    let sentence = match sentence {
        Some(code) => code.parse().map_err(|e| conversion_error(9, e))?,
        None => SentenceKind::Gga,
    };
    let fix_type: Option<String> = row.get(15)?;
    let fix_type = fix_type
        .map(|name| name.parse::<FixType>().map_err(|e| conversion_error(15, e)))
        .transpose()?;

    Ok(Fix {
        timestamp: parse_timestamp(&timestamp, 0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        altitude: row.get(3)?,
        speed: row.get(4)?,
        heading: row.get(5)?,
        satellites: row.get(6)?,
        hdop: row.get(7)?,
        fix_quality: row.get(8)?,
        sentence,
        climb_rate: row.get(10)?,
        distance_km: row.get(11)?,
        total_distance_km: row.get(12)?,
        pdop: row.get(13)?,
        vdop: row.get(14)?,
        fix_type,
        satellites_visible: row.get(16)?,
    })
}

pub struct TelemetryStore {
    conn: Connection,
}

impl TelemetryStore {
    /// Open (creating if needed) the database file and ensure the schema
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // journal_mode returns a row, so it can't go through execute
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            log::error!("Failed to enable WAL mode: {}", e);
        }

        let store = Self::with_connection(conn)?;
        log::info!("Database initialized at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database, for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn insert_fix(&self, fix: &Fix) -> Result<i64> {
        self.conn.execute(
            &format!(
                "INSERT INTO gps_data ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                FIX_COLUMNS
            ),
            params![
                format_timestamp(&fix.timestamp),
                fix.latitude,
                fix.longitude,
                fix.altitude,
                fix.speed,
                fix.heading,
                fix.satellites,
                fix.hdop,
                fix.fix_quality,
                fix.sentence.as_str(),
                fix.climb_rate,
                fix.distance_km,
                fix.total_distance_km,
                fix.pdop,
                fix.vdop,
                fix.fix_type.map(|kind| kind.as_str()),
                fix.satellites_visible,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_geofence_event(&self, event: &GeofenceEvent) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO geofence_events \
             (timestamp, event_type, fence_name, latitude, longitude, speed, heading) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                format_timestamp(&event.timestamp),
                event.event_type.as_str(),
                event.boundary,
                event.latitude,
                event.longitude,
                event.speed,
                event.heading,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_cell_observation(&self, observation: &CellularObservation) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO cell_observations \
             (timestamp, cell_id, pci, band, rsrp, rsrq, snr) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                format_timestamp(&observation.timestamp),
                observation.cell_id,
                observation.pci,
                observation.band,
                observation.rsrp,
                observation.rsrq,
                observation.snr,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recently inserted fix
    pub fn latest_fix(&self) -> Result<Option<Fix>> {
        let fix = self
            .conn
            .query_row(
                &format!("SELECT {} FROM gps_data ORDER BY id DESC LIMIT 1", FIX_COLUMNS),
                [],
                fix_from_row,
            )
            .optional()?;
        Ok(fix)
    }

    /// Fix closest in time to `at`, provided it lies within `max_gap`
    pub fn nearest_fix(&self, at: DateTime<Utc>, max_gap: Duration) -> Result<Option<Fix>> {
        let fix = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM gps_data \
                     ORDER BY ABS(julianday(timestamp) - julianday(?1)) LIMIT 1",
                    FIX_COLUMNS
                ),
                params![format_timestamp(&at)],
                fix_from_row,
            )
            .optional()?;

        Ok(fix.filter(|fix| (fix.timestamp - at).abs() <= max_gap))
    }

    pub fn fix_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM gps_data", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn cell_observation_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cell_observations", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// All geofence events in insertion order
    pub fn geofence_events(&self) -> Result<Vec<GeofenceEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, event_type, fence_name, latitude, longitude, speed, heading \
             FROM geofence_events ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            let timestamp: String = row.get(0)?;
            let event_type: String = row.get(1)?;
            Ok(GeofenceEvent {
                timestamp: parse_timestamp(&timestamp, 0)?,
                event_type: event_type
                    .parse::<Transition>()
                    .map_err(|e| conversion_error(1, e))?,
                boundary: row.get(2)?,
                latitude: row.get(3)?,
                longitude: row.get(4)?,
                speed: row.get(5)?,
                heading: row.get(6)?,
            })
        })?;

        let mut events = Vec::new();
        for event in rows {
            events.push(event?);
        }
        Ok(events)
    }

    /// Close the connection, reporting any error from the final flush
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }
}
