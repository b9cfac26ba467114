// src/gps/data.rs
//! GPS fix records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// NMEA sentence family a fix was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentenceKind {
    Gga,
    Rmc,
    Gll,
}

impl SentenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentenceKind::Gga => "GGA",
            SentenceKind::Rmc => "RMC",
            SentenceKind::Gll => "GLL",
        }
    }
}

impl fmt::Display for SentenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GGA" => Ok(SentenceKind::Gga),
            "RMC" => Ok(SentenceKind::Rmc),
            "GLL" => Ok(SentenceKind::Gll),
            other => Err(format!("unknown sentence kind '{}'", other)),
        }
    }
}

/// Receiver solution dimension reported by GSA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixType {
    NoFix,
    Fix2D,
    Fix3D,
}

impl FixType {
    /// GSA fix type field: 1 = none, 2 = 2D, 3 = 3D
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(FixType::NoFix),
            2 => Some(FixType::Fix2D),
            3 => Some(FixType::Fix3D),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FixType::NoFix => "No Fix",
            FixType::Fix2D => "2D",
            FixType::Fix3D => "3D",
        }
    }
}

impl fmt::Display for FixType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FixType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "No Fix" => Ok(FixType::NoFix),
            "2D" => Ok(FixType::Fix2D),
            "3D" => Ok(FixType::Fix3D),
            other => Err(format!("unknown fix type '{}'", other)),
        }
    }
}

/// A single decoded GPS observation.
///
/// `speed` and `heading` start out as whatever the sentence carried; the
/// motion analytics fill them in when the sentence had nothing. The
/// `distance_km`, `total_distance_km` and `climb_rate` fields are only ever
/// set by the motion analytics. `pdop`, `vdop`, `fix_type` and
/// `satellites_visible` come from the GSA and GSV sentences of the epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,   // km/h
    pub heading: Option<f64>, // degrees, 0 = true north
    pub satellites: Option<u8>,
    pub hdop: Option<f64>,
    pub pdop: Option<f64>,
    pub vdop: Option<f64>,
    pub fix_type: Option<FixType>,
    pub satellites_visible: Option<u8>,
    pub fix_quality: u8,
    pub sentence: SentenceKind,
    pub distance_km: Option<f64>,
    pub total_distance_km: Option<f64>,
    pub climb_rate: Option<f64>, // m/s
}

impl Fix {
    /// Create a fix with only a position; everything optional is empty
    pub fn new(timestamp: DateTime<Utc>, latitude: f64, longitude: f64, sentence: SentenceKind) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude: None,
            speed: None,
            heading: None,
            satellites: None,
            hdop: None,
            pdop: None,
            vdop: None,
            fix_type: None,
            satellites_visible: None,
            fix_quality: 1,
            sentence,
            distance_km: None,
            total_distance_km: None,
            climb_rate: None,
        }
    }

    /// True when the fix may be used as a source of positional truth
    pub fn is_valid(&self) -> bool {
        self.fix_quality > 0
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Get fix type description
    pub fn fix_description(&self) -> String {
        match self.fix_quality {
            0 => "No fix".to_string(),
            1 => "GPS".to_string(),
            2 => "DGPS".to_string(),
            3 => "PPS".to_string(),
            4 => "RTK".to_string(),
            5 => "Float RTK".to_string(),
            6 => "Estimated".to_string(),
            7 => "Manual".to_string(),
            8 => "Simulation".to_string(),
            quality => format!("Unknown ({})", quality),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Fix {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Fix::new(ts, 38.9, -77.03, SentenceKind::Gga)
    }

    #[test]
    fn test_valid_fix() {
        assert!(sample().is_valid());
    }

    #[test]
    fn test_quality_zero_is_invalid() {
        let mut fix = sample();
        fix.fix_quality = 0;
        assert!(!fix.is_valid());
        assert_eq!(fix.fix_description(), "No fix");
    }

    #[test]
    fn test_fix_type_codes() {
        assert_eq!(FixType::from_code(3), Some(FixType::Fix3D));
        assert_eq!(FixType::from_code(1), Some(FixType::NoFix));
        assert_eq!(FixType::from_code(7), None);
        assert_eq!("2D".parse::<FixType>(), Ok(FixType::Fix2D));
        assert_eq!(FixType::Fix3D.to_string(), "3D");
    }

    #[test]
    fn test_out_of_range_is_invalid() {
        let mut fix = sample();
        fix.latitude = 91.0;
        assert!(!fix.is_valid());

        let mut fix = sample();
        fix.longitude = -180.5;
        assert!(!fix.is_valid());
    }
}
