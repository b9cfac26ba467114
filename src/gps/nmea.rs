// src/gps/nmea.rs
//! NMEA sentence decoding
//!
//! Every function here is pure: a line goes in, a decoded sentence (or
//! nothing) comes out. Partial reads and line noise are routine on a serial
//! link, so malformed input is answered with `None` rather than an error.

use super::data::{Fix, FixType, SentenceKind};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::str::FromStr;

/// Conversion factor from knots to km/h
pub const KNOTS_TO_KMH: f64 = 1.852;

/// Talker ids accepted in front of the sentence type
const TALKERS: [&str; 5] = ["GP", "GN", "GL", "GA", "GB"];

/// GSA: dilution of precision and solution type
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DopReport {
    pub fix_type: Option<FixType>,
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
}

/// VTG: track made good and ground speed
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CourseReport {
    pub heading: Option<f64>,
    pub speed: Option<f64>, // km/h
}

/// Any sentence the decoder understands
#[derive(Debug, Clone, PartialEq)]
pub enum NmeaSentence {
    /// GGA, RMC or GLL
    Position(Fix),
    Dop(DopReport),
    SatellitesInView(u8),
    Course(CourseReport),
}

/// Decode a single NMEA line.
///
/// `reference` supplies the calendar date for sentences that only carry a
/// time of day (GGA, GLL), and the timestamp itself when the sentence has no
/// time field at all.
pub fn decode_sentence(line: &str, reference: DateTime<Utc>) -> Option<NmeaSentence> {
    let body = line.trim().strip_prefix('$')?;
    let payload = verify_checksum(body)?;
    let parts: Vec<&str> = payload.split(',').collect();

    let code = parts[0];
    let talker = code.get(..2)?;
    if !TALKERS.contains(&talker) {
        return None;
    }

    match code.get(2..)? {
        "GGA" => parse_gga(&parts, reference).map(NmeaSentence::Position),
        "RMC" => parse_rmc(&parts, reference).map(NmeaSentence::Position),
        "GLL" => parse_gll(&parts, reference).map(NmeaSentence::Position),
        "GSA" => parse_gsa(&parts).map(NmeaSentence::Dop),
        "GSV" => parse_gsv(&parts).map(NmeaSentence::SatellitesInView),
        "VTG" => parse_vtg(&parts).map(NmeaSentence::Course),
        _ => None,
    }
}

/// Decode a line into a fix; only position sentences yield one
pub fn parse_nmea_sentence(line: &str, reference: DateTime<Utc>) -> Option<Fix> {
    match decode_sentence(line, reference)? {
        NmeaSentence::Position(fix) => Some(fix),
        _ => None,
    }
}

/// XOR of every byte between `$` and `*`
pub fn nmea_checksum(payload: &str) -> u8 {
    payload.bytes().fold(0, |acc, b| acc ^ b)
}

/// Strip the checksum suffix, returning the payload only if the checksum
/// matches. A bare `*` with no digits is tolerated.
fn verify_checksum(body: &str) -> Option<&str> {
    let Some((payload, checksum)) = body.split_once('*') else {
        return Some(body);
    };

    let checksum = checksum.trim();
    if checksum.is_empty() {
        return Some(payload);
    }

    let expected = u8::from_str_radix(checksum, 16).ok()?;
    if nmea_checksum(payload) == expected {
        Some(payload)
    } else {
        None
    }
}

/// Parse GGA (Global Positioning System Fix Data) sentence
fn parse_gga(parts: &[&str], reference: DateTime<Utc>) -> Option<Fix> {
    if parts.len() < 10 {
        return None;
    }

    let quality: u8 = field(parts, 6)?;
    if quality == 0 {
        return None;
    }

    let latitude = parse_latitude(parts[2], parts[3])?;
    let longitude = parse_longitude(parts[4], parts[5])?;
    let timestamp = parse_utc_time(parts[1])
        .map(|time| resolve_time_of_day(time, reference))
        .unwrap_or(reference);

    let mut fix = Fix::new(timestamp, latitude, longitude, SentenceKind::Gga);
    fix.fix_quality = quality;
    fix.satellites = field(parts, 7);
    fix.hdop = dop_field(parts, 8);
    fix.altitude = number(parts, 9);
    Some(fix)
}

/// Parse RMC (Recommended Minimum Course) sentence
fn parse_rmc(parts: &[&str], reference: DateTime<Utc>) -> Option<Fix> {
    if parts.len() < 10 {
        return None;
    }

    // A = active, V = void
    if parts[2] != "A" {
        return None;
    }

    let latitude = parse_latitude(parts[3], parts[4])?;
    let longitude = parse_longitude(parts[5], parts[6])?;
    let timestamp = match (parse_utc_time(parts[1]), parse_date(parts[9])) {
        (Some(time), Some(date)) => date.and_time(time).and_utc(),
        (Some(time), None) => resolve_time_of_day(time, reference),
        _ => reference,
    };

    let mut fix = Fix::new(timestamp, latitude, longitude, SentenceKind::Rmc);
    fix.speed = speed_field(parts, 7).map(|knots| knots * KNOTS_TO_KMH);
    fix.heading = heading_field(parts, 8);
    Some(fix)
}

/// Parse GLL (Geographic Position) sentence
fn parse_gll(parts: &[&str], reference: DateTime<Utc>) -> Option<Fix> {
    if parts.len() < 7 {
        return None;
    }

    if parts[6] != "A" {
        return None;
    }

    let latitude = parse_latitude(parts[1], parts[2])?;
    let longitude = parse_longitude(parts[3], parts[4])?;
    let timestamp = parse_utc_time(parts[5])
        .map(|time| resolve_time_of_day(time, reference))
        .unwrap_or(reference);

    Some(Fix::new(timestamp, latitude, longitude, SentenceKind::Gll))
}

/// Parse GSA (DOP and Active Satellites) sentence
fn parse_gsa(parts: &[&str]) -> Option<DopReport> {
    if parts.len() < 18 {
        return None;
    }

    let report = DopReport {
        fix_type: field(parts, 2).and_then(FixType::from_code),
        pdop: dop_field(parts, 15),
        hdop: dop_field(parts, 16),
        vdop: dop_field(parts, 17),
    };

    if report == DopReport::default() {
        None
    } else {
        Some(report)
    }
}

/// Parse GSV (Satellites in View) sentence; only the total is kept
fn parse_gsv(parts: &[&str]) -> Option<u8> {
    if parts.len() < 4 {
        return None;
    }
    field(parts, 3)
}

/// Parse VTG (Track Made Good and Ground Speed) sentence
fn parse_vtg(parts: &[&str]) -> Option<CourseReport> {
    if parts.len() < 9 {
        return None;
    }

    // km/h when present, knots otherwise
    let speed = speed_field(parts, 7)
        .or_else(|| speed_field(parts, 5).map(|knots| knots * KNOTS_TO_KMH));
    let report = CourseReport {
        heading: heading_field(parts, 1),
        speed,
    };

    if report == CourseReport::default() {
        None
    } else {
        Some(report)
    }
}

/// Parse an optional field, treating empty and malformed values alike
fn field<T: FromStr>(parts: &[&str], index: usize) -> Option<T> {
    parts
        .get(index)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse().ok())
}

/// Finite numbers only; `NaN` and `inf` parse as `f64` but are not data
fn number(parts: &[&str], index: usize) -> Option<f64> {
    field::<f64>(parts, index).filter(|value| value.is_finite())
}

fn speed_field(parts: &[&str], index: usize) -> Option<f64> {
    number(parts, index).filter(|speed| *speed >= 0.0)
}

/// Degrees true, [0, 360)
fn heading_field(parts: &[&str], index: usize) -> Option<f64> {
    number(parts, index).filter(|heading| (0.0..360.0).contains(heading))
}

fn dop_field(parts: &[&str], index: usize) -> Option<f64> {
    number(parts, index).filter(|dop| *dop >= 0.0)
}

/// `DDMM.MMMM` plus `N`/`S`
pub fn parse_latitude(value: &str, hemisphere: &str) -> Option<f64> {
    let sign = match hemisphere {
        "N" => 1.0,
        "S" => -1.0,
        _ => return None,
    };
    parse_degrees_minutes(value, 90.0).map(|deg| sign * deg)
}

/// `DDDMM.MMMM` plus `E`/`W`
pub fn parse_longitude(value: &str, hemisphere: &str) -> Option<f64> {
    let sign = match hemisphere {
        "E" => 1.0,
        "W" => -1.0,
        _ => return None,
    };
    parse_degrees_minutes(value, 180.0).map(|deg| sign * deg)
}

/// Convert degrees-and-decimal-minutes to decimal degrees.
///
/// The two integer digits in front of the decimal point are the minutes;
/// everything before them is whole degrees.
fn parse_degrees_minutes(value: &str, max_degrees: f64) -> Option<f64> {
    if !value.is_ascii() {
        return None;
    }

    let dot = value.find('.').unwrap_or(value.len());
    if dot < 3 {
        return None;
    }

    let (degrees, minutes) = value.split_at(dot - 2);
    if !degrees.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let degrees: f64 = degrees.parse().ok()?;
    let minutes: f64 = minutes.parse().ok()?;
    if !(0.0..60.0).contains(&minutes) {
        return None;
    }

    let decimal = degrees + minutes / 60.0;
    if decimal > max_degrees {
        None
    } else {
        Some(decimal)
    }
}

/// `hhmmss` or `hhmmss.sss`
fn parse_utc_time(value: &str) -> Option<NaiveTime> {
    if value.len() < 6 || !value.is_ascii() {
        return None;
    }

    let hours: u32 = value[0..2].parse().ok()?;
    let minutes: u32 = value[2..4].parse().ok()?;
    let seconds: f64 = value[4..].parse().ok()?;
    if !(0.0..60.0).contains(&seconds) {
        return None;
    }

    let whole = seconds.trunc() as u32;
    let nanos = (seconds.fract() * 1e9).round() as u32;
    NaiveTime::from_hms_nano_opt(hours, minutes, whole, nanos.min(999_999_999))
}

/// `ddmmyy`; two-digit years below 80 are this century
fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 6 || !value.is_ascii() {
        return None;
    }

    let day: u32 = value[0..2].parse().ok()?;
    let month: u32 = value[2..4].parse().ok()?;
    let year: i32 = value[4..6].parse().ok()?;
    let year = if year < 80 { 2000 + year } else { 1900 + year };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Attach a time of day to the reference date, moving it one day back or
/// forward when that lands more than twelve hours from the reference.
fn resolve_time_of_day(time: NaiveTime, reference: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = reference.date_naive().and_time(time).and_utc();
    let half_day = Duration::hours(12);

    if candidate - reference > half_day {
        candidate - Duration::days(1)
    } else if reference - candidate > half_day {
        candidate + Duration::days(1)
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    /// Inverse of `parse_degrees_minutes` for round-trip checks
    fn encode_degrees_minutes(decimal: f64, degree_digits: usize) -> String {
        let abs = decimal.abs();
        let degrees = abs.trunc();
        let minutes = (abs - degrees) * 60.0;
        format!("{:0width$}{:07.4}", degrees as u32, minutes, width = degree_digits)
    }

    #[test]
    fn test_gga_parsing() {
        let gga = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

        let fix = parse_nmea_sentence(gga, reference()).unwrap();

        assert!((fix.latitude - 48.1173).abs() < 1e-4);
        assert!((fix.longitude - 11.516_666).abs() < 1e-4);
        assert_eq!(fix.satellites, Some(8));
        assert_eq!(fix.hdop, Some(0.9));
        assert_eq!(fix.altitude, Some(545.4));
        assert_eq!(fix.fix_quality, 1);
        assert_eq!(fix.sentence, SentenceKind::Gga);
        assert_eq!(fix.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 12, 35, 19).unwrap());
        assert!(fix.speed.is_none());
    }

    #[test]
    fn test_rmc_parsing() {
        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

        let fix = parse_nmea_sentence(rmc, reference()).unwrap();

        // Speed should be converted from knots to km/h
        assert!((fix.speed.unwrap() - 41.4848).abs() < 1e-3);
        assert_eq!(fix.heading, Some(84.4));
        assert_eq!(fix.timestamp, Utc.with_ymd_and_hms(1994, 3, 23, 12, 35, 19).unwrap());
    }

    #[test]
    fn test_void_rmc_yields_nothing() {
        let rmc = "$GPRMC,123519,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W";
        assert!(parse_nmea_sentence(rmc, reference()).is_none());
    }

    #[test]
    fn test_quality_zero_yields_nothing() {
        let gga = "$GPGGA,123519,4807.038,N,01131.000,E,0,00,99.9,545.4,M,46.9,M,,";
        assert!(parse_nmea_sentence(gga, reference()).is_none());
    }

    #[test]
    fn test_empty_position_yields_nothing() {
        let gga = "$GPGGA,123519,,,,,1,00,,,M,,M,,";
        assert!(parse_nmea_sentence(gga, reference()).is_none());
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let gga = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48";
        assert!(parse_nmea_sentence(gga, reference()).is_none());
    }

    #[test]
    fn test_bare_checksum_marker_accepted() {
        let gga = "$GPGGA,120000,3853.046,N,07739.000,W,1,08,0.9,100.0,M,,,,*";

        let fix = parse_nmea_sentence(gga, reference()).unwrap();

        assert!((fix.latitude - 38.884_1).abs() < 1e-4);
        assert!((fix.longitude + 77.65).abs() < 1e-9);
        assert_eq!(fix.altitude, Some(100.0));
    }

    #[test]
    fn test_southern_western_hemispheres() {
        let gga = "$GNGGA,000001.50,3351.600,S,15112.600,W,2,11,0.7,12.0,M,,,,";

        let fix = parse_nmea_sentence(gga, reference()).unwrap();

        assert!((fix.latitude + 33.86).abs() < 1e-9);
        assert!((fix.longitude + 151.21).abs() < 1e-9);
        assert_eq!(fix.fix_quality, 2);
        assert_eq!(fix.timestamp.nanosecond(), 500_000_000);
    }

    #[test]
    fn test_gll_parsing() {
        let gll = "$GPGLL,4916.45,N,12311.12,W,225444,A";

        let fix = parse_nmea_sentence(gll, reference()).unwrap();

        assert!((fix.latitude - 49.274_166).abs() < 1e-5);
        assert!((fix.longitude + 123.185_333).abs() < 1e-5);
        assert_eq!(fix.sentence, SentenceKind::Gll);
    }

    #[test]
    fn test_time_after_midnight_rollover() {
        let late = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 58).unwrap();
        let gga = "$GPGGA,000002,4807.038,N,01131.000,E,1,08,0.9,545.4,M,,,,";

        let fix = parse_nmea_sentence(gga, late).unwrap();
        assert_eq!(fix.timestamp, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 2).unwrap());

        let early = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 1).unwrap();
        let gga = "$GPGGA,235959,4807.038,N,01131.000,E,1,08,0.9,545.4,M,,,,";

        let fix = parse_nmea_sentence(gga, early).unwrap();
        assert_eq!(fix.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_invalid_sentence() {
        for line in [
            "$INVALID,123,456",
            "$GPGSV,3,1,12,01,40,083,46,02,17,308,41*75",
            "$GPGGA,123519,4807.038,N",
            "GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
            "$GPGGA,123519,48é7.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
            "$GPGGA,123519,9907.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
            "$GPGGA,123519,4807.038,X,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
            "$",
            "",
        ] {
            assert!(parse_nmea_sentence(line, reference()).is_none(), "{}", line);
        }
    }

    #[test]
    fn test_degrees_minutes_round_trip() {
        for &lat in &[0.0, 1.5, 38.884_1, 48.1173, 89.999] {
            let encoded = encode_degrees_minutes(lat, 2);
            let decoded = parse_latitude(&encoded, "N").unwrap();
            assert!((decoded - lat).abs() < 1e-5, "{} -> {} -> {}", lat, encoded, decoded);
        }
        for &lon in &[0.25, 77.65, 151.21, 179.5] {
            let encoded = encode_degrees_minutes(lon, 3);
            let decoded = parse_longitude(&encoded, "W").unwrap();
            assert!((decoded + lon).abs() < 1e-5, "{} -> {} -> {}", lon, encoded, decoded);
        }
    }

    #[test]
    fn test_out_of_range_values_dropped() {
        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,-5.0,720.0,230394,003.1,W";
        let fix = parse_nmea_sentence(rmc, reference()).unwrap();
        assert_eq!(fix.speed, None);
        assert_eq!(fix.heading, None);

        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,inf,360.0,230394,003.1,W";
        let fix = parse_nmea_sentence(rmc, reference()).unwrap();
        assert_eq!(fix.speed, None);
        assert_eq!(fix.heading, None);

        let gga = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,NaN,inf,M,46.9,M,,";
        let fix = parse_nmea_sentence(gga, reference()).unwrap();
        assert_eq!(fix.hdop, None);
        assert_eq!(fix.altitude, None);

        let gga = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,-1.0,-12.5,M,46.9,M,,";
        let fix = parse_nmea_sentence(gga, reference()).unwrap();
        assert_eq!(fix.hdop, None);
        assert_eq!(fix.altitude, Some(-12.5));
    }

    #[test]
    fn test_heading_bounds() {
        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,000.0,000.0,230394,,";
        assert_eq!(parse_nmea_sentence(rmc, reference()).unwrap().heading, Some(0.0));

        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,000.0,359.9,230394,,";
        assert_eq!(parse_nmea_sentence(rmc, reference()).unwrap().heading, Some(359.9));
    }

    #[test]
    fn test_gsa_parsing() {
        let gsa = "$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39";

        let Some(NmeaSentence::Dop(report)) = decode_sentence(gsa, reference()) else {
            panic!("GSA not decoded");
        };

        assert_eq!(report.fix_type, Some(FixType::Fix3D));
        assert_eq!(report.pdop, Some(2.5));
        assert_eq!(report.hdop, Some(1.3));
        assert_eq!(report.vdop, Some(2.1));
        assert!(parse_nmea_sentence(gsa, reference()).is_none());
    }

    #[test]
    fn test_gsv_parsing() {
        let gsv = "$GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00";
        assert_eq!(decode_sentence(gsv, reference()), Some(NmeaSentence::SatellitesInView(11)));

        assert_eq!(decode_sentence("$GPGSV,3,1", reference()), None);
    }

    #[test]
    fn test_vtg_parsing() {
        let vtg = "$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K*48";
        assert_eq!(
            decode_sentence(vtg, reference()),
            Some(NmeaSentence::Course(CourseReport {
                heading: Some(54.7),
                speed: Some(10.2),
            }))
        );

        // no km/h field, fall back to knots
        let vtg = "$GPVTG,054.7,T,034.4,M,005.5,N,,K";
        let Some(NmeaSentence::Course(course)) = decode_sentence(vtg, reference()) else {
            panic!("VTG not decoded");
        };
        assert!((course.speed.unwrap() - 10.186).abs() < 1e-9);

        let vtg = "$GPVTG,NaN,T,,M,-1.0,N,-2.0,K";
        assert_eq!(decode_sentence(vtg, reference()), None);
    }

    #[test]
    fn test_checksum_value() {
        assert_eq!(
            nmea_checksum("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,"),
            0x47
        );
    }
}
