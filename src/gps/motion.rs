// src/gps/motion.rs
//! Speed, heading and distance derived from consecutive fixes

use super::data::Fix;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in km between two positions (Haversine)
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push `a` a hair past 1 for antipodal points
    2.0 * EARTH_RADIUS_KM * a.min(1.0).sqrt().asin()
}

/// Initial bearing in degrees [0, 360) from the first position to the second
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlon = (lon2 - lon1).to_radians();

    let x = dlon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    (x.atan2(y).to_degrees() + 360.0) % 360.0
}

/// Rolling motion context: the previous fix and the distance covered so far.
///
/// Owned by the ingestion loop and never persisted, so a restart begins
/// again from an empty state.
#[derive(Debug, Clone, Default)]
pub struct MotionState {
    previous: Option<Fix>,
    total_distance_km: f64,
}

impl MotionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<&Fix> {
        self.previous.as_ref()
    }

    pub fn total_distance_km(&self) -> f64 {
        self.total_distance_km
    }

    /// Enrich `current` with motion derived from the previous fix and retain
    /// it as the new previous.
    ///
    /// Sentence-provided speed and heading always win over derived values.
    /// When the elapsed time is zero or negative only the distance is
    /// recorded.
    pub fn update(&mut self, current: Fix) -> Fix {
        let mut enriched = current;

        let Some(previous) = self.previous.take() else {
            enriched.distance_km = Some(0.0);
            enriched.total_distance_km = Some(self.total_distance_km);
            self.previous = Some(enriched.clone());
            return enriched;
        };

        let distance = haversine_distance(
            previous.latitude,
            previous.longitude,
            enriched.latitude,
            enriched.longitude,
        );
        self.total_distance_km += distance;
        enriched.distance_km = Some(distance);
        enriched.total_distance_km = Some(self.total_distance_km);

        let elapsed = (enriched.timestamp - previous.timestamp).num_milliseconds() as f64 / 1000.0;
        if elapsed > 0.0 {
            if enriched.speed.is_none() {
                enriched.speed = Some(distance / elapsed * 3600.0);
            }

            if enriched.heading.is_none() && distance > 0.0 {
                enriched.heading = Some(initial_bearing(
                    previous.latitude,
                    previous.longitude,
                    enriched.latitude,
                    enriched.longitude,
                ));
            }

            if let (Some(alt), Some(prev_alt)) = (enriched.altitude, previous.altitude) {
                enriched.climb_rate = Some((alt - prev_alt) / elapsed);
            }
        } else {
            log::debug!(
                "Skipping motion derivation, {:.3}s elapsed since previous fix",
                elapsed
            );
        }

        self.previous = Some(enriched.clone());
        enriched
    }
}
