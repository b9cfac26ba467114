// src/geofence/boundary.rs
//! Named polygon boundaries loaded from GeoJSON

use crate::error::Result;
use geo::{Contains, LineString, MultiPolygon, Point, Polygon};
use geojson::{Feature, GeoJson};
use std::path::Path;

/// Name used when a feature carries no usable name property
const DEFAULT_NAME: &str = "Geofence";

/// Property keys tried, in order, for a boundary's name
const NAME_KEYS: [&str; 3] = ["name", "NAME", "county"];

/// A named region made of one or more polygons in (longitude, latitude)
#[derive(Debug, Clone)]
pub struct GeofenceBoundary {
    name: String,
    area: MultiPolygon<f64>,
}

impl GeofenceBoundary {
    pub fn new(name: impl Into<String>, area: MultiPolygon<f64>) -> Self {
        Self {
            name: name.into(),
            area,
        }
    }

    /// Build a boundary from a single ring of (longitude, latitude) vertices.
    /// An open ring is closed implicitly.
    pub fn from_ring(name: impl Into<String>, ring: Vec<(f64, f64)>) -> Self {
        let polygon = Polygon::new(LineString::from(ring), vec![]);
        Self::new(name, MultiPolygon(vec![polygon]))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point-in-polygon test; points exactly on an edge count as outside
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        self.area.contains(&Point::new(longitude, latitude))
    }
}

/// Read every boundary from a GeoJSON file
pub fn load_boundaries(path: &Path) -> Result<Vec<GeofenceBoundary>> {
    let contents = std::fs::read_to_string(path)?;
    parse_boundaries(&contents)
}

/// Parse a FeatureCollection, a single Feature, or a bare geometry.
///
/// Features without polygon geometry are skipped with a warning.
pub fn parse_boundaries(contents: &str) -> Result<Vec<GeofenceBoundary>> {
    let geojson: GeoJson = contents.parse()?;

    let boundaries = match geojson {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(boundary_from_feature)
            .collect(),
        GeoJson::Feature(feature) => boundary_from_feature(feature).into_iter().collect(),
        GeoJson::Geometry(geometry) => to_multipolygon(geometry)
            .map(|area| GeofenceBoundary::new(DEFAULT_NAME, area))
            .into_iter()
            .collect(),
    };

    Ok(boundaries)
}

fn boundary_from_feature(feature: Feature) -> Option<GeofenceBoundary> {
    let name = NAME_KEYS
        .iter()
        .find_map(|key| feature.property(key).and_then(|value| value.as_str()))
        .unwrap_or(DEFAULT_NAME)
        .to_string();

    let Some(geometry) = feature.geometry else {
        log::warn!("Geofence feature '{}' has no geometry, skipping", name);
        return None;
    };

    match to_multipolygon(geometry) {
        Some(area) => Some(GeofenceBoundary::new(name, area)),
        None => {
            log::warn!("Geofence feature '{}' is not a polygon, skipping", name);
            None
        }
    }
}

/// Handles both `Polygon` and `MultiPolygon` geometry types
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geometry: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}
