//! Flat-earth helpers for converting kilometre offsets into degrees.
//!
//! Cells are small (a few kilometres), so the usual approximation of
//! ~111.32 km per degree of latitude, and the same scaled by `cos(lat)` per
//! degree of longitude, is accurate enough for search bounding boxes.

use serde::{Deserialize, Serialize};

/// Kilometres per degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.32;

/// Smallest cosine used when scaling longitude, so boxes near the poles stay
/// finite.
const MIN_COS_LAT: f64 = 1e-6;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a point.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns the point shifted `north_km` northwards and `east_km`
    /// eastwards. Negative values move south/west.
    #[must_use]
    pub fn offset_km(self, north_km: f64, east_km: f64) -> Self {
        Self {
            lat: self.lat + north_km / KM_PER_DEGREE,
            lon: self.lon + east_km / km_per_degree_lon(self.lat),
        }
    }
}

/// Kilometres per degree of longitude at `lat`.
#[must_use]
pub fn km_per_degree_lon(lat: f64) -> f64 {
    KM_PER_DEGREE * lat.to_radians().cos().abs().max(MIN_COS_LAT)
}

/// Axis-aligned box given by its north-east and south-west corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// North-east corner.
    pub north_east: GeoPoint,
    /// South-west corner.
    pub south_west: GeoPoint,
}

impl BoundingBox {
    /// Box extending `radius_km` from `center` in every cardinal direction.
    #[must_use]
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        Self {
            north_east: center.offset_km(radius_km, radius_km),
            south_west: center.offset_km(-radius_km, -radius_km),
        }
    }

    /// Whether `point` lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&point.lat)
            && (self.south_west.lon..=self.north_east.lon).contains(&point.lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_around_equator_is_square_in_degrees() {
        let bbox = BoundingBox::around(GeoPoint::new(0.0, 10.0), KM_PER_DEGREE);
        assert!((bbox.north_east.lat - 1.0).abs() < 1e-9);
        assert!((bbox.south_west.lat + 1.0).abs() < 1e-9);
        assert!((bbox.north_east.lon - 11.0).abs() < 1e-9);
        assert!((bbox.south_west.lon - 9.0).abs() < 1e-9);
    }

    #[test]
    fn longitude_delta_widens_with_latitude() {
        let bbox = BoundingBox::around(GeoPoint::new(60.0, 0.0), 5.0);
        let lat_span = bbox.north_east.lat - bbox.south_west.lat;
        let lon_span = bbox.north_east.lon - bbox.south_west.lon;
        // cos(60°) = 0.5
        assert!((lon_span - 2.0 * lat_span).abs() < 1e-9);
    }

    #[test]
    fn box_contains_its_center() {
        let center = GeoPoint::new(48.85, 2.35);
        assert!(BoundingBox::around(center, 2.0).contains(center));
        assert!(!BoundingBox::around(center, 2.0).contains(GeoPoint::new(49.0, 2.35)));
    }

    #[test]
    fn pole_box_stays_finite() {
        let bbox = BoundingBox::around(GeoPoint::new(90.0, 0.0), 5.0);
        assert!(bbox.north_east.lon.is_finite());
    }
}
