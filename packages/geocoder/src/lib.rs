#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Area resolution for lessor discovery.
//!
//! Turns a free-text place name ("Lisbon, Portugal") into the boundary
//! polygon the search grid is laid over. Only Nominatim is supported: it is
//! free, needs no key, and returns administrative boundaries as `GeoJSON`
//! when asked with `polygon_geojson=1`.

pub mod nominatim;

use geo::MultiPolygon;
use thiserror::Error;

pub use nominatim::GeoResolver;

/// A resolved target area.
#[derive(Debug, Clone)]
pub struct Area {
    /// The geocoder's canonical name for the place.
    pub display_name: String,
    /// Boundary in `(lon, lat)` coordinates.
    pub boundary: MultiPolygon<f64>,
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// The request failed after transport retries.
    #[error(transparent)]
    Api(#[from] lessor_map_api::ApiError),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// No candidate carried polygon geometry.
    #[error("No polygon boundary found for '{query}'")]
    LocationNotFound {
        /// The place name that was searched.
        query: String,
    },
}
