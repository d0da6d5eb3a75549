//! Nominatim / OpenStreetMap polygon search.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use geo::{Geometry, MultiPolygon};
use lessor_map_api::retry::{self, RetryPolicy};

use crate::{Area, GeocodeError};

/// Candidates requested per query. Cities often come back behind a
/// point-only node result, so asking for one is not enough.
const CANDIDATE_LIMIT: &str = "10";

/// Resolves place names into boundary polygons.
pub struct GeoResolver {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GeoResolver {
    /// Creates a resolver against the Nominatim search endpoint at
    /// `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.to_owned(),
            retry,
        }
    }

    /// Geocodes `query` and returns the first candidate with a polygon or
    /// multi-polygon boundary.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::LocationNotFound`] if no candidate has
    /// polygon geometry, or another [`GeocodeError`] if the request fails.
    pub async fn resolve(&self, query: &str) -> Result<Area, GeocodeError> {
        log::info!("Geocoding '{query}'");

        let body = retry::send_json(&self.retry, || {
            self.client.get(&self.base_url).query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("polygon_geojson", "1"),
                ("limit", CANDIDATE_LIMIT),
            ])
        })
        .await?;

        let area = parse_response(&body)?.ok_or_else(|| GeocodeError::LocationNotFound {
            query: query.to_owned(),
        })?;

        log::info!(
            "Resolved '{query}' to {} ({} polygon(s))",
            area.display_name,
            area.boundary.0.len()
        );
        Ok(area)
    }
}

/// Picks the first polygon-bearing candidate of a Nominatim response.
fn parse_response(body: &serde_json::Value) -> Result<Option<Area>, GeocodeError> {
    let candidates = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    for candidate in candidates {
        let Some(boundary) = candidate.get("geojson").and_then(to_multipolygon) else {
            log::debug!(
                "Skipping non-polygon candidate {:?}",
                candidate["display_name"].as_str()
            );
            continue;
        };

        let display_name = candidate["display_name"]
            .as_str()
            .unwrap_or_default()
            .to_owned();
        return Ok(Some(Area {
            display_name,
            boundary,
        }));
    }

    Ok(None)
}

/// Converts a `GeoJSON` geometry object into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon`; anything else is `None`.
fn to_multipolygon(value: &serde_json::Value) -> Option<MultiPolygon<f64>> {
    let geometry = geojson::Geometry::from_json_value(value.clone()).ok()?;
    let geometry: Geometry<f64> = geometry.try_into().ok()?;
    match geometry {
        Geometry::MultiPolygon(mp) => Some(mp),
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> serde_json::Value {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
        })
    }

    #[test]
    fn skips_point_candidates() {
        let body = serde_json::json!([
            {"display_name": "Town node", "geojson": {"type": "Point", "coordinates": [0.5, 0.5]}},
            {"display_name": "Town boundary", "geojson": square()}
        ]);
        let area = parse_response(&body).unwrap().unwrap();
        assert_eq!(area.display_name, "Town boundary");
        assert_eq!(area.boundary.0.len(), 1);
    }

    #[test]
    fn accepts_multipolygons() {
        let body = serde_json::json!([{
            "display_name": "Archipelago",
            "geojson": {
                "type": "MultiPolygon",
                "coordinates": [
                    [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
                    [[[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 5.0]]]
                ]
            }
        }]);
        let area = parse_response(&body).unwrap().unwrap();
        assert_eq!(area.boundary.0.len(), 2);
    }

    #[test]
    fn no_polygon_candidate_yields_none() {
        let body = serde_json::json!([
            {"display_name": "Somewhere", "geojson": {"type": "Point", "coordinates": [1.0, 2.0]}},
            {"display_name": "No geometry"}
        ]);
        assert!(parse_response(&body).unwrap().is_none());
        assert!(parse_response(&serde_json::json!([])).unwrap().is_none());
    }

    #[test]
    fn rejects_non_array_body() {
        assert!(matches!(
            parse_response(&serde_json::json!({"error": "bad"})),
            Err(GeocodeError::Parse { .. })
        ));
    }
}
