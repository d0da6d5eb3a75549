#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data model for lessor discovery.
//!
//! A run decomposes a target area into [`SearchCell`]s, the price axis into
//! [`PriceBand`]s, and executes one [`SearchTask`] per (cell, band) pair.
//! Every task yields [`SearchItem`]s (a listing id plus an optional embedded
//! host id); unique host ids are later resolved into [`Host`] records.
//!
//! Configuration value objects live in [`config`] and bounding-box geometry
//! in [`geometry`].

pub mod config;
pub mod geometry;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use geometry::{BoundingBox, GeoPoint};

/// Identifier of a rental listing as reported by the search API.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub String);

/// Identifier of a lessor (individual host or agency account).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            /// Returns the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(ListingId);
string_id!(HostId);

/// One bounded circular sub-area to query.
///
/// Cells produced by the planner have `depth == 0`; every subdivision halves
/// the radius and increments the depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchCell {
    /// Run-unique cell number, used for log labels and to densify a cell
    /// at most once.
    pub id: u32,
    /// Cell center (WGS84).
    pub center: GeoPoint,
    /// Search radius in kilometres.
    pub radius_km: f64,
    /// Subdivision level.
    pub depth: u8,
}

impl SearchCell {
    /// Bounding box sent to the search API for this cell.
    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::around(self.center, self.radius_km)
    }
}

/// An inclusive price sub-range `[min, max]` in the API's currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PriceBand {
    /// Lower bound.
    pub min: u64,
    /// Upper bound.
    pub max: u64,
}

impl PriceBand {
    /// Creates a band. `min` must not exceed `max`.
    #[must_use]
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Width of the band.
    #[must_use]
    pub const fn width(&self) -> u64 {
        self.max - self.min
    }

    /// Splits the band at its midpoint. The halves share the midpoint as a
    /// boundary. Returns `None` when the band is narrower than `2 * min_width`.
    #[must_use]
    pub fn halve(&self, min_width: u64) -> Option<(Self, Self)> {
        let half = self.width() / 2;
        if half == 0 || half < min_width {
            return None;
        }
        let mid = self.min + half;
        Some((Self::new(self.min, mid), Self::new(mid, self.max)))
    }
}

impl fmt::Display for PriceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Unit of work: one cell searched within one price band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchTask {
    /// Area to search.
    pub cell: SearchCell,
    /// Price filter.
    pub band: PriceBand,
}

impl SearchTask {
    /// Human-readable label for log lines.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "cell {}/{} band {}",
            self.cell.id, self.cell.depth, self.band
        )
    }
}

/// Parameters of a single search API page request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Area filter.
    pub bounds: BoundingBox,
    /// Price filter.
    pub band: PriceBand,
    /// Results per page.
    pub page_size: u32,
    /// Zero-based result offset.
    pub offset: u32,
}

/// One result item of a search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchItem {
    /// The listing.
    pub listing_id: ListingId,
    /// Owner of the listing, when the search response embeds it.
    pub host_id: Option<HostId>,
}

/// A page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPage {
    /// Items on this page.
    pub items: Vec<SearchItem>,
    /// Whether the API signals another page after this one.
    pub has_more: bool,
}

/// A discovered rental unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Listing identifier.
    pub id: ListingId,
    /// Host identifier, if it was embedded in any sighting.
    pub host_id: Option<HostId>,
}

/// Raw host profile as returned by the profile API.
#[derive(Debug, Clone, PartialEq)]
pub struct HostProfile {
    /// Display name.
    pub name: String,
    /// Total number of listings the host operates.
    pub listing_count: u32,
    /// Average rating, when the host has one.
    pub rating: Option<f64>,
    /// Profile picture URL.
    pub picture_url: Option<String>,
}

/// A fully resolved lessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Host identifier.
    pub id: HostId,
    /// Display name.
    pub name: String,
    /// Total number of listings the host operates.
    pub listing_count: u32,
    /// Average rating.
    pub rating: Option<f64>,
    /// Profile picture URL.
    pub picture_url: Option<String>,
    /// `listing_count >= agency_threshold`.
    pub is_agency: bool,
}

impl Host {
    /// Builds a host record from a fetched profile, classifying it against
    /// `agency_threshold`.
    #[must_use]
    pub fn from_profile(id: HostId, profile: HostProfile, agency_threshold: u32) -> Self {
        Self {
            id,
            is_agency: is_agency(profile.listing_count, agency_threshold),
            name: profile.name,
            listing_count: profile.listing_count,
            rating: profile.rating,
            picture_url: profile.picture_url,
        }
    }
}

/// Agency classification rule.
#[must_use]
pub const fn is_agency(listing_count: u32, agency_threshold: u32) -> bool {
    listing_count >= agency_threshold
}

/// Short-lived API access key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// The key value sent with every API request.
    pub token: String,
}

impl Credential {
    /// Wraps a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(listing_count: u32) -> HostProfile {
        HostProfile {
            name: "Ana".to_string(),
            listing_count,
            rating: Some(4.8),
            picture_url: None,
        }
    }

    #[test]
    fn agency_classification_matches_threshold() {
        for threshold in [1, 2, 5, 10] {
            for count in 0..15 {
                let host = Host::from_profile("h".into(), profile(count), threshold);
                assert_eq!(host.is_agency, count >= threshold, "count={count} t={threshold}");
            }
        }
    }

    #[test]
    fn agency_classification_boundary_is_inclusive() {
        assert!(is_agency(5, 5));
        assert!(!is_agency(4, 5));
    }

    #[test]
    fn halving_shares_midpoint() {
        let (low, high) = PriceBand::new(0, 100_000).halve(10).unwrap();
        assert_eq!(low, PriceBand::new(0, 50_000));
        assert_eq!(high, PriceBand::new(50_000, 100_000));
    }

    #[test]
    fn halving_stops_at_min_width() {
        assert!(PriceBand::new(0, 30).halve(10).is_some());
        assert!(PriceBand::new(0, 19).halve(10).is_none());
        assert!(PriceBand::new(7, 8).halve(1).is_none());
    }

    #[test]
    fn credential_debug_hides_token() {
        let debug = format!("{:?}", Credential::new("secret-key"));
        assert!(!debug.contains("secret-key"));
    }
}
