//! Configuration value objects passed into each component's constructor.
//!
//! Both structs deserialize from TOML with every field optional; missing
//! fields take the defaults below.

use serde::{Deserialize, Serialize};

/// Tuning knobs for planning, discovery, and host resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Grid spacing and initial cell radius in kilometres.
    pub cell_radius_km: f64,
    /// Upper bound of the price axis.
    pub price_ceiling: u64,
    /// Number of equal-width price bands per cell.
    pub price_bands: u32,
    /// Bands narrower than twice this are never split further.
    pub min_band_width: u64,
    /// Search results requested per page.
    pub page_size: u32,
    /// Maximum number of results the search API returns for one query.
    pub result_cap: u32,
    /// Newly discovered listings in one task that mark its cell for
    /// densification.
    pub density_threshold: usize,
    /// Cells at this depth are never subdivided.
    pub max_depth: u8,
    /// Cells with a radius at or below this are never subdivided.
    pub min_radius_km: f64,
    /// Hosts with at least this many listings are agencies.
    pub agency_threshold: u32,
    /// Consecutive failures that trigger a credential refresh.
    pub failure_threshold: u32,
    /// Fetch attempts per host profile before the host is omitted.
    pub host_fetch_attempts: u32,
    /// Politeness delay between requests, drawn uniformly from this range.
    pub request_delay_ms: DelayRange,
    /// In-flight requests. Clamped to `1..=MAX_WORKERS`.
    pub workers: usize,
    /// Stop discovery once this many unique listings are known.
    pub max_listings: Option<usize>,
    /// Stop host resolution once this many agencies are resolved.
    pub max_agencies: Option<usize>,
}

/// Upper bound on concurrent requests against the upstream API.
pub const MAX_WORKERS: usize = 4;

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cell_radius_km: 5.0,
            price_ceiling: 1_000_000,
            price_bands: 10,
            min_band_width: 10,
            page_size: 50,
            result_cap: 300,
            density_threshold: 20,
            max_depth: 2,
            min_radius_km: 2.0,
            agency_threshold: 5,
            failure_threshold: 3,
            host_fetch_attempts: 4,
            request_delay_ms: DelayRange::default(),
            workers: 1,
            max_listings: None,
            max_agencies: None,
        }
    }
}

impl DiscoveryConfig {
    /// Effective worker count.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }
}

/// Inclusive millisecond range for randomized politeness delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    /// Minimum delay.
    pub min: u64,
    /// Maximum delay.
    pub max: u64,
}

impl DelayRange {
    /// No delay at all.
    pub const NONE: Self = Self { min: 0, max: 0 };
}

impl Default for DelayRange {
    fn default() -> Self {
        Self { min: 250, max: 500 }
    }
}

/// Endpoints and transport settings for the upstream collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// Public landing page that embeds the API key.
    pub bootstrap_url: String,
    /// Regex with one capture group matching the key literal.
    pub key_pattern: String,
    /// Listing search endpoint.
    pub search_url: String,
    /// Host profile endpoint; `{id}` is replaced with the host id.
    pub host_url: String,
    /// Public profile page; `{id}` is replaced with the host id.
    pub profile_page_url: String,
    /// Nominatim search endpoint.
    pub geocoder_url: String,
    /// Currency the price filters are expressed in.
    pub currency: String,
    /// Response locale.
    pub locale: String,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Transport-level retries for transient failures.
    pub max_retries: u32,
    /// Optional HTTP(S) proxy URL.
    pub proxy: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bootstrap_url: "https://www.airbnb.com/".to_string(),
            key_pattern: r#""api_config"\s*:\s*\{\s*"key"\s*:\s*"([A-Za-z0-9]+)""#.to_string(),
            search_url: "https://www.airbnb.com/api/v2/explore_tabs".to_string(),
            host_url: "https://www.airbnb.com/api/v2/users/{id}".to_string(),
            profile_page_url: "https://www.airbnb.com/users/show/{id}".to_string(),
            geocoder_url: "https://nominatim.openstreetmap.org/search".to_string(),
            currency: "USD".to_string(),
            locale: "en".to_string(),
            user_agent: concat!("lessor_map/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            max_retries: 3,
            proxy: None,
        }
    }
}

impl ApiConfig {
    /// Public profile page of a host.
    #[must_use]
    pub fn profile_page(&self, host_id: &str) -> String {
        self.profile_page_url.replace("{id}", host_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DiscoveryConfig::default();
        assert!((config.cell_radius_km - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.price_ceiling, 1_000_000);
        assert_eq!(config.price_bands, 10);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.agency_threshold, 5);
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.failure_threshold, 3);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: DiscoveryConfig = toml::from_str(
            "agency_threshold = 3\nrequest_delay_ms = { min = 0, max = 0 }\n",
        )
        .unwrap();
        assert_eq!(config.agency_threshold, 3);
        assert_eq!(config.request_delay_ms, DelayRange::NONE);
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<DiscoveryConfig>("pagesize = 10").is_err());
    }

    #[test]
    fn worker_count_is_clamped() {
        let mut config = DiscoveryConfig {
            workers: 0,
            ..DiscoveryConfig::default()
        };
        assert_eq!(config.worker_count(), 1);
        config.workers = 32;
        assert_eq!(config.worker_count(), MAX_WORKERS);
    }

    #[test]
    fn profile_page_substitutes_id() {
        let api = ApiConfig::default();
        assert_eq!(
            api.profile_page("42"),
            "https://www.airbnb.com/users/show/42"
        );
    }
}
