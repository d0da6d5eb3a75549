//! Bounding-box listing search.
//!
//! The explore endpoint returns listings grouped into sections:
//!
//! ```text
//! explore_tabs[0].sections[].listings[].listing.{id, user.id | primary_host.id}
//! explore_tabs[0].pagination_metadata.has_next_page
//! ```
//!
//! Host ids are embedded in most responses, which saves a per-listing
//! detail lookup. Items without a host id are still reported so the
//! listing is counted.

use async_trait::async_trait;
use lessor_map_discovery_models::config::ApiConfig;
use lessor_map_discovery_models::{Credential, HostId, SearchItem, SearchPage, SearchQuery};

use crate::retry::{self, RetryPolicy};
use crate::{ApiError, SearchApi, json_id};

/// Search client for the explore endpoint.
pub struct HttpSearchApi {
    client: reqwest::Client,
    url: String,
    currency: String,
    locale: String,
    retry: RetryPolicy,
}

impl HttpSearchApi {
    /// Creates a search client from the endpoint settings in `config`.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &ApiConfig) -> Self {
        Self {
            client,
            url: config.search_url.clone(),
            currency: config.currency.clone(),
            locale: config.locale.clone(),
            retry: RetryPolicy::new(config.max_retries),
        }
    }

    fn query_params(&self, query: &SearchQuery, credential: &Credential) -> Vec<(&'static str, String)> {
        let bounds = &query.bounds;
        vec![
            ("key", credential.token.clone()),
            ("currency", self.currency.clone()),
            ("locale", self.locale.clone()),
            ("_format", "for_explore_search_web".to_owned()),
            ("search_by_map", "true".to_owned()),
            ("ne_lat", bounds.north_east.lat.to_string()),
            ("ne_lng", bounds.north_east.lon.to_string()),
            ("sw_lat", bounds.south_west.lat.to_string()),
            ("sw_lng", bounds.south_west.lon.to_string()),
            ("price_min", query.band.min.to_string()),
            ("price_max", query.band.max.to_string()),
            ("items_per_grid", query.page_size.to_string()),
            ("items_offset", query.offset.to_string()),
        ]
    }
}

#[async_trait]
impl SearchApi for HttpSearchApi {
    async fn search(
        &self,
        query: &SearchQuery,
        credential: &Credential,
    ) -> Result<SearchPage, ApiError> {
        let params = self.query_params(query, credential);
        let body = retry::send_json(&self.retry, || self.client.get(&self.url).query(&params)).await?;
        parse_search_page(&body)
    }
}

/// Parses an explore response into a [`SearchPage`].
///
/// # Errors
///
/// Returns [`ApiError::Parse`] if the response has no `explore_tabs`
/// array, which usually means the API answered with an error object.
pub fn parse_search_page(body: &serde_json::Value) -> Result<SearchPage, ApiError> {
    if let Some(message) = body.get("error_message").and_then(serde_json::Value::as_str) {
        return Err(ApiError::Parse {
            message: format!("search API error: {message}"),
        });
    }

    let tabs = body["explore_tabs"]
        .as_array()
        .ok_or_else(|| ApiError::Parse {
            message: "search response has no explore_tabs array".to_string(),
        })?;

    let Some(tab) = tabs.first() else {
        return Ok(SearchPage::default());
    };

    let items = tab["sections"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|section| section["listings"].as_array())
        .flatten()
        .filter_map(parse_item)
        .collect();

    let has_more = tab["pagination_metadata"]["has_next_page"]
        .as_bool()
        .unwrap_or(false);

    Ok(SearchPage { items, has_more })
}

fn parse_item(entry: &serde_json::Value) -> Option<SearchItem> {
    let listing = &entry["listing"];
    let Some(listing_id) = json_id(&listing["id"]) else {
        log::debug!("Skipping search item without listing id");
        return None;
    };

    let host_id = json_id(&listing["user"]["id"])
        .or_else(|| json_id(&listing["primary_host"]["id"]))
        .map(HostId);

    Some(SearchItem {
        listing_id: listing_id.into(),
        host_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessor_map_discovery_models::{BoundingBox, GeoPoint, PriceBand};

    #[test]
    fn parses_listings_across_sections() {
        let body = serde_json::json!({
            "explore_tabs": [{
                "sections": [
                    {"listings": [
                        {"listing": {"id": 11, "user": {"id": 100}}},
                        {"listing": {"id": "12", "primary_host": {"id": "101"}}}
                    ]},
                    {"result_type": "experiences"},
                    {"listings": [{"listing": {"id": 13}}]}
                ],
                "pagination_metadata": {"has_next_page": true, "items_offset": 50}
            }]
        });

        let page = parse_search_page(&body).unwrap();
        assert!(page.has_more);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.items[0].listing_id.as_str(), "11");
        assert_eq!(page.items[0].host_id.as_ref().map(HostId::as_str), Some("100"));
        assert_eq!(page.items[1].host_id.as_ref().map(HostId::as_str), Some("101"));
        assert_eq!(page.items[2].host_id, None);
    }

    #[test]
    fn missing_pagination_means_last_page() {
        let body = serde_json::json!({"explore_tabs": [{"sections": []}]});
        let page = parse_search_page(&body).unwrap();
        assert!(!page.has_more);
        assert!(page.items.is_empty());
    }

    #[test]
    fn items_without_id_are_skipped() {
        let body = serde_json::json!({
            "explore_tabs": [{"sections": [{"listings": [{"listing": {"name": "x"}}]}]}]
        });
        assert!(parse_search_page(&body).unwrap().items.is_empty());
    }

    #[test]
    fn error_object_is_a_parse_error() {
        let body = serde_json::json!({"error_code": 401, "error_message": "Invalid API key"});
        assert!(matches!(parse_search_page(&body), Err(ApiError::Parse { .. })));
        assert!(parse_search_page(&serde_json::json!({})).is_err());
    }

    #[test]
    fn query_params_carry_bounds_and_band() {
        let api = HttpSearchApi::new(reqwest::Client::new(), &ApiConfig::default());
        let query = SearchQuery {
            bounds: BoundingBox {
                north_east: GeoPoint::new(1.5, 2.5),
                south_west: GeoPoint::new(1.0, 2.0),
            },
            band: PriceBand::new(100, 200),
            page_size: 50,
            offset: 100,
        };
        let params = api.query_params(&query, &Credential::new("k"));
        let get = |name: &str| {
            params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.as_str())
        };
        assert_eq!(get("key"), Some("k"));
        assert_eq!(get("ne_lat"), Some("1.5"));
        assert_eq!(get("sw_lng"), Some("2"));
        assert_eq!(get("price_min"), Some("100"));
        assert_eq!(get("price_max"), Some("200"));
        assert_eq!(get("items_offset"), Some("100"));
    }
}
