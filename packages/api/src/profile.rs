//! Host profile lookup.

use async_trait::async_trait;
use lessor_map_discovery_models::config::ApiConfig;
use lessor_map_discovery_models::{Credential, HostId, HostProfile};

use crate::retry::{self, RetryPolicy};
use crate::{ApiError, HostProfileApi};

/// Profile client for the users endpoint.
pub struct HttpHostProfileApi {
    client: reqwest::Client,
    url_template: String,
    locale: String,
    retry: RetryPolicy,
}

impl HttpHostProfileApi {
    /// Creates a profile client from the endpoint settings in `config`.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &ApiConfig) -> Self {
        Self {
            client,
            url_template: config.host_url.clone(),
            locale: config.locale.clone(),
            retry: RetryPolicy::new(config.max_retries),
        }
    }
}

#[async_trait]
impl HostProfileApi for HttpHostProfileApi {
    async fn fetch_profile(
        &self,
        host_id: &HostId,
        credential: &Credential,
    ) -> Result<HostProfile, ApiError> {
        let url = self.url_template.replace("{id}", host_id.as_str());
        let body = retry::send_json(&self.retry, || {
            self.client.get(&url).query(&[
                ("key", credential.token.as_str()),
                ("locale", self.locale.as_str()),
                ("_format", "v1_legacy_show"),
            ])
        })
        .await?;
        parse_host_profile(&body)
    }
}

/// Parses a users response into a [`HostProfile`].
///
/// # Errors
///
/// Returns [`ApiError::Parse`] if the response has no `user` object or the
/// user has no listing count.
pub fn parse_host_profile(body: &serde_json::Value) -> Result<HostProfile, ApiError> {
    let user = body
        .get("user")
        .filter(|u| u.is_object())
        .ok_or_else(|| ApiError::Parse {
            message: "profile response has no user object".to_string(),
        })?;

    let name = ["smart_name", "first_name"]
        .iter()
        .find_map(|key| user[*key].as_str().filter(|s| !s.is_empty()))
        .unwrap_or_default()
        .to_owned();

    let listing_count = ["listings_count", "total_listings_count"]
        .iter()
        .find_map(|key| user[*key].as_u64())
        .ok_or_else(|| ApiError::Parse {
            message: "profile has no listings_count".to_string(),
        })?;

    let rating = ["overall_rating", "guest_rating"]
        .iter()
        .find_map(|key| user[*key].as_f64());

    let picture_url = user["picture_url"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(HostProfile {
        name,
        listing_count: u32::try_from(listing_count).unwrap_or(u32::MAX),
        rating,
        picture_url,
    })
}
