#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Clients for the rental marketplace's unofficial web API.
//!
//! The discovery core talks to three collaborators through the traits in
//! this crate:
//!
//! 1. [`CredentialSource`]: obtains the short-lived API key embedded in the
//!    public landing page ([`credential::BootstrapCredentialProvider`]).
//! 2. [`SearchApi`]: capped, paginated listing search by bounding box and
//!    price range ([`search::HttpSearchApi`]).
//! 3. [`HostProfileApi`]: host profile lookup ([`profile::HttpHostProfileApi`]).
//!
//! Every HTTP request goes through [`retry`], which retries transient
//! failures with exponential backoff before surfacing an error.

pub mod credential;
pub mod profile;
pub mod retry;
pub mod search;

use std::time::Duration;

use async_trait::async_trait;
use lessor_map_discovery_models::config::ApiConfig;
use lessor_map_discovery_models::{Credential, HostId, HostProfile, SearchPage, SearchQuery};

/// Errors from a single API request, after transport retries.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the credential.
    #[error("Credential rejected (HTTP {status})")]
    Unauthorized {
        /// Response status code.
        status: u16,
    },

    /// The server returned a non-retryable or exhausted error status.
    #[error("HTTP {status}")]
    Status {
        /// Response status code.
        status: u16,
    },

    /// The response body did not have the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },
}

/// Errors obtaining an API credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The bootstrap page could not be fetched.
    #[error("Bootstrap page unreachable: {0}")]
    Unreachable(#[source] ApiError),

    /// The bootstrap page no longer contains the key marker.
    #[error("API key marker not found at {url}")]
    MarkerNotFound {
        /// Page that was searched.
        url: String,
    },

    /// The configured key pattern is not a valid regex.
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Source of API credentials. Must be cheap enough to call again whenever
/// the current credential stops working.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Obtains a fresh credential.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if the credential cannot be obtained.
    async fn acquire(&self) -> Result<Credential, CredentialError>;
}

/// Capped listing search.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Fetches one page of search results.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails after transport retries.
    async fn search(
        &self,
        query: &SearchQuery,
        credential: &Credential,
    ) -> Result<SearchPage, ApiError>;
}

/// Host profile lookup.
#[async_trait]
pub trait HostProfileApi: Send + Sync {
    /// Fetches the profile of `host_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails after transport retries.
    async fn fetch_profile(
        &self,
        host_id: &HostId,
        credential: &Credential,
    ) -> Result<HostProfile, ApiError>;
}

/// Builds the shared HTTP client from the API configuration.
///
/// # Errors
///
/// Returns [`ApiError`] if the proxy URL is invalid or the TLS backend
/// fails to initialise.
pub fn build_client(config: &ApiConfig) -> Result<reqwest::Client, ApiError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs));

    if let Some(proxy) = &config.proxy {
        log::info!("Routing requests through proxy {proxy}");
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

/// Reads an id that the API may encode either as a number or a string.
pub(crate) fn json_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
