//! API key extraction from the marketplace's public landing page.
//!
//! The web frontend ships its API key inline in a bootstrap JSON blob. The
//! key rotates without notice, so callers re-run [`CredentialSource::acquire`]
//! whenever requests start failing.

use async_trait::async_trait;
use lessor_map_discovery_models::Credential;
use lessor_map_discovery_models::config::ApiConfig;
use regex::Regex;

use crate::retry::{self, RetryPolicy};
use crate::{CredentialError, CredentialSource};

/// Fetches the landing page and extracts the embedded API key.
pub struct BootstrapCredentialProvider {
    client: reqwest::Client,
    url: String,
    pattern: Regex,
    retry: RetryPolicy,
}

impl BootstrapCredentialProvider {
    /// Creates a provider for the bootstrap page and key pattern in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidPattern`] if the key pattern does
    /// not compile.
    pub fn new(client: reqwest::Client, config: &ApiConfig) -> Result<Self, CredentialError> {
        Ok(Self {
            client,
            url: config.bootstrap_url.clone(),
            pattern: Regex::new(&config.key_pattern)?,
            retry: RetryPolicy::new(config.max_retries),
        })
    }
}

#[async_trait]
impl CredentialSource for BootstrapCredentialProvider {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        log::debug!("Fetching API key from {}", self.url);

        let body = retry::send_text(&self.retry, || self.client.get(&self.url))
            .await
            .map_err(CredentialError::Unreachable)?;

        let key = extract_key(&self.pattern, &body).ok_or_else(|| {
            CredentialError::MarkerNotFound {
                url: self.url.clone(),
            }
        })?;

        log::info!("Acquired API key ({} chars)", key.len());
        Ok(Credential::new(key))
    }
}

/// Returns the first capture group of `pattern` in `body`, or the whole
/// match when the pattern has no groups.
#[must_use]
pub fn extract_key(pattern: &Regex, body: &str) -> Option<String> {
    let captures = pattern.captures(body)?;
    captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str().to_owned())
        .filter(|key| !key.is_empty())
}
