#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Lessor discovery core.
//!
//! Runs the planned search tasks against the marketplace search API,
//! deduplicates listings and hosts across overlapping queries, and resolves
//! each unique host into a classified [`Host`](lessor_map_discovery_models::Host)
//! record. Both phases share one [`session::CredentialSession`], which
//! transparently swaps the API key when requests keep failing.

pub mod discoverer;
pub mod hosts;
pub mod progress;
pub mod session;
pub mod state;

use std::time::Duration;

use lessor_map_api::CredentialError;
use lessor_map_discovery_models::config::DelayRange;
use rand::Rng as _;

pub use discoverer::{DiscoveryReport, ListingDiscoverer};
pub use hosts::{HostResolution, HostResolver};
pub use session::{CredentialSession, CredentialState};
pub use state::{DiscoveryState, SharedDiscoveryState};

/// Errors that abort a discovery run.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// No usable API credential could be obtained.
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Sleeps a random duration within `delay` before a request.
pub(crate) async fn polite_pause(delay: DelayRange) {
    if delay.max == 0 {
        return;
    }
    let millis = {
        let mut rng = rand::thread_rng();
        rng.gen_range(delay.min.min(delay.max)..=delay.max)
    };
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
