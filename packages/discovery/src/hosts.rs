//! Host profile resolution.
//!
//! Every unique host id is fetched, classified against the agency
//! threshold, and collected. A host is attempted up to
//! `host_fetch_attempts` times; each failure counts towards the shared
//! session's refresh threshold, so an expired key is replaced mid-run and
//! the retry goes out with the fresh one. Hosts that still fail are
//! omitted from the result.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::StreamExt as _;
use futures::stream;
use lessor_map_api::HostProfileApi;
use lessor_map_discovery_models::config::{DelayRange, DiscoveryConfig};
use lessor_map_discovery_models::{Host, HostId};

use crate::polite_pause;
use crate::progress::{ProgressCallback, null_progress};
use crate::session::CredentialSession;

/// Outcome of resolving a set of host ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostResolution {
    /// Resolved hosts, in host id order.
    pub hosts: Vec<Host>,
    /// Hosts whose profile could not be fetched.
    pub omitted: Vec<HostId>,
    /// Whether the `max_agencies` cap ended resolution early.
    pub stopped_early: bool,
}

impl HostResolution {
    /// Number of resolved agencies.
    #[must_use]
    pub fn agency_count(&self) -> usize {
        self.hosts.iter().filter(|h| h.is_agency).count()
    }
}

/// Fetches and classifies host profiles.
pub struct HostResolver {
    profiles: Arc<dyn HostProfileApi>,
    session: Arc<CredentialSession>,
    agency_threshold: u32,
    attempts: u32,
    delay: DelayRange,
    workers: usize,
    max_agencies: Option<usize>,
    progress: Arc<dyn ProgressCallback>,
}

impl HostResolver {
    /// Creates a resolver sharing `session` with the discovery phase.
    #[must_use]
    pub fn new(
        profiles: Arc<dyn HostProfileApi>,
        session: Arc<CredentialSession>,
        config: &DiscoveryConfig,
    ) -> Self {
        Self {
            profiles,
            session,
            agency_threshold: config.agency_threshold,
            attempts: config.host_fetch_attempts.max(1),
            delay: config.request_delay_ms,
            workers: config.worker_count(),
            max_agencies: config.max_agencies,
            progress: null_progress(),
        }
    }

    /// Reports progress to `progress` instead of discarding it.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Resolves every id in `host_ids`.
    pub async fn resolve(&self, host_ids: &BTreeSet<HostId>) -> HostResolution {
        let mut resolution = HostResolution::default();
        let mut agencies = 0;

        self.progress.set_total(host_ids.len() as u64);
        log::info!(
            "Resolving {} hosts, {} worker(s)",
            host_ids.len(),
            self.workers
        );

        let mut results = stream::iter(host_ids)
            .map(|id| self.resolve_one(id))
            .buffered(self.workers);

        while let Some((id, host)) = results.next().await {
            self.progress.inc(1);

            let Some(host) = host else {
                resolution.omitted.push(id);
                continue;
            };

            if host.is_agency {
                agencies += 1;
            }
            log::debug!(
                "Host {} ({}): {} listings{}",
                host.id,
                host.name,
                host.listing_count,
                if host.is_agency { ", agency" } else { "" }
            );
            resolution.hosts.push(host);
            self.progress.set_message(format!(
                "{} hosts, {agencies} agencies",
                resolution.hosts.len()
            ));

            if let Some(cap) = self.max_agencies
                && agencies >= cap
            {
                log::info!("Reached agency cap of {cap}, stopping host resolution");
                resolution.stopped_early = true;
                break;
            }
        }

        self.progress.finish(format!(
            "{} hosts, {agencies} agencies",
            resolution.hosts.len()
        ));
        log::info!(
            "Host resolution finished: {} resolved ({agencies} agencies), {} omitted",
            resolution.hosts.len(),
            resolution.omitted.len()
        );

        resolution
    }

    async fn resolve_one(&self, id: &HostId) -> (HostId, Option<Host>) {
        for attempt in 1..=self.attempts {
            polite_pause(self.delay).await;
            let lease = self.session.lease().await;

            match self.profiles.fetch_profile(id, &lease.credential).await {
                Ok(profile) => {
                    self.session.record_success().await;
                    let host = Host::from_profile(id.clone(), profile, self.agency_threshold);
                    return (id.clone(), Some(host));
                }
                Err(e) => {
                    log::warn!(
                        "[host {id}] profile fetch failed (attempt {attempt}/{}): {e}",
                        self.attempts
                    );
                    self.session.record_failure(&lease).await;
                }
            }
        }

        log::warn!("[host {id}] omitted after {} attempts", self.attempts);
        (id.clone(), None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use lessor_map_api::ApiError;
    use lessor_map_discovery_models::{Credential, HostProfile};

    use super::*;
    use crate::session::tests::{CountingSource, session};

    fn config() -> DiscoveryConfig {
        DiscoveryConfig {
            request_delay_ms: DelayRange::NONE,
            ..DiscoveryConfig::default()
        }
    }

    fn profile(name: &str, listing_count: u32) -> HostProfile {
        HostProfile {
            name: name.to_string(),
            listing_count,
            rating: Some(4.5),
            picture_url: None,
        }
    }

    /// Serves registered profiles. The first `fail_first` calls fail with
    /// 401, and unknown hosts always fail.
    #[derive(Default)]
    struct MockProfiles {
        profiles: BTreeMap<HostId, HostProfile>,
        fail_first: u32,
        calls: AtomicU32,
        tokens: Mutex<Vec<String>>,
    }

    impl MockProfiles {
        fn with(hosts: &[(&str, u32)]) -> Self {
            Self {
                profiles: hosts
                    .iter()
                    .map(|(id, count)| (HostId::from(*id), profile(id, *count)))
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl HostProfileApi for MockProfiles {
        async fn fetch_profile(
            &self,
            host_id: &HostId,
            credential: &Credential,
        ) -> Result<HostProfile, ApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.tokens.lock().unwrap().push(credential.token.clone());
            if call <= self.fail_first {
                return Err(ApiError::Unauthorized { status: 401 });
            }
            self.profiles
                .get(host_id)
                .cloned()
                .ok_or(ApiError::Status { status: 404 })
        }
    }

    fn ids(ids: &[&str]) -> BTreeSet<HostId> {
        ids.iter().map(|id| HostId::from(*id)).collect()
    }

    fn resolver(
        profiles: &Arc<MockProfiles>,
        source: &Arc<CountingSource>,
        config: &DiscoveryConfig,
    ) -> (HostResolver, Arc<CredentialSession>) {
        let session = Arc::new(session(source, config.failure_threshold));
        let resolver = HostResolver::new(profiles.clone(), session.clone(), config);
        (resolver, session)
    }

    #[tokio::test]
    async fn classifies_hosts_against_threshold() {
        let profiles = Arc::new(MockProfiles::with(&[("H1", 6), ("H2", 2), ("H3", 5)]));
        let source = Arc::new(CountingSource::default());
        let (resolver, _) = resolver(&profiles, &source, &config());

        let resolution = resolver.resolve(&ids(&["H1", "H2", "H3"])).await;
        let flags: Vec<(&str, bool)> = resolution
            .hosts
            .iter()
            .map(|h| (h.id.as_str(), h.is_agency))
            .collect();
        assert_eq!(flags, vec![("H1", true), ("H2", false), ("H3", true)]);
        assert_eq!(resolution.agency_count(), 2);
        assert!(resolution.omitted.is_empty());
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_once() {
        let profiles = Arc::new(MockProfiles {
            fail_first: 3,
            ..MockProfiles::with(&[("H1", 6), ("H2", 1)])
        });
        let source = Arc::new(CountingSource::default());
        let (resolver, session) = resolver(&profiles, &source, &config());

        let resolution = resolver.resolve(&ids(&["H1", "H2"])).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.refreshes().await, 1);
        assert_eq!(resolution.hosts.len(), 2);
        assert!(resolution.omitted.is_empty());

        let tokens = profiles.tokens.lock().unwrap().clone();
        assert_eq!(tokens, vec!["key-0", "key-0", "key-0", "key-1", "key-1"]);
    }

    #[tokio::test]
    async fn unreachable_host_is_omitted() {
        let profiles = Arc::new(MockProfiles::with(&[("H1", 6)]));
        let source = Arc::new(CountingSource::default());
        let (resolver, _) = resolver(&profiles, &source, &config());

        let resolution = resolver.resolve(&ids(&["H1", "H404"])).await;
        assert_eq!(resolution.hosts.len(), 1);
        assert_eq!(resolution.omitted, vec![HostId::from("H404")]);
        assert_eq!(profiles.calls.load(Ordering::SeqCst), 1 + 4);
    }

    #[tokio::test]
    async fn agency_cap_stops_early() {
        let profiles = Arc::new(MockProfiles::with(&[("H1", 9), ("H2", 1), ("H3", 9)]));
        let source = Arc::new(CountingSource::default());
        let config = DiscoveryConfig {
            max_agencies: Some(1),
            ..config()
        };
        let (resolver, _) = resolver(&profiles, &source, &config);

        let resolution = resolver.resolve(&ids(&["H1", "H2", "H3"])).await;
        assert!(resolution.stopped_early);
        assert_eq!(resolution.hosts.len(), 1);
        assert_eq!(resolution.hosts[0].id, HostId::from("H1"));
    }

    #[tokio::test]
    async fn empty_input_resolves_nothing() {
        let profiles = Arc::new(MockProfiles::default());
        let source = Arc::new(CountingSource::default());
        let (resolver, _) = resolver(&profiles, &source, &config());

        let resolution = resolver.resolve(&BTreeSet::new()).await;
        assert_eq!(resolution, HostResolution::default());
        assert_eq!(profiles.calls.load(Ordering::SeqCst), 0);
    }
}
