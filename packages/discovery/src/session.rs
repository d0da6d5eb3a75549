//! Shared API credential with failure-driven refresh.
//!
//! The marketplace key expires without warning mid-run. Callers lease the
//! current credential, then report the outcome of the request they made
//! with it. After `failure_threshold` consecutive failures the session
//! fetches a fresh credential:
//!
//! ```text
//! Active --failure--> Degraded(1) --failure--> ... Degraded(threshold)
//! Degraded(threshold) --> Refreshing --> Active
//! Degraded(n) --success--> Active
//! ```
//!
//! The credential lives behind an async mutex that is held for the whole
//! refresh, so leases block while a refresh is in flight and never hand
//! out a credential already known to be stale. Failures reported against
//! an older generation than the current one are ignored, which coalesces
//! concurrent failures into a single refresh.
//!
//! The [`CredentialState`] is kept in a separate lock so that it can be
//! read while a refresh holds the credential, including `Refreshing`.

use std::sync::{Arc, PoisonError};

use lessor_map_api::CredentialSource;
use lessor_map_discovery_models::Credential;
use tokio::sync::Mutex;

use crate::DiscoveryError;

/// Health of the current credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// The last request succeeded.
    Active,
    /// This many consecutive requests failed.
    Degraded(u32),
    /// A fresh credential is being acquired.
    Refreshing,
}

/// A credential handed out for one request, tagged with its generation.
#[derive(Debug, Clone)]
pub struct Lease {
    /// The credential to send.
    pub credential: Credential,
    generation: u64,
}

struct Inner {
    credential: Credential,
    generation: u64,
    refreshes: u32,
}

/// Credential shared by every request of a run.
pub struct CredentialSession {
    source: Arc<dyn CredentialSource>,
    failure_threshold: u32,
    inner: Mutex<Inner>,
    state: std::sync::Mutex<CredentialState>,
}

impl CredentialSession {
    /// Acquires the initial credential from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Credential`] if the initial credential
    /// cannot be obtained; the run cannot proceed without one.
    pub async fn start(
        source: Arc<dyn CredentialSource>,
        failure_threshold: u32,
    ) -> Result<Self, DiscoveryError> {
        let credential = source.acquire().await?;
        Ok(Self::with_credential(source, credential, failure_threshold))
    }

    /// Creates a session around an already acquired credential.
    #[must_use]
    pub fn with_credential(
        source: Arc<dyn CredentialSource>,
        credential: Credential,
        failure_threshold: u32,
    ) -> Self {
        Self {
            source,
            failure_threshold: failure_threshold.max(1),
            inner: Mutex::new(Inner {
                credential,
                generation: 0,
                refreshes: 0,
            }),
            state: std::sync::Mutex::new(CredentialState::Active),
        }
    }

    /// Current credential. Waits while a refresh is in flight.
    pub async fn lease(&self) -> Lease {
        let inner = self.inner.lock().await;
        Lease {
            credential: inner.credential.clone(),
            generation: inner.generation,
        }
    }

    /// Current state. Does not wait for an in-flight refresh.
    #[must_use]
    pub fn state(&self) -> CredentialState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: CredentialState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Number of successful refreshes so far.
    pub async fn refreshes(&self) -> u32 {
        self.inner.lock().await.refreshes
    }

    /// Reports a successful request. Resets the failure counter.
    pub async fn record_success(&self) {
        let _inner = self.inner.lock().await;
        let state = self.state();
        if state != CredentialState::Active {
            log::debug!("Credential healthy again after {state:?}");
            self.set_state(CredentialState::Active);
        }
    }

    /// Reports a failed request made with `lease`.
    ///
    /// Returns `true` when a newer credential than the one in `lease` is now
    /// available, either because this call refreshed it or because another
    /// caller already had.
    pub async fn record_failure(&self, lease: &Lease) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.generation != lease.generation {
            return true;
        }

        let failures = match self.state() {
            CredentialState::Degraded(n) => n + 1,
            CredentialState::Active | CredentialState::Refreshing => 1,
        };

        if failures < self.failure_threshold {
            self.set_state(CredentialState::Degraded(failures));
            return false;
        }

        log::warn!("{failures} consecutive failures, refreshing API credential");
        self.set_state(CredentialState::Refreshing);

        let refreshed = match self.source.acquire().await {
            Ok(credential) => {
                inner.credential = credential;
                inner.generation += 1;
                inner.refreshes += 1;
                log::info!("API credential refreshed ({} so far)", inner.refreshes);
                true
            }
            Err(e) => {
                log::warn!("Credential refresh failed, keeping current key: {e}");
                false
            }
        };
        self.set_state(CredentialState::Active);
        refreshed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use lessor_map_api::CredentialError;

    use super::*;

    /// Hands out `key-1`, `key-2`, ... and counts calls.
    #[derive(Default)]
    pub struct CountingSource {
        pub calls: AtomicU32,
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn acquire(&self) -> Result<Credential, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Credential::new(format!("key-{n}")))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl CredentialSource for FailingSource {
        async fn acquire(&self) -> Result<Credential, CredentialError> {
            Err(CredentialError::MarkerNotFound {
                url: "https://example.test/".to_string(),
            })
        }
    }

    pub fn session(source: &Arc<CountingSource>, threshold: u32) -> CredentialSession {
        CredentialSession::with_credential(source.clone(), Credential::new("key-0"), threshold)
    }

    #[tokio::test]
    async fn degrades_then_refreshes_at_threshold() {
        let source = Arc::new(CountingSource::default());
        let session = session(&source, 3);

        let lease = session.lease().await;
        assert!(!session.record_failure(&lease).await);
        assert_eq!(session.state(), CredentialState::Degraded(1));
        assert!(!session.record_failure(&lease).await);
        assert_eq!(session.state(), CredentialState::Degraded(2));
        assert!(session.record_failure(&lease).await);
        assert_eq!(session.state(), CredentialState::Active);

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.refreshes().await, 1);
        assert_eq!(session.lease().await.credential, Credential::new("key-1"));
    }

    #[tokio::test]
    async fn success_resets_counter() {
        let source = Arc::new(CountingSource::default());
        let session = session(&source, 3);

        let lease = session.lease().await;
        session.record_failure(&lease).await;
        session.record_failure(&lease).await;
        session.record_success().await;
        assert_eq!(session.state(), CredentialState::Active);
        session.record_failure(&lease).await;
        assert_eq!(session.state(), CredentialState::Degraded(1));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_failures_coalesce_into_one_refresh() {
        let source = Arc::new(CountingSource::default());
        let session = session(&source, 1);

        // Four in-flight requests all leased the same credential.
        let leases = [
            session.lease().await,
            session.lease().await,
            session.lease().await,
            session.lease().await,
        ];
        for lease in &leases {
            assert!(session.record_failure(lease).await);
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), CredentialState::Active);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_running() {
        let session =
            CredentialSession::with_credential(Arc::new(FailingSource), Credential::new("k"), 2);
        let lease = session.lease().await;
        session.record_failure(&lease).await;
        assert!(!session.record_failure(&lease).await);
        assert_eq!(session.state(), CredentialState::Active);
        assert_eq!(session.refreshes().await, 0);
        assert_eq!(session.lease().await.credential, Credential::new("k"));
    }

    #[tokio::test]
    async fn start_acquires_initial_credential() {
        let source = Arc::new(CountingSource::default());
        let session = CredentialSession::start(source.clone(), 3).await.unwrap();
        assert_eq!(session.lease().await.credential, Credential::new("key-1"));
        assert_eq!(session.refreshes().await, 0);
    }
    /// Blocks `acquire` until `gate` is notified.
    #[derive(Default)]
    struct GatedSource {
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl CredentialSource for GatedSource {
        async fn acquire(&self) -> Result<Credential, CredentialError> {
            self.gate.notified().await;
            Ok(Credential::new("fresh"))
        }
    }

    #[tokio::test]
    async fn refresh_in_flight_is_observable() {
        let source = Arc::new(GatedSource::default());
        let session = CredentialSession::with_credential(source.clone(), Credential::new("old"), 1);
        let lease = session.lease().await;

        let (refreshed, ()) = tokio::join!(session.record_failure(&lease), async {
            while session.state() != CredentialState::Refreshing {
                tokio::task::yield_now().await;
            }
            source.gate.notify_one();
        });

        assert!(refreshed);
        assert_eq!(session.state(), CredentialState::Active);
        assert_eq!(session.lease().await.credential, Credential::new("fresh"));
    }
}
