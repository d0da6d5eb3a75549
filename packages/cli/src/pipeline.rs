//! End-to-end run: credential -> geocode -> plan -> discover -> resolve ->
//! write.
//!
//! The credential is acquired first so a broken bootstrap page aborts the
//! run before any other request is sent. All marketplace collaborators sit
//! behind the `lessor_map_api` traits, so the whole flow after geocoding
//! can run against in-memory mocks.

use std::path::PathBuf;
use std::sync::Arc;

use lessor_map_api::credential::BootstrapCredentialProvider;
use lessor_map_api::profile::HttpHostProfileApi;
use lessor_map_api::retry::RetryPolicy;
use lessor_map_api::search::HttpSearchApi;
use lessor_map_api::{ApiError, CredentialError, CredentialSource, HostProfileApi, SearchApi};
use lessor_map_cli_utils::{IndicatifProgress, MultiProgress};
use lessor_map_discovery::progress::{ProgressCallback, null_progress};
use lessor_map_discovery::{
    CredentialSession, DiscoveryError, HostResolver, ListingDiscoverer, SharedDiscoveryState,
};
use lessor_map_discovery_models::SearchTask;
use lessor_map_discovery_models::config::{ApiConfig, DiscoveryConfig};
use lessor_map_geocoder::{GeoResolver, GeocodeError};
use lessor_map_grid::GridPlanner;
use lessor_map_report::{OutputError, RunSummary};

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The HTTP client could not be built.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The credential provider could not be set up.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The location could not be resolved to a polygon.
    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    /// Discovery could not start.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// An output file could not be written.
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Where to write the run's artifacts.
#[derive(Debug, Clone)]
pub struct Outputs {
    /// Host table.
    pub hosts_csv: PathBuf,
    /// Optional listing audit file.
    pub listings_json: Option<PathBuf>,
}

/// The marketplace collaborators of a run.
#[derive(Clone)]
pub struct Collaborators {
    /// Source of API keys.
    pub credentials: Arc<dyn CredentialSource>,
    /// Listing search.
    pub search: Arc<dyn SearchApi>,
    /// Host profile lookup.
    pub profiles: Arc<dyn HostProfileApi>,
}

impl Collaborators {
    /// HTTP implementations sharing one client.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the key pattern is invalid.
    pub fn http(client: &reqwest::Client, api: &ApiConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            credentials: Arc::new(BootstrapCredentialProvider::new(client.clone(), api)?),
            search: Arc::new(HttpSearchApi::new(client.clone(), api)),
            profiles: Arc::new(HttpHostProfileApi::new(client.clone(), api)),
        })
    }
}

/// Configured pipeline.
pub struct Pipeline {
    discovery: DiscoveryConfig,
    api: ApiConfig,
    collaborators: Collaborators,
    multi: Option<MultiProgress>,
}

impl Pipeline {
    /// Creates a pipeline. Progress bars are drawn on `multi` when given.
    #[must_use]
    pub const fn new(
        discovery: DiscoveryConfig,
        api: ApiConfig,
        collaborators: Collaborators,
        multi: Option<MultiProgress>,
    ) -> Self {
        Self {
            discovery,
            api,
            collaborators,
            multi,
        }
    }

    /// Resolves `location`, then discovers and resolves every host inside
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if no credential can be obtained, the
    /// location cannot be resolved, or the outputs cannot be written.
    pub async fn run(
        &self,
        geocoder: &GeoResolver,
        location: &str,
        outputs: &Outputs,
    ) -> Result<RunSummary, PipelineError> {
        let session = self.start_session().await?;

        let area = geocoder.resolve(location).await?;
        log::info!("Resolved '{location}' to {}", area.display_name);

        let mut planner = GridPlanner::new(&self.discovery);
        let tasks = planner.plan(&area.boundary);
        if tasks.is_empty() {
            log::warn!("Area '{}' produced no search cells", area.display_name);
        }

        self.run_tasks(session, &area.display_name, planner, tasks, outputs)
            .await
    }

    /// Acquires the run's initial API credential.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Discovery`] if no credential can be
    /// obtained.
    pub async fn start_session(&self) -> Result<Arc<CredentialSession>, PipelineError> {
        let session = CredentialSession::start(
            self.collaborators.credentials.clone(),
            self.discovery.failure_threshold,
        )
        .await?;
        log::info!("Acquired API credential");
        Ok(Arc::new(session))
    }

    /// Runs planned `tasks` through discovery and host resolution with
    /// `session` and writes the outputs. `planner` must be the planner that
    /// produced `tasks`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the outputs cannot be written.
    pub async fn run_tasks(
        &self,
        session: Arc<CredentialSession>,
        area_name: &str,
        planner: GridPlanner,
        tasks: Vec<SearchTask>,
        outputs: &Outputs,
    ) -> Result<RunSummary, PipelineError> {
        let state = SharedDiscoveryState::default();
        let report = ListingDiscoverer::new(
            self.collaborators.search.clone(),
            session.clone(),
            state.clone(),
            planner,
            &self.discovery,
        )
        .with_progress(self.progress(IndicatifProgress::tasks_bar, "Searching listings"))
        .discover(tasks)
        .await;

        let state = state.snapshot();
        let resolution = HostResolver::new(
            self.collaborators.profiles.clone(),
            session.clone(),
            &self.discovery,
        )
        .with_progress(self.progress(IndicatifProgress::hosts_bar, "Resolving hosts"))
        .resolve(state.host_ids())
        .await;

        lessor_map_report::write_hosts_csv(&outputs.hosts_csv, &resolution.hosts, &self.api)?;
        if let Some(path) = &outputs.listings_json {
            lessor_map_report::write_listings_json(path, &state.listings())?;
        }

        Ok(RunSummary::new(
            area_name,
            report,
            &resolution,
            session.refreshes().await,
        ))
    }

    fn progress(
        &self,
        bar: fn(&MultiProgress, &str) -> Arc<dyn ProgressCallback>,
        message: &str,
    ) -> Arc<dyn ProgressCallback> {
        self.multi
            .as_ref()
            .map_or_else(null_progress, |multi| bar(multi, message))
    }
}

/// Builds the HTTP client shared by every collaborator.
///
/// # Errors
///
/// Returns [`PipelineError::Api`] if the proxy URL is invalid or the TLS
/// backend fails to initialise.
pub fn client(api: &ApiConfig) -> Result<reqwest::Client, PipelineError> {
    Ok(lessor_map_api::build_client(api)?)
}

/// Builds the geocoder from the shared client.
#[must_use]
pub fn geocoder(client: &reqwest::Client, api: &ApiConfig) -> GeoResolver {
    GeoResolver::new(
        client.clone(),
        &api.geocoder_url,
        RetryPolicy::new(api.max_retries),
    )
}
