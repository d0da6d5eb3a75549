//! Capped-search pagination with adaptive densification.
//!
//! Tasks flow through a FIFO queue drained by up to `workers` in-flight
//! searches. When a task finishes, its outcome may enqueue more work:
//!
//! - **Densification**: a task that discovered at least
//!   `density_threshold` new listings marks its cell as dense. The cell is
//!   replaced by four half-radius children (once per cell, bounded by
//!   `max_depth` and `min_radius_km`), each planned with a full set of price
//!   bands.
//! - **Band split**: a task whose returned (or new) listings reach the API's
//!   `result_cap` was truncated; its band is halved and both halves
//!   re-queued for the same cell, recursively down to `min_band_width`.
//!
//! Follow-up tasks are only enqueued after their parent completes. A failed
//! request skips the rest of its task; coverage is best-effort.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use futures::StreamExt as _;
use futures::stream::FuturesUnordered;
use lessor_map_api::SearchApi;
use lessor_map_discovery_models::config::{DelayRange, DiscoveryConfig};
use lessor_map_discovery_models::{SearchQuery, SearchTask};
use lessor_map_grid::GridPlanner;

use crate::polite_pause;
use crate::progress::{ProgressCallback, null_progress};
use crate::session::CredentialSession;
use crate::state::SharedDiscoveryState;

/// Counters describing a discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Tasks that were executed (completed or skipped).
    pub tasks_run: usize,
    /// Tasks abandoned after a request failure.
    pub tasks_skipped: usize,
    /// Search pages fetched.
    pub pages_fetched: usize,
    /// Cells replaced by four children.
    pub cells_densified: usize,
    /// Price bands halved after hitting the result cap.
    pub bands_split: usize,
    /// Unique listings known at the end of the run.
    pub listings: usize,
    /// Unique hosts known at the end of the run.
    pub hosts: usize,
    /// Whether the `max_listings` cap ended the run early.
    pub stopped_early: bool,
}

/// Result of executing one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// The task that ran.
    pub task: SearchTask,
    /// Listings returned across all pages.
    pub returned: usize,
    /// Listings not seen before this task.
    pub new_listings: usize,
    /// Pages fetched.
    pub pages: usize,
    /// Whether a request failed before pagination finished.
    pub failed: bool,
}

/// Paginates the search API over a queue of tasks.
pub struct ListingDiscoverer {
    runner: TaskRunner,
    scheduler: Scheduler,
    workers: usize,
    max_listings: Option<usize>,
    progress: Arc<dyn ProgressCallback>,
}

impl ListingDiscoverer {
    /// Creates a discoverer writing into `state`.
    ///
    /// `planner` must be the planner that produced the initial tasks, so
    /// child cells receive unique ids.
    #[must_use]
    pub fn new(
        search: Arc<dyn SearchApi>,
        session: Arc<CredentialSession>,
        state: SharedDiscoveryState,
        planner: GridPlanner,
        config: &DiscoveryConfig,
    ) -> Self {
        Self {
            runner: TaskRunner {
                search,
                session,
                state,
                page_size: config.page_size.max(1),
                result_cap: config.result_cap as usize,
                delay: config.request_delay_ms,
            },
            scheduler: Scheduler {
                planner,
                densified: BTreeSet::new(),
                density_threshold: config.density_threshold,
                result_cap: config.result_cap as usize,
            },
            workers: config.worker_count(),
            max_listings: config.max_listings,
            progress: null_progress(),
        }
    }

    /// Reports progress to `progress` instead of discarding it.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs every task, plus the follow-ups they spawn, until the queue is
    /// empty or the `max_listings` cap is reached.
    pub async fn discover(&mut self, tasks: Vec<SearchTask>) -> DiscoveryReport {
        let runner = &self.runner;
        let scheduler = &mut self.scheduler;

        let mut report = DiscoveryReport::default();
        let mut queue: VecDeque<SearchTask> = tasks.into();
        let mut scheduled = queue.len() as u64;
        let mut in_flight = FuturesUnordered::new();

        self.progress.set_total(scheduled);
        log::info!(
            "Discovering listings: {} tasks, {} worker(s)",
            queue.len(),
            self.workers
        );

        loop {
            if let Some(cap) = self.max_listings
                && runner.state.with(|s| s.listing_count()) >= cap
            {
                log::info!("Reached listing cap of {cap}, stopping discovery");
                report.stopped_early = true;
                break;
            }

            while in_flight.len() < self.workers
                && let Some(task) = queue.pop_front()
            {
                in_flight.push(runner.run(task));
            }

            let Some(outcome) = in_flight.next().await else {
                break;
            };

            report.tasks_run += 1;
            report.pages_fetched += outcome.pages;
            self.progress.inc(1);

            if outcome.failed {
                report.tasks_skipped += 1;
                continue;
            }

            let follow_ups = scheduler.follow_ups(&outcome);
            if follow_ups.densified {
                report.cells_densified += 1;
            }
            if follow_ups.band_split {
                report.bands_split += 1;
            }
            if !follow_ups.tasks.is_empty() {
                scheduled += follow_ups.tasks.len() as u64;
                self.progress.set_total(scheduled);
                queue.extend(follow_ups.tasks);
            }

            let (listings, hosts) = runner
                .state
                .with(|s| (s.listing_count(), s.host_count()));
            self.progress
                .set_message(format!("{listings} listings, {hosts} hosts"));
        }

        drop(in_flight);

        let (listings, hosts) = runner
            .state
            .with(|s| (s.listing_count(), s.host_count()));
        report.listings = listings;
        report.hosts = hosts;

        self.progress
            .finish(format!("{listings} listings, {hosts} hosts"));
        log::info!(
            "Discovery finished: {} tasks ({} skipped), {} pages, {} cells densified, \
             {} bands split, {listings} listings, {hosts} hosts",
            report.tasks_run,
            report.tasks_skipped,
            report.pages_fetched,
            report.cells_densified,
            report.bands_split,
        );

        report
    }
}

/// Executes single tasks against the search API.
struct TaskRunner {
    search: Arc<dyn SearchApi>,
    session: Arc<CredentialSession>,
    state: SharedDiscoveryState,
    page_size: u32,
    result_cap: usize,
    delay: DelayRange,
}

impl TaskRunner {
    async fn run(&self, task: SearchTask) -> TaskOutcome {
        let label = task.label();
        let bounds = task.cell.bounding_box();
        let mut outcome = TaskOutcome {
            task,
            returned: 0,
            new_listings: 0,
            pages: 0,
            failed: false,
        };

        loop {
            polite_pause(self.delay).await;

            let query = SearchQuery {
                bounds,
                band: task.band,
                page_size: self.page_size,
                offset: u32::try_from(outcome.returned).unwrap_or(u32::MAX),
            };
            let lease = self.session.lease().await;

            let page = match self.search.search(&query, &lease.credential).await {
                Ok(page) => page,
                Err(e) => {
                    log::warn!("[{label}] search failed at offset {}, skipping: {e}", query.offset);
                    self.session.record_failure(&lease).await;
                    outcome.failed = true;
                    break;
                }
            };
            self.session.record_success().await;

            let count = page.items.len();
            outcome.pages += 1;
            outcome.returned += count;
            outcome.new_listings += self.state.with(|s| s.record_all(page.items));

            log::debug!(
                "[{label}] page {}: {count} items (returned {}, new {})",
                outcome.pages,
                outcome.returned,
                outcome.new_listings
            );

            if !page.has_more || count == 0 || outcome.returned >= self.result_cap {
                break;
            }
        }

        outcome
    }
}

/// Follow-up work produced by one task outcome.
#[derive(Debug, Default)]
struct FollowUps {
    tasks: Vec<SearchTask>,
    densified: bool,
    band_split: bool,
}

/// Decides which follow-up tasks a finished task spawns.
struct Scheduler {
    planner: GridPlanner,
    densified: BTreeSet<u32>,
    density_threshold: usize,
    result_cap: usize,
}

impl Scheduler {
    fn follow_ups(&mut self, outcome: &TaskOutcome) -> FollowUps {
        let mut follow_ups = FollowUps::default();
        let task = &outcome.task;

        if outcome.new_listings >= self.density_threshold
            && !self.densified.contains(&task.cell.id)
            && let Some(children) = self.planner.subdivide(&task.cell)
        {
            self.densified.insert(task.cell.id);
            log::info!(
                "[{}] {} new listings, densifying into 4 cells of {:.2} km",
                task.label(),
                outcome.new_listings,
                children[0].radius_km
            );
            for child in &children {
                follow_ups.tasks.extend(self.planner.tasks_for(child));
            }
            follow_ups.densified = true;
        }

        // A truncated page sequence means the band hides more listings,
        // whether or not they were new to this run.
        if (outcome.returned >= self.result_cap || outcome.new_listings >= self.result_cap)
            && let Some(halves) = self.planner.split_band(task)
        {
            log::info!(
                "[{}] hit result cap, splitting into bands {} and {}",
                task.label(),
                halves[0].band,
                halves[1].band
            );
            follow_ups.tasks.extend(halves);
            follow_ups.band_split = true;
        }

        follow_ups
    }
}
