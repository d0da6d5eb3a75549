//! Run-wide deduplication of listings and hosts.
//!
//! Overlapping cells and adjacent price bands return the same listings
//! repeatedly. [`DiscoveryState`] keeps the first sighting of each listing
//! and every host id seen; later sightings are no-ops. The state is shared
//! between concurrent search tasks through [`SharedDiscoveryState`], whose
//! lock is never held across an `.await`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use lessor_map_discovery_models::{HostId, Listing, ListingId, SearchItem};

/// Unique listings and hosts discovered so far.
#[derive(Debug, Default, Clone)]
pub struct DiscoveryState {
    listings: BTreeMap<ListingId, Option<HostId>>,
    hosts: BTreeSet<HostId>,
}

impl DiscoveryState {
    /// Records one search item. Returns `true` if the listing was not seen
    /// before.
    ///
    /// A host id on a repeat sighting still fills in a listing first seen
    /// without one.
    pub fn record(&mut self, item: SearchItem) -> bool {
        if let Some(host_id) = &item.host_id {
            self.hosts.insert(host_id.clone());
        }

        match self.listings.get_mut(&item.listing_id) {
            Some(existing) => {
                if existing.is_none() {
                    *existing = item.host_id;
                }
                false
            }
            None => {
                self.listings.insert(item.listing_id, item.host_id);
                true
            }
        }
    }

    /// Records a batch of items, returning how many listings were new.
    pub fn record_all(&mut self, items: impl IntoIterator<Item = SearchItem>) -> usize {
        items
            .into_iter()
            .map(|item| self.record(item))
            .filter(|&new| new)
            .count()
    }

    /// Number of unique listings.
    #[must_use]
    pub fn listing_count(&self) -> usize {
        self.listings.len()
    }

    /// Number of unique hosts.
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Unique listing ids.
    #[must_use]
    pub fn listing_ids(&self) -> BTreeSet<ListingId> {
        self.listings.keys().cloned().collect()
    }

    /// Unique host ids.
    #[must_use]
    pub const fn host_ids(&self) -> &BTreeSet<HostId> {
        &self.hosts
    }

    /// All listings with their (possibly unknown) host.
    #[must_use]
    pub fn listings(&self) -> Vec<Listing> {
        self.listings
            .iter()
            .map(|(id, host_id)| Listing {
                id: id.clone(),
                host_id: host_id.clone(),
            })
            .collect()
    }
}

/// Handle to a [`DiscoveryState`] shared between tasks.
#[derive(Debug, Default, Clone)]
pub struct SharedDiscoveryState(Arc<Mutex<DiscoveryState>>);

impl SharedDiscoveryState {
    /// Wraps an existing state.
    #[must_use]
    pub fn new(state: DiscoveryState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    /// Runs `f` with exclusive access to the state.
    pub fn with<R>(&self, f: impl FnOnce(&mut DiscoveryState) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Clones the current state.
    #[must_use]
    pub fn snapshot(&self) -> DiscoveryState {
        self.with(|state| state.clone())
    }
}
