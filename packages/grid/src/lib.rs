#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Search-space decomposition.
//!
//! The search API truncates every query at a fixed number of results, so an
//! area is covered by many small queries along two independent axes:
//!
//! - **Geography**: a point grid over the polygon's bounding box, masked by
//!   the polygon, each point becoming a circular [`SearchCell`]. Dense cells
//!   can later be [`subdivided`](GridPlanner::subdivide) into four children.
//! - **Price**: `[0, ceiling]` cut into equal-width [`PriceBand`]s. Bands
//!   that still hit the result cap can be [`split`](GridPlanner::split_band).

use geo::{Area as _, BoundingRect as _, Contains as _, InteriorPoint as _, MultiPolygon, Point};
use lessor_map_discovery_models::config::DiscoveryConfig;
use lessor_map_discovery_models::geometry::{KM_PER_DEGREE, km_per_degree_lon};
use lessor_map_discovery_models::{GeoPoint, PriceBand, SearchCell, SearchTask};

/// Plans search tasks and hands out run-unique cell ids.
#[derive(Debug, Clone)]
pub struct GridPlanner {
    spacing_km: f64,
    price_ceiling: u64,
    price_band_count: u32,
    min_band_width: u64,
    max_depth: u8,
    min_radius_km: f64,
    next_cell_id: u32,
}

impl GridPlanner {
    /// Creates a planner from the grid and price settings in `config`.
    #[must_use]
    pub const fn new(config: &DiscoveryConfig) -> Self {
        Self {
            spacing_km: config.cell_radius_km,
            price_ceiling: config.price_ceiling,
            price_band_count: config.price_bands,
            min_band_width: config.min_band_width,
            max_depth: config.max_depth,
            min_radius_km: config.min_radius_km,
            next_cell_id: 0,
        }
    }

    /// Emits one task per (cell, band) pair covering `polygon`.
    pub fn plan(&mut self, polygon: &MultiPolygon<f64>) -> Vec<SearchTask> {
        let cells = self.cells(polygon);
        let tasks: Vec<SearchTask> = cells.iter().flat_map(|cell| self.tasks_for(cell)).collect();
        log::info!(
            "Planned {} cells x {} price bands = {} search tasks",
            cells.len(),
            self.price_bands().len(),
            tasks.len()
        );
        tasks
    }

    /// Lays a grid over the bounding box of `polygon` and keeps the points
    /// inside it. Cells have `radius = spacing` and `depth = 0`.
    ///
    /// A polygon with positive area too small to catch any grid point gets a
    /// single cell at an interior point; a zero-area polygon gets none.
    pub fn cells(&mut self, polygon: &MultiPolygon<f64>) -> Vec<SearchCell> {
        let Some(rect) = polygon.bounding_rect() else {
            return Vec::new();
        };

        let lat_step = self.spacing_km / KM_PER_DEGREE;
        let (min_lat, max_lat) = (rect.min().y, rect.max().y);
        let (min_lon, max_lon) = (rect.min().x, rect.max().x);

        let mut centers = Vec::new();
        for lat in steps(min_lat, max_lat, lat_step) {
            let lon_step = self.spacing_km / km_per_degree_lon(lat);
            for lon in steps(min_lon, max_lon, lon_step) {
                if polygon.contains(&Point::new(lon, lat)) {
                    centers.push(GeoPoint::new(lat, lon));
                }
            }
        }

        if centers.is_empty()
            && polygon.unsigned_area() > 0.0
            && let Some(point) = polygon.interior_point()
        {
            log::debug!("Area smaller than grid spacing, using interior point");
            centers.push(GeoPoint::new(point.y(), point.x()));
        }

        centers
            .into_iter()
            .map(|center| self.new_cell(center, self.spacing_km, 0))
            .collect()
    }

    /// Equal-width bands covering `[0, price_ceiling]`.
    #[must_use]
    pub fn price_bands(&self) -> Vec<PriceBand> {
        price_bands(self.price_ceiling, self.price_band_count)
    }

    /// One task per price band for `cell`.
    #[must_use]
    pub fn tasks_for(&self, cell: &SearchCell) -> Vec<SearchTask> {
        self.price_bands()
            .into_iter()
            .map(|band| SearchTask { cell: *cell, band })
            .collect()
    }

    /// Whether `cell` may still be subdivided.
    #[must_use]
    pub fn can_subdivide(&self, cell: &SearchCell) -> bool {
        cell.depth < self.max_depth && cell.radius_km > self.min_radius_km
    }

    /// Replaces `cell` with four children at half the radius and one level
    /// deeper, centered on the diagonals of the parent. Returns `None` once
    /// the maximum depth or minimum radius is reached.
    pub fn subdivide(&mut self, cell: &SearchCell) -> Option<[SearchCell; 4]> {
        if !self.can_subdivide(cell) {
            return None;
        }
        let radius = cell.radius_km / 2.0;
        let depth = cell.depth + 1;
        Some([(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)].map(|(north, east)| {
            let center = cell.center.offset_km(north * radius, east * radius);
            self.new_cell(center, radius, depth)
        }))
    }

    /// Splits the band of a capped task into two halves over the same cell.
    #[must_use]
    pub fn split_band(&self, task: &SearchTask) -> Option<[SearchTask; 2]> {
        let (low, high) = task.band.halve(self.min_band_width)?;
        Some([
            SearchTask {
                cell: task.cell,
                band: low,
            },
            SearchTask {
                cell: task.cell,
                band: high,
            },
        ])
    }

    const fn new_cell(&mut self, center: GeoPoint, radius_km: f64, depth: u8) -> SearchCell {
        let id = self.next_cell_id;
        self.next_cell_id += 1;
        SearchCell {
            id,
            center,
            radius_km,
            depth,
        }
    }
}

/// Cuts `[0, ceiling]` into `count` bands whose boundaries are spread as
/// evenly as integer prices allow. Consecutive bands share one boundary.
#[must_use]
pub fn price_bands(ceiling: u64, count: u32) -> Vec<PriceBand> {
    let count = u128::from(count.max(1));
    let ceiling_wide = u128::from(ceiling);

    let mut boundaries: Vec<u64> = (0..=count)
        .map(|i| u64::try_from(ceiling_wide * i / count).unwrap_or(ceiling))
        .collect();
    boundaries.dedup();

    if boundaries.len() < 2 {
        return vec![PriceBand::new(0, ceiling)];
    }

    boundaries
        .windows(2)
        .map(|pair| PriceBand::new(pair[0], pair[1]))
        .collect()
}

/// Cell-centered sample positions from `min` towards `max`, `step` apart.
fn steps(min: f64, max: f64, step: f64) -> impl Iterator<Item = f64> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = if step > 0.0 && max > min {
        ((max - min) / step).ceil().max(1.0) as u32
    } else {
        1
    };
    (0..count).map(move |i| step.mul_add(f64::from(i) + 0.5, min))
}
