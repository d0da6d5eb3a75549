#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Lessor discovery CLI.
//!
//! Resolves a place name to a boundary, searches every listing inside it,
//! and writes one CSV row per distinct host with its agency classification.
//!
//! Uses `indicatif-log-bridge` (via [`lessor_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod config;
mod pipeline;

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use lessor_map_discovery_models::config::DiscoveryConfig;

use crate::config::FileConfig;
use crate::pipeline::{Collaborators, Outputs, Pipeline};

#[derive(Parser)]
#[command(
    name = "lessor_map",
    about = "Enumerates every short-term-rental host operating inside an area"
)]
struct Cli {
    /// Place to search (e.g., "Lisbon, Portugal")
    location: String,
    /// TOML configuration file with `[discovery]` and `[api]` sections
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host table output path
    #[arg(long, default_value = "hosts.csv")]
    output: PathBuf,
    /// Also write every discovered listing and its host as JSON
    #[arg(long)]
    listings_out: Option<PathBuf>,
    /// Concurrent requests (1-4)
    #[arg(long)]
    workers: Option<usize>,
    /// Stop discovery after this many unique listings (for testing)
    #[arg(long)]
    max_listings: Option<usize>,
    /// Stop host resolution after this many agencies (for testing)
    #[arg(long)]
    max_agencies: Option<usize>,
    /// Listings at or above which a host counts as an agency
    #[arg(long)]
    agency_threshold: Option<u32>,
    /// Initial search cell radius in kilometres
    #[arg(long, value_parser = positive_km)]
    cell_radius_km: Option<f64>,
}

/// Parses a finite distance greater than zero.
fn positive_km(s: &str) -> Result<f64, String> {
    let km: f64 = s.parse().map_err(|e| format!("'{s}' is not a number: {e}"))?;
    if km.is_finite() && km > 0.0 {
        Ok(km)
    } else {
        Err(format!("'{s}' must be a positive number of kilometres"))
    }
}

impl Cli {
    /// Applies command-line overrides on top of file configuration.
    fn apply(&self, config: &mut DiscoveryConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.max_listings.is_some() {
            config.max_listings = self.max_listings;
        }
        if self.max_agencies.is_some() {
            config.max_agencies = self.max_agencies;
        }
        if let Some(threshold) = self.agency_threshold {
            config.agency_threshold = threshold;
        }
        if let Some(radius) = self.cell_radius_km {
            config.cell_radius_km = radius;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = lessor_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let FileConfig {
        mut discovery,
        api,
    } = FileConfig::load(cli.config.as_deref())?;
    cli.apply(&mut discovery);

    let client = pipeline::client(&api)?;
    let geocoder = pipeline::geocoder(&client, &api);
    let collaborators = Collaborators::http(&client, &api)?;
    let outputs = Outputs {
        hosts_csv: cli.output.clone(),
        listings_json: cli.listings_out.clone(),
    };

    let start = Instant::now();
    let summary = Pipeline::new(discovery, api, collaborators, Some(multi))
        .run(&geocoder, &cli.location, &outputs)
        .await?;

    println!();
    println!("{summary}");
    println!("Elapsed:              {:.1}s", start.elapsed().as_secs_f64());

    if summary.coverage_warnings() > 0 {
        log::warn!(
            "{} tasks or hosts failed; the host table may be incomplete",
            summary.coverage_warnings()
        );
    }

    Ok(())
}
