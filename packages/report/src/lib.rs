#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Output artifacts of a discovery run.
//!
//! - The host table: one CSV row per resolved host, with the public profile
//!   URL filled in from the configured template.
//! - An optional JSON audit file mapping every discovered listing to its
//!   host.
//! - A [`RunSummary`] printed at the end of the run.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use lessor_map_discovery::{DiscoveryReport, HostResolution};
use lessor_map_discovery_models::config::ApiConfig;
use lessor_map_discovery_models::{Host, Listing};
use serde::Serialize;

/// Errors writing output files.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CSV serialization error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HostRow<'a> {
    host_id: &'a str,
    host_name: &'a str,
    listing_count: u32,
    is_agency: bool,
    host_rating: Option<f64>,
    host_picture_url: Option<&'a str>,
    profile_url: String,
}

/// Writes `hosts` as CSV to `writer`, header first.
///
/// # Errors
///
/// Returns [`OutputError`] if serialization or the underlying write fails.
pub fn write_hosts<W: io::Write>(
    writer: W,
    hosts: &[Host],
    api: &ApiConfig,
) -> Result<(), OutputError> {
    let mut csv = csv::Writer::from_writer(writer);

    if hosts.is_empty() {
        // serde-driven headers are only emitted with the first record.
        csv.write_record([
            "hostId",
            "hostName",
            "listingCount",
            "isAgency",
            "hostRating",
            "hostPictureUrl",
            "profileUrl",
        ])?;
    }

    for host in hosts {
        csv.serialize(HostRow {
            host_id: host.id.as_str(),
            host_name: &host.name,
            listing_count: host.listing_count,
            is_agency: host.is_agency,
            host_rating: host.rating,
            host_picture_url: host.picture_url.as_deref(),
            profile_url: api.profile_page(host.id.as_str()),
        })?;
    }

    csv.flush()?;
    Ok(())
}

/// Writes the host table to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`OutputError`] if the file cannot be created or written.
pub fn write_hosts_csv(path: &Path, hosts: &[Host], api: &ApiConfig) -> Result<(), OutputError> {
    create_parent(path)?;
    write_hosts(File::create(path)?, hosts, api)?;
    log::info!("Wrote {} hosts to {}", hosts.len(), path.display());
    Ok(())
}

/// Writes every discovered listing and its host (if known) to `path` as a
/// pretty-printed JSON array.
///
/// # Errors
///
/// Returns [`OutputError`] if the file cannot be created or written.
pub fn write_listings_json(path: &Path, listings: &[Listing]) -> Result<(), OutputError> {
    create_parent(path)?;
    fs::write(path, serde_json::to_string_pretty(listings)?)?;
    log::info!("Wrote {} listings to {}", listings.len(), path.display());
    Ok(())
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// End-of-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Resolved area name.
    pub area: String,
    /// Discovery counters.
    pub discovery: DiscoveryReport,
    /// Hosts written to the table.
    pub hosts_resolved: usize,
    /// Resolved hosts classified as agencies.
    pub agencies: usize,
    /// Hosts whose profile could not be fetched.
    pub hosts_omitted: usize,
    /// Credential refreshes performed.
    pub credential_refreshes: u32,
    /// Whether the agency cap ended host resolution early.
    pub agency_cap_reached: bool,
}

impl RunSummary {
    /// Builds a summary from both phases of a run.
    #[must_use]
    pub fn new(
        area: impl Into<String>,
        discovery: DiscoveryReport,
        resolution: &HostResolution,
        credential_refreshes: u32,
    ) -> Self {
        Self {
            area: area.into(),
            discovery,
            hosts_resolved: resolution.hosts.len(),
            agencies: resolution.agency_count(),
            hosts_omitted: resolution.omitted.len(),
            credential_refreshes,
            agency_cap_reached: resolution.stopped_early,
        }
    }

    /// Skipped tasks plus omitted hosts. Non-zero means the result may be
    /// incomplete.
    #[must_use]
    pub const fn coverage_warnings(&self) -> usize {
        self.discovery.tasks_skipped + self.hosts_omitted
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.discovery;
        writeln!(f, "Area:                 {}", self.area)?;
        writeln!(f, "Search tasks:         {} ({} skipped)", d.tasks_run, d.tasks_skipped)?;
        writeln!(f, "Pages fetched:        {}", d.pages_fetched)?;
        writeln!(f, "Cells densified:      {}", d.cells_densified)?;
        writeln!(f, "Bands split:          {}", d.bands_split)?;
        writeln!(f, "Listings:             {}", d.listings)?;
        writeln!(f, "Hosts:                {}", d.hosts)?;
        writeln!(
            f,
            "Hosts resolved:       {} ({} agencies, {} omitted)",
            self.hosts_resolved, self.agencies, self.hosts_omitted
        )?;
        writeln!(f, "Credential refreshes: {}", self.credential_refreshes)?;
        if d.stopped_early {
            writeln!(f, "Stopped early:        listing cap reached")?;
        }
        if self.agency_cap_reached {
            writeln!(f, "Stopped early:        agency cap reached")?;
        }
        write!(f, "Coverage warnings:    {}", self.coverage_warnings())
    }
}

#[cfg(test)]
mod tests {
    use lessor_map_discovery_models::HostId;

    use super::*;

    fn host(id: &str, listing_count: u32, is_agency: bool) -> Host {
        Host {
            id: id.into(),
            name: format!("Host {id}"),
            listing_count,
            rating: Some(4.9),
            picture_url: Some(format!("https://img.test/{id}.jpg")),
            is_agency,
        }
    }

    fn render(hosts: &[Host]) -> String {
        let mut out = Vec::new();
        write_hosts(&mut out, hosts, &ApiConfig::default()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn table_has_one_row_per_host() {
        let csv = render(&[host("H1", 6, true), host("H2", 2, false)]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "hostId,hostName,listingCount,isAgency,hostRating,hostPictureUrl,profileUrl"
        );
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "H1,Host H1,6,true,4.9,https://img.test/H1.jpg,https://www.airbnb.com/users/show/H1"
        );
        assert!(lines[2].starts_with("H2,Host H2,2,false,"));
    }

    #[test]
    fn missing_optional_fields_are_empty() {
        let mut bare = host("H3", 1, false);
        bare.rating = None;
        bare.picture_url = None;
        let csv = render(&[bare]);
        assert_eq!(
            csv.lines().nth(1).unwrap(),
            "H3,Host H3,1,false,,,https://www.airbnb.com/users/show/H3"
        );
    }

    #[test]
    fn empty_table_still_has_header() {
        let csv = render(&[]);
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.starts_with("hostId,"));
    }

    #[test]
    fn files_are_written_into_new_directories() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("out/hosts.csv");
        let json_path = dir.path().join("out/listings.json");

        write_hosts_csv(&csv_path, &[host("H1", 6, true)], &ApiConfig::default()).unwrap();
        write_listings_json(
            &json_path,
            &[Listing {
                id: "L1".into(),
                host_id: Some(HostId::from("H1")),
            }],
        )
        .unwrap();

        let csv = fs::read_to_string(&csv_path).unwrap();
        assert_eq!(csv.lines().count(), 2);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json[0]["id"], "L1");
        assert_eq!(json[0]["hostId"], "H1");
    }

    #[test]
    fn summary_counts_coverage_warnings() {
        let resolution = HostResolution {
            hosts: vec![host("H1", 6, true), host("H2", 1, false)],
            omitted: vec![HostId::from("H3")],
            stopped_early: false,
        };
        let discovery = DiscoveryReport {
            tasks_run: 10,
            tasks_skipped: 2,
            ..DiscoveryReport::default()
        };
        let summary = RunSummary::new("Lisbon", discovery, &resolution, 1);

        assert_eq!(summary.agencies, 1);
        assert_eq!(summary.coverage_warnings(), 3);
        assert!(summary.to_string().ends_with("Coverage warnings:    3"));
    }
}
