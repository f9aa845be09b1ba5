//! Conventional directory layout, rooted at `main_folder`. Stage numbering
//! and names must be preserved byte for byte since downstream collaborators
//! (the harvester, the catalog generator, the document store writer) read
//! and write these exact paths.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use regex::Regex;

pub struct StageLayout {
    root: PathBuf,
}

/// matches the harvester's `GTFSRT_YYYY-MM-DD.csv` naming convention and
/// captures the raw date, for discovering which fix table is on disk absent
/// an explicit `--date` flag.
const FIX_TABLE_PATTERN: &str = r"^GTFSRT_(\d{4}-\d{2}-\d{2})\.csv$";

impl StageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StageLayout { root: root.into() }
    }

    pub fn external(&self) -> PathBuf {
        self.root.join("0_external")
    }

    pub fn staging(&self, gtfs_date: NaiveDate) -> PathBuf {
        self.root.join("2_staging").join(gtfs_date.format("%Y-%m-%d").to_string())
    }

    pub fn interim(&self, gtfs_date: NaiveDate, raw_date: NaiveDate) -> PathBuf {
        self.root
            .join("3_interim")
            .join(gtfs_date.format("%Y-%m-%d").to_string())
            .join(raw_date.format("%Y-%m-%d").to_string())
    }

    pub fn processed(&self) -> PathBuf {
        self.root.join("4_processed")
    }

    pub fn conformed(&self) -> PathBuf {
        self.root.join("5_conformed")
    }

    pub fn analyses(&self) -> PathBuf {
        self.root.join("6_analyses")
    }

    pub fn requests(&self) -> PathBuf {
        self.root.join("7_requests")
    }

    /// raw fix table path within `0_external/`, named `GTFSRT_YYYY-MM-DD.csv`.
    pub fn fix_table(&self, raw_date: NaiveDate) -> PathBuf {
        self.external().join(format!("GTFSRT_{}.csv", raw_date.format("%Y-%m-%d")))
    }

    /// static GTFS bundle (`trips.txt`/`stop_times.txt`/...) for the schedule
    /// in effect on `gtfs_date`, read only as the catalog generator's source —
    /// the catalog generator itself is out of scope here.
    pub fn gtfs_bundle(&self, gtfs_date: NaiveDate) -> PathBuf {
        self.external().join("gtfs").join(format!("{}.zip", gtfs_date.format("%Y-%m-%d")))
    }

    /// per-route shapefile triple within a gtfs date's staging directory.
    pub fn route_undissolved(&self, gtfs_date: NaiveDate, route_id: &str, direction: u8) -> PathBuf {
        self.staging(gtfs_date)
            .join("Route")
            .join(format!("{route_id}_{direction}_undissolved.shp"))
    }

    pub fn route_dissolved(&self, gtfs_date: NaiveDate, route_id: &str, direction: u8) -> PathBuf {
        self.staging(gtfs_date)
            .join("Route")
            .join(format!("{route_id}_{direction}_dissolved.shp"))
    }

    pub fn stops(&self, gtfs_date: NaiveDate, route_id: &str, direction: u8) -> PathBuf {
        self.staging(gtfs_date)
            .join("Stops")
            .join(format!("{route_id}_{direction}.shp"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// the most recent raw date with a fix table present under `0_external/`,
    /// by matching [`FIX_TABLE_PATTERN`] against every directory entry —
    /// absent an explicit `--date` flag, this is the date the conventional
    /// layout implies should drive the run.
    pub fn latest_fix_date(&self) -> Option<NaiveDate> {
        let re = Regex::new(FIX_TABLE_PATTERN).expect("FIX_TABLE_PATTERN is a valid regex");
        std::fs::read_dir(self.external())
            .ok()?
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                let captures = re.captures(name)?;
                NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d").ok()
            })
            .max()
    }
}
