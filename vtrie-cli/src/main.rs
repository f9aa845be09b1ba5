//! Binary entry point. Loads one day's GTFS static bundle and fix table,
//! builds a [`vtrie_core::catalog::RouteCatalog`] per `(route_id,
//! direction)` pair actually observed, hands everything to
//! [`vtrie_core::executor::execute`], and writes the three aggregate tables
//! plus the manifest.

mod app;
mod error;
mod io;
mod layout;

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;

use vtrie_core::catalog::RouteCatalog;
use vtrie_core::manifest;

use app::VtrieApp;
use error::CliError;
use layout::StageLayout;

fn main() -> ExitCode {
    env_logger::init();
    let args = VtrieApp::parse();
    match run(&args) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            log::error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(args: &VtrieApp) -> Result<i32, CliError> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(args.parallelism()).build().map_err(|e| CliError::InvalidInput(e.to_string()))?;

    pool.install(|| run_pipeline(args))
}

fn run_pipeline(args: &VtrieApp) -> Result<i32, CliError> {
    let config = args.resolve_pipeline_config()?;
    let layout = StageLayout::new(&args.main_folder);

    let (gtfs_date, raw_date) = resolve_run_dates(&layout)?;
    let gtfs_path = layout.gtfs_bundle(gtfs_date);
    log::info!("loading GTFS bundle from {}", gtfs_path.display());
    let gtfs = gtfs_structures::Gtfs::new(
        gtfs_path
            .to_str()
            .ok_or_else(|| CliError::InvalidInput(format!("non-UTF8 GTFS bundle path {}", gtfs_path.display())))?,
    )?;
    let trip_index = io::gtfs::load_trip_index(&gtfs);

    let fix_table_path = layout.fix_table(raw_date);
    log::info!("reading fix table from {}", fix_table_path.display());
    let fixes = io::fixes::read_fix_table(&fix_table_path, &trip_index)?;
    if fixes.is_empty() {
        return Err(CliError::InvalidInput(format!("no resolvable fixes in {}", fix_table_path.display())));
    }
    let fixes_by_route = io::fixes::group_by_route(fixes);

    let routes: Vec<(String, u8)> = fixes_by_route.keys().cloned().collect();
    let sref = vtrie_core::geometry::SpatialRef::new(config.wkid);
    let raw_catalogs = io::gtfs::build_catalogs(&gtfs, &layout, gtfs_date, raw_date, sref, &trip_index, &routes)?;
    let catalogs: HashMap<(String, u8), Arc<RouteCatalog>> = raw_catalogs.into_iter().map(|(key, catalog)| (key, Arc::new(catalog))).collect();

    let result = vtrie_core::executor::execute(&catalogs, fixes_by_route, &config)?;

    // 6_analyses/ holds the per-trip aggregate; 7_requests/ holds the hourly
    // and daily aggregates plus the manifest, alongside the rest of the job's
    // outputs.
    let date_dir = raw_date.format("%Y-%m-%d").to_string();
    let analyses_dir = layout.analyses().join(&date_dir);
    let requests_dir = layout.requests().join(&date_dir);
    std::fs::create_dir_all(&analyses_dir)?;
    std::fs::create_dir_all(&requests_dir)?;

    io::output::write_trip_stop_csv(&analyses_dir.join("trip_stop.csv"), &result.trip_stop)?;
    io::output::write_manifest_csv(&requests_dir.join("manifest.csv"), &result.manifest)?;
    io::output::write_hourly_csv(&requests_dir.join("hourly.csv"), &result.hourly)?;
    io::output::write_daily_csv(&requests_dir.join("daily.csv"), &result.daily)?;

    let mut stop_coords = HashMap::new();
    for (route_id, direction) in &routes {
        if let Ok(points) = io::gtfs::read_stop_points(&layout, gtfs_date, route_id, *direction) {
            stop_coords.extend(points);
        }
    }
    io::output::write_trip_stop_geojson(&analyses_dir.join("trip_stop.geojson"), &result.trip_stop, &stop_coords)?;

    for entry in &result.manifest {
        println!("{}", entry.summary_line());
    }

    Ok(manifest::exit_code(&result.manifest, false))
}

/// resolves the GTFS schedule date and the fix table's raw date. Absent a
/// `--date` flag (not yet wired through `app::VtrieApp`), the raw date is the
/// most recent `GTFSRT_YYYY-MM-DD.csv` found under `0_external/`, and the
/// GTFS schedule date tracks it — the schedule in effect for a harvested
/// day's fixes is, by convention, dated the same day.
fn resolve_run_dates(layout: &StageLayout) -> Result<(NaiveDate, NaiveDate), CliError> {
    let raw_date = layout.latest_fix_date().ok_or_else(|| {
        CliError::InvalidInput(format!(
            "no GTFSRT_YYYY-MM-DD.csv found under {}",
            layout.external().display()
        ))
    })?;
    Ok((raw_date, raw_date))
}
