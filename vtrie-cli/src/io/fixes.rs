//! Fix table reader. `GTFSRT_YYYY-MM-DD.csv` carries only `trip_id`,
//! `timestamp`, `lat`, `lon`, `vehicle_id` — no `route_id`/`direction`, which
//! is why this module's row type is distinct from [`vtrie_core::Fix`]; rows
//! are joined against the trip index before entering the core.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use kdam::tqdm;
use serde::Deserialize;
use vtrie_core::Fix;

use crate::error::CliError;

#[derive(Debug, Clone, Deserialize)]
struct FixRow {
    trip_id: String,
    timestamp: String,
    lat: f64,
    lon: f64,
    #[allow(dead_code)]
    vehicle_id: String,
}

/// reads one day's fix table and resolves each row to a [`Fix`] via
/// `trip_index` (`trip_id -> (route_id, direction)`). Rows whose trip is absent
/// from the index are logged and dropped — the trip itself is out of scope for
/// this GTFS bundle, not a geolocation failure.
pub fn read_fix_table(path: &Path, trip_index: &HashMap<String, (String, u8)>) -> Result<Vec<Fix>, CliError> {
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    let desc = format!("reading {}", path.display());
    let rows = tqdm!(reader.deserialize::<FixRow>(), desc = desc);

    let mut fixes = Vec::new();
    for row in rows {
        let row = row?;
        let Some((route_id, direction)) = trip_index.get(&row.trip_id) else {
            log::debug!("dropping fix for unknown trip_id {}", row.trip_id);
            continue;
        };
        let Some(timestamp) = parse_timestamp(&row.timestamp) else {
            log::warn!("dropping fix with unparseable timestamp {:?} for trip {}", row.timestamp, row.trip_id);
            continue;
        };
        fixes.push(Fix {
            trip_id: row.trip_id,
            route_id: route_id.clone(),
            direction: *direction,
            vehicle_id: row.vehicle_id,
            timestamp,
            lon: row.lon,
            lat: row.lat,
        });
    }
    Ok(fixes)
}

/// accepts RFC3339 with an explicit offset (including bare UTC `Z`) and
/// materializes everything to UTC, avoiding hidden time-zone drift.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

/// groups fixes by `(route_id, direction)` for the executor's per-route fan-out.
pub fn group_by_route(fixes: Vec<Fix>) -> HashMap<(String, u8), Vec<Fix>> {
    let mut groups: HashMap<(String, u8), Vec<Fix>> = HashMap::new();
    for fix in fixes {
        groups.entry((fix.route_id.clone(), fix.direction)).or_default().push(fix);
    }
    groups
}
