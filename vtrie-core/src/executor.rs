//! Parallel executor (C9). One task per `(route_id, direction)`; `rayon`'s
//! global pool gives parallel worker threads without hand-rolled thread
//! management, with `(route_id, direction)` as the unit of parallelism.
//!
//! Each task owns its fixes end to end (no suspension points, no shared mutable
//! state); the executor only reduces after every task finishes, running
//! aggregation levels 2 and 3 once over the concatenated level-1 rows.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use itertools::Itertools;
use rayon::prelude::*;

use crate::aggregate::{self, DailyAggregate, HourlyAggregate, TripStopAggregate};
use crate::catalog::{RouteCatalog, RouteKey};
use crate::cleaner::{self, CleanReport};
use crate::config::PipelineConfig;
use crate::enrich;
use crate::error::PipelineError;
use crate::fix::Fix;
use crate::geolocator;
use crate::manifest::{RecordedError, RouteManifestEntry};
use crate::qaqc::{self, QaQcReport};

pub struct ExecutionResult {
    pub trip_stop: Vec<TripStopAggregate>,
    pub hourly: Vec<HourlyAggregate>,
    pub daily: Vec<DailyAggregate>,
    pub manifest: Vec<RouteManifestEntry>,
}

/// one route's worker output, joined at the barrier before levels 2/3 run.
struct RouteOutcome {
    trip_stop: Vec<TripStopAggregate>,
    manifest: RouteManifestEntry,
}

/// runs the full per-route pipeline for every `(route_id, direction)` present in
/// `fixes_by_route`, then reduces into the three aggregate tables.
///
/// `catalogs` must contain an entry for every key in `fixes_by_route`; a missing
/// catalog is an `InputMissing` abort (checked before any worker starts, since
/// catalog loading happens once up front).
pub fn execute(
    catalogs: &HashMap<RouteKey, Arc<RouteCatalog>>,
    fixes_by_route: HashMap<RouteKey, Vec<Fix>>,
    config: &PipelineConfig,
) -> Result<ExecutionResult, PipelineError> {
    for key in fixes_by_route.keys() {
        if !catalogs.contains_key(key) {
            return Err(PipelineError::InputMissing(format!(
                "no catalog for route {} direction {}",
                key.0, key.1
            )));
        }
    }

    let started = Instant::now();
    let outcomes: Vec<RouteOutcome> = fixes_by_route
        .into_par_iter()
        .map(|(key, fixes)| {
            if let Some(timeout) = config.timeout {
                if started.elapsed() > timeout {
                    return timeout_outcome(key);
                }
            }
            let catalog = catalogs.get(&key).expect("checked above");
            run_route(catalog, key, fixes, config)
        })
        .collect();

    let mut trip_stop = Vec::new();
    let mut manifest = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        trip_stop.extend(outcome.trip_stop);
        manifest.push(outcome.manifest);
    }

    let hourly = aggregate::aggregate_hourly(&trip_stop);
    let daily = aggregate::aggregate_daily(&trip_stop);

    Ok(ExecutionResult {
        trip_stop,
        hourly,
        daily,
        manifest,
    })
}

fn timeout_outcome(key: RouteKey) -> RouteOutcome {
    RouteOutcome {
        trip_stop: Vec::new(),
        manifest: RouteManifestEntry {
            route_id: key.0.clone(),
            direction: key.1,
            qaqc: QaQcReport::default(),
            clean: CleanReport::default(),
            errors: vec![RecordedError {
                kind: "TaskFailure",
                message: format!("route {} direction {} cancelled: job timeout exceeded", key.0, key.1),
            }],
            failed: true,
        },
    }
}

/// runs C3 through C8-stage-1 for one route, catching worker panics as a
/// `TaskFailure` so one route's crash cannot take down the rest.
fn run_route(catalog: &RouteCatalog, key: RouteKey, fixes: Vec<Fix>, config: &PipelineConfig) -> RouteOutcome {
    let result = catch_unwind(AssertUnwindSafe(|| run_route_inner(catalog, fixes, config)));

    match result {
        Ok((trip_stop, qaqc_report, clean_report)) => RouteOutcome {
            trip_stop,
            manifest: RouteManifestEntry {
                route_id: key.0,
                direction: key.1,
                qaqc: qaqc_report,
                clean: clean_report,
                errors: Vec::new(),
                failed: false,
            },
        },
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked with a non-string payload".to_string());
            log::error!("route {} direction {} failed: {reason}", key.0, key.1);
            RouteOutcome {
                trip_stop: Vec::new(),
                manifest: RouteManifestEntry {
                    route_id: key.0.clone(),
                    direction: key.1,
                    qaqc: QaQcReport::default(),
                    clean: CleanReport::default(),
                    errors: vec![RecordedError {
                        kind: "TaskFailure",
                        message: reason,
                    }],
                    failed: true,
                },
            }
        }
    }
}

fn run_route_inner(
    catalog: &RouteCatalog,
    mut fixes: Vec<Fix>,
    config: &PipelineConfig,
) -> (Vec<TripStopAggregate>, QaQcReport, CleanReport) {
    fixes.sort_by(|a, b| a.trip_id.cmp(&b.trip_id).then(a.timestamp.cmp(&b.timestamp)));

    let snapped = geolocator::snap_fixes(catalog, &fixes, config.snap_distance_bound_m);

    let mut qaqc_total = QaQcReport::default();
    let mut clean_total = CleanReport::default();
    let mut interpolated_all = Vec::new();

    for trip_fixes in group_by_trip(snapped) {
        let (filtered, qaqc_report) = qaqc::filter_trip(trip_fixes, &config.qaqc_lookback_orders);
        merge_qaqc(&mut qaqc_total, &qaqc_report);

        let mut enriched = filtered;
        enrich::classify_mobility(catalog, &mut enriched, config.stationary_distance_m);

        let rows = crate::interpolate::interpolate_trip(catalog, &enriched);
        let (cleaned, clean_report) = cleaner::clean_trip(
            rows,
            catalog.max_stop_sequence,
            config.speed_ceiling_kmh,
            config.max_arrival_offset_s,
        );
        merge_clean(&mut clean_total, &clean_report);

        interpolated_all.extend(cleaned);
    }

    let trip_stop = aggregate::aggregate_trip_stop(&interpolated_all);
    (trip_stop, qaqc_total, clean_total)
}

/// fixes are already sorted by `(trip_id, timestamp)`, so consecutive runs of
/// the same `trip_id` are exactly the trip's fixes; `chunk_by` groups them
/// without re-sorting or hashing.
fn group_by_trip(fixes: Vec<crate::fix::SnappedFix>) -> Vec<Vec<crate::fix::SnappedFix>> {
    fixes
        .into_iter()
        .chunk_by(|fix| fix.trip_id.clone())
        .into_iter()
        .map(|(_, group)| group.collect())
        .collect()
}

fn merge_qaqc(total: &mut QaQcReport, report: &QaQcReport) {
    total.input_count += report.input_count;
    total.duplicate_count += report.duplicate_count;
    total.back_step_count += report.back_step_count;
    total.retained_count += report.retained_count;
}

fn merge_clean(total: &mut CleanReport, report: &CleanReport) {
    total.input_count += report.input_count;
    total.dropped_speed += report.dropped_speed;
    total.dropped_arrival_offset += report.dropped_arrival_offset;
    total.dropped_wrap_around += report.dropped_wrap_around;
    total.retained_count += report.retained_count;
}
