//! End-to-end scenarios for the trajectory reconstruction pipeline, covering
//! the canonical travel-type/perf-rate cases plus three boundary cases.
//! Geometry uses a projected spatial reference (EPSG:3857-style flat meters)
//! with round figures rather than literal WGS84 coordinates, so expected
//! values are exact arithmetic rather than geodesic approximations — the same
//! tradeoff the inline unit tests throughout `vtrie-core` already make.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};

use vtrie_core::aggregate::{aggregate_daily, aggregate_trip_stop};
use vtrie_core::catalog::{RawSegment, RawStopTime, RouteCatalog};
use vtrie_core::enrich;
use vtrie_core::executor;
use vtrie_core::fix::{Fix, MobilityState, SnappedFix};
use vtrie_core::geolocator;
use vtrie_core::geometry::SpatialRef;
use vtrie_core::interpolate::{self, InterpolatedRow, PerfRate, TravelType};
use vtrie_core::time::ServiceTimeOffset;
use vtrie_core::PipelineConfig;

const SERVICE_DATE: (i32, u32, u32) = (2026, 7, 28);

fn service_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(SERVICE_DATE.0, SERVICE_DATE.1, SERVICE_DATE.2).unwrap()
}

fn ts(h: u32, m: u32, s: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(SERVICE_DATE.0, SERVICE_DATE.1, SERVICE_DATE.2, h, m, s).unwrap()
}

/// five stops, 100 m apart, one straight segment per inter-stop leg.
fn five_stop_catalog(stop_times: Vec<RawStopTime>) -> RouteCatalog {
    let segments = vec![
        RawSegment { seg_index: 0, path: [(0.0, 0.0), (100.0, 0.0)], stop_sequence: 1, stop_id: "S1".into() },
        RawSegment { seg_index: 1, path: [(100.0, 0.0), (200.0, 0.0)], stop_sequence: 2, stop_id: "S2".into() },
        RawSegment { seg_index: 2, path: [(200.0, 0.0), (300.0, 0.0)], stop_sequence: 3, stop_id: "S3".into() },
        RawSegment { seg_index: 3, path: [(300.0, 0.0), (400.0, 0.0)], stop_sequence: 4, stop_id: "S4".into() },
        RawSegment { seg_index: 4, path: [(400.0, 0.0), (500.0, 0.0)], stop_sequence: 5, stop_id: "S5".into() },
    ];
    RouteCatalog::build("R1".into(), 0, SpatialRef::new(3857), segments, stop_times, service_date()).unwrap()
}

fn sched(trip_id: &str, stop_sequence: u32, clock: &str) -> RawStopTime {
    RawStopTime {
        trip_id: trip_id.into(),
        stop_sequence,
        stop_id: format!("S{stop_sequence}"),
        scheduled_arrival: ServiceTimeOffset::parse(clock),
        scheduled_departure: None,
    }
}

/// a stop_times.txt row for every stop_sequence 1..=5 (the five-stop catalog's
/// full reach), with a real schedule only at the `(stop_sequence, clock)` pairs
/// named in `scheds`. `RouteCatalog::build` derives the schedule-side
/// `max_stop_sequence` from every row's `stop_sequence`, whether or not it
/// carries a time — a stop list with gaps in its stop_sequence coverage would
/// otherwise read as a real, lower terminus (the catalog's overshoot check
/// only guards the other direction).
fn full_stop_times(trip_id: &str, scheds: &[(u32, &str)]) -> Vec<RawStopTime> {
    (1..=5u32)
        .map(|stop_sequence| {
            let clock = scheds.iter().find(|(seq, _)| *seq == stop_sequence).map(|(_, c)| *c);
            RawStopTime {
                trip_id: trip_id.into(),
                stop_sequence,
                stop_id: format!("S{stop_sequence}"),
                scheduled_arrival: clock.and_then(ServiceTimeOffset::parse),
                scheduled_departure: None,
            }
        })
        .collect()
}

fn snapped(trip_id: &str, stop_sequence: u32, seg_index: usize, arc_length_m: f64, h: u32, m: u32, s: u32, barcode: u64) -> SnappedFix {
    SnappedFix {
        trip_id: trip_id.into(),
        route_id: "R1".into(),
        direction: 0,
        vehicle_id: "V1".into(),
        timestamp: ts(h, m, s),
        barcode,
        seg_index,
        stop_sequence,
        point: (arc_length_m, 0.0),
        arc_length_m,
        snap_distance_m: 0.0,
        mobility_state: None,
    }
}

// ---------------------------------------------------------------------
// 1. Movement between two stops.
// ---------------------------------------------------------------------
#[test]
fn movement_between_two_stops_lands_on_time() {
    let catalog = five_stop_catalog(full_stop_times("T1", &[(3, "08:02:00")]));
    let mut fixes = vec![
        snapped("T1", 2, 1, 150.0, 8, 0, 0, 1),
        snapped("T1", 3, 2, 250.0, 8, 1, 0, 2),
    ];
    enrich::classify_mobility(&catalog, &mut fixes, enrich::STATIONARY_DISTANCE_M);
    let rows = interpolate::interpolate_trip(&catalog, &fixes);

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.stop_sequence, 3);
    assert_eq!(row.travel_type, TravelType::OneStop);
    // B's row reports off_earr as B's timestamp plus the projected travel time to
    // the *next* stop (S4), not B's bare timestamp — the row describes arrival at
    // S3 informed by how the trip continues past it. At 6 km/h (100 m / 60 s) the
    // next 100 m leg projects to another 60 s.
    assert_eq!(row.off_earr, ts(8, 1, 30));
    assert_eq!(row.off_arrdif_s, Some(30.0));
    assert_eq!(row.perf_rate, Some(PerfRate::OnTime));
}

// ---------------------------------------------------------------------
// 2. Multi-stop traversal.
// ---------------------------------------------------------------------
#[test]
fn multi_stop_traversal_emits_every_crossed_stop() {
    let catalog = five_stop_catalog(full_stop_times("T1", &[(3, "08:02:00"), (4, "08:03:00")]));
    let mut fixes = vec![
        snapped("T1", 2, 1, 150.0, 8, 0, 0, 1),
        snapped("T1", 4, 3, 350.0, 8, 2, 0, 2),
    ];
    enrich::classify_mobility(&catalog, &mut fixes, enrich::STATIONARY_DISTANCE_M);
    let rows = interpolate::interpolate_trip(&catalog, &fixes);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].stop_sequence, 3);
    assert_eq!(rows[1].stop_sequence, 4);
    assert_eq!(rows[0].travel_type, TravelType::BtwnStops);
    assert!((rows[0].proj_speed_kmh - 6.0).abs() < 1e-9);
    // sum of leg distances equals Tot_Dist_m, a universal invariant of the split.
    let tot_dist_m: f64 = rows.iter().map(|r| r.dist_m).sum();
    assert!((tot_dist_m - 200.0).abs() < 1e-3);
}

// ---------------------------------------------------------------------
// 3. SameStop-SameSeg stationary confirmation.
// ---------------------------------------------------------------------
#[test]
fn same_stop_same_seg_confirms_stationary_within_20m() {
    let catalog = five_stop_catalog(full_stop_times("T1", &[(3, "08:02:00")]));
    let mut fixes = vec![
        snapped("T1", 3, 2, 250.0, 8, 0, 0, 1),
        snapped("T1", 3, 2, 251.0, 8, 0, 15, 2),
    ];
    enrich::classify_mobility(&catalog, &mut fixes, enrich::STATIONARY_DISTANCE_M);
    assert_eq!(fixes[0].mobility_state, Some(MobilityState::Stationary));

    let pairs = enrich::pair_up(&fixes);
    assert_eq!(pairs[0].delta_dist_m, Some(1.0));
    assert!(pairs[0].delta_dist_m.unwrap() <= 20.0);

    let rows = interpolate::interpolate_trip(&catalog, &fixes);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].travel_type, TravelType::StationaryRow);
    assert_eq!(rows[0].stop_sequence, 3);
    assert!(rows[0].perf_rate.is_some());
}

// ---------------------------------------------------------------------
// 4. QA/QC back-step removal.
// ---------------------------------------------------------------------
#[test]
fn qaqc_back_step_removal_drops_the_spurious_fix_and_lowers_retention() {
    let catalog = Arc::new(five_stop_catalog(vec![]));
    let mut catalogs = HashMap::new();
    catalogs.insert(("R1".to_string(), 0u8), Arc::clone(&catalog));

    // A clean forward run, with one spurious GPS back-step inserted mid-trip.
    let fixes = vec![
        Fix { trip_id: "T1".into(), route_id: "R1".into(), direction: 0, vehicle_id: "V1".into(), timestamp: ts(8, 0, 0), lon: 50.0, lat: 0.0 },
        Fix { trip_id: "T1".into(), route_id: "R1".into(), direction: 0, vehicle_id: "V1".into(), timestamp: ts(8, 1, 0), lon: 250.0, lat: 0.0 },
        Fix { trip_id: "T1".into(), route_id: "R1".into(), direction: 0, vehicle_id: "V1".into(), timestamp: ts(8, 1, 30), lon: 120.0, lat: 0.0 }, // spurious back-step
        Fix { trip_id: "T1".into(), route_id: "R1".into(), direction: 0, vehicle_id: "V1".into(), timestamp: ts(8, 2, 0), lon: 350.0, lat: 0.0 },
    ];
    let mut fixes_by_route = HashMap::new();
    fixes_by_route.insert(("R1".to_string(), 0u8), fixes);

    let result = executor::execute(&catalogs, fixes_by_route, &PipelineConfig::default()).unwrap();
    assert_eq!(result.manifest.len(), 1);
    let manifest = &result.manifest[0];
    assert!(manifest.retention() < 1.0, "the back-stepped fix must not survive QA/QC");
    assert!(!manifest.failed);

    for row in &result.trip_stop {
        assert!(row.stop_sequence >= 1 && row.stop_sequence <= catalog.max_stop_sequence);
    }
}

// ---------------------------------------------------------------------
// 5. Terminus validation mismatch.
// ---------------------------------------------------------------------
#[test]
fn terminus_validation_mismatch_caps_at_the_polyline_reach() {
    // stop list claims a stop_sequence the undissolved polyline never reaches.
    let stop_times = vec![sched("T1", 6, "08:05:00")];
    let catalog = five_stop_catalog(stop_times);
    assert_eq!(catalog.max_stop_sequence, 5);
    assert!(!catalog.max_stop_seq_validated);

    let mut fixes = vec![
        snapped("T1", 4, 3, 350.0, 8, 3, 0, 1),
        snapped("T1", 5, 4, 450.0, 8, 4, 0, 2),
    ];
    enrich::classify_mobility(&catalog, &mut fixes, enrich::STATIONARY_DISTANCE_M);
    assert_eq!(fixes[1].mobility_state, Some(MobilityState::Terminus));

    let rows = interpolate::interpolate_trip(&catalog, &fixes);
    assert!(rows.iter().all(|r| r.stop_sequence <= 5));
    assert!(rows.iter().any(|r| r.travel_type == TravelType::TerminusRow || r.stop_sequence == 5));
}

// ---------------------------------------------------------------------
// 6. Daily aggregate.
// ---------------------------------------------------------------------
#[test]
fn daily_aggregate_counts_distinct_hours_and_total_observations() {
    let hours = [6u32, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 19];
    let mut rows: Vec<InterpolatedRow> = Vec::new();
    for i in 0..23u32 {
        let hour = hours[(i as usize) % hours.len()];
        rows.push(InterpolatedRow {
            trip_id: format!("T{i}"),
            route_id: "R1".into(),
            direction: 0,
            idx: i as u64,
            travel_type: TravelType::OneStop,
            stop_sequence: 3,
            stop_id: "S3".into(),
            proj_speed_kmh: 20.0,
            dist_m: 100.0,
            dist_futr_m: 0.0,
            proj_travel_s: 18.0,
            futr_travel_s: 0.0,
            off_earr: Utc.with_ymd_and_hms(2026, 7, 28, hour, 0, 0).unwrap(),
            sched_arr: Some(Utc.with_ymd_and_hms(2026, 7, 28, hour, 0, 30).unwrap()),
            off_arrdif_s: Some(30.0),
            perc_chge: None,
            perf_rate: Some(PerfRate::OnTime),
            wrap_candidate: false,
        });
    }

    let level1 = aggregate_trip_stop(&rows);
    assert_eq!(level1.len(), 23, "each synthetic trip is its own (route,trip,stop) group");

    let daily = aggregate_daily(&level1);
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].agglength, 13);
    assert_eq!(daily[0].all_obs, 23);
    assert!((daily[0].act_sat_p - 100.0).abs() < 1e-9);
}

// ---------------------------------------------------------------------
// Boundary cases.
// ---------------------------------------------------------------------

#[test]
fn single_fix_trip_emits_only_a_stationary_or_terminus_row() {
    let catalog = five_stop_catalog(vec![]);
    let mut fixes = vec![snapped("T1", 3, 2, 250.0, 8, 0, 0, 1)];
    enrich::classify_mobility(&catalog, &mut fixes, enrich::STATIONARY_DISTANCE_M);

    let rows = interpolate::interpolate_trip(&catalog, &fixes);
    assert_eq!(rows.len(), 1);
    assert!(matches!(rows[0].travel_type, TravelType::StationaryRow | TravelType::TerminusRow));
}

#[test]
fn two_fixes_straddling_the_last_stop_emit_a_terminus_row_and_do_not_wrap() {
    let catalog = five_stop_catalog(vec![]);
    let mut fixes = vec![
        snapped("T1", 4, 3, 380.0, 8, 0, 0, 1),
        snapped("T1", 5, 4, 480.0, 8, 1, 0, 2),
    ];
    enrich::classify_mobility(&catalog, &mut fixes, enrich::STATIONARY_DISTANCE_M);
    assert_eq!(fixes[1].mobility_state, Some(MobilityState::Terminus));

    let rows = interpolate::interpolate_trip(&catalog, &fixes);
    assert!(rows.iter().any(|r| r.travel_type == TravelType::TerminusRow));
    assert!(rows.iter().all(|r| !r.wrap_candidate));
}

#[test]
fn loop_route_resolves_the_earlier_segment_outbound_and_later_inbound() {
    // a route whose geometry doubles back on itself: segment 0 and segment 2
    // occupy the same snap region, segment 1 links them.
    let segments = vec![
        RawSegment { seg_index: 0, path: [(0.0, 0.0), (100.0, 0.0)], stop_sequence: 1, stop_id: "S1".into() },
        RawSegment { seg_index: 1, path: [(100.0, 0.0), (100.0, 100.0)], stop_sequence: 2, stop_id: "S2".into() },
        RawSegment { seg_index: 2, path: [(100.0, 100.0), (0.0, 100.0)], stop_sequence: 3, stop_id: "S3".into() },
    ];
    let catalog = RouteCatalog::build(
        "R1".into(),
        0,
        SpatialRef::new(3857),
        segments,
        vec![],
        service_date(),
    )
    .unwrap();

    // first fix sits on the outbound leg (segment 0), unambiguous on its own.
    let outbound = Fix { trip_id: "T1".into(), route_id: "R1".into(), direction: 0, vehicle_id: "V1".into(), timestamp: ts(8, 0, 0), lon: 5.0, lat: 0.0 };
    let snapped_out = geolocator::snap_fixes(&catalog, &[outbound], geolocator::DEFAULT_SNAP_DISTANCE_BOUND_M);
    assert_eq!(snapped_out[0].seg_index, 0);

    // once the trip has advanced past segment 1, the next ambiguous candidate
    // resolves forward rather than snapping back to segment 0.
    let advance = Fix { trip_id: "T1".into(), route_id: "R1".into(), direction: 0, vehicle_id: "V1".into(), timestamp: ts(8, 1, 0), lon: 100.0, lat: 50.0 };
    let inbound = Fix { trip_id: "T1".into(), route_id: "R1".into(), direction: 0, vehicle_id: "V1".into(), timestamp: ts(8, 2, 0), lon: 95.0, lat: 100.0 };
    let snapped_seq = geolocator::snap_fixes(&catalog, &[outbound, advance, inbound], geolocator::DEFAULT_SNAP_DISTANCE_BOUND_M);
    assert_eq!(snapped_seq.last().unwrap().seg_index, 2);
}
