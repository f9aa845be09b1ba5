//! Interpolator (C6) — the core algorithm. Walks each trip's enriched,
//! consecutive fix pairs, classifies the travel type of the leg between them,
//! and reconstructs one estimated-arrival [`InterpolatedRow`] per stop the
//! vehicle is inferred to have passed.
//!
//! `idx` (the per-pair group identifier) is assigned from the left fix's
//! `barcode` rather than a freshly counted index: barcode is the geolocator's
//! pre-filter insertion counter, so pairs whose neighbors were dropped by QA/QC
//! naturally show up with gaps in `idx`, which is useful downstream as a signal
//! that rows were filtered there rather than re-deriving that fact.

use chrono::{DateTime, Duration, Utc};

use crate::catalog::RouteCatalog;
use crate::enrich::{self, EnrichedPair};
use crate::fix::{MobilityState, SnappedFix};

/// on-time-performance partition of a row's arrival offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfRate {
    Late,
    OnTime,
    Early,
}

impl PerfRate {
    /// `off_arrdif_s = sched_arr − off_earr`; positive means the vehicle arrived
    /// ahead of schedule.
    pub fn classify(off_arrdif_s: f64) -> PerfRate {
        if off_arrdif_s <= -120.0 {
            PerfRate::Late
        } else if off_arrdif_s >= 300.0 {
            PerfRate::Early
        } else {
            PerfRate::OnTime
        }
    }
}

/// travel-type classification of a leg between two snapped fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelType {
    StationaryRow,
    BtwnStops,
    OneStop,
    SameStopDiffSeg,
    SameStopSameSeg,
    TerminusRow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedRow {
    pub trip_id: String,
    pub route_id: String,
    pub direction: u8,
    pub idx: u64,
    pub travel_type: TravelType,
    pub stop_sequence: u32,
    pub stop_id: String,
    pub proj_speed_kmh: f64,
    pub dist_m: f64,
    pub dist_futr_m: f64,
    pub proj_travel_s: f64,
    pub futr_travel_s: f64,
    pub off_earr: DateTime<Utc>,
    pub sched_arr: Option<DateTime<Utc>>,
    pub off_arrdif_s: Option<f64>,
    pub perc_chge: Option<f64>,
    pub perf_rate: Option<PerfRate>,
    /// true if `stop_sequence` regressed by two or more across the pair — a
    /// wrap-around artefact on a loop route that C7 is responsible for dropping.
    pub wrap_candidate: bool,
}

/// reconstructs all [`InterpolatedRow`]s for one trip's QA/QC-filtered,
/// mobility-classified fix sequence (in timestamp order), by enriching it into
/// consecutive [`EnrichedPair`]s (C5) and walking each leg (C6).
pub fn interpolate_trip(catalog: &RouteCatalog, fixes: &[SnappedFix]) -> Vec<InterpolatedRow> {
    let mut rows = Vec::new();
    if fixes.is_empty() {
        return rows;
    }
    if fixes.len() == 1 {
        rows.push(terminus_or_stationary_row(catalog, &fixes[0]));
        return rows;
    }

    for pair in enrich::pair_up(fixes) {
        let b_timestamp = pair.right.timestamp;
        let mut leg_rows = interpolate_pair(catalog, &pair);
        // last row of the group carries B's timestamp.
        if let Some(last) = leg_rows.last_mut() {
            last.off_earr = b_timestamp + Duration::milliseconds((last.futr_travel_s * 1000.0) as i64);
            attach_schedule(catalog, last);
        }
        rows.extend(leg_rows);
    }

    if fixes.last().and_then(|f| f.mobility_state) == Some(MobilityState::Terminus) {
        rows.push(terminus_or_stationary_row(catalog, fixes.last().unwrap()));
    }

    rows
}

fn interpolate_pair(catalog: &RouteCatalog, pair: &EnrichedPair) -> Vec<InterpolatedRow> {
    let (a, b) = (&pair.left, &pair.right);
    let idx = a.barcode;
    let delta_time_s = pair.delta_time_s;
    let tot_dist_m = (b.arc_length_m - a.arc_length_m).abs();
    let proj_speed_kmh = if delta_time_s <= 0.0 {
        f64::INFINITY
    } else {
        (tot_dist_m / delta_time_s) * 3.6
    };

    if pair.left_status == MobilityState::Stationary {
        return vec![stationary_row(catalog, a, b, idx, proj_speed_kmh)];
    }

    let stop_diff = pair.stp_diff;

    if stop_diff <= -2 {
        return vec![wrap_row(catalog, a, b, idx, proj_speed_kmh, tot_dist_m, delta_time_s)];
    }
    if stop_diff >= 1 {
        return btwn_stops_rows(catalog, a, b, idx, proj_speed_kmh, delta_time_s);
    }
    if a.seg_index != b.seg_index {
        return vec![same_stop_row(
            catalog,
            a,
            b,
            idx,
            TravelType::SameStopDiffSeg,
            proj_speed_kmh,
            delta_time_s,
        )];
    }
    vec![same_stop_row(
        catalog,
        a,
        b,
        idx,
        TravelType::SameStopSameSeg,
        proj_speed_kmh,
        delta_time_s,
    )]
}

/// emits one row per stop crossed between `a` and `b` (inclusive of `b`'s stop),
/// partitioning `Tot_Dist_m` by cumulative arc length along the dissolved
/// polyline. Covers both `BtwnStops` (`stop_diff >= 2`) and `OneStop`
/// (`stop_diff == 1`), which differ only in how many intermediate stops exist.
fn btwn_stops_rows(
    catalog: &RouteCatalog,
    a: &SnappedFix,
    b: &SnappedFix,
    idx: u64,
    proj_speed_kmh: f64,
    delta_time_s: f64,
) -> Vec<InterpolatedRow> {
    let travel_type = if b.stop_sequence - a.stop_sequence == 1 {
        TravelType::OneStop
    } else {
        TravelType::BtwnStops
    };

    let mut boundary_arc_m: Vec<(u32, f64)> = vec![(a.stop_sequence, a.arc_length_m)];
    for seq in (a.stop_sequence + 1)..=b.stop_sequence {
        let arc_m = catalog.stop_arc_length_m(seq).unwrap_or(b.arc_length_m);
        boundary_arc_m.push((seq, arc_m));
    }
    if boundary_arc_m.last().map(|(seq, _)| *seq) != Some(b.stop_sequence) {
        boundary_arc_m.push((b.stop_sequence, b.arc_length_m));
    } else if let Some(last) = boundary_arc_m.last_mut() {
        last.1 = b.arc_length_m;
    }

    let mut rows = Vec::with_capacity(boundary_arc_m.len().saturating_sub(1));
    let mut cumulative_travel_s = 0.0;
    for pair in boundary_arc_m.windows(2) {
        let (_, arc_start) = pair[0];
        let (stop_seq, arc_end) = pair[1];
        let leg_dist_m = (arc_end - arc_start).abs();
        let proj_travel_s = if proj_speed_kmh.is_finite() && proj_speed_kmh > 0.0 {
            (leg_dist_m / 1000.0) / proj_speed_kmh * 3600.0
        } else {
            0.0
        };
        cumulative_travel_s += proj_travel_s;

        let off_earr = a.timestamp + Duration::milliseconds((cumulative_travel_s * 1000.0) as i64);
        let stop_id = catalog.stop_id_for(stop_seq).unwrap_or_default().to_string();

        let mut row = InterpolatedRow {
            trip_id: a.trip_id.clone(),
            route_id: a.route_id.clone(),
            direction: a.direction,
            idx,
            travel_type,
            stop_sequence: stop_seq,
            stop_id,
            proj_speed_kmh,
            dist_m: leg_dist_m,
            dist_futr_m: 0.0,
            proj_travel_s,
            futr_travel_s: 0.0,
            off_earr,
            sched_arr: None,
            off_arrdif_s: None,
            perc_chge: None,
            perf_rate: None,
            wrap_candidate: false,
        };
        attach_schedule(catalog, &mut row);
        rows.push(row);
    }

    attach_future_leg(catalog, &mut rows, b);
    attach_perc_chge(&mut rows);
    let _ = delta_time_s;
    rows
}

fn stationary_row(
    catalog: &RouteCatalog,
    a: &SnappedFix,
    b: &SnappedFix,
    idx: u64,
    proj_speed_kmh: f64,
) -> InterpolatedRow {
    let dist_futr_m = catalog
        .stop_arc_length_m(a.stop_sequence + 1)
        .map(|next| (next - a.arc_length_m).abs())
        .unwrap_or(0.0);
    let futr_travel_s = if proj_speed_kmh.is_finite() && proj_speed_kmh > 0.0 {
        (dist_futr_m / 1000.0) / proj_speed_kmh * 3600.0
    } else {
        0.0
    };

    let mut row = InterpolatedRow {
        trip_id: a.trip_id.clone(),
        route_id: a.route_id.clone(),
        direction: a.direction,
        idx,
        travel_type: TravelType::StationaryRow,
        stop_sequence: a.stop_sequence,
        stop_id: catalog.stop_id_for(a.stop_sequence).unwrap_or_default().to_string(),
        proj_speed_kmh,
        dist_m: 0.0,
        dist_futr_m,
        proj_travel_s: 0.0,
        futr_travel_s,
        off_earr: b.timestamp + Duration::milliseconds((futr_travel_s * 1000.0) as i64),
        sched_arr: None,
        off_arrdif_s: None,
        perc_chge: None,
        perf_rate: None,
        wrap_candidate: false,
    };
    attach_schedule(catalog, &mut row);
    row
}

fn same_stop_row(
    catalog: &RouteCatalog,
    a: &SnappedFix,
    b: &SnappedFix,
    idx: u64,
    travel_type: TravelType,
    proj_speed_kmh: f64,
    _delta_time_s: f64,
) -> InterpolatedRow {
    let dist_m = crate::geometry::distance_m(catalog.sref, a.coord(), b.coord());
    let dist_futr_m = catalog
        .stop_arc_length_m(a.stop_sequence + 1)
        .map(|next| (next - b.arc_length_m).abs())
        .unwrap_or(0.0);
    let futr_travel_s = if proj_speed_kmh.is_finite() && proj_speed_kmh > 0.0 {
        (dist_futr_m / 1000.0) / proj_speed_kmh * 3600.0
    } else {
        0.0
    };

    let mut row = InterpolatedRow {
        trip_id: a.trip_id.clone(),
        route_id: a.route_id.clone(),
        direction: a.direction,
        idx,
        travel_type,
        stop_sequence: a.stop_sequence,
        stop_id: catalog.stop_id_for(a.stop_sequence).unwrap_or_default().to_string(),
        proj_speed_kmh,
        dist_m,
        dist_futr_m,
        proj_travel_s: 0.0,
        futr_travel_s,
        off_earr: b.timestamp + Duration::milliseconds((futr_travel_s * 1000.0) as i64),
        sched_arr: None,
        off_arrdif_s: None,
        perc_chge: None,
        perf_rate: None,
        wrap_candidate: false,
    };
    attach_schedule(catalog, &mut row);
    row
}

fn wrap_row(
    catalog: &RouteCatalog,
    a: &SnappedFix,
    b: &SnappedFix,
    idx: u64,
    proj_speed_kmh: f64,
    dist_m: f64,
    _delta_time_s: f64,
) -> InterpolatedRow {
    let mut row = InterpolatedRow {
        trip_id: a.trip_id.clone(),
        route_id: a.route_id.clone(),
        direction: a.direction,
        idx,
        travel_type: TravelType::SameStopDiffSeg,
        stop_sequence: b.stop_sequence,
        stop_id: catalog.stop_id_for(b.stop_sequence).unwrap_or_default().to_string(),
        proj_speed_kmh,
        dist_m,
        dist_futr_m: 0.0,
        proj_travel_s: 0.0,
        futr_travel_s: 0.0,
        off_earr: b.timestamp,
        sched_arr: None,
        off_arrdif_s: None,
        perc_chge: None,
        perf_rate: None,
        wrap_candidate: true,
    };
    attach_schedule(catalog, &mut row);
    row
}

fn terminus_or_stationary_row(catalog: &RouteCatalog, fix: &SnappedFix) -> InterpolatedRow {
    let travel_type = if fix.mobility_state == Some(MobilityState::Terminus) {
        TravelType::TerminusRow
    } else {
        TravelType::StationaryRow
    };
    let mut row = InterpolatedRow {
        trip_id: fix.trip_id.clone(),
        route_id: fix.route_id.clone(),
        direction: fix.direction,
        idx: fix.barcode,
        travel_type,
        stop_sequence: fix.stop_sequence,
        stop_id: catalog.stop_id_for(fix.stop_sequence).unwrap_or_default().to_string(),
        proj_speed_kmh: 0.0,
        dist_m: 0.0,
        dist_futr_m: 0.0,
        proj_travel_s: 0.0,
        futr_travel_s: 0.0,
        off_earr: fix.timestamp,
        sched_arr: None,
        off_arrdif_s: None,
        perc_chge: None,
        perf_rate: None,
        wrap_candidate: false,
    };
    attach_schedule(catalog, &mut row);
    row
}

/// attaches the future leg (B → B's next stop) to the final row of a
/// `BtwnStops`/`OneStop` emission.
fn attach_future_leg(catalog: &RouteCatalog, rows: &mut [InterpolatedRow], b: &SnappedFix) {
    let Some(last) = rows.last_mut() else { return };
    let dist_futr_m = catalog
        .stop_arc_length_m(b.stop_sequence + 1)
        .map(|next| (next - b.arc_length_m).abs())
        .unwrap_or(0.0);
    let futr_travel_s = if last.proj_speed_kmh.is_finite() && last.proj_speed_kmh > 0.0 {
        (dist_futr_m / 1000.0) / last.proj_speed_kmh * 3600.0
    } else {
        0.0
    };
    last.dist_futr_m = dist_futr_m;
    last.futr_travel_s = futr_travel_s;
}

fn attach_schedule(catalog: &RouteCatalog, row: &mut InterpolatedRow) {
    let sched = catalog
        .stop_table
        .get(&(row.trip_id.clone(), row.stop_sequence))
        .and_then(|s| s.scheduled_arrival.or(s.scheduled_departure));
    let Some(sched) = sched else { return };
    let sched_arr = sched.to_utc(catalog.service_date);
    let off_arrdif_s = (sched_arr - row.off_earr).num_milliseconds() as f64 / 1000.0;
    row.sched_arr = Some(sched_arr);
    row.off_arrdif_s = Some(off_arrdif_s);
    row.perf_rate = Some(PerfRate::classify(off_arrdif_s));
}

/// `perc_chge = (off_arrdif[i] − off_arrdif[i−1]) / |off_arrdif[i−1]| · 100`,
/// undefined for the first row of the sequence.
fn attach_perc_chge(rows: &mut [InterpolatedRow]) {
    for i in 1..rows.len() {
        let (prev, curr) = (rows[i - 1].off_arrdif_s, rows[i].off_arrdif_s);
        if let (Some(prev), Some(curr)) = (prev, curr) {
            if prev.abs() > f64::EPSILON {
                rows[i].perc_chge = Some((curr - prev) / prev.abs() * 100.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RawSegment, RawStopTime, RouteCatalog};
    use crate::geometry::SpatialRef;
    use crate::time::ServiceTimeOffset;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn catalog_three_stops() -> RouteCatalog {
        let segments = vec![
            RawSegment { seg_index: 0, path: [(0.0, 0.0), (100.0, 0.0)], stop_sequence: 1, stop_id: "S1".into() },
            RawSegment { seg_index: 1, path: [(100.0, 0.0), (200.0, 0.0)], stop_sequence: 2, stop_id: "S2".into() },
            RawSegment { seg_index: 2, path: [(200.0, 0.0), (300.0, 0.0)], stop_sequence: 3, stop_id: "S3".into() },
        ];
        let stop_times = vec![RawStopTime {
            trip_id: "T1".into(),
            stop_sequence: 2,
            stop_id: "S2".into(),
            scheduled_arrival: ServiceTimeOffset::parse("08:01:00"),
            scheduled_departure: None,
        }];
        RouteCatalog::build(
            "R1".into(),
            0,
            SpatialRef::new(3857),
            segments,
            stop_times,
            NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
        )
        .unwrap()
    }

    fn fix(stop_sequence: u32, seg_index: usize, arc_length_m: f64, minute: u32, second: u32, barcode: u64) -> SnappedFix {
        SnappedFix {
            trip_id: "T1".into(),
            route_id: "R1".into(),
            direction: 0,
            vehicle_id: "V1".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 7, 28, 8, minute, second).unwrap(),
            barcode,
            seg_index,
            stop_sequence,
            point: (arc_length_m, 0.0),
            arc_length_m,
            snap_distance_m: 0.0,
            mobility_state: Some(MobilityState::Movement),
        }
    }

    #[test]
    fn one_stop_crossing_lands_on_time() {
        let catalog = catalog_three_stops();
        let a = fix(1, 0, 50.0, 0, 0, 1);
        let b = fix(2, 1, 150.0, 1, 0, 2);
        let rows = interpolate_trip(&catalog, &[a, b]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stop_sequence, 2);
        assert_eq!(rows[0].travel_type, TravelType::OneStop);
        assert!(rows[0].perf_rate.is_some());
    }

    #[test]
    fn same_stop_same_seg_is_stationary_or_synthesized() {
        let catalog = catalog_three_stops();
        let mut a = fix(2, 1, 150.0, 0, 0, 1);
        let b = fix(2, 1, 151.0, 0, 15, 2);
        a.mobility_state = Some(MobilityState::Stationary);
        let rows = interpolate_trip(&catalog, &[a, b]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].travel_type, TravelType::StationaryRow);
    }

    #[test]
    fn wrap_candidate_flagged_for_large_backward_stop_jump() {
        let catalog = catalog_three_stops();
        let a = fix(3, 2, 280.0, 0, 0, 1);
        let b = fix(1, 0, 10.0, 1, 0, 2);
        let rows = interpolate_trip(&catalog, &[a, b]);
        assert!(rows.iter().any(|r| r.wrap_candidate));
    }
}
