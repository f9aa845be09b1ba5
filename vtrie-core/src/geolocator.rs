//! Geolocator (C3): snaps raw [`Fix`] samples onto a route's dissolved
//! polyline, resolving the ambiguity that self-overlapping (looping,
//! out-and-back) routes create by tracking each trip's last-accepted segment and
//! preferring candidates that keep it moving forward along the route.
//!
//! Candidate segments are recovered from the catalog's `rstar` index rather than
//! by scanning every segment, since routes can carry thousands of undissolved
//! segments.

use std::collections::HashMap;

use geo::Coord;
use ordered_float::OrderedFloat;
use rstar::AABB;

use crate::catalog::RouteCatalog;
use crate::error::{PipelineError, Result};
use crate::fix::{Fix, SnappedFix};
use crate::geometry;

/// default bound (meters) past which a fix fails to geolocate and is
/// dropped rather than snapped to a wildly distant segment.
pub const DEFAULT_SNAP_DISTANCE_BOUND_M: f64 = 200.0;

/// how far beyond a candidate segment's own extent the R-tree query envelope is
/// padded, in the catalog's native coordinate units, before the clamped
/// projection distance from [`geometry::project_point_to_polyline`] is checked
/// against `snap_distance_bound_m` in [`snap_one`].
const QUERY_PAD: f64 = 1e-2;

struct TripState {
    last_accepted_seg_index: usize,
}

/// snaps a stream of fixes (already filtered to one `(route_id, direction)`,
/// in arrival order) against `catalog`.
///
/// Fixes belonging to different trips are tracked independently; within a trip,
/// candidates at or after the last accepted segment are preferred over strictly
/// earlier ones, so a vehicle re-crossing its own path on a loop route keeps
/// advancing instead of snapping backward onto an earlier pass.
pub fn snap_fixes(catalog: &RouteCatalog, fixes: &[Fix], snap_distance_bound_m: f64) -> Vec<SnappedFix> {
    let mut trip_state: HashMap<String, TripState> = HashMap::new();
    let mut out = Vec::with_capacity(fixes.len());
    let mut barcode: u64 = 0;

    for fix in fixes {
        let Some(snapped) = snap_one(catalog, fix, snap_distance_bound_m, &mut trip_state) else {
            log::debug!(
                "dropping fix trip={} vehicle={} ts={}: no segment within {snap_distance_bound_m}m",
                fix.trip_id,
                fix.vehicle_id,
                fix.timestamp
            );
            continue;
        };
        barcode += 1;
        out.push(SnappedFix { barcode, ..snapped });
    }

    out
}

fn snap_one(
    catalog: &RouteCatalog,
    fix: &Fix,
    snap_distance_bound_m: f64,
    trip_state: &mut HashMap<String, TripState>,
) -> Option<SnappedFix> {
    let pt = fix.coord();
    let candidates = candidate_segments(catalog, pt);

    let state = trip_state.get(&fix.trip_id);
    let floor = state.map(|s| s.last_accepted_seg_index).unwrap_or(0);

    let forward = candidates.iter().filter(|(idx, _)| *idx >= floor).copied();
    let chosen = closest_of(pt, forward).or_else(|| closest_of(pt, candidates.iter().copied()))?;

    let (seg_index, proj) = chosen;
    let snap_distance_m = geometry::distance_m(catalog.sref, pt, proj.point);
    if snap_distance_m > snap_distance_bound_m {
        return None;
    }

    trip_state
        .entry(fix.trip_id.clone())
        .and_modify(|s| s.last_accepted_seg_index = s.last_accepted_seg_index.max(seg_index))
        .or_insert(TripState { last_accepted_seg_index: seg_index });

    let stop_sequence = catalog
        .segments
        .get(seg_index.min(catalog.segments.len().saturating_sub(1)))
        .map(|s| s.stop_sequence)
        .unwrap_or(0);

    Some(SnappedFix {
        trip_id: fix.trip_id.clone(),
        route_id: fix.route_id.clone(),
        direction: fix.direction,
        vehicle_id: fix.vehicle_id.clone(),
        timestamp: fix.timestamp,
        barcode: 0,
        seg_index,
        stop_sequence,
        point: (proj.point.x, proj.point.y),
        arc_length_m: catalog.arc_length_at(seg_index, proj.point),
        snap_distance_m,
        mobility_state: None,
    })
}

/// candidate `(segment_index, perpendicular-distance projection)` pairs drawn from
/// the R-tree, expanding the query envelope until at least one candidate is found
/// or the whole catalog has been covered.
fn candidate_segments(catalog: &RouteCatalog, pt: Coord<f64>) -> Vec<(usize, geometry::Projection)> {
    let mut pad = QUERY_PAD;
    loop {
        let envelope = AABB::from_corners([pt.x - pad, pt.y - pad], [pt.x + pad, pt.y + pad]);
        let hits: Vec<(usize, geometry::Projection)> = catalog
            .spatial_index
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|entry| {
                let seg = catalog.segments.get(entry.index_in_segments)?;
                let line = geo::LineString::new(vec![seg.path.0, seg.path.1]);
                let proj = geometry::project_point_to_polyline(pt, &line)?;
                Some((entry.index_in_segments, proj))
            })
            .collect();

        if !hits.is_empty() || pad > 10.0 {
            return hits;
        }
        pad *= 4.0;
    }
}

fn closest_of(
    pt: Coord<f64>,
    candidates: impl Iterator<Item = (usize, geometry::Projection)>,
) -> Option<(usize, geometry::Projection)> {
    candidates.min_by_key(|(_, proj)| {
        let dx = proj.point.x - pt.x;
        let dy = proj.point.y - pt.y;
        OrderedFloat(dx * dx + dy * dy)
    })
}

/// a route whose dissolved polyline cannot be projected onto at all
/// (degenerate, single-point geometry) is a `Geometric` error rather than a
/// per-fix drop, since no fix on that route could ever succeed.
pub fn require_projectable(catalog: &RouteCatalog) -> Result<()> {
    if catalog.dissolved.0.len() < 2 {
        return Err(PipelineError::Geometric(format!(
            "route {} direction {} has a degenerate dissolved polyline",
            catalog.route_id, catalog.direction
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RawSegment, RouteCatalog};
    use crate::geometry::SpatialRef;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn catalog_straight_line() -> RouteCatalog {
        let segments = vec![
            RawSegment { seg_index: 0, path: [(0.0, 0.0), (1.0, 0.0)], stop_sequence: 1, stop_id: "A".into() },
            RawSegment { seg_index: 1, path: [(1.0, 0.0), (2.0, 0.0)], stop_sequence: 2, stop_id: "B".into() },
        ];
        RouteCatalog::build(
            "R1".into(),
            0,
            SpatialRef::new(3857),
            segments,
            vec![],
            NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn snaps_fix_onto_nearest_segment() {
        let catalog = catalog_straight_line();
        let fix = Fix {
            trip_id: "T1".into(),
            route_id: "R1".into(),
            direction: 0,
            vehicle_id: "V1".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 7, 28, 8, 0, 0).unwrap(),
            lon: 0.5,
            lat: 0.01,
        };
        let snapped = snap_fixes(&catalog, &[fix], DEFAULT_SNAP_DISTANCE_BOUND_M);
        assert_eq!(snapped.len(), 1);
        assert_eq!(snapped[0].seg_index, 0);
        assert_eq!(snapped[0].barcode, 1);
    }

    #[test]
    fn drops_fix_beyond_snap_distance_bound() {
        let catalog = catalog_straight_line();
        let fix = Fix {
            trip_id: "T1".into(),
            route_id: "R1".into(),
            direction: 0,
            vehicle_id: "V1".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 7, 28, 8, 0, 0).unwrap(),
            lon: 0.5,
            lat: 500.0,
        };
        let snapped = snap_fixes(&catalog, &[fix], DEFAULT_SNAP_DISTANCE_BOUND_M);
        assert!(snapped.is_empty());
    }

    #[test]
    fn prefers_forward_segment_for_same_trip() {
        let catalog = catalog_straight_line();
        let fixes = vec![
            Fix {
                trip_id: "T1".into(),
                route_id: "R1".into(),
                direction: 0,
                vehicle_id: "V1".into(),
                timestamp: Utc.with_ymd_and_hms(2026, 7, 28, 8, 0, 0).unwrap(),
                lon: 1.5,
                lat: 0.0,
            },
            Fix {
                trip_id: "T1".into(),
                route_id: "R1".into(),
                direction: 0,
                vehicle_id: "V1".into(),
                timestamp: Utc.with_ymd_and_hms(2026, 7, 28, 8, 1, 0).unwrap(),
                lon: 1.6,
                lat: 0.0,
            },
        ];
        let snapped = snap_fixes(&catalog, &fixes, DEFAULT_SNAP_DISTANCE_BOUND_M);
        assert_eq!(snapped[0].seg_index, 1);
        assert_eq!(snapped[1].seg_index, 1);
    }
}
