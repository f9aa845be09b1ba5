//! Route catalog loader (C2). Builds and validates the per-route geometry/schedule
//! catalog that C3–C6 project against. The catalog is assembled once per
//! `(route_id, direction)` and shared read-only by every worker.
//!
//! Bulk shapefile/GTFS I/O lives outside this crate; this module consumes
//! already-parsed rows (`RawSegment`, `RawStopTime`) and owns only the assembly,
//! validation, and in-memory spatial index.

use chrono::NaiveDate;
use geo::{Coord, LineString};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;

use crate::error::{PipelineError, Result};
use crate::geometry::{self, SpatialRef};
use crate::time::ServiceTimeOffset;

pub type RouteKey = (String, u8);

/// one inter-stop piece of the undissolved polyline, carrying the stop attributes
/// needed to place it on the route.
#[derive(Debug, Clone)]
pub struct Segment {
    pub seg_index: u32,
    pub path: (Coord<f64>, Coord<f64>),
    pub stop_sequence: u32,
    pub stop_id: String,
}

/// a row as read from `Route/<route_id>_<direction>_undissolved.shp`, before
/// validation.
#[derive(Debug, Clone)]
pub struct RawSegment {
    pub seg_index: u32,
    pub path: [(f64, f64); 2],
    pub stop_sequence: u32,
    pub stop_id: String,
}

/// a row as read from `stop_times.txt`, before validation.
#[derive(Debug, Clone)]
pub struct RawStopTime {
    pub trip_id: String,
    pub stop_sequence: u32,
    pub stop_id: String,
    pub scheduled_arrival: Option<ServiceTimeOffset>,
    pub scheduled_departure: Option<ServiceTimeOffset>,
}

#[derive(Debug, Clone)]
pub struct ScheduledStopTime {
    pub stop_id: String,
    pub scheduled_arrival: Option<ServiceTimeOffset>,
    pub scheduled_departure: Option<ServiceTimeOffset>,
}

/// an `rstar` index entry over one undissolved segment's bounding envelope, used by
/// the geolocator (C3) to recover candidate segments near a snap point in
/// `O(log n)` instead of a linear scan.
#[derive(Debug, Clone)]
pub struct SegmentEntry {
    pub index_in_segments: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for SegmentEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// per-route geometry and schedule catalog.
pub struct RouteCatalog {
    pub route_id: String,
    pub direction: u8,
    pub sref: SpatialRef,
    pub segments: Vec<Segment>,
    pub dissolved: LineString<f64>,
    /// cumulative arc length (meters) to each vertex of `dissolved`, `cumulative_m[0] == 0.0`.
    pub cumulative_m: Vec<f64>,
    pub spatial_index: RTree<SegmentEntry>,
    pub stop_table: HashMap<(String, u32), ScheduledStopTime>,
    pub max_stop_sequence: u32,
    pub max_seg_index: u32,
    pub max_stop_seq_validated: bool,
    pub service_date: NaiveDate,
}

impl RouteCatalog {
    /// assembles and validates a `RouteCatalog` from raw rows.
    pub fn build(
        route_id: String,
        direction: u8,
        sref: SpatialRef,
        mut raw_segments: Vec<RawSegment>,
        raw_stop_times: Vec<RawStopTime>,
        service_date: NaiveDate,
    ) -> Result<RouteCatalog> {
        if raw_segments.is_empty() {
            return Err(PipelineError::CatalogInvalid {
                route_id,
                direction,
                reason: "undissolved polyline has no segments".to_string(),
            });
        }

        raw_segments.sort_by_key(|s| s.seg_index);

        // invariant: seg_index strictly increasing along the dissolved polyline.
        for pair in raw_segments.windows(2) {
            if pair[1].seg_index <= pair[0].seg_index {
                return Err(PipelineError::CatalogInvalid {
                    route_id,
                    direction,
                    reason: format!(
                        "seg_index not strictly increasing: {} followed by {}",
                        pair[0].seg_index, pair[1].seg_index
                    ),
                });
            }
        }
        // invariant: stop_sequence non-decreasing along seg_index.
        for pair in raw_segments.windows(2) {
            if pair[1].stop_sequence < pair[0].stop_sequence {
                return Err(PipelineError::CatalogInvalid {
                    route_id,
                    direction,
                    reason: format!(
                        "stop_sequence decreases along seg_index at seg_index {}",
                        pair[1].seg_index
                    ),
                });
            }
        }

        let polyline_max_stop_seq = raw_segments.iter().map(|s| s.stop_sequence).max().unwrap_or(0);
        let stop_list_max_stop_seq = raw_stop_times.iter().map(|s| s.stop_sequence).max().unwrap_or(0);

        let (max_stop_sequence, max_stop_seq_validated) = if stop_list_max_stop_seq > polyline_max_stop_seq
        {
            (polyline_max_stop_seq, false)
        } else {
            (stop_list_max_stop_seq.max(polyline_max_stop_seq.min(stop_list_max_stop_seq)), true)
        };
        // when the stop list under-reports (e.g. empty), fall back to the polyline's reach.
        let max_stop_sequence = if max_stop_sequence == 0 {
            polyline_max_stop_seq
        } else {
            max_stop_sequence
        };

        let observed: std::collections::HashSet<u32> =
            raw_segments.iter().map(|s| s.stop_sequence).collect();
        for seq in 1..=max_stop_sequence {
            if !observed.contains(&seq) {
                return Err(PipelineError::CatalogInvalid {
                    route_id,
                    direction,
                    reason: format!("stop_sequence {seq} never appears on the undissolved polyline"),
                });
            }
        }

        let max_seg_index = raw_segments.iter().map(|s| s.seg_index).max().unwrap_or(0);

        let segments: Vec<Segment> = raw_segments
            .iter()
            .map(|s| Segment {
                seg_index: s.seg_index,
                path: (
                    Coord { x: s.path[0].0, y: s.path[0].1 },
                    Coord { x: s.path[1].0, y: s.path[1].1 },
                ),
                stop_sequence: s.stop_sequence,
                stop_id: s.stop_id.clone(),
            })
            .collect();

        let dissolved = dissolve(&segments);
        let cumulative_m = cumulative_arc_length(sref, &dissolved);

        let mut spatial_index_entries = Vec::with_capacity(segments.len());
        for (i, seg) in segments.iter().enumerate() {
            let (a, b) = seg.path;
            let envelope = AABB::from_corners(
                [a.x.min(b.x) - geometry::CONTAINMENT_TOL, a.y.min(b.y) - geometry::CONTAINMENT_TOL],
                [a.x.max(b.x) + geometry::CONTAINMENT_TOL, a.y.max(b.y) + geometry::CONTAINMENT_TOL],
            );
            spatial_index_entries.push(SegmentEntry {
                index_in_segments: i,
                envelope,
            });
        }
        let spatial_index = RTree::bulk_load(spatial_index_entries);

        let mut stop_table = HashMap::with_capacity(raw_stop_times.len());
        for row in raw_stop_times {
            stop_table.insert(
                (row.trip_id, row.stop_sequence),
                ScheduledStopTime {
                    stop_id: row.stop_id,
                    scheduled_arrival: row.scheduled_arrival,
                    scheduled_departure: row.scheduled_departure,
                },
            );
        }

        Ok(RouteCatalog {
            route_id,
            direction,
            sref,
            segments,
            dissolved,
            cumulative_m,
            spatial_index,
            stop_table,
            max_stop_sequence,
            max_seg_index,
            max_stop_seq_validated,
            service_date,
        })
    }

    /// arc length (meters) from the start of the dissolved polyline to `point`,
    /// given the segment it was projected onto.
    pub fn arc_length_at(&self, segment_index: usize, point: Coord<f64>) -> f64 {
        let base = self.cumulative_m.get(segment_index).copied().unwrap_or(0.0);
        let seg_start = self.dissolved.0[segment_index];
        base + geometry::distance_m(self.sref, seg_start, point)
    }

    /// arc length (meters) to the first dissolved-polyline vertex at which
    /// `stop_sequence` is reached, or `None` if it never appears.
    pub fn stop_arc_length_m(&self, stop_sequence: u32) -> Option<f64> {
        let seg = self.segments.iter().find(|s| s.stop_sequence == stop_sequence)?;
        self.cumulative_m.get(seg.seg_index as usize).copied()
    }

    /// the `stop_id` first associated with `stop_sequence` on this route.
    pub fn stop_id_for(&self, stop_sequence: u32) -> Option<&str> {
        self.segments
            .iter()
            .find(|s| s.stop_sequence == stop_sequence)
            .map(|s| s.stop_id.as_str())
    }
}

/// concatenates segment paths in traversal order into one continuous polyline,
/// dropping the duplicate vertex where consecutive segments share an endpoint.
fn dissolve(segments: &[Segment]) -> LineString<f64> {
    let mut points: Vec<Coord<f64>> = Vec::with_capacity(segments.len() + 1);
    for seg in segments {
        let (a, b) = seg.path;
        match points.last() {
            Some(last) if coords_close(*last, a) => {}
            _ => points.push(a),
        }
        points.push(b);
    }
    LineString::new(points)
}

fn coords_close(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
}

fn cumulative_arc_length(sref: SpatialRef, polyline: &LineString<f64>) -> Vec<f64> {
    let coords: Vec<Coord<f64>> = polyline.coords().copied().collect();
    let mut out = Vec::with_capacity(coords.len());
    let mut acc = 0.0;
    out.push(0.0);
    for pair in coords.windows(2) {
        acc += geometry::segment_length_m(sref, (pair[0], pair[1]));
        out.push(acc);
    }
    out
}
