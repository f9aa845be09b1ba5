//! Geometry primitives: point-to-polyline projection, segment containment, and
//! arc length in either WGS84 (haversine) or a projected, metric coordinate
//! system (Euclidean). Kept dependency-light and stateless — callers in
//! `catalog` and `geolocator` hold whatever caches (cumulative arc length, spatial
//! index) make repeated calls cheap.

use geo::{line_string, Coord, Euclidean, Haversine, Length, LineString};

/// numeric tolerance for segment containment, expressed in the native coordinate
/// units of the configured spatial reference (degrees for WGS84).
pub const CONTAINMENT_TOL: f64 = 1e-7;

/// the configurable spatial reference (WKID, default 4326) the pipeline is
/// operating in; we only need to know whether distances should be measured
/// geodetically (WGS84, degrees-valued coordinates) or in a projected,
/// already-metric coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialRef {
    pub wkid: i32,
}

impl Default for SpatialRef {
    fn default() -> Self {
        SpatialRef { wkid: 4326 }
    }
}

impl SpatialRef {
    pub fn new(wkid: i32) -> Self {
        SpatialRef { wkid }
    }

    /// true if coordinates are geographic (lon/lat degrees) and distances must be
    /// computed with a great-circle formula; false if the WKID is already a
    /// projected, Euclidean-metric coordinate system.
    pub fn is_geographic(&self) -> bool {
        self.wkid == 4326
    }
}

/// distance between two coordinates in meters, dispatching on the spatial
/// reference: great-circle for WGS84, Euclidean in projected meters for
/// projected WKIDs.
pub fn distance_m(sref: SpatialRef, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let line: LineString<f64> = line_string![a, b];
    if sref.is_geographic() {
        Haversine.length(&line)
    } else {
        Euclidean.length(&line)
    }
}

/// length of a two-point segment in meters.
pub fn segment_length_m(sref: SpatialRef, seg: (Coord<f64>, Coord<f64>)) -> f64 {
    distance_m(sref, seg.0, seg.1)
}

/// result of projecting a point onto a polyline: the closest point on the polyline,
/// the index of the containing segment (the segment `[polyline[i], polyline[i+1]]`),
/// and the interpolation parameter `t in [0,1]` of the projection along that segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub point: Coord<f64>,
    pub segment_index: usize,
    pub t: f64,
}

/// projects `pt` onto `polyline`, returning the globally closest point —
/// minimizing Euclidean distance in the source WKID, so the snap always finds
/// the globally-closest projection rather than settling for the first
/// candidate segment checked. Containment/selection among candidate segments is
/// always plain Euclidean in the coordinate system as given (degrees for
/// WGS84, meters for a projected WKID) — only length/arc measurement
/// downstream switches to haversine.
///
/// Returns `None` if the polyline has fewer than two points (the empty-polyline
/// case is flagged as a `Geometric` error by callers).
pub fn project_point_to_polyline(pt: Coord<f64>, polyline: &LineString<f64>) -> Option<Projection> {
    let coords: Vec<Coord<f64>> = polyline.coords().copied().collect();
    if coords.len() < 2 {
        return None;
    }

    let mut best: Option<Projection> = None;
    let mut best_dist_sq = f64::INFINITY;

    for (i, pair) in coords.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let (t, proj) = closest_point_on_segment(pt, a, b);
        let dx = proj.x - pt.x;
        let dy = proj.y - pt.y;
        let dist_sq = dx * dx + dy * dy;
        if dist_sq < best_dist_sq {
            best_dist_sq = dist_sq;
            best = Some(Projection {
                point: proj,
                segment_index: i,
                t,
            });
        }
    }

    best
}

/// closest point on the segment `a-b` to `pt`, clamped to the segment's extent.
/// returns the (unclamped-but-reported) interpolation parameter and the clamped
/// point itself.
fn closest_point_on_segment(pt: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> (f64, Coord<f64>) {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let len_sq = abx * abx + aby * aby;
    if len_sq <= f64::EPSILON {
        return (0.0, a);
    }
    let apx = pt.x - a.x;
    let apy = pt.y - a.y;
    let raw_t = (apx * abx + apy * aby) / len_sq;
    let t = raw_t.clamp(0.0, 1.0);
    let point = Coord {
        x: a.x + t * abx,
        y: a.y + t * aby,
    };
    (t, point)
}

/// true if `pt` lies within `tol` of `segment`, where `tol` is a
/// perpendicular-distance tolerance in the native coordinate units. The segment's
/// unclamped projection parameter must also land within `[-tol, 1+tol]` of the
/// segment's own extent (scaled to length-`1` parametrization) so that a point far
/// past either endpoint, even if perpendicular-close to the segment's infinite line,
/// is not considered contained.
pub fn point_in_segment(pt: Coord<f64>, segment: (Coord<f64>, Coord<f64>), tol: f64) -> bool {
    let (a, b) = segment;
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let len_sq = abx * abx + aby * aby;
    if len_sq <= f64::EPSILON {
        let dx = pt.x - a.x;
        let dy = pt.y - a.y;
        return (dx * dx + dy * dy).sqrt() <= tol;
    }
    let apx = pt.x - a.x;
    let apy = pt.y - a.y;
    let raw_t = (apx * abx + apy * aby) / len_sq;

    let seg_len = len_sq.sqrt();
    let t_tol = tol / seg_len;
    if raw_t < -t_tol || raw_t > 1.0 + t_tol {
        return false;
    }

    let foot = Coord {
        x: a.x + raw_t * abx,
        y: a.y + raw_t * aby,
    };
    let dx = pt.x - foot.x;
    let dy = pt.y - foot.y;
    (dx * dx + dy * dy).sqrt() <= tol
}

/// sum of segment lengths (meters) of `polyline` strictly between
/// `seg_index_a` and `seg_index_b` (inclusive of both endpoints' segments).
/// Indices are segment indices (`polyline[i]..polyline[i+1]`);
/// order-independent (returns a non-negative length regardless of which index is
/// larger).
pub fn polyline_length_between(
    sref: SpatialRef,
    polyline: &LineString<f64>,
    seg_index_a: usize,
    seg_index_b: usize,
) -> f64 {
    let (lo, hi) = if seg_index_a <= seg_index_b {
        (seg_index_a, seg_index_b)
    } else {
        (seg_index_b, seg_index_a)
    };
    let coords: Vec<Coord<f64>> = polyline.coords().copied().collect();
    let mut total = 0.0;
    for i in lo..hi {
        if i + 1 >= coords.len() {
            break;
        }
        total += segment_length_m(sref, (coords[i], coords[i + 1]));
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    #[test]
    fn projects_onto_nearest_segment() {
        let polyline: LineString<f64> = line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ];
        let proj = project_point_to_polyline(Coord { x: 0.5, y: 0.1 }, &polyline).unwrap();
        assert_eq!(proj.segment_index, 0);
        assert!((proj.point.x - 0.5).abs() < 1e-9);
        assert!((proj.point.y - 0.0).abs() < 1e-9);
    }

    #[test]
    fn containment_respects_tolerance() {
        let a = Coord { x: 0.0, y: 0.0 };
        let b = Coord { x: 1.0, y: 0.0 };
        assert!(point_in_segment(Coord { x: 0.5, y: 0.0 }, (a, b), CONTAINMENT_TOL));
        assert!(!point_in_segment(Coord { x: 0.5, y: 1.0 }, (a, b), CONTAINMENT_TOL));
        assert!(!point_in_segment(Coord { x: 2.0, y: 0.0 }, (a, b), CONTAINMENT_TOL));
    }

    #[test]
    fn polyline_length_between_sums_segments() {
        let polyline: LineString<f64> = line_string![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 2.0),
        ];
        let sref = SpatialRef::new(3857); // projected, Euclidean meters
        let total = polyline_length_between(sref, &polyline, 0, 1);
        assert!((total - 1.0).abs() < 1e-9);
    }
}
