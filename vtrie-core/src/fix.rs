//! Raw and snapped vehicle position fixes.

use chrono::{DateTime, Utc};
use geo::Coord;
use serde::{Deserialize, Serialize};

/// one GTFS-Realtime vehicle position sample as read off the wire/CSV, already
/// resolved to a UTC instant by the caller before entering the core pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub trip_id: String,
    pub route_id: String,
    pub direction: u8,
    pub vehicle_id: String,
    pub timestamp: DateTime<Utc>,
    pub lon: f64,
    pub lat: f64,
}

impl Fix {
    pub fn coord(&self) -> Coord<f64> {
        Coord { x: self.lon, y: self.lat }
    }
}

/// mobility state assigned during enrichment, carried forward onto each
/// snapped fix so C5/C6 can classify travel type without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MobilityState {
    Stationary,
    Movement,
    Terminus,
}

/// a [`Fix`] after C3 snapping: its projection onto the route's dissolved
/// polyline, the containing segment, and the barcode ordinal that breaks ties
/// among same-timestamp fixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnappedFix {
    pub trip_id: String,
    pub route_id: String,
    pub direction: u8,
    pub vehicle_id: String,
    pub timestamp: DateTime<Utc>,
    pub barcode: u64,
    pub seg_index: usize,
    pub stop_sequence: u32,
    /// the snap point itself, `(lon, lat)` or `(x, y)` in the route's spatial
    /// reference. Stored as a tuple rather than `geo::Coord` so this type stays
    /// trivially (de)serializable regardless of `geo`'s serde feature surface.
    pub point: (f64, f64),
    pub arc_length_m: f64,
    pub snap_distance_m: f64,
    pub mobility_state: Option<MobilityState>,
}

impl SnappedFix {
    pub fn coord(&self) -> Coord<f64> {
        Coord { x: self.point.0, y: self.point.1 }
    }
}
