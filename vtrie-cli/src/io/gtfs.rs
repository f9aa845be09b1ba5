//! Static GTFS bundle reader. Builds the trip index (`trip_id -> (route_id,
//! direction)`) from `trips.txt`/`stop_times.txt` via `gtfs_structures`, and
//! assembles one [`RouteCatalog`] per `(route_id, direction)` from the
//! catalog-generation collaborator's pre-derived shapefiles, via `shapefile`.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use gtfs_structures::{DirectionType, Gtfs};
use shapefile::dbase::{FieldValue, Record};
use shapefile::Shape;
use vtrie_core::catalog::{RawSegment, RawStopTime, RouteCatalog};
use vtrie_core::geometry::SpatialRef;
use vtrie_core::time::ServiceTimeOffset;

use crate::error::CliError;
use crate::layout::StageLayout;

/// loads `trips.txt` once and resolves every `trip_id` to `(route_id, direction)`.
pub fn load_trip_index(gtfs: &Gtfs) -> HashMap<String, (String, u8)> {
    gtfs.trips
        .values()
        .map(|trip| {
            let direction = match trip.direction_id {
                Some(DirectionType::Outbound) | None => 0,
                Some(DirectionType::Inbound) => 1,
            };
            (trip.id.clone(), (trip.route_id.clone(), direction))
        })
        .collect()
}

/// assembles `stop_times.txt` rows for `trip_id`s belonging to `route_id` into
/// [`RawStopTime`] entries ready for [`RouteCatalog::build`].
pub fn stop_times_for_route(gtfs: &Gtfs, route_id: &str, direction: u8, trip_index: &HashMap<String, (String, u8)>) -> Vec<RawStopTime> {
    let mut rows = Vec::new();
    for (trip_id, trip) in gtfs.trips.iter() {
        match trip_index.get(trip_id) {
            Some((r, d)) if r == route_id && *d == direction => {}
            _ => continue,
        }
        for stop_time in &trip.stop_times {
            rows.push(RawStopTime {
                trip_id: trip_id.clone(),
                stop_sequence: stop_time.stop_sequence as u32,
                stop_id: stop_time.stop.id.clone(),
                scheduled_arrival: stop_time.arrival_time.and_then(|secs| ServiceTimeOffset::parse(&seconds_to_clock(secs))),
                scheduled_departure: stop_time.departure_time.and_then(|secs| ServiceTimeOffset::parse(&seconds_to_clock(secs))),
            });
        }
    }
    rows
}

fn seconds_to_clock(total_seconds: u32) -> String {
    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// reads the undissolved-polyline shapefile for one `(route_id, direction)`
/// into [`RawSegment`] rows, from the
/// `Route/<route_id>_<direction>_undissolved.shp` layer.
pub fn read_undissolved_segments(layout: &StageLayout, gtfs_date: NaiveDate, route_id: &str, direction: u8) -> Result<Vec<RawSegment>, CliError> {
    let path = layout.route_undissolved(gtfs_date, route_id, direction);
    read_segments(&path)
}

fn read_segments(path: &Path) -> Result<Vec<RawSegment>, CliError> {
    let rows = shapefile::read(path)?;
    let mut segments = Vec::with_capacity(rows.len());
    for (shape, record) in rows {
        let Shape::Polyline(polyline) = shape else {
            continue;
        };
        let Some(part) = polyline.parts().first() else {
            continue;
        };
        if part.len() < 2 {
            continue;
        }
        let start = (part[0].x, part[0].y);
        let end = (part[part.len() - 1].x, part[part.len() - 1].y);

        let seg_index = field_as_u32(&record, "index").unwrap_or(0);
        let stop_sequence = field_as_u32(&record, "stop_seque").or_else(|| field_as_u32(&record, "stop_sequence")).unwrap_or(0);
        let stop_id = field_as_string(&record, "stop_id").unwrap_or_default();

        segments.push(RawSegment {
            seg_index,
            path: [start, end],
            stop_sequence,
            stop_id,
        });
    }
    Ok(segments)
}

fn field_as_u32(record: &Record, field: &str) -> Option<u32> {
    match record.get(field)? {
        FieldValue::Numeric(Some(n)) => Some(*n as u32),
        FieldValue::Integer(n) => Some(*n as u32),
        _ => None,
    }
}

fn field_as_string(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        FieldValue::Character(Some(s)) => Some(s.clone()),
        _ => None,
    }
}

/// reads the `Stops/<route_id>_<direction>.shp` point layer into a
/// `stop_id -> (lon, lat)` map, for the GeoJSON output writer's row geometries.
pub fn read_stop_points(layout: &StageLayout, gtfs_date: NaiveDate, route_id: &str, direction: u8) -> Result<HashMap<String, (f64, f64)>, CliError> {
    let path = layout.stops(gtfs_date, route_id, direction);
    let rows = shapefile::read(&path)?;
    let mut points = HashMap::with_capacity(rows.len());
    for (shape, record) in rows {
        let Shape::Point(point) = shape else { continue };
        if let Some(stop_id) = field_as_string(&record, "stop_id") {
            points.insert(stop_id, (point.x, point.y));
        }
    }
    Ok(points)
}

/// builds every `RouteCatalog` referenced by `routes` (the `(route_id,
/// direction)` pairs actually observed in the day's fixes).
pub fn build_catalogs(
    gtfs: &Gtfs,
    layout: &StageLayout,
    gtfs_date: NaiveDate,
    service_date: NaiveDate,
    sref: SpatialRef,
    trip_index: &HashMap<String, (String, u8)>,
    routes: &[(String, u8)],
) -> Result<HashMap<(String, u8), RouteCatalog>, CliError> {
    let mut catalogs = HashMap::with_capacity(routes.len());
    for (route_id, direction) in routes {
        let segments = read_undissolved_segments(layout, gtfs_date, route_id, *direction)?;
        let stop_times = stop_times_for_route(gtfs, route_id, *direction, trip_index);
        let catalog = RouteCatalog::build(route_id.clone(), *direction, sref, segments, stop_times, service_date)?;
        catalogs.insert((route_id.clone(), *direction), catalog);
    }
    Ok(catalogs)
}
