//! Output writers: three aggregate CSV tables plus a per-route manifest, and
//! an optional GeoJSON rendering of the trip-stop level. Each core struct
//! stays free of `serde`/`csv` so the bulk I/O stack lives here, in the CLI
//! crate, flattening a domain struct into a dedicated `Serialize` row before
//! handing it to `csv::Writer`.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use vtrie_core::aggregate::{DailyAggregate, HourlyAggregate, TripStopAggregate};
use vtrie_core::interpolate::{PerfRate, TravelType};
use vtrie_core::manifest::RouteManifestEntry;

use crate::error::CliError;

fn perf_rate_str(perf_rate: Option<PerfRate>) -> &'static str {
    match perf_rate {
        Some(PerfRate::Late) => "late",
        Some(PerfRate::OnTime) => "on_time",
        Some(PerfRate::Early) => "early",
        None => "",
    }
}

fn travel_type_str(travel_type: TravelType) -> &'static str {
    match travel_type {
        TravelType::StationaryRow => "stationary",
        TravelType::BtwnStops => "btwn_stops",
        TravelType::OneStop => "one_stop",
        TravelType::SameStopDiffSeg => "same_stop_diff_seg",
        TravelType::SameStopSameSeg => "same_stop_same_seg",
        TravelType::TerminusRow => "terminus",
    }
}

#[derive(Debug, Serialize)]
struct TripStopRow {
    route_id: String,
    trip_id: String,
    stop_sequence: u32,
    stop_id: String,
    sched_arr: String,
    late: u32,
    on_time: u32,
    early: u32,
    satis: u32,
    unsatis: u32,
    prc_obs_sat: f64,
    prc_obs_uns: f64,
    avg_spd: f64,
    avg_arr_dif: f64,
    last_off_earr: String,
    last_perf_rate: &'static str,
    total_obs: u32,
    idx: u64,
}

impl From<&TripStopAggregate> for TripStopRow {
    fn from(a: &TripStopAggregate) -> Self {
        TripStopRow {
            route_id: a.route_id.clone(),
            trip_id: a.trip_id.clone(),
            stop_sequence: a.stop_sequence,
            stop_id: a.stop_id.clone(),
            sched_arr: a.sched_arr.map(|t| t.to_rfc3339()).unwrap_or_default(),
            late: a.late,
            on_time: a.on_time,
            early: a.early,
            satis: a.satis,
            unsatis: a.unsatis,
            prc_obs_sat: a.prc_obs_sat,
            prc_obs_uns: a.prc_obs_uns,
            avg_spd: a.avg_spd,
            avg_arr_dif: a.avg_arr_dif,
            last_off_earr: a.last_off_earr.to_rfc3339(),
            last_perf_rate: perf_rate_str(a.last_perf_rate),
            total_obs: a.total_obs,
            idx: a.idx,
        }
    }
}

#[derive(Debug, Serialize)]
struct HourlyRow {
    route_id: String,
    stop_id: String,
    stop_sequence: u32,
    ref_hr: u32,
    avg_spd: f64,
    avg_arr_dif: f64,
    prc_obs_sat: f64,
    prc_obs_uns: f64,
    spd_w: f64,
    arrd_w: f64,
    prc_w_sat: f64,
    prc_w_uns: f64,
    cnt_trip_ids: u32,
    all_obs: u32,
    act_sat_p: f64,
    act_uns_p: f64,
}

impl From<&HourlyAggregate> for HourlyRow {
    fn from(a: &HourlyAggregate) -> Self {
        HourlyRow {
            route_id: a.route_id.clone(),
            stop_id: a.stop_id.clone(),
            stop_sequence: a.stop_sequence,
            ref_hr: a.ref_hr,
            avg_spd: a.avg_spd,
            avg_arr_dif: a.avg_arr_dif,
            prc_obs_sat: a.prc_obs_sat,
            prc_obs_uns: a.prc_obs_uns,
            spd_w: a.spd_w,
            arrd_w: a.arrd_w,
            prc_w_sat: a.prc_w_sat,
            prc_w_uns: a.prc_w_uns,
            cnt_trip_ids: a.cnt_trip_ids,
            all_obs: a.all_obs,
            act_sat_p: a.act_sat_p,
            act_uns_p: a.act_uns_p,
        }
    }
}

#[derive(Debug, Serialize)]
struct DailyRow {
    route_id: String,
    stop_id: String,
    stop_sequence: u32,
    avg_spd: f64,
    avg_arr_dif: f64,
    prc_obs_sat: f64,
    prc_obs_uns: f64,
    spd_w: f64,
    arrd_w: f64,
    prc_w_sat: f64,
    prc_w_uns: f64,
    cnt_trip_ids: u32,
    all_obs: u32,
    act_sat_p: f64,
    act_uns_p: f64,
    agglength: usize,
    list_ref_hr: String,
}

impl From<&DailyAggregate> for DailyRow {
    fn from(a: &DailyAggregate) -> Self {
        DailyRow {
            route_id: a.route_id.clone(),
            stop_id: a.stop_id.clone(),
            stop_sequence: a.stop_sequence,
            avg_spd: a.avg_spd,
            avg_arr_dif: a.avg_arr_dif,
            prc_obs_sat: a.prc_obs_sat,
            prc_obs_uns: a.prc_obs_uns,
            spd_w: a.spd_w,
            arrd_w: a.arrd_w,
            prc_w_sat: a.prc_w_sat,
            prc_w_uns: a.prc_w_uns,
            cnt_trip_ids: a.cnt_trip_ids,
            all_obs: a.all_obs,
            act_sat_p: a.act_sat_p,
            act_uns_p: a.act_uns_p,
            agglength: a.agglength,
            list_ref_hr: a.list_ref_hr.iter().map(|h| h.to_string()).collect::<Vec<_>>().join(";"),
        }
    }
}

#[derive(Debug, Serialize)]
struct ManifestRow {
    route_id: String,
    direction: u8,
    input_count: u32,
    retained_count: u32,
    retention: f64,
    duplicate_count: u32,
    back_step_count: u32,
    dropped_speed: u32,
    dropped_arrival_offset: u32,
    dropped_wrap_around: u32,
    error_count: usize,
    failed: bool,
}

impl From<&RouteManifestEntry> for ManifestRow {
    fn from(m: &RouteManifestEntry) -> Self {
        ManifestRow {
            route_id: m.route_id.clone(),
            direction: m.direction,
            input_count: m.qaqc.input_count,
            retained_count: m.clean.retained_count,
            retention: m.retention(),
            duplicate_count: m.qaqc.duplicate_count,
            back_step_count: m.qaqc.back_step_count,
            dropped_speed: m.clean.dropped_speed,
            dropped_arrival_offset: m.clean.dropped_arrival_offset,
            dropped_wrap_around: m.clean.dropped_wrap_around,
            error_count: m.errors.len(),
            failed: m.failed,
        }
    }
}

pub fn write_trip_stop_csv(path: &Path, rows: &[TripStopAggregate]) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(TripStopRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_hourly_csv(path: &Path, rows: &[HourlyAggregate]) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(HourlyRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_daily_csv(path: &Path, rows: &[DailyAggregate]) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(DailyRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_manifest_csv(path: &Path, rows: &[RouteManifestEntry]) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(ManifestRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// renders the trip-stop level as a GeoJSON `FeatureCollection`, one feature
/// per row, with the geometry set to the row's stop location (`stop_coords`,
/// loaded from the `Stops/` shapefile layer per route). Rows whose stop has no
/// known point (a stop dropped by the catalog, or a coordinate map that wasn't
/// loaded for that route) are emitted with a null geometry rather than
/// dropped, so the feature count still matches the CSV row count.
pub fn write_trip_stop_geojson(path: &Path, rows: &[TripStopAggregate], stop_coords: &HashMap<String, (f64, f64)>) -> Result<(), CliError> {
    let features: Vec<geojson::Feature> = rows
        .iter()
        .map(|row| {
            let geometry = stop_coords.get(&row.stop_id).map(|&(lon, lat)| geojson::Geometry::new(geojson::Value::Point(vec![lon, lat])));
            let mut properties = serde_json::Map::new();
            properties.insert("route_id".into(), row.route_id.clone().into());
            properties.insert("trip_id".into(), row.trip_id.clone().into());
            properties.insert("stop_sequence".into(), row.stop_sequence.into());
            properties.insert("stop_id".into(), row.stop_id.clone().into());
            properties.insert("total_obs".into(), row.total_obs.into());
            properties.insert("prc_obs_sat".into(), row.prc_obs_sat.into());
            properties.insert("last_perf_rate".into(), perf_rate_str(row.last_perf_rate).into());

            geojson::Feature {
                bbox: None,
                geometry,
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    std::fs::write(path, collection.to_string())?;
    Ok(())
}
