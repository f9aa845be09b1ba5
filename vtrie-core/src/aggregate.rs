//! Aggregator (C8): three reductions over the cleaned interpolated table.
//! Level 1 runs inside each route's worker task (so its output is already
//! per-route coherent); levels 2 and 3 run once, after the executor's
//! barrier, over the concatenation of every route's level-1 rows.

use chrono::{DateTime, Timelike, Utc};
use indexmap::IndexMap;

use crate::interpolate::{InterpolatedRow, PerfRate};

#[derive(Debug, Clone, PartialEq)]
pub struct TripStopAggregate {
    pub route_id: String,
    pub trip_id: String,
    pub stop_sequence: u32,
    pub stop_id: String,
    pub sched_arr: Option<DateTime<Utc>>,
    pub late: u32,
    pub on_time: u32,
    pub early: u32,
    pub satis: u32,
    pub unsatis: u32,
    pub prc_obs_sat: f64,
    pub prc_obs_uns: f64,
    pub avg_spd: f64,
    pub avg_arr_dif: f64,
    pub last_off_earr: DateTime<Utc>,
    pub last_perf_rate: Option<PerfRate>,
    pub total_obs: u32,
    pub idx: u64,
    pub spd_list: Vec<f64>,
    pub arr_dif_list: Vec<f64>,
}

/// one row per `(route,trip,stop_seq,stop_id,sched_arr)`.
pub fn aggregate_trip_stop(rows: &[InterpolatedRow]) -> Vec<TripStopAggregate> {
    let mut groups: IndexMap<(String, String, u32, String), Vec<&InterpolatedRow>> = IndexMap::new();
    for row in rows {
        let key = (
            row.route_id.clone(),
            row.trip_id.clone(),
            row.stop_sequence,
            row.stop_id.clone(),
        );
        groups.entry(key).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|((route_id, trip_id, stop_sequence, stop_id), members)| {
            let total_obs = members.len() as u32;
            let late = members.iter().filter(|r| r.perf_rate == Some(PerfRate::Late)).count() as u32;
            let on_time = members.iter().filter(|r| r.perf_rate == Some(PerfRate::OnTime)).count() as u32;
            let early = members.iter().filter(|r| r.perf_rate == Some(PerfRate::Early)).count() as u32;
            let satis = on_time;
            let unsatis = late + early;

            let spd_list: Vec<f64> = members.iter().map(|r| r.proj_speed_kmh).collect();
            let arr_dif_list: Vec<f64> = members.iter().filter_map(|r| r.off_arrdif_s).collect();

            let avg_spd = mean(&spd_list);
            let avg_arr_dif = mean(&arr_dif_list);
            let prc_obs_sat = percent(satis, total_obs);
            let prc_obs_uns = percent(unsatis, total_obs);

            let last = members.last().expect("group is non-empty");
            TripStopAggregate {
                route_id,
                trip_id,
                stop_sequence,
                stop_id,
                sched_arr: last.sched_arr,
                late,
                on_time,
                early,
                satis,
                unsatis,
                prc_obs_sat,
                prc_obs_uns,
                avg_spd,
                avg_arr_dif,
                last_off_earr: last.off_earr,
                last_perf_rate: last.perf_rate,
                total_obs,
                idx: members.first().map(|r| r.idx).unwrap_or(0),
                spd_list,
                arr_dif_list,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourlyAggregate {
    pub route_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub ref_hr: u32,
    pub avg_spd: f64,
    pub avg_arr_dif: f64,
    pub prc_obs_sat: f64,
    pub prc_obs_uns: f64,
    pub spd_w: f64,
    pub arrd_w: f64,
    pub prc_w_sat: f64,
    pub prc_w_uns: f64,
    pub cnt_trip_ids: u32,
    pub all_obs: u32,
    pub act_sat_p: f64,
    pub act_uns_p: f64,
}

/// one row per `(route,stop_id,stop_seq,ref_hr)`, `ref_hr` being the hour of
/// each trip-stop group's scheduled arrival.
pub fn aggregate_hourly(level1: &[TripStopAggregate]) -> Vec<HourlyAggregate> {
    let mut groups: IndexMap<(String, String, u32, u32), Vec<&TripStopAggregate>> = IndexMap::new();
    for row in level1 {
        let Some(sched) = row.sched_arr else { continue };
        let key = (row.route_id.clone(), row.stop_id.clone(), row.stop_sequence, sched.hour());
        groups.entry(key).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|((route_id, stop_id, stop_sequence, ref_hr), members)| {
            HourlyAggregate {
                route_id,
                stop_id,
                stop_sequence,
                ref_hr,
                ..weighted_summary(&members)
            }
        })
        .collect()
}

/// shared unweighted/weighted mean + actual-on-time computation for levels 2 and 3.
fn weighted_summary(members: &[&TripStopAggregate]) -> HourlyAggregate {
    let unweighted_spd = mean(&members.iter().map(|m| m.avg_spd).collect::<Vec<_>>());
    let unweighted_arr_dif = mean(&members.iter().map(|m| m.avg_arr_dif).collect::<Vec<_>>());
    let unweighted_sat = mean(&members.iter().map(|m| m.prc_obs_sat).collect::<Vec<_>>());
    let unweighted_uns = mean(&members.iter().map(|m| m.prc_obs_uns).collect::<Vec<_>>());

    let total_obs: u32 = members.iter().map(|m| m.total_obs).sum();
    let weighted = |f: &dyn Fn(&TripStopAggregate) -> f64| -> f64 {
        if total_obs == 0 {
            return 0.0;
        }
        members.iter().map(|m| f(m) * m.total_obs as f64).sum::<f64>() / total_obs as f64
    };

    // each `members` entry is already a per-trip level-1 row, so its count is the
    // distinct-trip count directly.
    let cnt_trip_ids = members.len() as u32;

    let on_time_trips = members
        .iter()
        .filter(|m| m.last_perf_rate == Some(PerfRate::OnTime))
        .count() as f64;
    let act_sat_p = if members.is_empty() {
        0.0
    } else {
        on_time_trips / members.len() as f64 * 100.0
    };
    let act_uns_p = 100.0 - act_sat_p;

    HourlyAggregate {
        route_id: String::new(),
        stop_id: String::new(),
        stop_sequence: 0,
        ref_hr: 0,
        avg_spd: unweighted_spd,
        avg_arr_dif: unweighted_arr_dif,
        prc_obs_sat: unweighted_sat,
        prc_obs_uns: unweighted_uns,
        spd_w: weighted(&|m| m.avg_spd),
        arrd_w: weighted(&|m| m.avg_arr_dif),
        prc_w_sat: weighted(&|m| m.prc_obs_sat),
        prc_w_uns: weighted(&|m| m.prc_obs_uns),
        cnt_trip_ids,
        all_obs: total_obs,
        act_sat_p,
        act_uns_p,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAggregate {
    pub route_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub avg_spd: f64,
    pub avg_arr_dif: f64,
    pub prc_obs_sat: f64,
    pub prc_obs_uns: f64,
    pub spd_w: f64,
    pub arrd_w: f64,
    pub prc_w_sat: f64,
    pub prc_w_uns: f64,
    pub cnt_trip_ids: u32,
    pub all_obs: u32,
    pub act_sat_p: f64,
    pub act_uns_p: f64,
    pub agglength: usize,
    pub list_ref_hr: Vec<u32>,
}

/// one row per `(route,stop_id,stop_seq)`, folding every hour of the day
/// observed for that stop.
pub fn aggregate_daily(level1: &[TripStopAggregate]) -> Vec<DailyAggregate> {
    let mut groups: IndexMap<(String, String, u32), Vec<&TripStopAggregate>> = IndexMap::new();
    let mut hours_by_group: IndexMap<(String, String, u32), std::collections::BTreeSet<u32>> = IndexMap::new();
    for row in level1 {
        let key = (row.route_id.clone(), row.stop_id.clone(), row.stop_sequence);
        groups.entry(key.clone()).or_default().push(row);
        if let Some(sched) = row.sched_arr {
            hours_by_group.entry(key).or_default().insert(sched.hour());
        }
    }

    groups
        .into_iter()
        .map(|((route_id, stop_id, stop_sequence), members)| {
            let summary = weighted_summary(&members);
            let list_ref_hr: Vec<u32> = hours_by_group
                .get(&(route_id.clone(), stop_id.clone(), stop_sequence))
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            DailyAggregate {
                route_id,
                stop_id,
                stop_sequence,
                avg_spd: summary.avg_spd,
                avg_arr_dif: summary.avg_arr_dif,
                prc_obs_sat: summary.prc_obs_sat,
                prc_obs_uns: summary.prc_obs_uns,
                spd_w: summary.spd_w,
                arrd_w: summary.arrd_w,
                prc_w_sat: summary.prc_w_sat,
                prc_w_uns: summary.prc_w_uns,
                cnt_trip_ids: summary.cnt_trip_ids,
                all_obs: summary.all_obs,
                act_sat_p: summary.act_sat_p,
                act_uns_p: summary.act_uns_p,
                agglength: list_ref_hr.len(),
                list_ref_hr,
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn percent(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
