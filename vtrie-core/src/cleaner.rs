//! Post-interpolation cleaner (C7): drops interpolated rows that are either
//! physically impossible (speed, arrival-offset magnitude) or artefacts of
//! wrap-around on a self-overlapping loop route. Not fatal — dropped counts are
//! reported alongside the survivors for the per-route manifest.

use crate::interpolate::InterpolatedRow;

/// above this implied speed, a row is dropped as physically impossible.
pub const SPEED_CEILING_KMH: f64 = 120.0;
/// twenty minutes, in seconds — an arrival-offset magnitude beyond this is dropped.
pub const MAX_ARRIVAL_OFFSET_S: f64 = 20.0 * 60.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CleanReport {
    pub input_count: usize,
    pub dropped_speed: usize,
    pub dropped_arrival_offset: usize,
    pub dropped_wrap_around: usize,
    pub retained_count: usize,
}

/// cleans one trip's interpolated rows (already sorted by `stop_sequence` within
/// each `idx` group). `speed_ceiling_kmh` and `max_arrival_offset_s` are
/// configurable thresholds (defaults [`SPEED_CEILING_KMH`] / [`MAX_ARRIVAL_OFFSET_S`]).
pub fn clean_trip(
    rows: Vec<InterpolatedRow>,
    max_stop_sequence: u32,
    speed_ceiling_kmh: f64,
    max_arrival_offset_s: f64,
) -> (Vec<InterpolatedRow>, CleanReport) {
    let input_count = rows.len();
    let mut report = CleanReport {
        input_count,
        ..Default::default()
    };

    let mut high_water_mark = 0u32;
    let mut retained = Vec::with_capacity(rows.len());

    for row in rows {
        if row.proj_speed_kmh > speed_ceiling_kmh {
            report.dropped_speed += 1;
            continue;
        }
        if row.off_arrdif_s.map(|d| d.abs() > max_arrival_offset_s).unwrap_or(false) {
            report.dropped_arrival_offset += 1;
            continue;
        }
        let is_wrap_around = row.wrap_candidate
            || (high_water_mark >= max_stop_sequence.saturating_sub(1) && row.stop_sequence < high_water_mark);
        if is_wrap_around {
            report.dropped_wrap_around += 1;
            continue;
        }
        high_water_mark = high_water_mark.max(row.stop_sequence);
        retained.push(row);
    }

    report.retained_count = retained.len();
    (retained, report)
}
