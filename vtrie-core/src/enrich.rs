//! Trajectory enricher (C5): assigns a [`MobilityState`] to every
//! retained fix and pairs up consecutive fixes within a trip into an
//! [`EnrichedPair`] that C6 consumes to classify each leg's travel type.
//!
//! Mobility classification is one logical step, not two independent passes:
//! whether a pair reads `Stationary` depends on the 20 m distance threshold
//! between the same two fixes whose `seg_index`/`stop_sequence` deltas are
//! being tested, so both checks happen together here rather than in a
//! separate tentative/freeze pass.

use crate::catalog::RouteCatalog;
use crate::fix::{MobilityState, SnappedFix};

/// arc-length movement below this (meters) between neighboring fixes reads as
/// stationary rather than in motion.
pub const STATIONARY_DISTANCE_M: f64 = 20.0;

/// one consecutive retained-fix pair within a trip, carrying the deltas C6 needs
/// to classify and interpolate the leg between them. Retains both fixes
/// themselves so the interpolator has the current-row point and the next
/// row's shifted point.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedPair {
    pub trip_id: String,
    pub route_id: String,
    pub direction: u8,
    pub left: SnappedFix,
    pub right: SnappedFix,
    pub left_status: MobilityState,
    pub right_status: MobilityState,
    pub delta_time_s: f64,
    pub stp_left: u32,
    pub stp_diff: i64,
    pub idx_left: usize,
    pub idx_diff: i64,
    /// arc-length delta (meters), only populated for the status-pair
    /// combinations where a distance is physically meaningful:
    /// `{(Stationary,Stationary), (Stationary,Movement),
    /// (Stationary,Terminus)}` — exactly the pairs whose stationary
    /// classification still needs distance confirmation.
    pub delta_dist_m: Option<f64>,
}

/// assigns a [`MobilityState`] to every fix of one trip (already QA/QC-filtered,
/// in timestamp order):
///
/// - `Terminus` if `stop_sequence == max_stop_sequence` (already the *validated*
///   max — `RouteCatalog::build` lowers it when the stop list overshoots the
///   polyline) and no forward progress is possible;
/// - `Stationary` if the next fix shows `Δseg_index == 0 ∧ Δstop_sequence == 0`
///   and the arc-length distance between them is `≤ stationary_distance_m`;
/// - `Movement` otherwise.
///
/// A fix with no following fix to compare against (the last fix of a trip, or
/// the sole fix of a single-fix trip) defaults to `Stationary` absent a
/// terminus — a single-fix trip emits only a Stationary/Terminus row, with no
/// interpolation.
pub fn classify_mobility(catalog: &RouteCatalog, fixes: &mut [SnappedFix], stationary_distance_m: f64) {
    let n = fixes.len();
    let max_seq = catalog.max_stop_sequence;

    for i in 0..n {
        let state = if fixes[i].stop_sequence >= max_seq {
            MobilityState::Terminus
        } else if i + 1 < n {
            let same_leg =
                fixes[i + 1].seg_index == fixes[i].seg_index && fixes[i + 1].stop_sequence == fixes[i].stop_sequence;
            if same_leg {
                let dist = (fixes[i + 1].arc_length_m - fixes[i].arc_length_m).abs();
                if dist <= stationary_distance_m {
                    MobilityState::Stationary
                } else {
                    MobilityState::Movement
                }
            } else {
                MobilityState::Movement
            }
        } else {
            MobilityState::Stationary
        };
        fixes[i].mobility_state = Some(state);
    }
}

/// true if a distance computation is meaningful for this pair of mobility
/// states: exactly the pairs whose tentative status still needs distance
/// confirmation.
fn distance_applies(left: MobilityState, right: MobilityState) -> bool {
    matches!(
        (left, right),
        (MobilityState::Stationary, MobilityState::Stationary)
            | (MobilityState::Stationary, MobilityState::Movement)
            | (MobilityState::Stationary, MobilityState::Terminus)
    )
}

/// builds the consecutive-pair stream for one trip's enriched fixes (already
/// mobility-classified).
pub fn pair_up(fixes: &[SnappedFix]) -> Vec<EnrichedPair> {
    fixes
        .windows(2)
        .map(|pair| {
            let (left, right) = (&pair[0], &pair[1]);
            let left_status = left.mobility_state.unwrap_or(MobilityState::Movement);
            let right_status = right.mobility_state.unwrap_or(MobilityState::Movement);
            EnrichedPair {
                trip_id: left.trip_id.clone(),
                route_id: left.route_id.clone(),
                direction: left.direction,
                delta_time_s: (right.timestamp - left.timestamp).num_milliseconds() as f64 / 1000.0,
                stp_left: left.stop_sequence,
                stp_diff: right.stop_sequence as i64 - left.stop_sequence as i64,
                idx_left: left.seg_index,
                idx_diff: right.seg_index as i64 - left.seg_index as i64,
                delta_dist_m: distance_applies(left_status, right_status)
                    .then(|| (right.arc_length_m - left.arc_length_m).abs()),
                left_status,
                right_status,
                left: left.clone(),
                right: right.clone(),
            }
        })
        .collect()
}
