//! QA/QC filter (C4): removes GPS back-steps from a trip's snapped
//! fixes while preserving near-stationary runs.
//!
//! Three passes run with decreasing lookback `k = 3, 2, 1`: each pass compares a
//! fix's `stop_sequence` and `seg_index` against the fix `k` positions back (among
//! fixes surviving so far) and drops it if either has gone negative — a back-step.
//! A genuinely stationary run has zero delta in both fields, which is never
//! negative, so it survives without needing any distance tolerance at this stage
//! (the 20 m stationary/movement distinction belongs to C5, not here). Decreasing
//! `k` lets the filter catch short, sharp reversals on the first pass and then
//! close in on single-step noise.

use std::collections::HashMap;

use crate::fix::SnappedFix;

/// the three-pass filter's lookback orders, always applied in this exact
/// decreasing sequence.
pub const DEFAULT_LOOKBACK_ORDER: [usize; 3] = [3, 2, 1];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QaQcReport {
    pub input_count: usize,
    pub duplicate_count: usize,
    pub back_step_count: usize,
    pub retained_count: usize,
}

/// runs the three-pass filter over one trip's snapped fixes (already in
/// timestamp order) and returns the retained fixes plus a retention report.
///
/// Exact-duplicate `(timestamp, snap point)` rows are removed first; the
/// remaining passes run in `lookback_orders`' order (normally
/// [`DEFAULT_LOOKBACK_ORDER`], but configurable).
pub fn filter_trip(fixes: Vec<SnappedFix>, lookback_orders: &[usize]) -> (Vec<SnappedFix>, QaQcReport) {
    let input_count = fixes.len();
    let mut report = QaQcReport {
        input_count,
        ..Default::default()
    };

    let mut deduped = dedupe(fixes);
    report.duplicate_count = input_count - deduped.len();

    for &k in lookback_orders {
        let before = deduped.len();
        deduped = remove_back_steps(deduped, k);
        report.back_step_count += before - deduped.len();
    }

    report.retained_count = deduped.len();
    (deduped, report)
}

/// drops exact duplicates — same trip, timestamp, and snap point. Keyed on the
/// snap point rather than `barcode`, since `barcode` is a monotonic insertion
/// counter that differs even between two rows the feed harvester genuinely
/// duplicated.
fn dedupe(fixes: Vec<SnappedFix>) -> Vec<SnappedFix> {
    let mut seen: HashMap<(i64, u64, u64), ()> = HashMap::with_capacity(fixes.len());
    let mut out = Vec::with_capacity(fixes.len());
    for fix in fixes {
        let key = (fix.timestamp.timestamp(), fix.point.0.to_bits(), fix.point.1.to_bits());
        if seen.insert(key, ()).is_none() {
            out.push(fix);
        }
    }
    out
}

/// drops any fix whose `stop_sequence` or `seg_index` is lower than the fix `k`
/// positions back among survivors. Comparisons walk left to right so that once
/// a fix is dropped, later comparisons measure lookback against the nearest
/// *retained* predecessor.
fn remove_back_steps(fixes: Vec<SnappedFix>, k: usize) -> Vec<SnappedFix> {
    let mut retained: Vec<SnappedFix> = Vec::with_capacity(fixes.len());
    for fix in fixes {
        let is_back_step = retained.len() >= k
            && {
                let reference = &retained[retained.len() - k];
                fix.stop_sequence < reference.stop_sequence || fix.seg_index < reference.seg_index
            };
        if !is_back_step {
            retained.push(fix);
        }
    }
    retained
}
