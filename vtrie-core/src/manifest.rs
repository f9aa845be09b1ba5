//! Per-route manifest: retention and error counts written to a manifest
//! alongside outputs. Assembled by the executor from each worker's QA/QC and
//! cleaning reports plus any errors it recorded along the way.

use crate::cleaner::CleanReport;
use crate::error::PipelineError;
use crate::qaqc::QaQcReport;

#[derive(Debug, Clone, PartialEq)]
pub struct RouteManifestEntry {
    pub route_id: String,
    pub direction: u8,
    pub qaqc: QaQcReport,
    pub clean: CleanReport,
    pub errors: Vec<RecordedError>,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedError {
    pub kind: &'static str,
    pub message: String,
}

impl From<&PipelineError> for RecordedError {
    fn from(err: &PipelineError) -> Self {
        RecordedError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl RouteManifestEntry {
    /// fraction of input fixes surviving QA/QC.
    pub fn retention(&self) -> f64 {
        if self.qaqc.input_count == 0 {
            return 0.0;
        }
        self.qaqc.retained_count as f64 / self.qaqc.input_count as f64
    }

    /// true if this route never finished (worker panic or timeout
    /// cancellation, both recorded under the `TaskFailure` kind) rather than
    /// merely dropping some rows along the way.
    pub fn task_failed(&self) -> bool {
        self.failed
    }

    /// true if QA/QC or cleaning dropped any rows, short of a full
    /// `task_failed` abort for this route.
    pub fn degraded(&self) -> bool {
        !self.failed && (self.qaqc.retained_count < self.qaqc.input_count || self.clean.retained_count < self.clean.input_count)
    }

    /// one-line summary with retention and error counts for this route.
    pub fn summary_line(&self) -> String {
        format!(
            "route={} direction={} retention={:.3} cleaned_dropped={} errors={} failed={}",
            self.route_id,
            self.direction,
            self.retention(),
            self.clean.input_count - self.clean.retained_count,
            self.errors.len(),
            self.failed
        )
    }
}

/// overall job exit code: 0 success, 1 invalid input/fatal abort, 2 partial
/// failure (some routes dropped rows short of a full task failure), 3 a
/// route's worker panicked or timed out.
pub fn exit_code(manifest: &[RouteManifestEntry], fatal: bool) -> i32 {
    if fatal {
        return 1;
    }
    if manifest.iter().any(|m| m.task_failed()) {
        return 3;
    }
    if manifest.iter().any(|m| m.degraded()) {
        return 2;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(failed: bool) -> RouteManifestEntry {
        RouteManifestEntry {
            route_id: "R1".into(),
            direction: 0,
            qaqc: QaQcReport {
                input_count: 100,
                duplicate_count: 2,
                back_step_count: 3,
                retained_count: 95,
            },
            clean: CleanReport {
                input_count: 95,
                dropped_speed: 1,
                dropped_arrival_offset: 0,
                dropped_wrap_around: 0,
                retained_count: 94,
            },
            errors: vec![],
            failed,
        }
    }

    fn clean_entry() -> RouteManifestEntry {
        RouteManifestEntry {
            route_id: "R1".into(),
            direction: 0,
            qaqc: QaQcReport {
                input_count: 100,
                duplicate_count: 0,
                back_step_count: 0,
                retained_count: 100,
            },
            clean: CleanReport {
                input_count: 100,
                dropped_speed: 0,
                dropped_arrival_offset: 0,
                dropped_wrap_around: 0,
                retained_count: 100,
            },
            errors: vec![],
            failed: false,
        }
    }

    #[test]
    fn retention_is_retained_over_input() {
        let e = entry(false);
        assert!((e.retention() - 0.95).abs() < 1e-9);
    }

    #[test]
    fn degraded_is_false_once_a_route_task_failed() {
        assert!(entry(false).degraded());
        assert!(!entry(true).degraded());
        assert!(!clean_entry().degraded());
    }

    #[test]
    fn exit_code_reflects_worst_outcome() {
        assert_eq!(exit_code(&[clean_entry()], false), 0);
        assert_eq!(exit_code(&[entry(false)], false), 2);
        assert_eq!(exit_code(&[entry(true)], false), 3);
        assert_eq!(exit_code(&[entry(false)], true), 1);
    }
}
