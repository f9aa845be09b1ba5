//! Pipeline-tunable configuration. Population (CLI flags overriding a config
//! file overriding defaults) is the CLI's concern — see `vtrie-cli::app` —
//! this struct is the resolved result the core operates on.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cleaner::{MAX_ARRIVAL_OFFSET_S, SPEED_CEILING_KMH};
use crate::enrich::STATIONARY_DISTANCE_M;
use crate::geolocator::DEFAULT_SNAP_DISTANCE_BOUND_M;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// configurable spatial reference WKID (default 4326).
    pub wkid: i32,
    /// route-dependent geolocation failure bound, meters.
    pub snap_distance_bound_m: f64,
    /// the three-pass filter's lookback orders, always applied in this exact
    /// decreasing sequence.
    pub qaqc_lookback_orders: [usize; 3],
    /// stationary classification distance, meters.
    pub stationary_distance_m: f64,
    /// implausible-speed ceiling, km/h.
    pub speed_ceiling_kmh: f64,
    /// max tolerated `|off_arrdif_s|`, seconds.
    pub max_arrival_offset_s: f64,
    /// global per-job timeout; `None` is "unlimited" (the default).
    pub timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            wkid: 4326,
            snap_distance_bound_m: DEFAULT_SNAP_DISTANCE_BOUND_M,
            qaqc_lookback_orders: [3, 2, 1],
            stationary_distance_m: STATIONARY_DISTANCE_M,
            speed_ceiling_kmh: SPEED_CEILING_KMH,
            max_arrival_offset_s: MAX_ARRIVAL_OFFSET_S,
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_thresholds() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.wkid, 4326);
        assert_eq!(cfg.snap_distance_bound_m, 200.0);
        assert_eq!(cfg.qaqc_lookback_orders, [3, 2, 1]);
        assert!(cfg.timeout.is_none());
    }
}
