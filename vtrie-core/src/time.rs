//! Single time basis for the pipeline: everything is materialized as a UTC
//! `DateTime<Utc>` before arithmetic happens, avoiding hidden time-zone drift.
//! `Fix` timestamps arrive already resolved to UTC by the CLI's CSV reader
//! (RFC3339, with or without an explicit offset). Schedule times arrive as
//! GTFS "seconds since noon minus 12h" clock-of-day offsets, which this
//! module combines with the trip's service date to produce a comparable UTC instant.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// a GTFS `stop_times.txt` time value, stored as seconds since midnight of the
/// service date. GTFS permits values `>= 86400` for trips that run past midnight
/// (e.g. `25:30:00`); we keep that encoding verbatim rather than wrapping it, which
/// is exactly what lets a single `service_date` stay correct across midnight — see
/// `DESIGN.md` for the cross-midnight handling rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceTimeOffset(pub i64);

impl ServiceTimeOffset {
    /// materializes this offset against `service_date` as a single UTC instant.
    pub fn to_utc(self, service_date: NaiveDate) -> DateTime<Utc> {
        let midnight = service_date.and_hms_opt(0, 0, 0).expect("midnight is valid");
        DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc) + Duration::seconds(self.0)
    }

    /// parses GTFS's `H:MM:SS` / `HH:MM:SS` clock-of-day format, including values
    /// with an hour component `>= 24`.
    pub fn parse(raw: &str) -> Option<ServiceTimeOffset> {
        let mut parts = raw.trim().splitn(3, ':');
        let h: i64 = parts.next()?.parse().ok()?;
        let m: i64 = parts.next()?.parse().ok()?;
        let s: i64 = parts.next()?.parse().ok()?;
        Some(ServiceTimeOffset(h * 3600 + m * 60 + s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn past_midnight_offset_lands_on_next_calendar_day() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let offset = ServiceTimeOffset(25 * 3600 + 30 * 60); // "25:30:00"
        let utc = offset.to_utc(date);
        assert_eq!(utc.date_naive(), NaiveDate::from_ymd_opt(2026, 7, 29).unwrap());
        assert_eq!(utc.hour(), 1);
        assert_eq!(utc.minute(), 30);
    }

    #[test]
    fn parse_handles_two_and_three_digit_hours() {
        assert_eq!(ServiceTimeOffset::parse("08:15:00"), Some(ServiceTimeOffset(8 * 3600 + 15 * 60)));
        assert_eq!(ServiceTimeOffset::parse("125:00:00"), Some(ServiceTimeOffset(125 * 3600)));
    }
}
