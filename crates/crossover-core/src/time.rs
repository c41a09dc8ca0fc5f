//! Acquisition timestamps, search windows, and acquisition offsets.
//!
//! Every instant in this crate is a `DateTime<Utc>`. Normalization happens
//! once, at ingestion:
//!
//! - Legacy catalog timestamps (`2017:046:10:00:00.000`, year + day of
//!   year) carry no zone marker and are **declared UTC**.
//! - Commercial catalog timestamps are RFC 3339; an explicit offset is
//!   honoured and converted to UTC. A bare timestamp without offset is
//!   also declared UTC.
//!
//! Offsets and windows are then plain UTC arithmetic.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

/// Format of the legacy catalog's `Scene Start Time` field.
pub const LEGACY_TIMESTAMP_FORMAT: &str = "%Y:%j:%H:%M:%S%.f";

/// Canonical query-boundary format: microsecond precision, explicit UTC.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn parse_legacy_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(raw.trim(), LEGACY_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid legacy timestamp '{raw}': {e}"))
}

pub fn parse_catalog_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid catalog timestamp '{raw}': {e}"))
}

pub fn format_canonical(t: &DateTime<Utc>) -> String {
    t.format(CANONICAL_FORMAT).to_string()
}

/// Convert a window width in (possibly fractional) hours to a duration
/// with microsecond resolution.
pub fn window_width(hours: f64) -> TimeDelta {
    TimeDelta::microseconds((hours * 3_600_000_000.0).round() as i64)
}

/// Closed acquisition-time interval centred on an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build the window `[t - width/2, t + width/2]`.
    ///
    /// An odd microsecond count puts the extra microsecond after `t`, so
    /// `end - start == width` always holds exactly.
    pub fn around(t: DateTime<Utc>, width: TimeDelta) -> Self {
        let before = width / 2;
        let after = width - before;
        Self {
            start: t - before,
            end: t + after,
        }
    }

    pub fn width(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Inclusive at both bounds, matching the catalog's `gte`/`lte` filter.
    pub fn contains(&self, t: &DateTime<Utc>) -> bool {
        self.start <= *t && *t <= self.end
    }

    pub fn start_bound(&self) -> String {
        format_canonical(&self.start)
    }

    pub fn end_bound(&self) -> String {
        format_canonical(&self.end)
    }
}

/// Absolute distance between two acquisitions, truncated to whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionOffset {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl AcquisitionOffset {
    pub fn between(a: &DateTime<Utc>, b: &DateTime<Utc>) -> Self {
        let secs = (*a - *b).abs().num_seconds();
        let days = secs / 86_400;
        let rem = secs % 86_400;
        Self {
            days,
            hours: rem / 3_600,
            minutes: (rem / 60) % 60,
        }
    }
}

impl fmt::Display for AcquisitionOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} days {} hours {} minutes",
            self.days, self.hours, self.minutes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn legacy_timestamp_uses_day_of_year() {
        // Day 46 of 2017 is February 15th.
        let t = parse_legacy_timestamp("2017:046:10:00:00.000").unwrap();
        assert_eq!(t, utc(2017, 2, 15, 10, 0, 0));
    }

    #[test]
    fn legacy_timestamp_keeps_fraction() {
        let t = parse_legacy_timestamp("2017:046:10:00:01.250").unwrap();
        assert_eq!(t.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn legacy_timestamp_rejects_calendar_dates() {
        assert!(parse_legacy_timestamp("2017-02-15 10:00:00").is_err());
        assert!(parse_legacy_timestamp("").is_err());
    }

    #[test]
    fn catalog_timestamp_converts_offsets_to_utc() {
        let t = parse_catalog_timestamp("2017-02-15T11:30:00+02:00").unwrap();
        assert_eq!(t, utc(2017, 2, 15, 9, 30, 0));
        let z = parse_catalog_timestamp("2017-02-15T09:30:00.123456Z").unwrap();
        assert_eq!(z.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn catalog_timestamp_without_offset_is_utc() {
        let t = parse_catalog_timestamp("2017-02-15T09:30:00").unwrap();
        assert_eq!(t, utc(2017, 2, 15, 9, 30, 0));
    }

    #[test]
    fn window_scenario() {
        let t = utc(2017, 2, 15, 10, 0, 0);
        let w = TimeWindow::around(t, window_width(4.0));
        assert_eq!(w.start_bound(), "2017-02-15T08:00:00.000000Z");
        assert_eq!(w.end_bound(), "2017-02-15T12:00:00.000000Z");
    }

    #[test]
    fn window_width_is_exact_and_straddles_t() {
        let t = utc(2017, 2, 15, 10, 0, 0);
        for hours in [0.5, 1.0, 3.0, 4.0, 7.25, 48.0] {
            let width = window_width(hours);
            let w = TimeWindow::around(t, width);
            assert_eq!(w.end - w.start, width, "hours={hours}");
            assert!(w.start < t && t < w.end, "hours={hours}");
        }
        // Odd microsecond width still comes out exact.
        let odd = TimeDelta::microseconds(7);
        assert_eq!(TimeWindow::around(t, odd).width(), odd);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let t = utc(2017, 2, 15, 10, 0, 0);
        let w = TimeWindow::around(t, window_width(4.0));
        assert!(w.contains(&w.start));
        assert!(w.contains(&w.end));
        assert!(!w.contains(&(w.end + TimeDelta::microseconds(1))));
        assert!(!w.contains(&(w.start - TimeDelta::microseconds(1))));
    }

    #[test]
    fn offset_scenario() {
        let source = utc(2017, 2, 15, 10, 0, 0);
        let candidate = utc(2017, 2, 15, 9, 30, 0);
        assert_eq!(
            AcquisitionOffset::between(&source, &candidate).to_string(),
            "0 days 0 hours 30 minutes"
        );
    }

    #[test]
    fn offset_is_symmetric() {
        let a = utc(2017, 2, 15, 10, 0, 0);
        for b in [
            utc(2017, 2, 15, 9, 30, 0),
            utc(2017, 2, 17, 13, 45, 59),
            utc(2016, 12, 31, 23, 59, 59),
        ] {
            assert_eq!(
                AcquisitionOffset::between(&a, &b),
                AcquisitionOffset::between(&b, &a)
            );
        }
    }

    #[test]
    fn offset_truncates_instead_of_rounding() {
        let a = utc(2017, 2, 15, 10, 0, 0);
        let b = utc(2017, 2, 16, 11, 59, 59);
        assert_eq!(
            AcquisitionOffset::between(&a, &b).to_string(),
            "1 days 1 hours 59 minutes"
        );
    }
}
