use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::ops::{Add, Sub};

// 2000-01-01T00:00:00Z
const ANCHOR_UNIX_SECONDS: i64 = 946_684_800;

/// An instant on a continuous time axis.
///
/// Internally a second count from 2000-01-01T00:00:00 UTC, stored as an
/// f64 (sub-microsecond resolution over decades around the anchor).
/// Time scales proper (leap seconds, TAI vs UT1) are the business of
/// the caller's time library; inside the engine only durations matter.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Epoch {
    offset: f64,
}

impl Epoch {
    /// The anchor epoch, 2000-01-01T00:00:00 UTC.
    pub const REFERENCE: Epoch = Epoch { offset: 0.0 };

    /// An epoch `seconds` past the anchor.
    pub fn from_offset(seconds: f64) -> Self {
        Self { offset: seconds }
    }

    /// Seconds elapsed since the anchor epoch.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Converts a chrono UTC date.
    pub fn from_utc(date: DateTime<Utc>) -> Self {
        let seconds = (date.timestamp() - ANCHOR_UNIX_SECONDS) as f64;
        Self {
            offset: seconds + f64::from(date.timestamp_subsec_nanos()) * 1.0e-9,
        }
    }

    /// Parses an ISO-8601 date, with or without offset suffix.
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(date) = DateTime::parse_from_rfc3339(s) {
            return Some(Self::from_utc(date.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| Self::from_utc(naive.and_utc()))
    }

    /// Signed duration from `other` to `self`, in seconds.
    pub fn seconds_since(&self, other: Epoch) -> f64 {
        self.offset - other.offset
    }

    /// The later of the two epochs.
    pub fn max(self, other: Epoch) -> Epoch {
        Epoch {
            offset: self.offset.max(other.offset),
        }
    }

    /// The earlier of the two epochs.
    pub fn min(self, other: Epoch) -> Epoch {
        Epoch {
            offset: self.offset.min(other.offset),
        }
    }

    /// Chrono view of the epoch, truncated to nanoseconds.
    pub fn to_utc(&self) -> DateTime<Utc> {
        let seconds = self.offset.floor();
        let nanos = ((self.offset - seconds) * 1.0e9).round() as u32;
        let (seconds, nanos) = if nanos >= 1_000_000_000 {
            (seconds as i64 + 1, 0)
        } else {
            (seconds as i64, nanos)
        };
        DateTime::from_timestamp(ANCHOR_UNIX_SECONDS + seconds, nanos).unwrap_or_default()
    }
}

impl Add<f64> for Epoch {
    type Output = Epoch;

    fn add(self, seconds: f64) -> Epoch {
        Epoch {
            offset: self.offset + seconds,
        }
    }
}

impl Sub<f64> for Epoch {
    type Output = Epoch;

    fn sub(self, seconds: f64) -> Epoch {
        Epoch {
            offset: self.offset - seconds,
        }
    }
}

impl Sub<Epoch> for Epoch {
    type Output = f64;

    fn sub(self, other: Epoch) -> f64 {
        self.offset - other.offset
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_utc().format("%Y-%m-%dT%H:%M:%S%.6fZ"))
    }
}
