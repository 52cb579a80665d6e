//! Estimated-duration normalization.
//!
//! Operators type durations loosely (`9`, `9:5`, `09:05:30`); the store expects a strict
//! `HH:mm:ss`. [`normalize`] is the only entry point the workflow uses.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDuration {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl WorkDuration {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let parts: Vec<&str> = raw.trim().split(':').collect();

        let parsed = match parts.as_slice() {
            [hours] => component(hours, 23).map(|hours| (hours, 0, 0)),
            [hours, minutes] => component(hours, 23)
                .and_then(|hours| component(minutes, 59).map(|minutes| (hours, minutes, 0))),
            [hours, minutes, seconds] => component(hours, 23).and_then(|hours| {
                component(minutes, 59).and_then(|minutes| {
                    component(seconds, 59).map(|seconds| (hours, minutes, seconds))
                })
            }),
            _ => None,
        };

        parsed
            .map(|(hours, minutes, seconds)| Self { hours, minutes, seconds })
            .ok_or_else(|| DomainError::InvalidDuration { raw: raw.to_string() })
    }

    pub fn as_hours(&self) -> Decimal {
        let seconds = u32::from(self.hours) * 3600
            + u32::from(self.minutes) * 60
            + u32::from(self.seconds);
        (Decimal::from(seconds) / Decimal::from(3600)).round_dp(2)
    }
}

/// One `:`-separated component: one or two ASCII digits, at most `max`.
fn component(raw: &str, max: u8) -> Option<u8> {
    if raw.is_empty() || raw.len() > 2 || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u8>().ok().filter(|value| *value <= max)
}

impl fmt::Display for WorkDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

impl FromStr for WorkDuration {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

/// Normalizes a loosely typed duration into `HH:mm:ss`.
pub fn normalize(raw: &str) -> Result<String, DomainError> {
    WorkDuration::parse(raw).map(|duration| duration.to_string())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{normalize, WorkDuration};
    use crate::errors::DomainError;

    #[test]
    fn bare_hour_expands_to_full_time() {
        assert_eq!(normalize("9").as_deref(), Ok("09:00:00"));
        assert_eq!(normalize("12").as_deref(), Ok("12:00:00"));
    }

    #[test]
    fn hour_and_minute_get_seconds_appended() {
        assert_eq!(normalize("9:5").as_deref(), Ok("09:05:00"));
        assert_eq!(normalize("09:30").as_deref(), Ok("09:30:00"));
    }

    #[test]
    fn full_times_are_zero_padded() {
        assert_eq!(normalize("09:05:30").as_deref(), Ok("09:05:30"));
        assert_eq!(normalize("7:45:00").as_deref(), Ok("07:45:00"));
        assert_eq!(normalize("  2:15  ").as_deref(), Ok("02:15:00"));
    }

    #[test]
    fn out_of_range_and_malformed_inputs_fail() {
        for raw in [
            "25:00", "24", "10:60", "10:00:60", "", "  ", "1:2:3:4", "abc", "1h", "123", ":30",
            "-1", "1.5",
        ] {
            assert_eq!(
                normalize(raw),
                Err(DomainError::InvalidDuration { raw: raw.to_string() }),
                "`{raw}` should be rejected"
            );
        }
    }

    #[test]
    fn duration_converts_to_fractional_hours() {
        let duration: WorkDuration = "1:30".parse().expect("valid duration");
        assert_eq!(duration.as_hours(), Decimal::new(150, 2));
    }
}
