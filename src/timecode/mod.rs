//! Timestamp parsing and formatting.
//!
//! Timecodes are accepted as `HH:MM:SS`, `MM:SS` or `SS` and always rendered
//! back in the zero-padded `HH:MM:SS` form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Errors raised while interpreting timecodes
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimecodeError {
    #[error("Invalid time format: {0:?} (use HH:MM:SS, MM:SS, or SS)")]
    Format(String),

    #[error("End time ({end}) must be after start time ({start})")]
    Order { start: String, end: String },
}

/// Parse a timecode string into a number of seconds
pub fn parse_timecode(input: &str) -> Result<u64, TimecodeError> {
    let format_error = || TimecodeError::Format(input.to_string());

    let groups = input
        .split(':')
        .map(|group| {
            if group.is_empty() || !group.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format_error());
            }
            group.parse::<u64>().map_err(|_| format_error())
        })
        .collect::<Result<Vec<u64>, _>>()?;

    let seconds = match groups.as_slice() {
        [h, m, s] => h
            .checked_mul(3600)
            .and_then(|h| m.checked_mul(60).and_then(|m| h.checked_add(m)))
            .and_then(|hm| hm.checked_add(*s)),
        [m, s] => m.checked_mul(60).and_then(|m| m.checked_add(*s)),
        [s] => Some(*s),
        _ => None,
    };

    seconds.ok_or_else(format_error)
}

/// Render seconds in the canonical `HH:MM:SS` form
pub fn format_timecode(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Seconds between two timecode strings; `end` must be strictly later than `start`
pub fn duration_between(start: &str, end: &str) -> Result<u64, TimecodeError> {
    let start_secs = parse_timecode(start)?;
    let end_secs = parse_timecode(end)?;

    if end_secs <= start_secs {
        return Err(TimecodeError::Order {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    Ok(end_secs - start_secs)
}

/// A parsed point in time, measured in whole seconds from zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timecode(u64);

impl Timecode {
    pub const fn from_secs(seconds: u64) -> Self {
        Self(seconds)
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds from `self` until `end`
    pub fn duration_until(&self, end: Timecode) -> Result<u64, TimecodeError> {
        if end.0 <= self.0 {
            return Err(TimecodeError::Order {
                start: self.to_string(),
                end: end.to_string(),
            });
        }
        Ok(end.0 - self.0)
    }
}

impl FromStr for Timecode {
    type Err = TimecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_timecode(s).map(Timecode)
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_timecode(self.0))
    }
}

impl Serialize for Timecode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timecode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
