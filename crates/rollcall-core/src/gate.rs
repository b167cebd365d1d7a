//! Daily time-of-day window during which attendance may be marked.

use chrono::NaiveTime;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("invalid time of day {0:?}: expected HH:MM or HH:MM:SS")]
pub struct WindowParseError(pub String);

/// Inclusive `[start, end]` window, recurring every day.
///
/// A window whose start is after its end spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse a window from two `HH:MM` or `HH:MM:SS` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, WindowParseError> {
        Ok(Self::new(parse_time_of_day(start)?, parse_time_of_day(end)?))
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn is_open(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }
}

impl Default for TimeWindow {
    /// 10:00 to 10:30.
    fn default() -> Self {
        Self::new(hm(10, 0), hm(10, 30))
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M:%S"), self.end.format("%H:%M:%S"))
    }
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime, WindowParseError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| WindowParseError(s.to_string()))
}

fn hm(hour: u32, min: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, 0).unwrap_or_default()
}
