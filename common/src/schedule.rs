use std::{fmt, str::FromStr};

use chrono::{Datelike, Timelike, Weekday};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("time string is empty")]
    Empty,
    #[error("malformed time string {0:?}, expected HH:MM")]
    Malformed(String),
    #[error("time {hour}:{minute:02} is out of range")]
    OutOfRange { hour: u32, minute: u32 },
}

/// Wall-clock time of day at minute granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, TimeParseError> {
        if hour > 23 || minute > 59 {
            return Err(TimeParseError::OutOfRange { hour, minute });
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn of<T: Timelike>(now: &T) -> Self {
        Self {
            hour: now.hour() as u8,
            minute: now.minute() as u8,
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    /// Accepts `H`, `HH`, `H:MM`, `HH:MM` and `HH:MM:SS` (seconds ignored).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TimeParseError::Empty);
        }

        let malformed = || TimeParseError::Malformed(trimmed.to_string());
        let mut parts = trimmed.split(':');
        let mut field = |required: bool| -> Result<Option<u32>, TimeParseError> {
            match parts.next() {
                Some(part) if !part.is_empty() && part.len() <= 2 => {
                    part.parse::<u32>().map(Some).map_err(|_| malformed())
                }
                Some(_) => Err(malformed()),
                None if required => Err(malformed()),
                None => Ok(None),
            }
        };

        let hour = field(true)?.unwrap_or_default();
        let minute = field(false)?.unwrap_or_default();
        let _seconds = field(false)?;
        if parts.next().is_some() {
            return Err(malformed());
        }

        Self::new(hour, minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Daily active window. A missing bound leaves that side unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<TimeOfDay>,
    pub end: Option<TimeOfDay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollGate {
    Open,
    MasterOff,
    Weekend,
    BeforeStart,
    AfterEnd,
}

impl PollGate {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::MasterOff => "master switch off",
            Self::Weekend => "weekend",
            Self::BeforeStart => "before working hours",
            Self::AfterEnd => "after working hours",
        }
    }
}

/// Decides whether presence should be fetched at `now`, reporting why not.
pub fn evaluate<T: Datelike + Timelike>(
    now: &T,
    window: &TimeWindow,
    weekend_enabled: bool,
    master_on: bool,
) -> PollGate {
    if !master_on {
        return PollGate::MasterOff;
    }

    if !weekend_enabled && matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return PollGate::Weekend;
    }

    let current = TimeOfDay::of(now);

    if window.start.is_some_and(|start| current < start) {
        return PollGate::BeforeStart;
    }

    if window.end.is_some_and(|end| current > end) {
        return PollGate::AfterEnd;
    }

    PollGate::Open
}

pub fn should_poll<T: Datelike + Timelike>(
    now: &T,
    window: &TimeWindow,
    weekend_enabled: bool,
    master_on: bool,
) -> bool {
    evaluate(now, window, weekend_enabled, master_on).is_open()
}
