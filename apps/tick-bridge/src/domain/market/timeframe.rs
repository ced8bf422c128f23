//! Provider timeframe codes.

use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;

use super::RequestError;

/// Bar timeframe understood by the provider's snapshot request factory.
///
/// Codes are case-sensitive: `m1` is one minute, `M1` is one month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    /// Tick-level data.
    Tick,
    /// One minute.
    Minute1,
    /// Five minutes.
    Minute5,
    /// Fifteen minutes.
    Minute15,
    /// Thirty minutes.
    Minute30,
    /// One hour.
    Hour1,
    /// Two hours.
    Hour2,
    /// Three hours.
    Hour3,
    /// Four hours.
    Hour4,
    /// Six hours.
    Hour6,
    /// Eight hours.
    Hour8,
    /// One day.
    Day1,
    /// One week.
    Week1,
    /// One month.
    Month1,
}

impl Timeframe {
    /// All timeframes in ascending bar length.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Tick,
            Self::Minute1,
            Self::Minute5,
            Self::Minute15,
            Self::Minute30,
            Self::Hour1,
            Self::Hour2,
            Self::Hour3,
            Self::Hour4,
            Self::Hour6,
            Self::Hour8,
            Self::Day1,
            Self::Week1,
            Self::Month1,
        ]
    }

    /// Provider code for this timeframe.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Tick => "t1",
            Self::Minute1 => "m1",
            Self::Minute5 => "m5",
            Self::Minute15 => "m15",
            Self::Minute30 => "m30",
            Self::Hour1 => "H1",
            Self::Hour2 => "H2",
            Self::Hour3 => "H3",
            Self::Hour4 => "H4",
            Self::Hour6 => "H6",
            Self::Hour8 => "H8",
            Self::Day1 => "D1",
            Self::Week1 => "W1",
            Self::Month1 => "M1",
        }
    }

    /// Nominal spacing between consecutive bars.
    ///
    /// Ticks have no fixed spacing; one second is used. Months count as 30 days.
    #[must_use]
    pub fn bar_length(self) -> TimeDelta {
        match self {
            Self::Tick => TimeDelta::seconds(1),
            Self::Minute1 => TimeDelta::minutes(1),
            Self::Minute5 => TimeDelta::minutes(5),
            Self::Minute15 => TimeDelta::minutes(15),
            Self::Minute30 => TimeDelta::minutes(30),
            Self::Hour1 => TimeDelta::hours(1),
            Self::Hour2 => TimeDelta::hours(2),
            Self::Hour3 => TimeDelta::hours(3),
            Self::Hour4 => TimeDelta::hours(4),
            Self::Hour6 => TimeDelta::hours(6),
            Self::Hour8 => TimeDelta::hours(8),
            Self::Day1 => TimeDelta::days(1),
            Self::Week1 => TimeDelta::weeks(1),
            Self::Month1 => TimeDelta::days(30),
        }
    }
}

impl FromStr for Timeframe {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|tf| tf.code() == s)
            .ok_or_else(|| RequestError::UnknownResolution(s.to_string()))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
