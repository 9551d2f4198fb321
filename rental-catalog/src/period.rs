use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit a vendor prices a rental in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodUnit {
    Hour,
    Day,
    Week,
    Month,
}

impl PeriodUnit {
    pub const ALL: [PeriodUnit; 4] = [
        PeriodUnit::Hour,
        PeriodUnit::Day,
        PeriodUnit::Week,
        PeriodUnit::Month,
    ];

    /// Length of one unit. A month is billed as 30 days.
    pub fn duration(&self) -> Duration {
        match self {
            PeriodUnit::Hour => Duration::hours(1),
            PeriodUnit::Day => Duration::days(1),
            PeriodUnit::Week => Duration::days(7),
            PeriodUnit::Month => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodUnit::Hour => "HOUR",
            PeriodUnit::Day => "DAY",
            PeriodUnit::Week => "WEEK",
            PeriodUnit::Month => "MONTH",
        }
    }

    /// Number of whole units needed to cover `span`, rounding any remainder up.
    pub fn units_to_cover(&self, span: Duration) -> i64 {
        let unit = self.duration().num_seconds();
        let span = span.num_seconds().max(0);
        if span == 0 {
            return 0;
        }
        (span + unit - 1) / unit
    }
}

impl fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HOUR" | "HOURLY" => Ok(PeriodUnit::Hour),
            "DAY" | "DAILY" => Ok(PeriodUnit::Day),
            "WEEK" | "WEEKLY" => Ok(PeriodUnit::Week),
            "MONTH" | "MONTHLY" => Ok(PeriodUnit::Month),
            other => Err(format!("unknown rental period: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_round_up() {
        assert_eq!(PeriodUnit::Day.units_to_cover(Duration::hours(24)), 1);
        assert_eq!(PeriodUnit::Day.units_to_cover(Duration::hours(25)), 2);
        assert_eq!(PeriodUnit::Week.units_to_cover(Duration::days(8)), 2);
        assert_eq!(PeriodUnit::Hour.units_to_cover(Duration::minutes(1)), 1);
        assert_eq!(PeriodUnit::Month.units_to_cover(Duration::zero()), 0);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("daily".parse::<PeriodUnit>().unwrap(), PeriodUnit::Day);
        assert_eq!("WEEK".parse::<PeriodUnit>().unwrap(), PeriodUnit::Week);
        assert!("fortnight".parse::<PeriodUnit>().is_err());
    }
}
