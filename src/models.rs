//! Shared data models and API types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar lending period (year, month). Serialized as `yyyy-mm` in path
/// parameters and API payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (2000..=2100).contains(&year) {
            Some(Period { year, month })
        } else {
            None
        }
    }

    /// Period containing the given date.
    pub fn from_date(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Period {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn next(&self) -> Period {
        if self.month == 12 {
            Period {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Period {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First day of the period.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("valid period date")
    }

    /// Last day of the period.
    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day().pred_opt().expect("valid period date")
    }

    /// Period shifted forward by `months` whole months.
    pub fn plus_months(&self, months: u32) -> Period {
        let total = (self.year * 12 + self.month as i32 - 1) + months as i32;
        Period {
            year: total.div_euclid(12),
            month: (total.rem_euclid(12) + 1) as u32,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid period '{}', expected yyyy-mm", s))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("Invalid year in period '{}'", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("Invalid month in period '{}'", s))?;
        Period::new(year, month).ok_or_else(|| format!("Period '{}' out of range", s))
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parse_and_display() {
        let p: Period = "2026-02".parse().unwrap();
        assert_eq!(p, Period::new(2026, 2).unwrap());
        assert_eq!(p.to_string(), "2026-02");

        assert!("2026-13".parse::<Period>().is_err());
        assert!("202602".parse::<Period>().is_err());
        assert!("abcd-ef".parse::<Period>().is_err());
    }

    #[test]
    fn test_period_next_wraps_year() {
        let dec = Period::new(2026, 12).unwrap();
        assert_eq!(dec.next(), Period::new(2027, 1).unwrap());
        assert_eq!(Period::new(2026, 5).unwrap().next(), Period::new(2026, 6).unwrap());
    }

    #[test]
    fn test_period_plus_months() {
        let p = Period::new(2026, 11).unwrap();
        assert_eq!(p.plus_months(3), Period::new(2027, 2).unwrap());
        assert_eq!(p.plus_months(0), p);
        assert_eq!(p.plus_months(24), Period::new(2028, 11).unwrap());
    }

    #[test]
    fn test_period_day_bounds() {
        let feb = Period::new(2024, 2).unwrap();
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }
}
