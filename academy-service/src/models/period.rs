//! Billing period (`YYYY-MM`).

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid billing period '{0}', expected YYYY-MM")]
pub struct InvalidPeriod(pub String);

/// A calendar month used as the billing period of a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, InvalidPeriod> {
        if !(1..=12).contains(&month) || !(1900..=9999).contains(&year) {
            return Err(InvalidPeriod(format!("{:04}-{:02}", year, month)));
        }
        Ok(Self { year, month })
    }

    /// The period containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Number of days in the month.
    pub fn days_in_month(&self) -> u32 {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.pred_opt())
            .map(|d| d.day())
            .unwrap_or(28)
    }

    /// Due date on `day` of this month, clamped to the month length.
    pub fn due_date(&self, day: u32) -> NaiveDate {
        let day = day.clamp(1, self.days_in_month());
        NaiveDate::from_ymd_opt(self.year, self.month, day).unwrap_or_else(|| self.first_day())
    }

    /// Human label, e.g. `March 2026`.
    pub fn label(&self) -> String {
        format!("{} {}", MONTH_NAMES[(self.month - 1) as usize], self.year)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for BillingPeriod {
    type Err = InvalidPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidPeriod(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for BillingPeriod {
    type Error = InvalidPeriod;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillingPeriod> for String {
    fn from(period: BillingPeriod) -> Self {
        period.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats() {
        let period: BillingPeriod = "2026-03".parse().unwrap();
        assert_eq!(period.year(), 2026);
        assert_eq!(period.month(), 3);
        assert_eq!(period.to_string(), "2026-03");
        assert_eq!(period.label(), "March 2026");
    }

    #[test]
    fn rejects_malformed_periods() {
        for raw in ["2026-13", "2026-00", "2026-3", "26-03", "2026/03", "", "abcd-ef"] {
            assert!(raw.parse::<BillingPeriod>().is_err(), "{raw} should fail");
        }
    }

    #[test]
    fn due_date_is_clamped_to_month_length() {
        let feb: BillingPeriod = "2026-02".parse().unwrap();
        assert_eq!(feb.due_date(31), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
        let leap: BillingPeriod = "2028-02".parse().unwrap();
        assert_eq!(leap.due_date(30), NaiveDate::from_ymd_opt(2028, 2, 29).unwrap());
        let dec: BillingPeriod = "2026-12".parse().unwrap();
        assert_eq!(dec.days_in_month(), 31);
        assert_eq!(dec.due_date(0), NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
    }

    #[test]
    fn serde_uses_string_form() {
        let period: BillingPeriod = serde_json::from_str("\"2026-07\"").unwrap();
        assert_eq!(serde_json::to_string(&period).unwrap(), "\"2026-07\"");
        assert!(serde_json::from_str::<BillingPeriod>("\"2026-7\"").is_err());
    }
}
