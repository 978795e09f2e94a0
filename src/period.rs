use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

/// A calendar month, the unit every goal and progress row is keyed by.
///
/// Field order matters: the derived `Ord` compares year first, then month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    /// Build a key, rejecting months outside 1-12.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if (1..=12).contains(&month) {
            Ok(Self { year, month })
        } else {
            Err(Error::PeriodParse(format!("month out of range: {year}-{month}")))
        }
    }

    /// Parse the canonical `YYYY-MM` form.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let caps = RE_MONTH
            .captures(s)
            .ok_or_else(|| Error::PeriodParse(format!("expected YYYY-MM, got: {s}")))?;
        let year: i32 = caps[1]
            .parse()
            .map_err(|_| Error::PeriodParse(format!("invalid year: {s}")))?;
        let month: u32 = caps[2]
            .parse()
            .map_err(|_| Error::PeriodParse(format!("invalid month: {s}")))?;
        Self::new(year, month)
    }

    pub fn from_date(d: NaiveDate) -> Self {
        Self {
            year: d.year(),
            month: d.month(),
        }
    }

    /// The key for the month containing today (local time).
    pub fn current() -> Self {
        Self::from_date(chrono::Local::now().date_naive())
    }

    /// Canonical `YYYY-MM` string.
    pub fn to_key(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }

    /// Short chart label, `MM/YY`.
    pub fn label(&self) -> String {
        format!("{:02}/{:02}", self.month, self.year.rem_euclid(100))
    }

    pub fn next(&self) -> Self {
        if self.month >= 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn previous(&self) -> Self {
        if self.month <= 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Months since year 0, used for range arithmetic.
    pub fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + self.month as i64
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_key())
    }
}

/// Every month from `from` to `to`, inclusive and ascending.
///
/// Callers must pass `from <= to`. A reversed pair yields an empty vector.
pub fn month_range(from: MonthKey, to: MonthKey) -> Vec<MonthKey> {
    let len = (to.ordinal() - from.ordinal() + 1).max(0) as usize;
    let mut months = Vec::with_capacity(len);
    let mut cursor = from;
    while cursor <= to {
        months.push(cursor);
        cursor = cursor.next();
    }
    months
}

/// Group months by year. Store queries filter on (year, month list), so each
/// year becomes one query.
pub fn months_by_year(months: &[MonthKey]) -> BTreeMap<i32, Vec<u32>> {
    let mut by_year: BTreeMap<i32, Vec<u32>> = BTreeMap::new();
    for m in months {
        let list = by_year.entry(m.year).or_default();
        if !list.contains(&m.month) {
            list.push(m.month);
        }
    }
    by_year
}
