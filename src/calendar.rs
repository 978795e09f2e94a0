use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::date_util::{first_day_of_month, last_day_of_month};
use crate::period::MonthKey;

/// One row of a month view, Monday first. Days outside the month are `None`.
pub type Week = [Option<NaiveDate>; 7];

/// Monday-first weeks covering `month`. The first and last weeks are padded
/// with `None`.
pub fn month_grid(month: MonthKey) -> Vec<Week> {
    let (Some(first), Some(last)) = (
        first_day_of_month(month.year, month.month),
        last_day_of_month(month.year, month.month),
    ) else {
        return Vec::new();
    };

    let mut weeks = Vec::with_capacity(6);
    let mut week: Week = [None; 7];
    let mut day = first;
    while day <= last {
        let col = day.weekday().num_days_from_monday() as usize;
        week[col] = Some(day);
        if col == 6 {
            weeks.push(week);
            week = [None; 7];
        }
        day += Duration::days(1);
    }
    if week.iter().any(Option::is_some) {
        weeks.push(week);
    }
    weeks
}

/// The Monday..Sunday week containing `date`.
pub fn week_of(date: NaiveDate) -> [NaiveDate; 7] {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    std::array::from_fn(|i| monday + Duration::days(i as i64))
}

/// Count occurrences per day, ignoring strings that are not `YYYY-MM-DD`.
pub fn count_by_day<S: AsRef<str>>(dates: &[S]) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for s in dates {
        match NaiveDate::parse_from_str(s.as_ref(), "%Y-%m-%d") {
            Ok(d) => *counts.entry(d).or_insert(0) += 1,
            Err(_) => log::debug!("Skipping unparseable date: {}", s.as_ref()),
        }
    }
    counts
}
