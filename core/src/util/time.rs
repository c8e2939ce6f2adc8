use chrono::{Datelike, NaiveDate, TimeZone, Utc};

/// A calendar month, the unit most upstream APIs group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// `YYYY-MM`, the key format used across summary trees.
    pub fn formatted(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// `YYYY-MM` of an arbitrary date.
pub fn year_month_of(date: NaiveDate) -> String {
    YearMonth {
        year: date.year(),
        month: date.month(),
    }
    .formatted()
}

/// Midnight-UTC ISO timestamp for a calendar day.
pub fn to_iso_date(year: i32, month: u32, day: u32) -> Option<String> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
}

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_first.pred_opt()?))
}

/// Month bounds as midnight-UTC ISO timestamps, the form the ReliefWeb
/// date filters expect.
pub fn month_bounds_iso(year: i32, month: u32) -> Option<(String, String)> {
    let (first, last) = month_bounds(year, month)?;
    Some((
        to_iso_date(first.year(), first.month(), first.day())?,
        to_iso_date(last.year(), last.month(), last.day())?,
    ))
}

/// Every month of every year in `start_year..=end_year`.
pub fn months_between(start_year: i32, end_year: i32) -> Vec<YearMonth> {
    let mut months = Vec::new();
    for year in start_year..=end_year {
        for month in 1..=12 {
            months.push(YearMonth { year, month });
        }
    }
    months
}

/// `(now - years, now)` as calendar years. `now` is explicit: callers
/// own the clock, nothing here reads it at import time.
pub fn year_range_back(now: NaiveDate, years: i32) -> (i32, i32) {
    (now.year() - years, now.year())
}

/// Every month of the last `years` years up to `now`'s year.
pub fn months_back(now: NaiveDate, years: i32) -> Vec<YearMonth> {
    let (start, end) = year_range_back(now, years);
    months_between(start, end)
}

/// `H:MM:SS` for end-of-run reporting.
pub fn human_duration(duration: std::time::Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_bounds_handle_year_end() {
        let (first, last) = month_bounds(2018, 12).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2018, 12, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2018, 12, 31).unwrap());
    }

    #[test]
    fn month_bounds_handle_february() {
        let (_, last) = month_bounds(2020, 2).unwrap();
        assert_eq!(last, NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
    }

    #[test]
    fn iso_bounds_are_midnight_utc() {
        let (from, to) = month_bounds_iso(2018, 6).unwrap();
        assert_eq!(from, "2018-06-01T00:00:00+00:00");
        assert_eq!(to, "2018-06-30T00:00:00+00:00");
    }

    #[test]
    fn months_back_covers_inclusive_range() {
        let now = NaiveDate::from_ymd_opt(2018, 6, 15).unwrap();
        let months = months_back(now, 10);
        assert_eq!(months.len(), 11 * 12);
        assert_eq!(months[0].formatted(), "2008-01");
        assert_eq!(months.last().unwrap().formatted(), "2018-12");
    }

    #[test]
    fn human_duration_formats_hours() {
        assert_eq!(
            human_duration(std::time::Duration::from_secs(3723)),
            "1:02:03"
        );
    }
}
