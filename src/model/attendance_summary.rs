use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::attendance::AttStatus;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceSummary {
    pub id: u64,
    pub com_id: u64,
    pub emp_id: u64,
    #[schema(example = 2025)]
    pub dt_year: i32,
    #[schema(example = 9)]
    pub dt_month: i32,
    pub present: i32,
    pub late: i32,
    pub absent: i32,
}

/// Summary row with the employee's code and name.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceSummaryView {
    pub id: u64,
    pub com_id: u64,
    pub emp_id: u64,
    pub emp_code: Option<String>,
    pub emp_name: Option<String>,
    pub dt_year: i32,
    pub dt_month: i32,
    pub present: i32,
    pub late: i32,
    pub absent: i32,
}

/// A calendar month, the unit summaries and salaries are produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthPeriod {
    first: NaiveDate,
}

impl MonthPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first| Self { first })
    }

    /// Parses the `YYYY-MM` form used by month pickers.
    pub fn parse(value: &str) -> Option<Self> {
        let (year, month) = value.trim().split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> u32 {
        self.first.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first
    }

    pub fn last_day(&self) -> NaiveDate {
        let next = if self.first.month() == 12 {
            NaiveDate::from_ymd_opt(self.first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.first.year(), self.first.month() + 1, 1)
        };
        next.and_then(|d| d.pred_opt()).unwrap_or(self.first)
    }

    pub fn days(&self) -> u32 {
        self.last_day().day()
    }

    /// Number of days in the month on or after `joined`; zero when the
    /// employee joined after the month ended.
    pub fn days_employed(&self, joined: NaiveDate) -> u32 {
        let last = self.last_day();
        if joined > last {
            return 0;
        }
        let start = joined.max(self.first);
        ((last - start).num_days() + 1) as u32
    }
}

/// Per-employee rollup of attendance codes over a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub present: u32,
    pub late: u32,
    pub absent: u32,
}

impl Tally {
    /// Days without an attended record count as absent, whether an `A` row
    /// exists for them or not.
    pub fn count<I>(statuses: I, days_in_period: u32) -> Self
    where
        I: IntoIterator<Item = AttStatus>,
    {
        let mut tally = Tally::default();
        for status in statuses {
            match status {
                AttStatus::Present => tally.present += 1,
                AttStatus::Late => tally.late += 1,
                AttStatus::Absent => {}
            }
        }
        tally.absent = days_in_period.saturating_sub(tally.attended());
        tally
    }

    pub fn attended(&self) -> u32 {
        self.present + self.late
    }
}

/// Tallies a month for every employee who had joined by its last day.
/// `records` are `(emp_id, status)` pairs of that month; records of other
/// employees are ignored.
pub fn summarize_month(
    period: &MonthPeriod,
    employees: &[(u64, NaiveDate)],
    records: &[(u64, AttStatus)],
) -> Vec<(u64, Tally)> {
    let mut by_employee: HashMap<u64, Vec<AttStatus>> = HashMap::new();
    for (emp_id, status) in records {
        by_employee.entry(*emp_id).or_default().push(*status);
    }

    employees
        .iter()
        .filter_map(|(emp_id, joined)| {
            let days = period.days_employed(*joined);
            if days == 0 {
                return None;
            }
            let statuses = by_employee.remove(emp_id).unwrap_or_default();
            Some((*emp_id, Tally::count(statuses, days)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_month_picker_values() {
        let period = MonthPeriod::parse("2025-09").unwrap();
        assert_eq!(period.year(), 2025);
        assert_eq!(period.month(), 9);
        assert!(MonthPeriod::parse("2025-13").is_none());
        assert!(MonthPeriod::parse("2025/09").is_none());
        assert!(MonthPeriod::parse("25-09").is_none());
        assert!(MonthPeriod::parse("").is_none());
    }

    #[test]
    fn month_lengths() {
        assert_eq!(MonthPeriod::new(2024, 2).unwrap().days(), 29);
        assert_eq!(MonthPeriod::new(2025, 2).unwrap().days(), 28);
        assert_eq!(MonthPeriod::new(2025, 12).unwrap().last_day(), date(2025, 12, 31));
        assert_eq!(MonthPeriod::new(2025, 4).unwrap().days(), 30);
    }

    #[test]
    fn days_employed_respects_join_date() {
        let sept = MonthPeriod::new(2025, 9).unwrap();
        assert_eq!(sept.days_employed(date(2020, 1, 1)), 30);
        assert_eq!(sept.days_employed(date(2025, 9, 21)), 10);
        assert_eq!(sept.days_employed(date(2025, 9, 30)), 1);
        assert_eq!(sept.days_employed(date(2025, 10, 1)), 0);
    }

    #[test]
    fn tally_counts_missing_days_as_absent() {
        let statuses = [
            AttStatus::Present,
            AttStatus::Present,
            AttStatus::Late,
            AttStatus::Absent,
        ];
        let tally = Tally::count(statuses, 30);
        assert_eq!(tally.present, 2);
        assert_eq!(tally.late, 1);
        assert_eq!(tally.absent, 27);
        assert_eq!(tally.attended(), 3);
    }

    #[test]
    fn tally_never_goes_negative() {
        let tally = Tally::count([AttStatus::Present; 5], 3);
        assert_eq!(tally.absent, 0);
    }

    #[test]
    fn month_summary_skips_late_joiners_and_prorates() {
        let sept = MonthPeriod::new(2025, 9).unwrap();
        let employees = [
            (1, date(2024, 1, 1)),
            (2, date(2025, 9, 26)),
            (3, date(2025, 10, 2)),
        ];
        let records = [
            (1, AttStatus::Present),
            (1, AttStatus::Late),
            (2, AttStatus::Present),
            (3, AttStatus::Present),
            (99, AttStatus::Present),
        ];

        let summary = summarize_month(&sept, &employees, &records);
        assert_eq!(summary.len(), 2);

        let (emp, tally) = summary[0];
        assert_eq!(emp, 1);
        assert_eq!((tally.present, tally.late, tally.absent), (1, 1, 28));

        let (emp, tally) = summary[1];
        assert_eq!(emp, 2);
        assert_eq!((tally.present, tally.late, tally.absent), (1, 0, 4));
    }
}
