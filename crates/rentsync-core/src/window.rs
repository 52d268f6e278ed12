//! The sync window a run operates over.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window start {since} is after window end {until}")]
    Inverted { since: NaiveDate, until: NaiveDate },

    #[error("cannot step back a year from {0}")]
    OutOfRange(NaiveDate),
}

/// 23:59 on the given day.
pub fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN) + TimeDelta::minutes(24 * 60 - 1)
}

/// The last minute of the calendar month containing `ts`.
pub fn end_of_month(ts: NaiveDateTime) -> NaiveDateTime {
    let day = ts.date();
    let first = day.with_day(1).unwrap_or(day);
    let next = first
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX);
    next.and_time(NaiveTime::MIN) - TimeDelta::minutes(1)
}

/// A closed `[since, until]` interval plus the comparison ceiling.
///
/// `compare_until` is `until` clamped to the end of the current month: the
/// platform only accepts declarations up to the current month, so nothing
/// beyond it is ever projected, compared or mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    pub since: NaiveDateTime,
    pub until: NaiveDateTime,
    pub compare_until: NaiveDateTime,
}

impl SyncWindow {
    /// Build the window from operator-supplied dates.
    ///
    /// `since` defaults to one year before today and starts at 00:00;
    /// `until` defaults to today and ends at 23:59.
    pub fn resolve(
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
        now: NaiveDateTime,
    ) -> Result<Self, WindowError> {
        let today = now.date();
        let since_day = match since {
            Some(day) => day,
            None => today
                .checked_sub_months(Months::new(12))
                .ok_or(WindowError::OutOfRange(today))?,
        };
        let until_day = until.unwrap_or(today);
        if since_day > until_day {
            return Err(WindowError::Inverted {
                since: since_day,
                until: until_day,
            });
        }
        let since = since_day.and_time(NaiveTime::MIN);
        let until = end_of_day(until_day);
        Ok(Self {
            since,
            until,
            compare_until: until.min(end_of_month(now)),
        })
    }

    /// Intersect a period with `[since, compare_until]`.
    ///
    /// Returns `None` when the intersection is empty.
    pub fn clamp(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = start.max(self.since);
        let end = end.min(self.compare_until);
        (start <= end).then_some((start, end))
    }
}
