//! Calendar-month segmentation of rental periods.
//!
//! The platform models a declaration as a month-bounded fact: a contract
//! running from mid-January to mid-March is declared as three records, one
//! per calendar month. Long contracts therefore expand into many segments.
//!
//! # Segmentation
//!
//! - The first segment starts at the period start
//! - Every segment ends at the last minute of its month, or the period end,
//!   whichever is earlier
//! - The next segment starts one minute after the previous one ends
//! - Segments never overlap and leave no gaps

use chrono::{NaiveDateTime, TimeDelta};

use crate::record::truncate_to_minute;
use crate::window::end_of_month;

/// Iterator over `(start, end)` month segments of a closed period.
///
/// Built by [`month_segments`].
#[derive(Debug, Clone)]
pub struct MonthSegments {
    cursor: NaiveDateTime,
    end: NaiveDateTime,
}

/// Split the closed period `[start, end]` at calendar-month boundaries.
///
/// Both bounds are truncated to the minute. An inverted period yields
/// nothing. Callers clamp the period to the sync window first; see
/// [`SyncWindow::clamp`](crate::window::SyncWindow::clamp).
pub fn month_segments(start: NaiveDateTime, end: NaiveDateTime) -> MonthSegments {
    MonthSegments {
        cursor: truncate_to_minute(start),
        end: truncate_to_minute(end),
    }
}

impl Iterator for MonthSegments {
    type Item = (NaiveDateTime, NaiveDateTime);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor > self.end {
            return None;
        }
        let segment_end = end_of_month(self.cursor).min(self.end);
        let segment = (self.cursor, segment_end);
        self.cursor = segment_end + TimeDelta::minutes(1);
        Some(segment)
    }
}
