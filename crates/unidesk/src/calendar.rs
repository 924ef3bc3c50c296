//! Month grid layout for the calendar view.
//!
//! A month is laid out on a 7-column grid starting on Sunday. Day 1 is
//! preceded by one blank cell per weekday before it, and the last week row
//! is padded with blanks so the total cell count is always a multiple of 7.
//! Each day cell shows at most [`MAX_VISIBLE_EVENTS`] events, in input order,
//! and counts the rest as overflow.

use chrono::{Datelike, Month, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::types::CalendarEvent;

/// Events shown per day cell before the rest collapse into "+N more"
pub const MAX_VISIBLE_EVENTS: usize = 3;

/// Characters of an event title shown inside a day cell
pub const TITLE_DISPLAY_CHARS: usize = 20;

pub const DAYS_PER_WEEK: u32 = 7;

/// Column headers, in grid order
pub const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),
    #[error("year {0} is outside the supported calendar range")]
    InvalidYear(i32),
}

/// One day of the month with the events that start on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCell {
    pub day: u32,
    pub is_today: bool,
    pub visible_events: Vec<CalendarEvent>,
    pub overflow_count: usize,
}

impl DayCell {
    pub fn total_events(&self) -> usize {
        self.visible_events.len() + self.overflow_count
    }

    pub fn is_empty(&self) -> bool {
        self.visible_events.is_empty()
    }
}

/// A renderable month: leading blanks, one cell per day, trailing blanks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub days_in_month: u32,
    pub leading_blanks: u32,
    pub days: Vec<DayCell>,
    pub trailing_blanks: u32,
}

/// A position on the 7-column grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridCell<'a> {
    Blank,
    Day(&'a DayCell),
}

impl MonthGrid {
    pub fn total_cells(&self) -> u32 {
        self.leading_blanks + self.days_in_month + self.trailing_blanks
    }

    pub fn cells(&self) -> impl Iterator<Item = GridCell<'_>> {
        let leading = (0..self.leading_blanks).map(|_| GridCell::Blank);
        let trailing = (0..self.trailing_blanks).map(|_| GridCell::Blank);
        leading
            .chain(self.days.iter().map(GridCell::Day))
            .chain(trailing)
    }

    /// Grid rows of exactly 7 cells
    pub fn weeks(&self) -> Vec<Vec<GridCell<'_>>> {
        let cells: Vec<_> = self.cells().collect();
        cells
            .chunks(DAYS_PER_WEEK as usize)
            .map(|week| week.to_vec())
            .collect()
    }

    pub fn month_name(&self) -> &'static str {
        u8::try_from(self.month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("")
    }

    #[cfg(test)]
    pub fn day(&self, day: u32) -> Option<&DayCell> {
        self.days.get(day.checked_sub(1)? as usize)
    }

    pub fn previous(&self) -> (i32, u32) {
        previous_month(self.year, self.month)
    }

    pub fn next(&self) -> (i32, u32) {
        next_month(self.year, self.month)
    }
}

impl fmt::Display for MonthGrid {
    /// Plain-text month: days with events are marked with `*`, today with `<`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.month_name(), self.year)?;
        writeln!(f, "{}", WEEKDAY_NAMES.join(" "))?;
        for week in self.weeks() {
            let line: String = week
                .iter()
                .map(|cell| match cell {
                    GridCell::Blank => "    ".to_string(),
                    GridCell::Day(day) => {
                        let marker = if day.is_today {
                            '<'
                        } else if day.is_empty() {
                            ' '
                        } else {
                            '*'
                        };
                        format!("{:>3}{}", day.day, marker)
                    }
                })
                .collect();
            writeln!(f, "{}", line.trim_end())?;
        }
        Ok(())
    }
}

pub fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, GridError> {
    if !(1..=12).contains(&month) {
        return Err(GridError::InvalidMonth(month));
    }
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(GridError::InvalidYear(year))
}

/// Half-open `[start, end)` range of timestamps covering the month
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDateTime, NaiveDateTime), GridError> {
    let first = first_of_month(year, month)?;
    let (next_year, next) = next_month(year, month);
    let following = NaiveDate::from_ymd_opt(next_year, next, 1).ok_or(GridError::InvalidYear(year))?;
    Ok((first.and_time(NaiveTime::MIN), following.and_time(NaiveTime::MIN)))
}

pub fn days_in_month(year: i32, month: u32) -> Result<u32, GridError> {
    let (start, end) = month_bounds(year, month)?;
    Ok((end.date() - start.date()).num_days() as u32)
}

pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Lay out a month. `events` are expected to start within the month; any that
/// don't are skipped. `today` only drives the `is_today` flag.
pub fn build_month_grid(
    year: i32,
    month: u32,
    events: &[CalendarEvent],
    today: NaiveDate,
) -> Result<MonthGrid, GridError> {
    let first = first_of_month(year, month)?;
    let days_in_month = days_in_month(year, month)?;
    let leading_blanks = first.weekday().num_days_from_sunday();

    let mut buckets: Vec<Vec<&CalendarEvent>> = vec![Vec::new(); days_in_month as usize];
    for event in events {
        if !event.falls_in(year, month) {
            debug!(id = %event.id, start = %event.start_date, "Skipping event outside month");
            continue;
        }
        buckets[event.start_date.day0() as usize].push(event);
    }

    let days = buckets
        .into_iter()
        .zip(1..)
        .map(|(bucket, day)| DayCell {
            day,
            is_today: today.year() == year && today.month() == month && today.day() == day,
            overflow_count: bucket.len().saturating_sub(MAX_VISIBLE_EVENTS),
            visible_events: bucket
                .into_iter()
                .take(MAX_VISIBLE_EVENTS)
                .cloned()
                .collect(),
        })
        .collect();

    let last_day_of_week = (leading_blanks + days_in_month) % DAYS_PER_WEEK;
    let trailing_blanks = if last_day_of_week == 0 {
        0
    } else {
        DAYS_PER_WEEK - last_day_of_week
    };

    Ok(MonthGrid {
        year,
        month,
        days_in_month,
        leading_blanks,
        days,
        trailing_blanks,
    })
}

/// Cut a title to `max` characters, marking the cut with `...`
pub fn truncate_title(title: &str, max: usize) -> String {
    match title.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &title[..byte_idx]),
        None => title.to_string(),
    }
}
