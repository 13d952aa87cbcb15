use std::cmp::Ordering;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::minutes_or_end_of_day;
use crate::dates::{end_of_week, month_bounds, start_of_week};
use crate::recurrence::{DEFAULT_RECURRENCE_MARKER, DateRange, expand_with_marker};
use crate::task::{Occurrence, Task};

/// One calendar date in a month or week grid.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub date: NaiveDate,
    pub is_today: bool,
    /// False for leading/trailing days outside the displayed month.
    pub in_period: bool,
    pub occurrences: Vec<Occurrence>,
    /// Previous day's cross-midnight occurrences whose tail lands here.
    pub carried_over: Vec<Occurrence>,
}

impl Cell {
    fn empty(date: NaiveDate, today: NaiveDate, in_period: bool) -> Self {
        Self {
            date,
            is_today: date == today,
            in_period,
            occurrences: vec![],
            carried_over: vec![],
        }
    }
}

/// Partitions expanded occurrences into calendar cells.
#[derive(Debug, Clone, Copy)]
pub struct GridBuilder<'a> {
    today: NaiveDate,
    marker: &'a str,
}

impl<'a> GridBuilder<'a> {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            marker: DEFAULT_RECURRENCE_MARKER,
        }
    }

    #[must_use]
    pub fn with_marker(mut self, marker: &'a str) -> Self {
        self.marker = marker;
        self
    }

    /// Whole weeks, Sunday to Saturday, covering the month (`month` 1-based).
    /// An invalid month yields an empty grid.
    #[tracing::instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub fn month(&self, tasks: &[Task], year: i32, month: u32) -> Vec<Vec<Cell>> {
        let Some((first, last)) = month_bounds(year, month) else {
            warn!(year, month, "invalid month for grid");
            return vec![];
        };

        let range = DateRange::new(start_of_week(first), end_of_week(last));
        let cells = self.cells(tasks, range, |date| {
            date.year() == year && date.month() == month
        });

        let weeks: Vec<Vec<Cell>> = cells
            .chunks(7)
            .map(<[Cell]>::to_vec)
            .collect();
        debug!(weeks = weeks.len(), "built month grid");
        weeks
    }

    /// The seven days, Sunday to Saturday, of the week containing `anchor`.
    #[tracing::instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub fn week(&self, tasks: &[Task], anchor: NaiveDate) -> Vec<Cell> {
        let range = DateRange::new(start_of_week(anchor), end_of_week(anchor));
        self.cells(tasks, range, |_| true)
    }

    fn cells(&self, tasks: &[Task], range: DateRange, in_period: impl Fn(NaiveDate) -> bool) -> Vec<Cell> {
        let occurrences = expand_with_marker(tasks, range.widened(1), self.marker);

        let mut cells: Vec<Cell> = range
            .days()
            .map(|date| Cell::empty(date, self.today, in_period(date)))
            .collect();

        for occurrence in occurrences {
            let tail_index = occurrence
                .is_cross_midnight()
                .then(|| cell_index(range, occurrence.due_date.succ_opt()?))
                .flatten();
            if let Some(index) = tail_index {
                cells[index].carried_over.push(occurrence.clone());
            }
            if let Some(index) = cell_index(range, occurrence.due_date) {
                cells[index].occurrences.push(occurrence);
            }
        }

        for cell in &mut cells {
            sort_cell_occurrences(&mut cell.occurrences);
            sort_cell_occurrences(&mut cell.carried_over);
        }
        cells
    }
}

fn cell_index(range: DateRange, date: NaiveDate) -> Option<usize> {
    if !range.contains(date) {
        return None;
    }
    usize::try_from((date - range.start).num_days()).ok()
}

/// Month grid with the default recurrence marker.
pub fn build_month_grid(tasks: &[Task], year: i32, month: u32, today: NaiveDate) -> Vec<Vec<Cell>> {
    GridBuilder::new(today).month(tasks, year, month)
}

/// Week grid with the default recurrence marker.
pub fn build_week_grid(tasks: &[Task], anchor: NaiveDate, today: NaiveDate) -> Vec<Cell> {
    GridBuilder::new(today).week(tasks, anchor)
}

/// All-day first, then by start (or due) time, then by title.
pub fn sort_cell_occurrences(occurrences: &mut [Occurrence]) {
    occurrences.sort_by(compare_in_cell);
}

fn compare_in_cell(a: &Occurrence, b: &Occurrence) -> Ordering {
    b.is_all_day()
        .cmp(&a.is_all_day())
        .then_with(|| sort_minutes(a).cmp(&sort_minutes(b)))
        .then_with(|| a.title.cmp(&b.title))
}

fn sort_minutes(occurrence: &Occurrence) -> u32 {
    minutes_or_end_of_day(
        occurrence
            .start_time
            .as_deref()
            .or(occurrence.due_time.as_deref()),
    )
}
