use chrono::NaiveDate;
use tracing::{debug, trace};

use crate::dates::add_days;
use crate::task::{Occurrence, Task};

pub const DEFAULT_RECURRENCE_MARKER: &str = " ↻";

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self::new(day, day)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Grows the range by `days` on both sides.
    #[must_use]
    pub fn widened(&self, days: i64) -> Self {
        Self::new(add_days(self.start, -days), add_days(self.end, days))
    }

    /// Every date in the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start
            .iter_days()
            .take_while(move |day| *day <= end)
    }
}

/// Expands `tasks` into the concrete occurrences visible in `range`.
pub fn expand(tasks: &[Task], range: DateRange) -> Vec<Occurrence> {
    expand_with_marker(tasks, range, DEFAULT_RECURRENCE_MARKER)
}

/// [`expand`] with a custom title marker for generated occurrences.
#[tracing::instrument(skip(tasks, marker), fields(tasks = tasks.len(), start = %range.start, end = %range.end))]
pub fn expand_with_marker(tasks: &[Task], range: DateRange, marker: &str) -> Vec<Occurrence> {
    let mut out = Vec::new();
    if range.is_empty() {
        debug!("empty expansion range");
        return out;
    }

    for task in tasks {
        if task.active_recurrence().is_some() {
            expand_recurring(task, range, marker, &mut out);
        } else if let Some(date) = placement_date(task, range) {
            out.push(Occurrence::from_task(task, date));
        } else {
            trace!(task = %task.id, "task not visible in range");
        }
    }

    debug!(occurrences = out.len(), "expanded tasks");
    out
}

fn expand_recurring(task: &Task, range: DateRange, marker: &str, out: &mut Vec<Occurrence>) {
    let Some(rule) = task.active_recurrence() else {
        return;
    };
    if !rule.is_well_formed() {
        debug!(task = %task.id, frequency = ?rule.frequency, "recurrence rule missing fields; skipping");
        return;
    }

    let first = rule
        .start_date
        .map_or(range.start, |start| start.max(range.start));
    let last = rule
        .end_date
        .map_or(range.end, |end| end.min(range.end));
    let window = DateRange::new(first, last);

    for day in window.days() {
        if !rule.matches_frequency(day) {
            continue;
        }
        if rule.is_exception(day) {
            trace!(task = %task.id, date = %day, "occurrence suppressed by exception");
            continue;
        }
        out.push(Occurrence::generated(task, day, marker));
    }
}

/// Date a non-recurring task is shown on, if it is visible in `range`.
///
/// Checked in order: due date, schedule date, creation date (untimed-due
/// tasks with a time only), then a cross-midnight task adjacent to `range`.
pub fn placement_date(task: &Task, range: DateRange) -> Option<NaiveDate> {
    if let Some(due) = task.due_date.filter(|due| range.contains(*due)) {
        return Some(due);
    }

    if let Some(scheduled) = task.schedule_date.filter(|day| range.contains(*day)) {
        return Some(scheduled);
    }

    if task.due_date.is_none()
        && task.has_time_fields()
        && let Some(created) = task
            .created_at
            .map(|ts| ts.date())
            .filter(|day| range.contains(*day))
    {
        return Some(created);
    }

    // A cross-midnight task on the day just outside the range still
    // contributes its other half to a day inside it.
    let due = task.due_date?;
    if task.is_cross_midnight()
        && (range.contains(add_days(due, 1)) || range.contains(add_days(due, -1)))
    {
        return Some(due);
    }

    None
}
