//! The calendar, today dashboard and effort log all share these entry
//! points; each view only picks its visible range.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::capacity::{CapacitySettings, CapacityUsage, usage};
use crate::completion::{CompletionStore, apply_virtual_completion};
use crate::config::EngineConfig;
use crate::dates::add_days;
use crate::grid::sort_cell_occurrences;
use crate::layout::{TimeBlock, layout_day};
use crate::recurrence::{DateRange, expand_with_marker};
use crate::task::{Occurrence, Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub completed: usize,
    pub total: usize,
}

/// Completed/total actionable occurrences dated `date`.
pub fn summarize_day(occurrences: &[Occurrence], date: NaiveDate) -> DaySummary {
    occurrences
        .iter()
        .filter(|occ| occ.due_date == date && !occ.no_task)
        .fold(DaySummary::default(), |mut acc, occ| {
            acc.total += 1;
            if occ.completed {
                acc.completed += 1;
            }
            acc
        })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayView {
    pub date: NaiveDate,
    pub occurrences: Vec<Occurrence>,
    pub blocks: Vec<TimeBlock>,
    pub capacity: CapacityUsage,
    pub summary: DaySummary,
}

/// Everything a single-day screen needs.
#[tracing::instrument(skip(tasks, engine, settings, completion), fields(date = %date))]
pub fn day_view(
    tasks: &[Task],
    date: NaiveDate,
    engine: &EngineConfig,
    settings: Option<&CapacitySettings>,
    completion: Option<&dyn CompletionStore>,
) -> anyhow::Result<DayView> {
    let range = DateRange::new(add_days(date, -1), date);
    let mut expanded = expand_with_marker(tasks, range, &engine.recurrence_marker);
    if let Some(store) = completion {
        apply_virtual_completion(&mut expanded, store)?;
    }

    let blocks = layout_day(&expanded, date, &engine.layout);
    let capacity = usage(&expanded, tasks, date, settings);
    let summary = summarize_day(&expanded, date);

    let mut occurrences: Vec<Occurrence> = expanded
        .into_iter()
        .filter(|occ| occ.due_date == date)
        .collect();
    sort_cell_occurrences(&mut occurrences);

    Ok(DayView {
        date,
        occurrences,
        blocks,
        capacity,
        summary,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEffort {
    pub date: NaiveDate,
    pub capacity: CapacityUsage,
    pub summary: DaySummary,
}

/// Per-day booked minutes against capacity over an inclusive range.
#[tracing::instrument(skip(tasks, engine, settings, completion), fields(start = %range.start, end = %range.end))]
pub fn effort_log(
    tasks: &[Task],
    range: DateRange,
    engine: &EngineConfig,
    settings: Option<&CapacitySettings>,
    completion: Option<&dyn CompletionStore>,
) -> anyhow::Result<Vec<DayEffort>> {
    let mut expanded = expand_with_marker(tasks, range, &engine.recurrence_marker);
    if let Some(store) = completion {
        apply_virtual_completion(&mut expanded, store)?;
    }
    let rows: Vec<DayEffort> = range
        .days()
        .map(|date| DayEffort {
            date,
            capacity: usage(&expanded, tasks, date, settings),
            summary: summarize_day(&expanded, date),
        })
        .collect();
    debug!(days = rows.len(), "built effort log");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::completion::MemoryCompletionStore;
    use crate::task::{Frequency, Recurrence};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn sample_tasks() -> Vec<Task> {
        let mut standup = Task::new("standup", "Standup");
        standup.start_time = Some("09:00".to_string());
        standup.end_time = Some("09:30".to_string());
        standup.recurrence = Some(Recurrence::new(Frequency::Daily));

        let mut night = Task::new("night", "Deploy");
        night.due_date = Some(ymd(2024, 6, 3));
        night.start_time = Some("23:00".to_string());
        night.end_time = Some("01:00".to_string());

        let mut lunch = Task::new("lunch", "Lunch");
        lunch.due_date = Some(ymd(2024, 6, 4));
        lunch.start_time = Some("12:00".to_string());
        lunch.end_time = Some("13:00".to_string());
        lunch.no_task = true;

        vec![standup, night, lunch]
    }

    #[test]
    fn day_view_combines_layout_capacity_and_summary() {
        let tasks = sample_tasks();
        let store = MemoryCompletionStore::new();
        store.set("standup", ymd(2024, 6, 4), true).expect("set");

        let view = day_view(
            &tasks,
            ymd(2024, 6, 4),
            &EngineConfig::default(),
            Some(&CapacitySettings::with_default(120)),
            Some(&store),
        )
        .expect("day view");

        assert_eq!(view.blocks.len(), 3);
        assert_eq!(view.blocks[0].occurrence_id, "night");
        assert_eq!(view.capacity.used_minutes, 90);
        assert_eq!(view.capacity.remaining_minutes, 30);
        assert_eq!(view.summary, DaySummary { completed: 1, total: 1 });
        let ids: Vec<_> = view.occurrences.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["standup_2024-06-04", "lunch"]);
    }

    #[test]
    fn effort_log_covers_every_day() {
        let tasks = sample_tasks();
        let rows = effort_log(
            &tasks,
            DateRange::new(ymd(2024, 6, 3), ymd(2024, 6, 5)),
            &EngineConfig::default(),
            None,
            None,
        )
        .expect("effort log");
        let used: Vec<_> = rows.iter().map(|r| r.capacity.used_minutes).collect();
        assert_eq!(used, vec![90, 90, 30]);
        assert_eq!(rows[0].summary.total, 2);
    }

    #[test]
    fn effort_log_and_day_view_agree_on_completion() {
        let mut chores = Task::new("chores", "Chores");
        chores.completed = true;
        chores.start_time = Some("18:00".to_string());
        chores.end_time = Some("18:30".to_string());
        chores.recurrence = Some(Recurrence::new(Frequency::Daily));
        let tasks = vec![chores];

        let store = MemoryCompletionStore::new();
        store.set("chores", ymd(2024, 1, 3), true).expect("set");
        let engine = EngineConfig::default();

        let rows = effort_log(
            &tasks,
            DateRange::new(ymd(2024, 1, 2), ymd(2024, 1, 3)),
            &engine,
            None,
            Some(&store),
        )
        .expect("effort log");

        for row in &rows {
            let view = day_view(&tasks, row.date, &engine, None, Some(&store)).expect("day view");
            assert_eq!(row.summary, view.summary, "{}", row.date);
        }
        assert_eq!(rows[0].summary, DaySummary { completed: 0, total: 1 });
        assert_eq!(rows[1].summary, DaySummary { completed: 1, total: 1 });

        let bare = effort_log(&tasks, DateRange::single(ymd(2024, 1, 2)), &engine, None, None)
            .expect("effort log");
        assert_eq!(bare[0].summary.completed, 0);
    }
}
