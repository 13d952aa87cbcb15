use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::{MINUTES_PER_DAY, parse_clock_time};
use crate::dates::{add_days, parse_date_key, weekday_index};
use crate::recurrence::{DateRange, placement_date};
use crate::task::{Occurrence, Task};

const DAY_LEN: usize = MINUTES_PER_DAY as usize;

/// User-declared capacities, in minutes per day.
///
/// `weekday_capacity` is keyed by weekday index (`"0"` = Sunday),
/// `special_capacity` by `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapacitySettings {
    #[serde(default, alias = "capacity_minutes")]
    pub capacity: Option<u32>,

    #[serde(default, alias = "weekday_capacity")]
    pub weekday_capacity: BTreeMap<String, Option<u32>>,

    #[serde(default, alias = "special_capacity")]
    pub special_capacity: BTreeMap<String, u32>,
}

impl CapacitySettings {
    pub fn with_default(capacity: u32) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn set_weekday(&mut self, weekday: u32, capacity: Option<u32>) {
        self.weekday_capacity.insert(weekday.to_string(), capacity);
    }

    pub fn set_special(&mut self, date: NaiveDate, capacity: u32) {
        self.special_capacity
            .insert(crate::dates::date_key(date), capacity);
    }

    fn special_for(&self, date: NaiveDate) -> Option<u32> {
        self.special_capacity
            .iter()
            .find(|(key, _)| parse_date_key(key) == Some(date))
            .map(|(_, minutes)| *minutes)
    }

    fn weekday_for(&self, date: NaiveDate) -> Option<u32> {
        self.weekday_capacity
            .get(&weekday_index(date).to_string())
            .copied()
            .flatten()
    }
}

/// Where a resolved capacity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CapacitySource {
    Special,
    Weekday,
    Default,
    /// Settings exist but declare no capacity for the date.
    Unset,
    /// No settings were available at all.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityUsage {
    pub used_minutes: u32,
    pub capacity_minutes: u32,
    pub remaining_minutes: u32,
    pub is_over_capacity: bool,
    pub source: CapacitySource,
}

impl CapacityUsage {
    /// False when there is no positive capacity to compare against.
    pub fn has_capacity(&self) -> bool {
        self.capacity_minutes > 0
    }
}

/// Capacity for `date`: special override, then a non-zero weekday override,
/// then the default, then zero.
pub fn resolve_capacity(settings: Option<&CapacitySettings>, date: NaiveDate) -> (u32, CapacitySource) {
    let Some(settings) = settings else {
        return (0, CapacitySource::Unknown);
    };

    if let Some(minutes) = settings.special_for(date) {
        return (minutes, CapacitySource::Special);
    }
    if let Some(minutes) = settings.weekday_for(date).filter(|m| *m > 0) {
        return (minutes, CapacitySource::Weekday);
    }
    if let Some(minutes) = settings.capacity.filter(|m| *m > 0) {
        return (minutes, CapacitySource::Default);
    }
    (0, CapacitySource::Unset)
}

/// One flag per minute of a day; overlapping intervals count once.
#[derive(Debug, Clone)]
pub struct MinuteMap {
    minutes: [bool; DAY_LEN],
}

impl Default for MinuteMap {
    fn default() -> Self {
        Self {
            minutes: [false; DAY_LEN],
        }
    }
}

impl MinuteMap {
    /// Marks `[start, end)`, clamped to the day.
    pub fn mark(&mut self, start: u32, end: u32) {
        let start = (start as usize).min(DAY_LEN);
        let end = (end as usize).min(DAY_LEN);
        if start < end {
            self.minutes[start..end].fill(true);
        }
    }

    pub fn count(&self) -> u32 {
        self.minutes.iter().filter(|set| **set).count() as u32
    }
}

/// Minutes of `date` booked by timed, actionable occurrences.
///
/// `day_occurrences` supplies the day's own intervals (an interval that
/// crosses midnight counts until 24:00); `all_tasks` is scanned for the
/// previous day's cross-midnight tails.
#[tracing::instrument(skip(day_occurrences, all_tasks, settings), fields(date = %date))]
pub fn usage(
    day_occurrences: &[Occurrence],
    all_tasks: &[Task],
    date: NaiveDate,
    settings: Option<&CapacitySettings>,
) -> CapacityUsage {
    let mut map = MinuteMap::default();

    for occurrence in day_occurrences
        .iter()
        .filter(|occ| occ.due_date == date && !occ.no_task)
    {
        let (Some(start), Some(end)) = (
            occurrence.start_time.as_deref(),
            occurrence.end_time.as_deref(),
        ) else {
            continue;
        };
        let (Some(start), Some(end)) = (
            parse_clock_time(start).minutes(),
            parse_clock_time(end).minutes(),
        ) else {
            trace!(occurrence = %occurrence.id, "unparseable interval; not counted");
            continue;
        };
        let end = if end <= start { MINUTES_PER_DAY } else { end };
        map.mark(start, end);
    }

    let previous = add_days(date, -1);
    for task in all_tasks {
        if let Some(end) = trailing_minutes(task, previous, date) {
            trace!(task = %task.id, end, "counting cross-midnight tail");
            map.mark(0, end);
        }
    }

    let used_minutes = map.count();
    let (capacity_minutes, source) = resolve_capacity(settings, date);
    let result = CapacityUsage {
        used_minutes,
        capacity_minutes,
        remaining_minutes: capacity_minutes.saturating_sub(used_minutes),
        is_over_capacity: capacity_minutes > 0 && used_minutes > capacity_minutes,
        source,
    };
    debug!(used = used_minutes, capacity = capacity_minutes, source = ?source, "computed capacity usage");
    result
}

/// End minute of the tail `task` spills from `previous` into `date`.
///
/// The task must be placed on `previous` the way a `[previous, date]`
/// expansion places it, so capacity agrees with the day layout.
fn trailing_minutes(task: &Task, previous: NaiveDate, date: NaiveDate) -> Option<u32> {
    if task.no_task || !task.is_cross_midnight() {
        return None;
    }

    let on_previous = match task.active_recurrence() {
        Some(rule) => rule.is_well_formed() && rule.occurs_on(previous),
        None => placement_date(task, DateRange::new(previous, date)) == Some(previous),
    };
    if !on_previous {
        return None;
    }

    parse_clock_time(task.end_time.as_deref()?)
        .minutes()
        .filter(|end| *end > 0)
}
