use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::clock::parse_clock_time;
use crate::dates::{date_key, lenient, parse_date_key, weekday_index};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A recurrence rule as stored on a source task.
///
/// `days_of_week` uses `0 = Sunday`, `month` is `0 = January`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub enabled: bool,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub frequency: Frequency,

    #[serde(default, deserialize_with = "lenient::date")]
    pub start_date: Option<NaiveDate>,

    #[serde(default, deserialize_with = "lenient::date")]
    pub end_date: Option<NaiveDate>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub days_of_week: Vec<u32>,

    #[serde(default)]
    pub day_of_month: Option<u32>,

    #[serde(default)]
    pub month: Option<u32>,

    #[serde(default, deserialize_with = "lenient::date_set")]
    pub exception_dates: BTreeSet<NaiveDate>,
}

impl Recurrence {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            enabled: true,
            frequency,
            start_date: None,
            end_date: None,
            days_of_week: vec![],
            day_of_month: None,
            month: None,
            exception_dates: BTreeSet::new(),
        }
    }

    /// Whether the frequency-specific fields the rule needs are present.
    pub fn is_well_formed(&self) -> bool {
        match self.frequency {
            Frequency::Daily => true,
            Frequency::Weekly => !self.days_of_week.is_empty(),
            Frequency::Monthly => self.day_of_month.is_some(),
            Frequency::Yearly => self.day_of_month.is_some() && self.month.is_some(),
            Frequency::Unknown => false,
        }
    }

    /// Frequency membership only; ignores bounds and exceptions.
    pub fn matches_frequency(&self, date: NaiveDate) -> bool {
        match self.frequency {
            Frequency::Daily => true,
            Frequency::Weekly => self.days_of_week.contains(&weekday_index(date)),
            Frequency::Monthly => self.day_of_month == Some(date.day()),
            Frequency::Yearly => {
                self.month == Some(date.month0()) && self.day_of_month == Some(date.day())
            }
            Frequency::Unknown => false,
        }
    }

    pub fn within_bounds(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| date >= start)
            && self.end_date.is_none_or(|end| date <= end)
    }

    pub fn is_exception(&self, date: NaiveDate) -> bool {
        self.exception_dates.contains(&date)
    }

    /// Whether an enabled rule generates an occurrence on `date`.
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        self.enabled
            && self.within_bounds(date)
            && self.matches_frequency(date)
            && !self.is_exception(date)
    }
}

/// A task as read from the task source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub title: String,

    #[serde(default)]
    pub category_id: Option<String>,

    #[serde(default, deserialize_with = "lenient::date")]
    pub due_date: Option<NaiveDate>,

    #[serde(default, deserialize_with = "lenient::date")]
    pub schedule_date: Option<NaiveDate>,

    #[serde(default, deserialize_with = "lenient::date_time")]
    pub created_at: Option<NaiveDateTime>,

    #[serde(default)]
    pub start_time: Option<String>,

    #[serde(default)]
    pub end_time: Option<String>,

    #[serde(default)]
    pub due_time: Option<String>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub no_task: bool,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub completed: bool,

    #[serde(default)]
    pub recurrence: Option<Recurrence>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category_id: None,
            due_date: None,
            schedule_date: None,
            created_at: None,
            start_time: None,
            end_time: None,
            due_time: None,
            no_task: false,
            completed: false,
            recurrence: None,
        }
    }

    pub fn active_recurrence(&self) -> Option<&Recurrence> {
        self.recurrence.as_ref().filter(|rule| rule.enabled)
    }

    pub fn has_time_fields(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some() || self.due_time.is_some()
    }

    pub fn is_cross_midnight(&self) -> bool {
        is_cross_midnight(self.start_time.as_deref(), self.end_time.as_deref())
    }
}

/// True when both ends parse and the end clock value is not after the start.
pub fn is_cross_midnight(start: Option<&str>, end: Option<&str>) -> bool {
    let (Some(start), Some(end)) = (start, end) else {
        return false;
    };
    match (
        parse_clock_time(start).minutes(),
        parse_clock_time(end).minutes(),
    ) {
        (Some(start), Some(end)) => end <= start,
        _ => false,
    }
}

/// One concrete dated instance of a task, real or recurrence-generated.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub category_id: Option<String>,
    pub due_date: NaiveDate,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub due_time: Option<String>,
    pub no_task: bool,
    pub completed: bool,
    pub is_virtual: bool,
}

impl Occurrence {
    /// Projects a non-recurring task onto `date`.
    pub fn from_task(task: &Task, date: NaiveDate) -> Self {
        Self {
            id: task.id.clone(),
            source_id: task.id.clone(),
            title: task.title.clone(),
            category_id: task.category_id.clone(),
            due_date: date,
            start_time: task.start_time.clone(),
            end_time: task.end_time.clone(),
            due_time: task.due_time.clone(),
            no_task: task.no_task,
            completed: task.completed,
            is_virtual: false,
        }
    }

    /// Synthesizes the generated occurrence of a recurring task on `date`.
    ///
    /// Starts uncompleted; per-date state comes from a completion store.
    pub fn generated(task: &Task, date: NaiveDate, marker: &str) -> Self {
        Self {
            id: virtual_id(&task.id, date),
            title: format!("{}{marker}", task.title),
            completed: false,
            is_virtual: true,
            ..Self::from_task(task, date)
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.start_time.is_none() && self.end_time.is_none() && self.due_time.is_none()
    }

    pub fn is_cross_midnight(&self) -> bool {
        is_cross_midnight(self.start_time.as_deref(), self.end_time.as_deref())
    }
}

/// `{task_id}_{YYYY-MM-DD}`
#[must_use]
pub fn virtual_id(task_id: &str, date: NaiveDate) -> String {
    format!("{task_id}_{}", date_key(date))
}

/// Splits a generated occurrence id into its source id and date.
pub fn split_virtual_id(id: &str) -> Option<(&str, NaiveDate)> {
    let (source, raw_date) = id.rsplit_once('_')?;
    if source.is_empty() {
        return None;
    }
    parse_date_key(raw_date).map(|date| (source, date))
}

/// Finds the task that owns `id`, whether it is a plain or generated id.
pub fn resolve_source<'a>(tasks: &'a [Task], id: &str) -> Option<&'a Task> {
    tasks
        .iter()
        .find(|task| task.id == id)
        .or_else(|| {
            let (source, _) = split_virtual_id(id)?;
            tasks.iter().find(|task| task.id == source)
        })
}
