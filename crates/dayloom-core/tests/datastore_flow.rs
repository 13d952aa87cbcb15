use std::fs;

use chrono::NaiveDate;
use dayloom_core::capacity::CapacitySource;
use dayloom_core::completion::{CompletionStore, FileCompletionStore, toggle_completion};
use dayloom_core::config::EngineConfig;
use dayloom_core::datastore::{DataStore, TaskSource};
use dayloom_core::recurrence::{DateRange, expand};
use dayloom_core::task::Frequency;
use dayloom_core::views::day_view;
use tempfile::tempdir;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

const TASKS: &str = r#"
{"id":"standup","title":"Standup","startTime":"9:00","endTime":"9:30","recurrence":{"enabled":true,"frequency":"daily","startDate":"2024/06/01","exceptionDates":[{"seconds":1717459200,"nanoseconds":0},"not a date"]}}
{"id":"report","title":"Report","dueDate":1717545600000,"dueTime":"午後5時"}
{"id":"deploy","title":"Deploy","dueDate":"2024-06-05T10:00:00Z","startTime":"11:00 PM","endTime":"1:00 AM","completed":null}

{"id":"odd","title":"Odd","recurrence":{"enabled":true,"frequency":"fortnightly"}}
"#;

const CAPACITY: &str = r#"
capacity = 480

[weekdayCapacity]
"3" = 240

[specialCapacity]
"2024-06-06" = 0
"#;

#[test]
fn loads_heterogeneous_records_and_builds_day_views() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    fs::write(&store.tasks_path, TASKS).expect("write tasks");
    fs::write(&store.capacity_path, CAPACITY).expect("write capacity");

    let tasks = store.snapshot().expect("load tasks");
    assert_eq!(tasks.len(), 4);
    assert_eq!(tasks[1].due_date, Some(ymd(2024, 6, 5)));
    assert_eq!(tasks[2].due_date, Some(ymd(2024, 6, 5)));
    assert!(!tasks[2].completed);
    assert_eq!(
        tasks[0]
            .recurrence
            .as_ref()
            .map(|rule| rule.exception_dates.len()),
        Some(1)
    );
    assert_eq!(
        tasks[3].recurrence.as_ref().map(|rule| rule.frequency),
        Some(Frequency::Unknown)
    );

    let occurrences = expand(&tasks, DateRange::new(ymd(2024, 6, 3), ymd(2024, 6, 5)));
    let standups: Vec<_> = occurrences
        .iter()
        .filter(|occ| occ.source_id == "standup")
        .map(|occ| occ.due_date)
        .collect();
    assert_eq!(standups, vec![ymd(2024, 6, 3), ymd(2024, 6, 5)]);
    assert!(occurrences.iter().all(|occ| occ.source_id != "odd"));

    let settings = store.load_capacity().expect("load capacity");
    let engine = EngineConfig::default();

    // Wednesday: weekday override applies.
    let wednesday = day_view(&tasks, ymd(2024, 6, 5), &engine, settings.as_ref(), None)
        .expect("day view");
    assert_eq!(wednesday.capacity.used_minutes, 30 + 60);
    assert_eq!(wednesday.capacity.capacity_minutes, 240);
    assert_eq!(wednesday.capacity.source, CapacitySource::Weekday);

    // Thursday: special zero wins; deploy's tail still books the morning.
    let thursday = day_view(&tasks, ymd(2024, 6, 6), &engine, settings.as_ref(), None)
        .expect("day view");
    assert_eq!(thursday.capacity.used_minutes, 30 + 60);
    assert_eq!(thursday.capacity.capacity_minutes, 0);
    assert_eq!(thursday.capacity.source, CapacitySource::Special);
    assert!(!thursday.capacity.is_over_capacity);
}

#[test]
fn missing_capacity_file_is_not_an_error() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    assert!(store.load_capacity().expect("load capacity").is_none());
    assert!(store.snapshot().expect("load tasks").is_empty());
}

#[test]
fn completion_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    fs::write(&store.tasks_path, TASKS).expect("write tasks");
    let tasks = store.snapshot().expect("load tasks");

    let occurrences = expand(&tasks, DateRange::new(ymd(2024, 6, 3), ymd(2024, 6, 5)));
    let standup = occurrences
        .iter()
        .find(|occ| occ.id == "standup_2024-06-03")
        .expect("generated standup");

    let completion = store.completion_store().expect("open completions");
    assert!(toggle_completion(&completion, standup).expect("toggle"));

    let reopened = FileCompletionStore::open(&store.completions_path).expect("reopen");
    assert!(reopened.get("standup", ymd(2024, 6, 3)).expect("get"));
    assert!(!reopened.get("standup", ymd(2024, 6, 4)).expect("get"));

    let view = day_view(
        &tasks,
        ymd(2024, 6, 3),
        &EngineConfig::default(),
        None,
        Some(&reopened),
    )
    .expect("day view");
    assert_eq!(view.summary.completed, 1);
    assert_eq!(view.capacity.source, CapacitySource::Unknown);

    let report = occurrences
        .iter()
        .find(|occ| occ.id == "report")
        .expect("real report occurrence");
    assert!(!report.is_virtual);
    assert!(toggle_completion(&completion, report).is_err());
}
