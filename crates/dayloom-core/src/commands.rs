use anyhow::{Context, anyhow};
use chrono::{Datelike, Local, NaiveDate};
use tracing::{debug, info, instrument};

use crate::cli::Command;
use crate::completion::{CompletionStore, apply_virtual_completion, toggle_completion};
use crate::config::{Config, EngineConfig};
use crate::datastore::{DataStore, TaskSource};
use crate::dates::{first_day_of_month, shift_months};
use crate::grid::GridBuilder;
use crate::recurrence::{DateRange, expand_with_marker};
use crate::render::Renderer;
use crate::task::{resolve_source, split_virtual_id};
use crate::views::{day_view, effort_log};

#[instrument(skip(store, cfg, renderer, command))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
    today: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let engine = EngineConfig::from_config(cfg);

    match command {
        Command::Month {
            year,
            month,
            offset,
        } => {
            let tasks = store.snapshot()?;
            let month = month.unwrap_or(today.month());
            let anchor = first_day_of_month(year.unwrap_or(today.year()), month)
                .ok_or_else(|| anyhow!("month must be between 1 and 12, got {month}"))?;
            let anchor = shift_months(anchor, offset);
            let (year, month) = (anchor.year(), anchor.month());
            debug!(year, month, "building month grid");
            let completion = store.completion_store()?;
            let mut weeks = GridBuilder::new(today)
                .with_marker(&engine.recurrence_marker)
                .month(&tasks, year, month);
            for cell in weeks.iter_mut().flatten() {
                apply_virtual_completion(&mut cell.occurrences, &completion)?;
            }
            renderer.print_month(&weeks)
        }
        Command::Week { date } => {
            let tasks = store.snapshot()?;
            let completion = store.completion_store()?;
            let mut cells = GridBuilder::new(today)
                .with_marker(&engine.recurrence_marker)
                .week(&tasks, date.unwrap_or(today));
            for cell in &mut cells {
                apply_virtual_completion(&mut cell.occurrences, &completion)?;
            }
            renderer.print_week(&cells)
        }
        Command::Day { date } => {
            let tasks = store.snapshot()?;
            let settings = store.load_capacity()?;
            let completion = store.completion_store()?;
            let view = day_view(
                &tasks,
                date.unwrap_or(today),
                &engine,
                settings.as_ref(),
                Some(&completion as &dyn CompletionStore),
            )?;
            renderer.print_day(&view)
        }
        Command::Effort { from, to } => {
            let range = checked_range(from, to)?;
            let tasks = store.snapshot()?;
            let settings = store.load_capacity()?;
            let completion = store.completion_store()?;
            let rows = effort_log(
                &tasks,
                range,
                &engine,
                settings.as_ref(),
                Some(&completion as &dyn CompletionStore),
            )?;
            renderer.print_effort(&rows)
        }
        Command::Expand { from, to } => {
            let range = checked_range(from, to)?;
            let tasks = store.snapshot()?;
            let occurrences = expand_with_marker(&tasks, range, &engine.recurrence_marker);
            renderer.print_occurrences(&occurrences)
        }
        Command::Done { occurrence } => cmd_done(store, &engine, &occurrence),
        Command::Show => renderer.print_config(cfg),
    }
}

fn checked_range(from: NaiveDate, to: NaiveDate) -> anyhow::Result<DateRange> {
    if to < from {
        return Err(anyhow!("range end {to} is before start {from}"));
    }
    Ok(DateRange::new(from, to))
}

#[instrument(skip(store, engine))]
fn cmd_done(store: &DataStore, engine: &EngineConfig, occurrence_id: &str) -> anyhow::Result<()> {
    let (_, date) = split_virtual_id(occurrence_id).ok_or_else(|| {
        anyhow!("{occurrence_id} is not a generated occurrence id (expected TASK_YYYY-MM-DD)")
    })?;

    let tasks = store.snapshot()?;
    let source = resolve_source(&tasks, occurrence_id)
        .ok_or_else(|| anyhow!("no task owns occurrence {occurrence_id}"))?;

    let occurrence = expand_with_marker(
        std::slice::from_ref(source),
        DateRange::single(date),
        &engine.recurrence_marker,
    )
    .into_iter()
    .find(|occ| occ.id == occurrence_id)
    .ok_or_else(|| anyhow!("task {} does not occur on {date}", source.id))?;

    let completion = store.completion_store()?;
    let completed = toggle_completion(&completion, &occurrence)
        .with_context(|| format!("failed to toggle {occurrence_id}"))?;

    info!(occurrence = %occurrence_id, completed, "toggled completion");
    println!(
        "{} {}",
        if completed { "completed" } else { "reopened" },
        occurrence.title
    );
    Ok(())
}
