//! Per-date completion state for generated occurrences.
//!
//! A recurring task maps to many dated occurrences, each completed
//! independently, so their state lives outside the task under
//! `{task_id}_{YYYY-MM-DD}` keys.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::task::{Occurrence, virtual_id};

/// Keyed completion store; distinct keys may be written concurrently.
pub trait CompletionStore: Send + Sync {
    fn get(&self, task_id: &str, date: NaiveDate) -> anyhow::Result<bool>;

    fn set(&self, task_id: &str, date: NaiveDate, completed: bool) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCompletionStore {
    entries: Mutex<BTreeMap<String, bool>>,
}

impl MemoryCompletionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompletionStore for MemoryCompletionStore {
    fn get(&self, task_id: &str, date: NaiveDate) -> anyhow::Result<bool> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("completion store lock poisoned"))?;
        Ok(entries
            .get(&virtual_id(task_id, date))
            .copied()
            .unwrap_or(false))
    }

    fn set(&self, task_id: &str, date: NaiveDate, completed: bool) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("completion store lock poisoned"))?;
        entries.insert(virtual_id(task_id, date), completed);
        Ok(())
    }
}

/// JSON object on disk, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileCompletionStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, bool>>,
}

impl FileCompletionStore {
    #[tracing::instrument(skip(path), fields(file = %path.display()))]
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let entries = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed parsing {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };

        info!(entries = entries.len(), "opened completion store");
        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, bool>) -> anyhow::Result<()> {
        debug!(file = %self.path.display(), count = entries.len(), "saving completions atomically");
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, entries)?;
        writeln!(temp)?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;
        Ok(())
    }
}

impl CompletionStore for FileCompletionStore {
    fn get(&self, task_id: &str, date: NaiveDate) -> anyhow::Result<bool> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("completion store lock poisoned"))?;
        Ok(entries
            .get(&virtual_id(task_id, date))
            .copied()
            .unwrap_or(false))
    }

    fn set(&self, task_id: &str, date: NaiveDate, completed: bool) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("completion store lock poisoned"))?;
        entries.insert(virtual_id(task_id, date), completed);
        self.persist(&entries)
    }
}

/// Overlays stored completion onto generated occurrences.
///
/// Real occurrences keep their task's own `completed` flag.
pub fn apply_virtual_completion(
    occurrences: &mut [Occurrence],
    store: &dyn CompletionStore,
) -> anyhow::Result<()> {
    for occurrence in occurrences.iter_mut().filter(|occ| occ.is_virtual) {
        occurrence.completed = store.get(&occurrence.source_id, occurrence.due_date)?;
    }
    Ok(())
}

/// Flips a generated occurrence's completion and returns the new state.
pub fn toggle_completion(store: &dyn CompletionStore, occurrence: &Occurrence) -> anyhow::Result<bool> {
    if !occurrence.is_virtual {
        return Err(anyhow!(
            "occurrence {} is not generated; toggle the task itself",
            occurrence.id
        ));
    }

    let current = store.get(&occurrence.source_id, occurrence.due_date)?;
    let next = !current;
    store
        .set(&occurrence.source_id, occurrence.due_date, next)
        .with_context(|| format!("failed to store completion for {}", occurrence.id))?;
    debug!(occurrence = %occurrence.id, completed = next, "toggled virtual completion");
    Ok(next)
}
