use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::capacity::CapacitySettings;
use crate::completion::FileCompletionStore;
use crate::task::Task;

/// Anything that can hand the engine a full snapshot of tasks.
pub trait TaskSource {
    fn snapshot(&self) -> anyhow::Result<Vec<Task>>;
}

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub capacity_path: PathBuf,
    pub completions_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.jsonl");
        let capacity_path = data_dir.join("capacity.toml");
        let completions_path = data_dir.join("completions.json");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            capacity = %capacity_path.display(),
            completions = %completions_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            capacity_path,
            completions_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.jsonl")
    }

    /// `None` when no capacity has been configured.
    #[tracing::instrument(skip(self))]
    pub fn load_capacity(&self) -> anyhow::Result<Option<CapacitySettings>> {
        if !self.capacity_path.exists() {
            warn!(file = %self.capacity_path.display(), "no capacity settings; usage has nothing to compare against");
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.capacity_path)
            .with_context(|| format!("failed reading {}", self.capacity_path.display()))?;
        let settings: CapacitySettings = toml::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.capacity_path.display()))?;
        debug!(?settings, "loaded capacity settings");
        Ok(Some(settings))
    }

    pub fn completion_store(&self) -> anyhow::Result<FileCompletionStore> {
        FileCompletionStore::open(&self.completions_path)
    }
}

impl TaskSource for DataStore {
    fn snapshot(&self) -> anyhow::Result<Vec<Task>> {
        self.load_tasks()
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<Task>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}
