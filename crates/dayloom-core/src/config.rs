use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::layout::LayoutConfig;
use crate::recurrence::DEFAULT_RECURRENCE_MARKER;

const RC_ENV_VAR: &str = "DAYLOOMRC";
const RC_FILE_NAME: &str = ".dayloomrc";
const DEFAULT_DATA_DIR: &str = ".dayloom";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "data.location".to_string(),
      format!("~/{DEFAULT_DATA_DIR}")
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Engine tunables: grid scale, default durations and the title marker for
/// generated occurrences.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
  pub layout:            LayoutConfig,
  pub recurrence_marker: String
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      layout:            LayoutConfig::default(),
      recurrence_marker:
        DEFAULT_RECURRENCE_MARKER
          .to_string()
    }
  }
}

impl EngineConfig {
  /// Reads `layout.*` and `recurrence.marker`; invalid values keep the default.
  pub fn from_config(
    cfg: &Config
  ) -> Self {
    let defaults = LayoutConfig::default();
    let layout = LayoutConfig {
      pixels_per_minute: positive_f64(
        cfg,
        "layout.pixels_per_minute"
      )
      .unwrap_or(
        defaults.pixels_per_minute
      ),
      min_block_minutes: positive_u32(
        cfg,
        "layout.min_block_minutes"
      )
      .unwrap_or(
        defaults.min_block_minutes
      ),
      all_day_bar_px:    positive_f64(
        cfg,
        "layout.all_day_bar_px"
      )
      .unwrap_or(
        defaults.all_day_bar_px
      ),
      instant_minutes:   positive_u32(
        cfg,
        "layout.instant_minutes"
      )
      .unwrap_or(
        defaults.instant_minutes
      )
    };

    let recurrence_marker = cfg
      .get("recurrence.marker")
      .map(|raw| unquote(&raw))
      .unwrap_or_else(|| {
        DEFAULT_RECURRENCE_MARKER
          .to_string()
      });

    debug!(?layout, marker = %recurrence_marker, "resolved engine config");
    Self {
      layout,
      recurrence_marker
    }
  }
}

fn positive_f64(
  cfg: &Config,
  key: &str
) -> Option<f64> {
  let raw = cfg.get(key)?;
  match raw.trim().parse::<f64>() {
    | Ok(value)
      if value.is_finite()
        && value > 0.0 =>
    {
      Some(value)
    }
    | _ => {
      warn!(key, value = %raw, "expected a positive number; using default");
      None
    }
  }
}

fn positive_u32(
  cfg: &Config,
  key: &str
) -> Option<u32> {
  let raw = cfg.get(key)?;
  match raw.trim().parse::<u32>() {
    | Ok(value) if value > 0 => {
      Some(value)
    }
    | _ => {
      warn!(key, value = %raw, "expected a positive integer; using default");
      None
    }
  }
}

/// rc values are trimmed, so a marker with leading space must be quoted.
fn unquote(raw: &str) -> String {
  raw
    .strip_prefix('"')
    .and_then(|rest| {
      rest.strip_suffix('"')
    })
    .unwrap_or(raw)
    .to_string()
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(DEFAULT_DATA_DIR))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn loads_rc_with_includes_and_overrides()
  {
    let temp =
      tempdir().expect("tempdir");
    let extra =
      temp.path().join("layout.rc");
    fs::write(
      &extra,
      "layout.pixels_per_minute = 2.5\n"
    )
    .expect("write include");
    let rc = temp.path().join("main.rc");
    fs::write(
      &rc,
      "# grid\ninclude layout.rc\n\
       layout.min_block_minutes = 10 # floor\n\
       recurrence.marker = \" (repeat)\"\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(&rc))
      .expect("load rc");
    cfg.apply_overrides(vec![(
      "rc.layout.instant_minutes"
        .to_string(),
      "45".to_string()
    )]);
    assert_eq!(cfg.loaded_files.len(), 2);

    let engine =
      EngineConfig::from_config(&cfg);
    assert_eq!(
      engine.layout.pixels_per_minute,
      2.5
    );
    assert_eq!(
      engine.layout.min_block_minutes,
      10
    );
    assert_eq!(
      engine.layout.instant_minutes,
      45
    );
    assert_eq!(
      engine.layout.all_day_bar_px,
      24.0
    );
    assert_eq!(
      engine.recurrence_marker,
      " (repeat)"
    );
  }

  #[test]
  fn invalid_values_fall_back_to_defaults()
  {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "layout.pixels_per_minute"
          .to_string(),
        "-1".to_string()
      ),
      (
        "layout.min_block_minutes"
          .to_string(),
        "0".to_string()
      ),
      (
        "layout.instant_minutes"
          .to_string(),
        "soon".to_string()
      ),
    ]);
    assert_eq!(
      EngineConfig::from_config(&cfg),
      EngineConfig::default()
    );
  }

  #[test]
  fn rejects_lines_without_equals() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("bad.rc");
    fs::write(&rc, "color on\n")
      .expect("write rc");
    assert!(
      Config::load(Some(&rc)).is_err()
    );
  }

  #[test]
  fn parses_bool_values() {
    let mut cfg = Config::default();
    assert_eq!(
      cfg.get_bool("color"),
      Some(true)
    );
    cfg.apply_overrides(vec![(
      "color".to_string(),
      "off".to_string()
    )]);
    assert_eq!(
      cfg.get_bool("color"),
      Some(false)
    );
  }
}
