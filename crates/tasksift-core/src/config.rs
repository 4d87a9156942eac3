use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow
};
use tasksift_shared::{
  TaskPriority,
  TaskReviewStatus,
  TaskStatus,
  UserId
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::filter::{
  FilterKey,
  FilterState,
  IncludeFlags,
  REVIEW_NOT_SET_LABEL,
  ReviewStatusKey
};

pub const RC_ENV: &str = "TASKSIFTRC";
const RC_FILE_NAME: &str = ".tasksiftrc";

#[derive(Debug, Clone, Default)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    cfg.map.insert(
      "color".to_string(),
      "on".to_string()
    );
    cfg.map.insert(
      "filter.include_locked"
        .to_string(),
      "on".to_string()
    );

    let rc =
      resolve_rc_path(rc_override)?;
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
  ) -> anyhow::Result<Option<bool>> {
    self
      .map
      .get(key)
      .map(|v| {
        parse_bool(v).ok_or_else(|| {
          anyhow!(
            "invalid boolean for \
             {key}: {v}"
          )
        })
      })
      .transpose()
  }

  pub fn user_id(
    &self
  ) -> anyhow::Result<Option<UserId>> {
    self
      .map
      .get("user.id")
      .map(|raw| {
        raw.trim().parse::<UserId>().with_context(
          || {
            format!(
              "invalid user.id: {raw}"
            )
          }
        )
      })
      .transpose()
  }

  /// Filters to start from. Listed
  /// values are included and the rest
  /// excluded; an absent key includes
  /// everything.
  #[tracing::instrument(skip(self))]
  pub fn initial_filters(
    &self
  ) -> anyhow::Result<FilterState> {
    let mut filters =
      FilterState::default();

    if let Some(raw) =
      self.map.get("filter.statuses")
    {
      filters.statuses =
        parse_flag_list(
          raw,
          |s| s.parse::<TaskStatus>()
        )
        .context("filter.statuses")?;
    }

    if let Some(raw) = self
      .map
      .get("filter.review_statuses")
    {
      filters.review_statuses =
        parse_flag_list(
          raw,
          parse_review_key
        )
        .context(
          "filter.review_statuses"
        )?;
    }

    if let Some(raw) =
      self.map.get("filter.priorities")
    {
      filters.priorities =
        parse_flag_list(
          raw,
          |s| s.parse::<TaskPriority>()
        )
        .context("filter.priorities")?;
    }

    if let Some(include_locked) = self
      .get_bool("filter.include_locked")?
    {
      filters.include_locked =
        include_locked;
    }

    debug!(
      all_inclusive =
        filters.is_all_inclusive(),
      "resolved initial filters"
    );
    Ok(filters)
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

pub fn parse_review_key(
  s: &str
) -> anyhow::Result<ReviewStatusKey> {
  let trimmed = s.trim();
  if trimmed == REVIEW_NOT_SET_LABEL
    || trimmed == "not-set"
    || trimmed == "notSet"
  {
    return Ok(None);
  }
  Ok(Some(
    trimmed
      .parse::<TaskReviewStatus>()?
  ))
}

fn parse_flag_list<K, const N: usize, E>(
  raw: &str,
  parse: impl Fn(&str) -> Result<K, E>
) -> anyhow::Result<IncludeFlags<K, N>>
where
  K: FilterKey,
  E: Into<anyhow::Error>
{
  let keys = raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| parse(s).map_err(Into::into))
    .collect::<anyhow::Result<Vec<K>>>(
    )?;
  Ok(IncludeFlags::from_included(keys))
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
    std::env::var(RC_ENV)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory"
    );
    return Ok(None);
  };
  let candidate =
    home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
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

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
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

pub fn parse_bool(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

impl FromStr for Config {
  type Err = anyhow::Error;

  /// Parses rc text without includes.
  fn from_str(
    text: &str
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();
    let pairs = text
      .lines()
      .map(|l| {
        l.split_once('#')
          .map(|(b, _)| b)
          .unwrap_or(l)
          .trim()
      })
      .filter(|l| !l.is_empty())
      .map(|l| {
        l.split_once('=')
          .map(|(k, v)| {
            (
              k.trim().to_string(),
              v.trim().to_string()
            )
          })
          .ok_or_else(|| {
            anyhow!(
              "invalid config line: {l}"
            )
          })
      })
      .collect::<anyhow::Result<Vec<_>>>(
      )?;
    cfg.apply_overrides(pairs);
    Ok(cfg)
  }
}
