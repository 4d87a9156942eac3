pub mod bundle;
pub mod cli;
pub mod clusters;
pub mod commands;
pub mod config;
pub mod filter;
pub mod manager;
pub mod render;
pub mod selection;

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use serde::de::DeserializeOwned;
use tasksift_shared::{
  ClusterSummary,
  TaskCollection
};
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tasksift"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let page: TaskCollection =
    read_json(&cli.page).with_context(
      || {
        format!(
          "failed to load task page \
           from {}",
          cli.page.display()
        )
      }
    )?;
  let clusters = cli
    .clusters
    .as_deref()
    .map(|path| {
      read_json::<Vec<ClusterSummary>>(
        path
      )
      .with_context(|| {
        format!(
          "failed to load clusters \
           from {}",
          path.display()
        )
      })
    })
    .transpose()?;

  let ops =
    commands::parse_ops(&cli.ops)?;
  let mut manager =
    manager::FilterSelectionManager::new(
      cfg.initial_filters()?,
      cfg.user_id()?,
      Some(page)
    );
  commands::dispatch(
    &mut manager,
    &ops,
    clusters.as_deref()
  );

  let renderer =
    render::Renderer::new(&cfg)?;
  if cli.json {
    renderer.print_json(&manager)?;
  } else {
    renderer.print_session(&manager)?;
  }

  info!("done");
  Ok(())
}

/// Reads JSON from `path`, or stdin
/// when `path` is `-`.
fn read_json<T: DeserializeOwned>(
  path: &Path
) -> anyhow::Result<T> {
  let text = if path == Path::new("-")
  {
    let mut buf = String::new();
    std::io::stdin()
      .read_to_string(&mut buf)
      .context("failed to read stdin")?;
    buf
  } else {
    fs::read_to_string(path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?
  };
  serde_json::from_str(&text)
    .context("invalid JSON")
}
