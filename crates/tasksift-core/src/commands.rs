use std::str::FromStr;

use anyhow::{Context, anyhow};
use tasksift_shared::{ClusterSummary, TaskId, TaskPriority, TaskStatus};
use tracing::{debug, instrument};

use crate::config::parse_review_key;
use crate::filter::ReviewStatusKey;
use crate::manager::{FilterSelectionManager, SelectionSource};

/// One step of a command-line session against a selection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    ToggleStatus { status: TaskStatus, exclusive: bool },
    ToggleReview { review: ReviewStatusKey, exclusive: bool },
    TogglePriority { priority: TaskPriority, exclusive: bool },
    Select(TaskId),
    SelectIds(Vec<TaskId>),
    SelectStatus(TaskStatus),
    SelectPriority(TaskPriority),
    SelectAll,
    UnselectAll,
    ClearFilters,
    Reset,
    Refresh,
}

impl FromStr for Op {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        match token {
            "select-all" => return Ok(Op::SelectAll),
            "unselect-all" => return Ok(Op::UnselectAll),
            "clear-filters" => return Ok(Op::ClearFilters),
            "reset" => return Ok(Op::Reset),
            "refresh" => return Ok(Op::Refresh),
            _ => {}
        }

        let (name, arg) = token
            .split_once(':')
            .ok_or_else(|| anyhow!("unknown operation: {token}"))?;

        let op = match name {
            "status" | "only-status" => Op::ToggleStatus {
                status: arg.parse()?,
                exclusive: name.starts_with("only-"),
            },
            "review" | "only-review" => Op::ToggleReview {
                review: parse_review_key(arg)?,
                exclusive: name.starts_with("only-"),
            },
            "priority" | "only-priority" => Op::TogglePriority {
                priority: arg.parse()?,
                exclusive: name.starts_with("only-"),
            },
            "select" => Op::Select(parse_task_id(arg)?),
            "select-ids" => Op::SelectIds(
                arg.split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(parse_task_id)
                    .collect::<anyhow::Result<_>>()?,
            ),
            "select-status" => Op::SelectStatus(arg.parse()?),
            "select-priority" => Op::SelectPriority(arg.parse()?),
            other => return Err(anyhow!("unknown operation: {other}")),
        };
        Ok(op)
    }
}

fn parse_task_id(raw: &str) -> anyhow::Result<TaskId> {
    raw.trim()
        .parse::<TaskId>()
        .with_context(|| format!("invalid task id: {raw}"))
}

#[instrument(skip_all)]
pub fn parse_ops(tokens: &[String]) -> anyhow::Result<Vec<Op>> {
    tokens
        .iter()
        .map(|t| t.parse::<Op>().with_context(|| format!("in operation `{t}`")))
        .collect()
}

/// Applies `ops` in order. `select-ids:` looks tasks up in `clusters` when
/// given, otherwise on the current page.
#[instrument(skip_all, fields(ops = ops.len()))]
pub fn dispatch(
    manager: &mut FilterSelectionManager,
    ops: &[Op],
    clusters: Option<&[ClusterSummary]>,
) {
    for op in ops {
        debug!(?op, "applying operation");
        match op {
            Op::ToggleStatus { status, exclusive } => {
                manager.toggle_status_filter(*status, *exclusive)
            }
            Op::ToggleReview { review, exclusive } => {
                manager.toggle_review_status_filter(*review, *exclusive)
            }
            Op::TogglePriority {
                priority,
                exclusive,
            } => manager.toggle_priority_filter(*priority, *exclusive),
            Op::Select(id) => manager.toggle_task_selection_by_id(*id),
            Op::SelectIds(ids) => match clusters {
                Some(clusters) => {
                    manager.select_tasks_by_id(ids, SelectionSource::Clusters(clusters))
                }
                None => {
                    let page = manager
                        .source()
                        .map(|s| s.task_list().to_vec())
                        .unwrap_or_default();
                    manager.select_tasks_by_id(ids, SelectionSource::Tasks(&page));
                }
            },
            Op::SelectStatus(status) => manager.select_tasks_with_status(*status),
            Op::SelectPriority(priority) => manager.select_tasks_with_priority(*priority),
            Op::SelectAll => manager.toggle_all_tasks_selection(),
            Op::UnselectAll => manager.unselect_all_tasks(),
            Op::ClearFilters => manager.clear_all_filters(),
            Op::Reset => manager.reset_selected_tasks(),
            Op::Refresh => manager.refresh_selected_tasks(),
        }
    }
}
