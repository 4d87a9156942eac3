use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{
  Deserialize,
  Serialize
};
use serde_json::Value;

pub type TaskId = u64;
pub type UserId = u64;
pub type ChallengeId = u64;

/// Review status code used on the wire
/// for tasks that were never reviewed.
pub const REVIEW_STATUS_NOT_SET: i64 = -1;

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct UnknownVariant {
  pub kind:  &'static str,
  pub value: String
}

impl fmt::Display for UnknownVariant {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "unknown {} `{}`",
      self.kind, self.value
    )
  }
}

impl std::error::Error
  for UnknownVariant
{
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(try_from = "i64", into = "i64")]
pub enum TaskStatus {
  Created,
  Fixed,
  FalsePositive,
  Skipped,
  Deleted,
  AlreadyFixed,
  TooHard,
  Answered,
  Validated,
  Disabled
}

impl TaskStatus {
  pub const ALL: [TaskStatus; 10] = [
    TaskStatus::Created,
    TaskStatus::Fixed,
    TaskStatus::FalsePositive,
    TaskStatus::Skipped,
    TaskStatus::Deleted,
    TaskStatus::AlreadyFixed,
    TaskStatus::TooHard,
    TaskStatus::Answered,
    TaskStatus::Validated,
    TaskStatus::Disabled
  ];

  pub fn code(self) -> i64 {
    self as i64
  }

  pub fn name(self) -> &'static str {
    match self {
      | TaskStatus::Created => "created",
      | TaskStatus::Fixed => "fixed",
      | TaskStatus::FalsePositive => {
        "false_positive"
      }
      | TaskStatus::Skipped => "skipped",
      | TaskStatus::Deleted => "deleted",
      | TaskStatus::AlreadyFixed => {
        "already_fixed"
      }
      | TaskStatus::TooHard => "too_hard",
      | TaskStatus::Answered => {
        "answered"
      }
      | TaskStatus::Validated => {
        "validated"
      }
      | TaskStatus::Disabled => {
        "disabled"
      }
    }
  }
}

impl TryFrom<i64> for TaskStatus {
  type Error = UnknownVariant;

  fn try_from(
    code: i64
  ) -> Result<Self, Self::Error> {
    Self::ALL
      .into_iter()
      .find(|s| s.code() == code)
      .ok_or_else(|| UnknownVariant {
        kind:  "task status",
        value: code.to_string()
      })
  }
}

impl From<TaskStatus> for i64 {
  fn from(value: TaskStatus) -> Self {
    value.code()
  }
}

impl FromStr for TaskStatus {
  type Err = UnknownVariant;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let wanted = normalize_name(s);
    Self::ALL
      .into_iter()
      .find(|v| v.name() == wanted)
      .ok_or_else(|| UnknownVariant {
        kind:  "task status",
        value: s.to_string()
      })
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(try_from = "i64", into = "i64")]
pub enum TaskPriority {
  High,
  Medium,
  Low
}

impl TaskPriority {
  pub const ALL: [TaskPriority; 3] = [
    TaskPriority::High,
    TaskPriority::Medium,
    TaskPriority::Low
  ];

  pub fn code(self) -> i64 {
    self as i64
  }

  pub fn name(self) -> &'static str {
    match self {
      | TaskPriority::High => "high",
      | TaskPriority::Medium => "medium",
      | TaskPriority::Low => "low"
    }
  }
}

impl TryFrom<i64> for TaskPriority {
  type Error = UnknownVariant;

  fn try_from(
    code: i64
  ) -> Result<Self, Self::Error> {
    Self::ALL
      .into_iter()
      .find(|p| p.code() == code)
      .ok_or_else(|| UnknownVariant {
        kind:  "task priority",
        value: code.to_string()
      })
  }
}

impl From<TaskPriority> for i64 {
  fn from(value: TaskPriority) -> Self {
    value.code()
  }
}

impl FromStr for TaskPriority {
  type Err = UnknownVariant;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let wanted = normalize_name(s);
    Self::ALL
      .into_iter()
      .find(|v| v.name() == wanted)
      .ok_or_else(|| UnknownVariant {
        kind:  "task priority",
        value: s.to_string()
      })
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(try_from = "i64", into = "i64")]
pub enum TaskReviewStatus {
  Needed,
  Approved,
  Rejected,
  ApprovedWithFixes,
  Disputed,
  Unnecessary
}

impl TaskReviewStatus {
  pub const ALL: [TaskReviewStatus; 6] = [
    TaskReviewStatus::Needed,
    TaskReviewStatus::Approved,
    TaskReviewStatus::Rejected,
    TaskReviewStatus::ApprovedWithFixes,
    TaskReviewStatus::Disputed,
    TaskReviewStatus::Unnecessary
  ];

  pub fn code(self) -> i64 {
    self as i64
  }

  pub fn name(self) -> &'static str {
    match self {
      | TaskReviewStatus::Needed => {
        "needed"
      }
      | TaskReviewStatus::Approved => {
        "approved"
      }
      | TaskReviewStatus::Rejected => {
        "rejected"
      }
      | TaskReviewStatus::ApprovedWithFixes => {
        "approved_with_fixes"
      }
      | TaskReviewStatus::Disputed => {
        "disputed"
      }
      | TaskReviewStatus::Unnecessary => {
        "unnecessary"
      }
    }
  }
}

impl TryFrom<i64> for TaskReviewStatus {
  type Error = UnknownVariant;

  fn try_from(
    code: i64
  ) -> Result<Self, Self::Error> {
    Self::ALL
      .into_iter()
      .find(|r| r.code() == code)
      .ok_or_else(|| UnknownVariant {
        kind:  "review status",
        value: code.to_string()
      })
  }
}

impl From<TaskReviewStatus> for i64 {
  fn from(
    value: TaskReviewStatus
  ) -> Self {
    value.code()
  }
}

impl FromStr for TaskReviewStatus {
  type Err = UnknownVariant;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let wanted = normalize_name(s);
    Self::ALL
      .into_iter()
      .find(|v| v.name() == wanted)
      .ok_or_else(|| UnknownVariant {
        kind:  "review status",
        value: s.to_string()
      })
  }
}

/// Accepts `falsePositive`,
/// `false-positive` and
/// `false_positive` alike.
fn normalize_name(s: &str) -> String {
  let mut out = String::with_capacity(
    s.len() + 4
  );
  for ch in s.trim().chars() {
    if ch == '-' || ch == ' ' {
      out.push('_');
    } else if ch.is_ascii_uppercase() {
      if !out.is_empty()
        && !out.ends_with('_')
      {
        out.push('_');
      }
      out.push(ch.to_ascii_lowercase());
    } else {
      out.push(ch);
    }
  }
  out
}

/// Review status as sent by the
/// server: either a code or the
/// `-1` "not set" marker.
mod review_status_serde {
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  use super::{
    REVIEW_STATUS_NOT_SET,
    TaskReviewStatus
  };

  pub fn serialize<S>(
    value: &Option<TaskReviewStatus>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match value {
      | Some(status) => {
        serializer
          .serialize_i64(status.code())
      }
      | None => serializer.serialize_none()
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<
    Option<TaskReviewStatus>,
    D::Error
  >
  where
    D: Deserializer<'de>
  {
    let raw =
      Option::<i64>::deserialize(
        deserializer
      )?;
    match raw {
      | None
      | Some(REVIEW_STATUS_NOT_SET) => {
        Ok(None)
      }
      | Some(code) => {
        TaskReviewStatus::try_from(code)
          .map(Some)
          .map_err(serde::de::Error::custom)
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(
  rename_all = "camelCase",
  from = "TaskWire"
)]
pub struct Task {
  pub id:            TaskId,
  pub status:        TaskStatus,
  pub priority:      TaskPriority,
  #[serde(
    default,
    with = "review_status_serde",
    skip_serializing_if = "Option::is_none"
  )]
  pub review_status:
    Option<TaskReviewStatus>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub locked_by:     Option<UserId>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub parent_id:     Option<ChallengeId>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub bundle_id:     Option<u64>,
  #[serde(default)]
  pub geometries:    Value,
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>
}

/// Incoming task shape. Payloads name
/// the challenge `parent`, `parentId`
/// or both; `parentId` wins.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskWire {
  id:            TaskId,
  status:        TaskStatus,
  priority:      TaskPriority,
  #[serde(
    default,
    deserialize_with = "review_status_serde::deserialize"
  )]
  review_status:
    Option<TaskReviewStatus>,
  #[serde(default)]
  locked_by:     Option<UserId>,
  #[serde(default)]
  parent_id:     Option<ChallengeId>,
  #[serde(default)]
  parent:        Option<ChallengeId>,
  #[serde(default)]
  bundle_id:     Option<u64>,
  #[serde(default)]
  geometries:    Value,
  #[serde(flatten)]
  extra: BTreeMap<String, Value>
}

impl From<TaskWire> for Task {
  fn from(wire: TaskWire) -> Self {
    Self {
      id:            wire.id,
      status:        wire.status,
      priority:      wire.priority,
      review_status: wire.review_status,
      locked_by:     wire.locked_by,
      parent_id:     wire
        .parent_id
        .or(wire.parent),
      bundle_id:     wire.bundle_id,
      geometries:    wire.geometries,
      extra:         wire.extra
    }
  }
}

impl Task {
  pub fn new(
    id: TaskId,
    status: TaskStatus,
    priority: TaskPriority
  ) -> Self {
    Self {
      id,
      status,
      priority,
      review_status: None,
      locked_by: None,
      parent_id: None,
      bundle_id: None,
      geometries: Value::Null,
      extra: BTreeMap::new()
    }
  }

  pub fn is_locked(&self) -> bool {
    self.locked_by.is_some()
  }
}

/// Map marker summary for one or
/// more nearby tasks. The `task*`
/// fields are only filled in when the
/// cluster stands for a single task.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
  pub cluster_id:       u64,
  #[serde(default)]
  pub task_id:          Option<TaskId>,
  #[serde(default)]
  pub task_status:      Option<TaskStatus>,
  #[serde(default)]
  pub task_priority:
    Option<TaskPriority>,
  #[serde(default)]
  pub challenge_ids:
    Vec<ChallengeId>,
  #[serde(default)]
  pub geometries:       Value,
  #[serde(default)]
  pub number_of_points: u64
}

impl ClusterSummary {
  /// Minimal task record for a
  /// single-task cluster.
  pub fn to_task(&self) -> Option<Task> {
    let mut task = Task::new(
      self.task_id?,
      self.task_status?,
      self.task_priority?
    );
    task.parent_id =
      self.challenge_ids.first().copied();
    task.geometries =
      self.geometries.clone();
    Some(task)
  }
}

/// One page of tasks plus whatever
/// metadata came with it. `tasks` is
/// `None` until the page has loaded.
#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskCollection {
  #[serde(
    default,
    deserialize_with = "tasks_if_list"
  )]
  pub tasks:    Option<Vec<Task>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub fetch_id: Option<u64>,
  #[serde(flatten)]
  pub metadata: BTreeMap<String, Value>
}

impl TaskCollection {
  pub fn from_tasks(
    tasks: Vec<Task>
  ) -> Self {
    Self {
      tasks: Some(tasks),
      ..Self::default()
    }
  }

  pub fn task_list(&self) -> &[Task] {
    self.tasks.as_deref().unwrap_or(&[])
  }

  pub fn len(&self) -> usize {
    self.task_list().len()
  }

  pub fn is_empty(&self) -> bool {
    self.task_list().is_empty()
  }
}

/// Anything other than a JSON array is
/// treated as "no tasks yet".
fn tasks_if_list<'de, D>(
  deserializer: D
) -> Result<Option<Vec<Task>>, D::Error>
where
  D: serde::Deserializer<'de>
{
  let raw = Value::deserialize(
    deserializer
  )?;
  match raw {
    | Value::Array(_) => {
      serde_json::from_value(raw)
        .map(Some)
        .map_err(serde::de::Error::custom)
    }
    | _ => Ok(None)
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskBundle {
  pub bundle_id: u64,
  #[serde(default)]
  pub name:      String,
  #[serde(default)]
  pub task_ids:  Vec<TaskId>,
  #[serde(default)]
  pub tasks:     Option<Vec<Task>>
}

impl TaskBundle {
  /// The task that stands for the
  /// whole bundle.
  pub fn primary_task_id(
    &self
  ) -> Option<TaskId> {
    self.task_ids.first().copied().or_else(
      || {
        self
          .tasks
          .as_ref()
          .and_then(|t| t.first())
          .map(|t| t.id)
      }
    )
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn task_wire_shape_uses_numeric_codes()
  {
    let task: Task =
      serde_json::from_value(json!({
        "id": 7,
        "status": 1,
        "priority": 2,
        "reviewStatus": 3,
        "lockedBy": 12,
        "parent": 5,
        "geometries": {"type": "FeatureCollection"},
        "name": "road gap"
      }))
      .expect("task should parse");

    assert_eq!(task.id, 7);
    assert_eq!(
      task.status,
      TaskStatus::Fixed
    );
    assert_eq!(
      task.priority,
      TaskPriority::Low
    );
    assert_eq!(
      task.review_status,
      Some(
        TaskReviewStatus::ApprovedWithFixes
      )
    );
    assert_eq!(task.locked_by, Some(12));
    assert_eq!(task.parent_id, Some(5));
    assert_eq!(
      task.extra.get("name"),
      Some(&json!("road gap"))
    );

    let back =
      serde_json::to_value(&task)
        .expect("serialize");
    assert_eq!(back["status"], json!(1));
    assert_eq!(
      back["parentId"],
      json!(5)
    );
  }

  #[test]
  fn parent_and_parent_id_together() {
    let task: Task =
      serde_json::from_value(json!({
        "id": 3,
        "status": 0,
        "priority": 1,
        "parent": 5,
        "parentId": 6
      }))
      .expect("task should parse");
    assert_eq!(task.parent_id, Some(6));
    assert!(
      !task.extra.contains_key("parent")
    );

    let page: TaskCollection =
      serde_json::from_value(json!({
        "tasks": [
          {"id": 1, "status": 0, "priority": 0, "parentId": 5},
          {"id": 2, "status": 0, "priority": 0, "parent": 5, "parentId": 5}
        ]
      }))
      .expect("page should parse");
    assert_eq!(page.len(), 2);
    assert!(
      page
        .task_list()
        .iter()
        .all(|t| t.parent_id == Some(5))
    );
  }

  #[test]
  fn not_set_review_status_is_none() {
    let task: Task =
      serde_json::from_value(json!({
        "id": 1,
        "status": 0,
        "priority": 0,
        "reviewStatus": -1
      }))
      .expect("task should parse");
    assert_eq!(task.review_status, None);
  }

  #[test]
  fn unknown_status_code_is_rejected() {
    let err = serde_json::from_value::<
      Task
    >(json!({
      "id": 1,
      "status": 42,
      "priority": 0
    }))
    .expect_err("status 42 is unknown");
    assert!(
      err
        .to_string()
        .contains("unknown task status")
    );
  }

  #[test]
  fn collection_without_list_has_no_tasks()
  {
    let page: TaskCollection =
      serde_json::from_value(json!({
        "tasks": {"loading": true},
        "fetchId": 3,
        "challengeId": 9
      }))
      .expect("page should parse");
    assert!(page.tasks.is_none());
    assert_eq!(page.fetch_id, Some(3));
    assert_eq!(
      page.metadata.get("challengeId"),
      Some(&json!(9))
    );
    assert!(page.is_empty());
  }

  #[test]
  fn names_parse_in_several_spellings() {
    assert_eq!(
      "falsePositive"
        .parse::<TaskStatus>()
        .expect("camel case"),
      TaskStatus::FalsePositive
    );
    assert_eq!(
      "already-fixed"
        .parse::<TaskStatus>()
        .expect("kebab case"),
      TaskStatus::AlreadyFixed
    );
    assert_eq!(
      "urgent"
        .parse::<TaskPriority>()
        .ok(),
      None
    );
    assert_eq!(
      "approved_with_fixes"
        .parse::<TaskReviewStatus>()
        .expect("snake case"),
      TaskReviewStatus::ApprovedWithFixes
    );
  }

  #[test]
  fn single_task_cluster_projects_to_task()
  {
    let cluster: ClusterSummary =
      serde_json::from_value(json!({
        "clusterId": 100,
        "taskId": 2,
        "taskStatus": 0,
        "taskPriority": 1,
        "challengeIds": [5, 8],
        "numberOfPoints": 1
      }))
      .expect("cluster should parse");
    let task = cluster
      .to_task()
      .expect("single-task cluster");
    assert_eq!(task.id, 2);
    assert_eq!(task.parent_id, Some(5));
    assert_eq!(
      task.priority,
      TaskPriority::Medium
    );

    let multi = ClusterSummary {
      task_id: None,
      ..cluster
    };
    assert!(multi.to_task().is_none());
  }
}
