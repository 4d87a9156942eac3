use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use serde::ser::{
  Serialize,
  SerializeMap,
  Serializer
};
use tasksift_shared::{
  Task,
  TaskCollection,
  TaskId,
  TaskPriority,
  TaskReviewStatus,
  TaskStatus,
  UserId
};
use tracing::trace;

/// A closed set of values that can be
/// switched on and off in a filter.
pub trait FilterKey:
  Copy + Eq + fmt::Debug + 'static
{
  const VARIANTS: &'static [Self];

  fn index(self) -> usize;

  fn label(self) -> &'static str;
}

impl FilterKey for TaskStatus {
  const VARIANTS: &'static [Self] =
    &TaskStatus::ALL;

  fn index(self) -> usize {
    self.code() as usize
  }

  fn label(self) -> &'static str {
    self.name()
  }
}

impl FilterKey for TaskPriority {
  const VARIANTS: &'static [Self] =
    &TaskPriority::ALL;

  fn index(self) -> usize {
    self.code() as usize
  }

  fn label(self) -> &'static str {
    self.name()
  }
}

/// `None` is the "not set" review
/// status.
pub type ReviewStatusKey =
  Option<TaskReviewStatus>;

pub const REVIEW_NOT_SET_LABEL: &str =
  "not_set";

impl FilterKey for ReviewStatusKey {
  const VARIANTS: &'static [Self] = &[
    None,
    Some(TaskReviewStatus::Needed),
    Some(TaskReviewStatus::Approved),
    Some(TaskReviewStatus::Rejected),
    Some(
      TaskReviewStatus::ApprovedWithFixes
    ),
    Some(TaskReviewStatus::Disputed),
    Some(TaskReviewStatus::Unnecessary)
  ];

  fn index(self) -> usize {
    match self {
      | None => 0,
      | Some(status) => {
        status.code() as usize + 1
      }
    }
  }

  fn label(self) -> &'static str {
    match self {
      | None => REVIEW_NOT_SET_LABEL,
      | Some(status) => status.name()
    }
  }
}

/// One include flag per variant of
/// `K`. `N` must equal
/// `K::VARIANTS.len()`; use the
/// aliases below.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct IncludeFlags<
  K,
  const N: usize
> {
  flags: [bool; N],
  _key:  PhantomData<K>
}

pub type StatusFlags =
  IncludeFlags<TaskStatus, 10>;
pub type PriorityFlags =
  IncludeFlags<TaskPriority, 3>;
pub type ReviewStatusFlags =
  IncludeFlags<ReviewStatusKey, 7>;

impl<K: FilterKey, const N: usize>
  IncludeFlags<K, N>
{
  pub fn all(value: bool) -> Self {
    debug_assert_eq!(
      K::VARIANTS.len(),
      N
    );
    Self {
      flags: [value; N],
      _key:  PhantomData
    }
  }

  /// Exactly the listed keys are
  /// included.
  pub fn from_included<I>(
    keys: I
  ) -> Self
  where
    I: IntoIterator<Item = K>
  {
    let mut flags = Self::all(false);
    for key in keys {
      flags.set(key, true);
    }
    flags
  }

  pub fn includes(
    &self,
    key: K
  ) -> bool {
    self
      .flags
      .get(key.index())
      .copied()
      .unwrap_or(true)
  }

  pub fn set(
    &mut self,
    key: K,
    value: bool
  ) {
    if let Some(slot) =
      self.flags.get_mut(key.index())
    {
      *slot = value;
    }
  }

  pub fn toggle(&mut self, key: K) {
    let next = !self.includes(key);
    self.set(key, next);
  }

  /// Include `key` and exclude every
  /// other variant.
  pub fn only(&mut self, key: K) {
    *self = Self::from_included([key]);
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (K, bool)> + '_
  {
    K::VARIANTS
      .iter()
      .map(|k| (*k, self.includes(*k)))
  }

  pub fn included(&self) -> Vec<K> {
    self
      .iter()
      .filter(|(_, on)| *on)
      .map(|(k, _)| k)
      .collect()
  }

  pub fn all_included(&self) -> bool {
    self.flags.iter().all(|on| *on)
  }
}

impl<K: FilterKey, const N: usize>
  Default for IncludeFlags<K, N>
{
  fn default() -> Self {
    Self::all(true)
  }
}

impl<K: FilterKey, const N: usize>
  Serialize for IncludeFlags<K, N>
{
  fn serialize<S>(
    &self,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    let mut map =
      serializer.serialize_map(Some(N))?;
    for (key, on) in self.iter() {
      map.serialize_entry(
        key.label(),
        &on
      )?;
    }
    map.end()
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  serde::Serialize,
)]
pub struct FilterState {
  pub statuses:        StatusFlags,
  pub review_statuses: ReviewStatusFlags,
  pub priorities:      PriorityFlags,
  pub include_locked:  bool
}

impl Default for FilterState {
  fn default() -> Self {
    Self {
      statuses:        StatusFlags::all(
        true
      ),
      review_statuses:
        ReviewStatusFlags::all(true),
      priorities:      PriorityFlags::all(
        true
      ),
      include_locked:  true
    }
  }
}

impl FilterState {
  pub fn is_all_inclusive(&self) -> bool {
    self.statuses.all_included()
      && self
        .review_statuses
        .all_included()
      && self.priorities.all_included()
      && self.include_locked
  }

  /// Status, priority and review status
  /// must all be included. A locked task
  /// only passes when locks are included
  /// or the lock belongs to `user_id`.
  pub fn matches(
    &self,
    task: &Task,
    user_id: Option<UserId>
  ) -> bool {
    let lock_ok = self.include_locked
      || !task.is_locked()
      || task.locked_by == user_id;

    self.statuses.includes(task.status)
      && self
        .priorities
        .includes(task.priority)
      && self
        .review_statuses
        .includes(task.review_status)
      && lock_ok
  }
}

/// Applies `filters` to the page in
/// `source`, keeping its metadata.
///
/// Tasks in `off_page` whose id is not
/// on the page are unioned in first, so
/// a selection made on another page is
/// judged by the same rules. Page
/// entries win over `off_page` entries
/// with the same id.
///
/// Returns `None` when the page has not
/// loaded.
#[tracing::instrument(skip_all, fields(
  off_page = off_page.len()
))]
pub fn filter_tasks(
  source: Option<&TaskCollection>,
  filters: &FilterState,
  user_id: Option<UserId>,
  off_page: &[Task]
) -> Option<TaskCollection> {
  let source = source?;
  let page = source.tasks.as_ref()?;

  let on_page: HashSet<TaskId> =
    page.iter().map(|t| t.id).collect();

  let tasks: Vec<Task> = page
    .iter()
    .chain(off_page.iter().filter(|t| {
      !on_page.contains(&t.id)
    }))
    .filter(|task| {
      filters.matches(task, user_id)
    })
    .cloned()
    .collect();

  trace!(
    page = page.len(),
    kept = tasks.len(),
    "filtered task page"
  );

  Some(TaskCollection {
    tasks:    Some(tasks),
    fetch_id: source.fetch_id,
    metadata: source.metadata.clone()
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn task(
    id: TaskId,
    status: TaskStatus,
    priority: TaskPriority
  ) -> Task {
    Task::new(id, status, priority)
  }

  fn ids(
    collection: &TaskCollection
  ) -> Vec<TaskId> {
    collection
      .task_list()
      .iter()
      .map(|t| t.id)
      .collect()
  }

  #[test]
  fn flags_toggle_and_exclusive_select()
  {
    let mut flags = StatusFlags::default();
    assert!(flags.all_included());

    flags.toggle(TaskStatus::Fixed);
    assert!(
      !flags.includes(TaskStatus::Fixed)
    );
    assert!(
      flags.includes(TaskStatus::Created)
    );

    flags.toggle(TaskStatus::Fixed);
    assert!(flags.all_included());

    flags.only(TaskStatus::Skipped);
    assert_eq!(
      flags.included(),
      vec![TaskStatus::Skipped]
    );
  }

  fn assert_indices_line_up<
    K: FilterKey,
    const N: usize
  >() {
    assert_eq!(K::VARIANTS.len(), N);
    for (pos, key) in
      K::VARIANTS.iter().enumerate()
    {
      assert_eq!(key.index(), pos);
    }
  }

  #[test]
  fn variant_tables_index_in_order() {
    assert_indices_line_up::<
      TaskStatus,
      10
    >();
    assert_indices_line_up::<
      TaskPriority,
      3
    >();
    assert_indices_line_up::<
      ReviewStatusKey,
      7
    >();
  }

  #[test]
  fn review_flags_cover_not_set() {
    let mut flags =
      ReviewStatusFlags::default();
    assert_eq!(
      flags.iter().count(),
      ReviewStatusKey::VARIANTS.len()
    );
    flags.only(None);
    assert!(flags.includes(None));
    assert!(!flags.includes(Some(
      TaskReviewStatus::Needed
    )));
  }

  #[test]
  fn predicate_combines_every_rule() {
    let mut filters =
      FilterState::default();
    let mut t = task(
      1,
      TaskStatus::Created,
      TaskPriority::High
    );
    assert!(filters.matches(&t, None));

    filters
      .priorities
      .toggle(TaskPriority::High);
    assert!(!filters.matches(&t, None));
    filters
      .priorities
      .toggle(TaskPriority::High);

    t.review_status =
      Some(TaskReviewStatus::Rejected);
    filters.review_statuses.only(None);
    assert!(!filters.matches(&t, None));
    t.review_status = None;
    assert!(filters.matches(&t, None));
  }

  #[test]
  fn locked_tasks_pass_for_their_owner()
  {
    let filters = FilterState {
      include_locked: false,
      ..FilterState::default()
    };
    let mut t = task(
      1,
      TaskStatus::Created,
      TaskPriority::Low
    );
    assert!(filters.matches(&t, Some(9)));

    t.locked_by = Some(9);
    assert!(filters.matches(&t, Some(9)));
    assert!(
      !filters.matches(&t, Some(10))
    );
    assert!(!filters.matches(&t, None));
  }

  #[test]
  fn missing_page_filters_to_none() {
    let filters = FilterState::default();
    assert!(
      filter_tasks(
        None, &filters, None, &[]
      )
      .is_none()
    );

    let unloaded =
      TaskCollection::default();
    assert!(
      filter_tasks(
        Some(&unloaded),
        &filters,
        None,
        &[]
      )
      .is_none()
    );
  }

  #[test]
  fn off_page_tasks_are_unioned_by_id() {
    let page =
      TaskCollection::from_tasks(vec![
        task(
          1,
          TaskStatus::Created,
          TaskPriority::High
        ),
        task(
          2,
          TaskStatus::Fixed,
          TaskPriority::Low
        ),
      ]);
    let stale = task(
      2,
      TaskStatus::Created,
      TaskPriority::Low
    );
    let elsewhere = task(
      3,
      TaskStatus::Created,
      TaskPriority::Medium
    );

    let mut filters =
      FilterState::default();
    filters
      .statuses
      .toggle(TaskStatus::Fixed);

    let result = filter_tasks(
      Some(&page),
      &filters,
      None,
      &[stale, elsewhere]
    )
    .expect("page is loaded");

    assert_eq!(ids(&result), vec![1, 3]);
  }

  #[test]
  fn metadata_passes_through() {
    let mut page =
      TaskCollection::from_tasks(vec![]);
    page.fetch_id = Some(4);
    page.metadata.insert(
      "challengeId".to_string(),
      serde_json::json!(12)
    );

    let result = filter_tasks(
      Some(&page),
      &FilterState::default(),
      None,
      &[]
    )
    .expect("page is loaded");
    assert_eq!(result.fetch_id, Some(4));
    assert_eq!(
      result.metadata,
      page.metadata
    );
  }
}
