use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use tasksift_shared::{
    ClusterSummary, Task, TaskCollection, TaskId, TaskPriority, TaskStatus, UserId,
};
use tracing::{debug, instrument, trace, warn};

use crate::filter::{FilterState, ReviewStatusKey, filter_tasks};
use crate::selection::SelectionSet;

/// Called with the new selection whenever an operation changes it.
pub type SelectionListener = Box<dyn FnMut(&SelectionSet)>;

pub type SharedManager = Rc<RefCell<FilterSelectionManager>>;

/// Where `select_tasks_by_id` looks tasks up.
#[derive(Debug, Clone, Copy)]
pub enum SelectionSource<'a> {
    Tasks(&'a [Task]),
    /// Map clusters; only single-task clusters can be selected.
    Clusters(&'a [ClusterSummary]),
}

impl SelectionSource<'_> {
    fn into_tasks(self) -> Vec<Task> {
        match self {
            SelectionSource::Tasks(tasks) => tasks.to_vec(),
            SelectionSource::Clusters(clusters) => {
                clusters.iter().filter_map(ClusterSummary::to_task).collect()
            }
        }
    }
}

/// Owns the include filters and the task selection for one page of tasks.
///
/// The page itself is supplied from outside through [`Self::set_source`];
/// the manager only derives the filtered view from it and keeps the
/// selection consistent with the active filters.
pub struct FilterSelectionManager {
    source: Option<TaskCollection>,
    user_id: Option<UserId>,
    initial_filters: FilterState,
    filters: FilterState,
    selected: SelectionSet,
    filtered: Option<TaskCollection>,
    all_selected: bool,
    listener: Option<SelectionListener>,
}

impl fmt::Debug for FilterSelectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSelectionManager")
            .field("user_id", &self.user_id)
            .field("filters", &self.filters)
            .field("selected", &self.selected.len())
            .field("filtered", &self.filtered_list().len())
            .field("all_selected", &self.all_selected)
            .finish_non_exhaustive()
    }
}

impl FilterSelectionManager {
    #[instrument(skip(initial_filters, source))]
    pub fn new(
        initial_filters: FilterState,
        user_id: Option<UserId>,
        source: Option<TaskCollection>,
    ) -> Self {
        let mut manager = Self {
            source,
            user_id,
            initial_filters,
            filters: initial_filters,
            selected: SelectionSet::new(),
            filtered: None,
            all_selected: false,
            listener: None,
        };
        manager.filtered = manager.filter_tasks(&initial_filters, false);
        debug!(
            filtered = manager.filtered_list().len(),
            "computed initial filtered tasks"
        );
        manager
    }

    pub fn with_selection_listener(mut self, listener: SelectionListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn set_selection_listener(&mut self, listener: Option<SelectionListener>) {
        self.listener = listener;
    }

    pub fn into_shared(self) -> SharedManager {
        Rc::new(RefCell::new(self))
    }

    /// Handle for callers that need to reset the selection without holding
    /// the manager itself.
    pub fn reset_handle(this: &SharedManager) -> ResetHandle {
        ResetHandle {
            manager: Rc::downgrade(this),
        }
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn selected_tasks(&self) -> &SelectionSet {
        &self.selected
    }

    /// `None` until a page has loaded.
    pub fn filtered_tasks(&self) -> Option<&TaskCollection> {
        self.filtered.as_ref()
    }

    pub fn filtered_list(&self) -> &[Task] {
        self.filtered
            .as_ref()
            .map(TaskCollection::task_list)
            .unwrap_or(&[])
    }

    pub fn all_selected(&self) -> bool {
        self.all_selected
    }

    pub fn source(&self) -> Option<&TaskCollection> {
        self.source.as_ref()
    }

    fn page(&self) -> &[Task] {
        self.source
            .as_ref()
            .map(TaskCollection::task_list)
            .unwrap_or(&[])
    }

    /// Replaces the page. A change in its tasks or fetch id refreshes the
    /// filtered view and the selection.
    #[instrument(skip_all)]
    pub fn set_source(&mut self, source: Option<TaskCollection>) {
        let prev_tasks = self.source.as_ref().and_then(|s| s.tasks.as_ref());
        let prev_fetch = self.source.as_ref().and_then(|s| s.fetch_id);
        let changed = prev_tasks != source.as_ref().and_then(|s| s.tasks.as_ref())
            || prev_fetch != source.as_ref().and_then(|s| s.fetch_id);

        self.source = source;
        if changed {
            debug!("task page changed; refreshing selection");
            self.refresh_selected_tasks();
        } else {
            trace!("task page unchanged");
        }
    }

    pub fn set_user_id(&mut self, user_id: Option<UserId>) {
        if self.user_id != user_id {
            self.user_id = user_id;
            self.refresh_selected_tasks();
        }
    }

    /// Filters the current page. With `include_all`, selected tasks that are
    /// not on the page are considered as well.
    pub fn filter_tasks(&self, filters: &FilterState, include_all: bool) -> Option<TaskCollection> {
        let off_page = if include_all {
            self.selected.to_tasks()
        } else {
            Vec::new()
        };
        filter_tasks(self.source.as_ref(), filters, self.user_id, &off_page)
    }

    #[instrument(skip(self))]
    pub fn toggle_status_filter(&mut self, status: TaskStatus, exclusive_select: bool) {
        let mut next = self.filters;
        if exclusive_select {
            next.statuses.only(status);
        } else {
            next.statuses.toggle(status);
        }
        self.apply_filters(next);
    }

    #[instrument(skip(self))]
    pub fn toggle_review_status_filter(&mut self, status: ReviewStatusKey, exclusive_select: bool) {
        let mut next = self.filters;
        if exclusive_select {
            next.review_statuses.only(status);
        } else {
            next.review_statuses.toggle(status);
        }
        self.apply_filters(next);
    }

    #[instrument(skip(self))]
    pub fn toggle_priority_filter(&mut self, priority: TaskPriority, exclusive_select: bool) {
        let mut next = self.filters;
        if exclusive_select {
            next.priorities.only(priority);
        } else {
            next.priorities.toggle(priority);
        }
        self.apply_filters(next);
    }

    fn apply_filters(&mut self, filters: FilterState) {
        self.filtered = self.filter_tasks(&filters, false);
        let pruned = self.unselect_excluded_tasks(&filters);
        self.filters = filters;
        self.all_selected = false;
        self.commit_selection(pruned);
    }

    /// The selection minus every task that fails `filters`, judged against
    /// the page unioned with the selection itself.
    fn unselect_excluded_tasks(&self, filters: &FilterState) -> SelectionSet {
        let keep: HashSet<TaskId> = match self.filter_tasks(filters, true) {
            Some(merged) => merged.task_list().iter().map(|t| t.id).collect(),
            None => self
                .selected
                .iter()
                .filter(|t| filters.matches(t, self.user_id))
                .map(|t| t.id)
                .collect(),
        };

        let mut next = self.selected.clone();
        let dropped = next.retain_ids(&keep);
        if dropped > 0 {
            debug!(dropped, "unselected tasks excluded by filters");
        }
        next
    }

    fn commit_selection(&mut self, next: SelectionSet) {
        if next == self.selected {
            return;
        }
        self.selected = next;
        trace!(selected = self.selected.len(), "selection changed");
        if let Some(listener) = self.listener.as_mut() {
            listener(&self.selected);
        }
    }

    #[instrument(skip(self, task), fields(task_id = task.id))]
    pub fn toggle_task_selection(&mut self, task: &Task) {
        let mut next = self.selected.clone();
        if next.remove(task.id).is_none() {
            next.insert(task.clone());
        }
        self.all_selected = false;
        self.commit_selection(next);
    }

    /// Like [`Self::toggle_task_selection`], but selecting needs the task to
    /// be on the current page.
    #[instrument(skip(self))]
    pub fn toggle_task_selection_by_id(&mut self, task_id: TaskId) {
        let mut next = self.selected.clone();
        if next.remove(task_id).is_none() {
            match self.page().iter().find(|t| t.id == task_id) {
                Some(task) => next.insert(task.clone()),
                None => debug!(task_id, "task not on current page; nothing to select"),
            }
        }
        self.all_selected = false;
        self.commit_selection(next);
    }

    #[instrument(skip(self, task_ids, source), fields(count = task_ids.len()))]
    pub fn select_tasks_by_id(&mut self, task_ids: &[TaskId], source: SelectionSource<'_>) {
        if task_ids.is_empty() || self.all_selected {
            return;
        }

        let wanted: HashSet<TaskId> = task_ids.iter().copied().collect();
        let mut next = self.selected.clone();
        next.extend(
            source
                .into_tasks()
                .into_iter()
                .filter(|task| wanted.contains(&task.id)),
        );
        self.all_selected = false;
        self.commit_selection(next);
    }

    /// Only an explicit select-all counts: selecting every task by hand
    /// leaves this false unless `exclude_all_selected_flag` is set.
    pub fn all_tasks_are_selected(&self, exclude_all_selected_flag: bool) -> bool {
        if self.selected.is_empty() {
            return false;
        }
        self.selected.len() == self.filtered_list().len()
            && (exclude_all_selected_flag || self.all_selected)
    }

    pub fn some_tasks_are_selected(&self) -> bool {
        !self.selected.is_empty() && !self.all_tasks_are_selected(false)
    }

    #[instrument(skip(self))]
    pub fn toggle_all_tasks_selection(&mut self) {
        if self.all_tasks_are_selected(false) {
            self.all_selected = false;
            self.commit_selection(SelectionSet::new());
        } else {
            let next: SelectionSet = self.filtered_list().iter().cloned().collect();
            self.all_selected = !next.is_empty();
            self.commit_selection(next);
        }
    }

    #[instrument(skip(self))]
    pub fn unselect_all_tasks(&mut self) {
        self.all_selected = false;
        self.commit_selection(SelectionSet::new());
    }

    #[instrument(skip(self))]
    pub fn select_tasks_with_status(&mut self, status: TaskStatus) {
        let matching: Vec<Task> = self
            .filtered_list()
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        self.add_to_selection(matching);
    }

    #[instrument(skip(self))]
    pub fn select_tasks_with_priority(&mut self, priority: TaskPriority) {
        let matching: Vec<Task> = self
            .filtered_list()
            .iter()
            .filter(|t| t.priority == priority)
            .cloned()
            .collect();
        self.add_to_selection(matching);
    }

    /// Adds `tasks` as given. They are not checked against the filters.
    #[instrument(skip_all, fields(count = tasks.len()))]
    pub fn select_tasks(&mut self, tasks: &[Task]) {
        self.add_to_selection(tasks.to_vec());
    }

    fn add_to_selection(&mut self, tasks: Vec<Task>) {
        let mut next = self.selected.clone();
        next.extend(tasks);
        if next != self.selected {
            self.all_selected = false;
        }
        self.commit_selection(next);
    }

    /// Restores the filters the manager was created with.
    #[instrument(skip(self))]
    pub fn clear_all_filters(&mut self) {
        let fresh = self.initial_filters;
        self.filtered = self.filter_tasks(&fresh, false);
        let pruned = self.unselect_excluded_tasks(&fresh);
        self.filters = fresh;
        self.commit_selection(pruned);
    }

    #[instrument(skip(self))]
    pub fn reset_selected_tasks(&mut self) {
        let fresh = self.initial_filters;
        self.filtered = self.filter_tasks(&fresh, false);
        self.filters = fresh;
        self.all_selected = false;
        self.commit_selection(SelectionSet::new());
    }

    /// Re-derives the filtered view and prunes the selection, for when task
    /// state changed without a page or filter change.
    #[instrument(skip(self))]
    pub fn refresh_selected_tasks(&mut self) {
        let filters = self.filters;
        self.filtered = self.filter_tasks(&filters, false);
        let pruned = self.unselect_excluded_tasks(&filters);
        self.all_selected = self.all_selected && self.covers_filtered(&pruned);
        self.commit_selection(pruned);
    }

    /// True when `selection` is exactly the filtered view.
    fn covers_filtered(&self, selection: &SelectionSet) -> bool {
        let filtered = self.filtered_list();
        selection.len() == filtered.len() && filtered.iter().all(|t| selection.contains(t.id))
    }
}

/// Weak handle that lets an owner outside the manager reset its selection.
#[derive(Debug, Clone)]
pub struct ResetHandle {
    manager: Weak<RefCell<FilterSelectionManager>>,
}

impl ResetHandle {
    /// Returns false when the manager is gone or currently borrowed.
    pub fn reset(&self) -> bool {
        let Some(manager) = self.manager.upgrade() else {
            debug!("selection manager dropped; reset skipped");
            return false;
        };
        match manager.try_borrow_mut() {
            Ok(mut manager) => {
                manager.reset_selected_tasks();
                true
            }
            Err(_) => {
                warn!("selection manager busy; reset skipped");
                false
            }
        }
    }
}
