use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use tasksift_shared::{Task, TaskBundle, TaskId};
use tracing::{debug, info, instrument, warn};

use crate::manager::{ResetHandle, SelectionListener};
use crate::selection::SelectionSet;

/// Remote calls for creating, loading and deleting bundles.
pub trait BundleService {
    fn fetch_task_bundle(&mut self, bundle_id: u64) -> anyhow::Result<TaskBundle>;

    fn bundle_tasks(&mut self, task_ids: &[TaskId], name: &str) -> anyhow::Result<TaskBundle>;

    fn delete_task_bundle(
        &mut self,
        bundle_id: u64,
        primary_task_id: Option<TaskId>,
    ) -> anyhow::Result<()>;
}

/// Keeps track of the bundle belonging to the task being worked on.
pub struct TaskBundleTracker<S> {
    service: S,
    bundle: Option<TaskBundle>,
    loading: bool,
    current_task: Option<TaskId>,
    selected_tasks: Rc<RefCell<SelectionSet>>,
    reset_handle: Option<ResetHandle>,
}

impl<S: BundleService> TaskBundleTracker<S> {
    pub fn new(service: S, reset_handle: Option<ResetHandle>) -> Self {
        Self {
            service,
            bundle: None,
            loading: false,
            current_task: None,
            selected_tasks: Rc::new(RefCell::new(SelectionSet::new())),
            reset_handle,
        }
    }

    pub fn task_bundle(&self) -> Option<&TaskBundle> {
        self.bundle.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Latest selection reported through [`Self::selection_listener`].
    pub fn selected_tasks(&self) -> SelectionSet {
        self.selected_tasks.borrow().clone()
    }

    /// Listener to register on a selection manager so this tracker mirrors
    /// its selection.
    pub fn selection_listener(&self) -> SelectionListener {
        let mirror = Rc::clone(&self.selected_tasks);
        Box::new(move |selection: &SelectionSet| {
            *mirror.borrow_mut() = selection.clone();
        })
    }

    #[instrument(skip_all, fields(task_id = task.map(|t| t.id)))]
    pub fn mount(&mut self, task: Option<&Task>) -> anyhow::Result<()> {
        self.current_task = task.map(|t| t.id);
        match task.and_then(|t| t.bundle_id) {
            Some(bundle_id) => self.setup_bundle(bundle_id),
            None => Ok(()),
        }
    }

    /// Loads the new task's bundle, or drops the active one when the new task
    /// has none. Does nothing if the task id did not change.
    #[instrument(skip_all, fields(task_id = task.map(|t| t.id)))]
    pub fn task_changed(&mut self, task: Option<&Task>) -> anyhow::Result<()> {
        let task_id = task.map(|t| t.id);
        if task_id == self.current_task {
            return Ok(());
        }
        self.current_task = task_id;

        match task.and_then(|t| t.bundle_id) {
            Some(bundle_id) => self.setup_bundle(bundle_id),
            None => {
                self.clear_active_task_bundle();
                Ok(())
            }
        }
    }

    #[instrument(skip(self))]
    pub fn setup_bundle(&mut self, bundle_id: u64) -> anyhow::Result<()> {
        self.loading = true;
        let fetched = self
            .service
            .fetch_task_bundle(bundle_id)
            .with_context(|| format!("failed to fetch task bundle {bundle_id}"));
        self.loading = false;

        let bundle = fetched?;
        debug!(bundle_id, tasks = bundle.task_ids.len(), "loaded task bundle");
        self.bundle = Some(bundle);
        Ok(())
    }

    /// Primary task of the active bundle, if `bundle_id` is the active one.
    pub fn primary_task_id(&self, bundle_id: u64) -> Option<TaskId> {
        self.bundle
            .as_ref()
            .filter(|b| b.bundle_id == bundle_id)
            .and_then(TaskBundle::primary_task_id)
    }

    #[instrument(skip(self, task_ids), fields(count = task_ids.len()))]
    pub fn create_task_bundle(&mut self, task_ids: &[TaskId], name: &str) -> anyhow::Result<()> {
        let bundle = self
            .service
            .bundle_tasks(task_ids, name)
            .with_context(|| format!("failed to create task bundle `{name}`"))?;
        info!(bundle_id = bundle.bundle_id, "created task bundle");
        self.bundle = Some(bundle);
        Ok(())
    }

    /// Deletes the bundle if it is the active one; other ids are ignored.
    #[instrument(skip(self))]
    pub fn remove_task_bundle(&mut self, bundle_id: u64) -> anyhow::Result<()> {
        if self.bundle.as_ref().map(|b| b.bundle_id) != Some(bundle_id) {
            debug!(bundle_id, "not the active bundle; nothing removed");
            return Ok(());
        }

        let primary = self.primary_task_id(bundle_id);
        self.service
            .delete_task_bundle(bundle_id, primary)
            .with_context(|| format!("failed to delete task bundle {bundle_id}"))?;
        info!(bundle_id, "removed task bundle");
        self.clear_active_task_bundle();
        Ok(())
    }

    pub fn clear_active_task_bundle(&mut self) {
        self.bundle = None;
        self.loading = false;
    }

    /// Resets the selection manager this tracker was given, if any.
    pub fn reset_selected_tasks(&self) -> bool {
        match &self.reset_handle {
            Some(handle) => handle.reset(),
            None => {
                warn!("no selection manager to reset");
                false
            }
        }
    }
}
