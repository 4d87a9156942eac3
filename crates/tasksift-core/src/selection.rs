use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tasksift_shared::{Task, TaskId};

/// Selected tasks keyed by id, in the order they were first selected.
///
/// Each entry holds the task as it looked when it was selected, so a
/// selection can outlive the page it was made on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, Task>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Re-inserting an id replaces the snapshot but keeps its position.
    pub fn insert(&mut self, task: Task) {
        if self.tasks.insert(task.id, task.clone()).is_none() {
            self.order.push(task.id);
        }
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let removed = self.tasks.remove(&id)?;
        self.order.retain(|existing| *existing != id);
        Some(removed)
    }

    pub fn extend<I>(&mut self, tasks: I)
    where
        I: IntoIterator<Item = Task>,
    {
        for task in tasks {
            self.insert(task);
        }
    }

    /// Keeps only the ids in `keep`. Returns how many entries were dropped.
    pub fn retain_ids(&mut self, keep: &HashSet<TaskId>) -> usize {
        let before = self.order.len();
        self.order.retain(|id| keep.contains(id));
        self.tasks.retain(|id, _| keep.contains(id));
        before - self.order.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.order.iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> + '_ {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn to_tasks(&self) -> Vec<Task> {
        self.iter().cloned().collect()
    }
}

impl Serialize for SelectionSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.iter())
    }
}

impl FromIterator<Task> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use tasksift_shared::{TaskPriority, TaskStatus};

    use super::*;

    fn task(id: TaskId) -> Task {
        Task::new(id, TaskStatus::Created, TaskPriority::Medium)
    }

    #[test]
    fn keeps_first_selection_order() {
        let mut set: SelectionSet = [task(3), task(1), task(2)].into_iter().collect();
        let mut updated = task(1);
        updated.status = TaskStatus::Fixed;
        set.insert(updated);

        assert_eq!(set.ids().collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(set.get(1).map(|t| t.status), Some(TaskStatus::Fixed));
    }

    #[test]
    fn remove_and_retain() {
        let mut set: SelectionSet = (1..=4).map(task).collect();
        assert!(set.remove(2).is_some());
        assert!(set.remove(2).is_none());

        let keep: HashSet<TaskId> = [1, 4, 9].into_iter().collect();
        assert_eq!(set.retain_ids(&keep), 1);
        assert_eq!(set.ids().collect::<Vec<_>>(), vec![1, 4]);
        assert!(!set.contains(3));
    }

    #[test]
    fn equality_is_order_sensitive() {
        let a: SelectionSet = [task(1), task(2)].into_iter().collect();
        let b: SelectionSet = [task(2), task(1)].into_iter().collect();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
