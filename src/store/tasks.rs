//! In-memory task store.
//!
//! Tasks are process-lifetime only; the snapshot never persists them. The
//! store enforces the no-regression rule for terminal states and offers a
//! compare-and-set claim so two correlated resubmissions cannot both win.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::Utc;

use crate::types::{Message, Task, TaskMetadata, TaskState};

#[derive(Default)]
pub struct TaskStore {
    inner: RwLock<HashMap<String, Task>>,
}

/// Outcome of a compare-and-set state claim.
pub enum Claim {
    /// Caller won the transition; the updated task.
    Won(Task),
    /// Task was not in an eligible state; its current snapshot.
    Lost(Task),
    Missing,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, task: Task) -> Task {
        let mut tasks = self.inner.write().unwrap();
        tasks.insert(task.id.clone(), task.clone());
        task
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.inner.read().unwrap().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().unwrap().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }

    /// Move the task to `state`, stamping the status and optionally replacing
    /// the status message and patching metadata. Transitions out of a terminal
    /// state are refused: the task is returned unchanged.
    pub fn transition(
        &self,
        id: &str,
        state: TaskState,
        message: Option<Message>,
        patch: impl FnOnce(&mut TaskMetadata),
    ) -> Option<Task> {
        let mut tasks = self.inner.write().unwrap();
        let task = tasks.get_mut(id)?;
        if task.status.state.is_terminal() {
            return Some(task.clone());
        }
        task.status.state = state;
        task.status.timestamp = Utc::now();
        if message.is_some() {
            task.status.message = message;
        }
        patch(&mut task.metadata);
        Some(task.clone())
    }

    /// Compare-and-set: move the task to `to` only if it currently sits in one
    /// of `from`. Exactly one of two racing callers wins.
    pub fn claim(&self, id: &str, from: &[TaskState], to: TaskState) -> Claim {
        let mut tasks = self.inner.write().unwrap();
        let Some(task) = tasks.get_mut(id) else {
            return Claim::Missing;
        };
        if !from.contains(&task.status.state) {
            return Claim::Lost(task.clone());
        }
        task.status.state = to;
        task.status.timestamp = Utc::now();
        Claim::Won(task.clone())
    }

    pub fn append_history(&self, id: &str, message: Message) {
        let mut tasks = self.inner.write().unwrap();
        if let Some(task) = tasks.get_mut(id) {
            task.history.push(message);
        }
    }

    pub fn state_counts(&self) -> BTreeMap<&'static str, usize> {
        let tasks = self.inner.read().unwrap();
        let mut counts = BTreeMap::new();
        for t in tasks.values() {
            *counts.entry(t.status.state.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Snapshot of every live task, for the self-test invariant sweep.
    pub fn all(&self) -> Vec<Task> {
        self.inner.read().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::new_id;

    fn task(state: TaskState) -> Task {
        Task::new(new_id(), new_id(), state)
    }

    #[test]
    fn create_then_get_returns_same_record() {
        let store = TaskStore::new();
        let created = store.create(task(TaskState::Submitted));
        let fetched = store.get(&created.id).unwrap();
        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            serde_json::to_value(&fetched).unwrap()
        );
    }

    #[test]
    fn transition_refuses_to_leave_terminal_state() {
        let store = TaskStore::new();
        let t = store.create(task(TaskState::Completed));
        let after = store
            .transition(&t.id, TaskState::Working, None, |_| {})
            .unwrap();
        assert_eq!(after.status.state, TaskState::Completed);
    }

    #[test]
    fn transition_patches_metadata() {
        let store = TaskStore::new();
        let t = store.create(task(TaskState::Submitted));
        let after = store
            .transition(&t.id, TaskState::Working, None, |m| {
                m.skill = Some("screenshot".to_string());
            })
            .unwrap();
        assert_eq!(after.status.state, TaskState::Working);
        assert_eq!(after.metadata.skill.as_deref(), Some("screenshot"));
    }

    #[test]
    fn claim_lets_exactly_one_caller_win() {
        let store = TaskStore::new();
        let t = store.create(task(TaskState::InputRequired));
        let first = store.claim(&t.id, &[TaskState::InputRequired], TaskState::Working);
        let second = store.claim(&t.id, &[TaskState::InputRequired], TaskState::Working);
        assert!(matches!(first, Claim::Won(_)));
        match second {
            Claim::Lost(current) => assert_eq!(current.status.state, TaskState::Working),
            _ => panic!("second claim should lose"),
        }
    }

    #[test]
    fn state_counts_tally_by_state() {
        let store = TaskStore::new();
        store.create(task(TaskState::Completed));
        store.create(task(TaskState::Completed));
        store.create(task(TaskState::Failed));
        let counts = store.state_counts();
        assert_eq!(counts.get("completed"), Some(&2));
        assert_eq!(counts.get("failed"), Some(&1));
    }
}
