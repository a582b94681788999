//! In-memory task store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use super::TaskStore;
use crate::domain::{Task, TaskId, TaskMeta, TaskState};

type Record = Arc<Mutex<TaskMeta>>;

/// Volatile store backed by a map of per-record mutexes.
///
/// # Locking
/// - The map `RwLock` is taken for write only when a new id is inserted.
/// - Updates to an existing id take the map read lock plus that record's mutex,
///   so unrelated tasks never serialize on one write lock.
/// - Snapshots clone each record under its own mutex: every returned
///   `TaskMeta` is consistent as of some instant.
#[derive(Default)]
pub struct InMemoryTaskStore {
    records: RwLock<HashMap<TaskId, Record>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, id: &TaskId) -> Option<Record> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

// A panicking writer leaves a record that is still a valid TaskMeta, so poisoning is ignored.
fn lock(record: &Mutex<TaskMeta>) -> MutexGuard<'_, TaskMeta> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskStore for InMemoryTaskStore {
    fn create_or_update(&self, task: Task, state: TaskState) {
        if let Some(record) = self.record(&task.id) {
            lock(&record).resubmit(task, state);
            return;
        }

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        // 別スレッドが先に insert したかもしれないので write lock の下で再確認
        match records.get(&task.id) {
            Some(record) => lock(record).resubmit(task, state),
            None => {
                let id = task.id.clone();
                records.insert(id, Arc::new(Mutex::new(TaskMeta::new(task, state))));
            }
        }
    }

    fn set_state(&self, id: &TaskId, state: TaskState) {
        if let Some(record) = self.record(id) {
            lock(&record).set_state(state);
        }
    }

    fn increment_attempts(&self, id: &TaskId) -> u32 {
        match self.record(id) {
            Some(record) => lock(&record).record_failure(),
            None => 0,
        }
    }

    fn get(&self, id: &TaskId) -> Option<TaskMeta> {
        self.record(id).map(|record| lock(&record).clone())
    }

    fn dump_all(&self) -> HashMap<TaskId, TaskMeta> {
        // Copy the handles first so no record mutex is taken under the map lock.
        let handles: Vec<(TaskId, Record)> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, record)| (id.clone(), Arc::clone(record)))
            .collect();

        handles
            .into_iter()
            .map(|(id, record)| {
                let meta = lock(&record).clone();
                (id, meta)
            })
            .collect()
    }
}
