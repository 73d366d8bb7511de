//! Tasklet introspection.
//!
//! A tasklet tracks one logical async activity for the introspection sink.
//! Introspective requests bracket each await with before/after events so
//! in-flight waits are visible. With no tracker installed on the context,
//! none of this runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// What happened to a tasklet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskletWhat {
    Spawned,
    BeforeAwait,
    AfterAwait,
    Finished,
}

/// One recorded introspection event.
#[derive(Debug, Clone)]
pub struct TaskletEvent {
    pub tasklet_id: u64,
    pub title: String,
    pub what: TaskletWhat,
    pub detail: String,
    pub at: Instant,
}

/// The introspection sink: an event buffer behind a short-held mutex.
pub struct TaskletTracker {
    events: Mutex<Vec<TaskletEvent>>,
    next_id: AtomicU64,
}

impl TaskletTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Starts tracking a new activity.
    pub fn spawn(self: &Arc<Self>, title: impl Into<String>) -> Tasklet {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let title = title.into();
        self.record(TaskletEvent {
            tasklet_id: id,
            title: title.clone(),
            what: TaskletWhat::Spawned,
            detail: String::new(),
            at: Instant::now(),
        });
        Tasklet {
            tracker: Arc::clone(self),
            id,
            title,
        }
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<TaskletEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: TaskletEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Handle for one tracked activity; records `Finished` on drop.
pub struct Tasklet {
    tracker: Arc<TaskletTracker>,
    id: u64,
    title: String,
}

impl Tasklet {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Records that this activity is about to suspend.
    pub fn before_await(&self, detail: impl Into<String>) {
        self.tracker.record(TaskletEvent {
            tasklet_id: self.id,
            title: self.title.clone(),
            what: TaskletWhat::BeforeAwait,
            detail: detail.into(),
            at: Instant::now(),
        });
    }

    /// Records that this activity resumed.
    pub fn after_await(&self) {
        self.tracker.record(TaskletEvent {
            tasklet_id: self.id,
            title: self.title.clone(),
            what: TaskletWhat::AfterAwait,
            detail: String::new(),
            at: Instant::now(),
        });
    }
}

impl Drop for Tasklet {
    fn drop(&mut self) {
        self.tracker.record(TaskletEvent {
            tasklet_id: self.id,
            title: self.title.clone(),
            what: TaskletWhat::Finished,
            detail: String::new(),
            at: Instant::now(),
        });
    }
}
