//! In-memory per-user task queues
//!
//! `UserQueues` is the synchronization point of the whole task subsystem:
//! a map from user id to that user's FIFO of not-yet-executed tasks, plus
//! the set of users that currently have a worker draining their queue. It
//! owns no durable state; it is rebuilt from the store at startup.
//!
//! Every operation that couples queue contents with the active-worker flag
//! runs under a single lock guard. In particular `next_or_release` observes
//! "queue is empty" and clears the active flag in the same critical
//! section, so a submission racing against a draining worker either lands
//! in front of a worker that will still see it, or finds the flag already
//! cleared and starts a fresh one. A task can never be stranded between
//! the two.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use crate::models::BackgroundTask;

/// What the submitter must do after enqueueing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// No worker is draining this user's queue; the caller must start one
    StartWorker,
    /// A worker is already active for this user and will pick the task up
    WorkerAlreadyRunning,
}

#[derive(Default)]
struct QueueState {
    queues: HashMap<Uuid, VecDeque<BackgroundTask>>,
    active: HashSet<Uuid>,
}

/// Thread-safe table of per-user pending queues and active-worker flags
#[derive(Default)]
pub struct UserQueues {
    state: Mutex<QueueState>,
}

impl UserQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // Nothing panics while holding this lock; recover rather than
        // wedge every user's queue if it ever does.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a task to its user's queue and atomically test-and-set the
    /// active-worker flag.
    pub fn enqueue(&self, task: BackgroundTask) -> EnqueueOutcome {
        let user_id = task.user_id;
        let mut state = self.lock();
        state.queues.entry(user_id).or_default().push_back(task);
        if state.active.insert(user_id) {
            EnqueueOutcome::StartWorker
        } else {
            EnqueueOutcome::WorkerAlreadyRunning
        }
    }

    /// Pop the next task for a user, or release the user's active-worker
    /// flag if the queue is empty. Emptiness and flag-clearing are decided
    /// under one guard; a worker that gets `None` is guaranteed that any
    /// later submission will see the flag cleared and start a new worker.
    pub fn next_or_release(&self, user_id: Uuid) -> Option<BackgroundTask> {
        let mut state = self.lock();
        match state.queues.get_mut(&user_id).and_then(VecDeque::pop_front) {
            Some(task) => Some(task),
            None => {
                state.queues.remove(&user_id);
                state.active.remove(&user_id);
                None
            }
        }
    }

    /// Bulk-load a user's queue at recovery time and mark the user active.
    /// Returns false if the user already had an active worker.
    pub fn install(&self, user_id: Uuid, tasks: Vec<BackgroundTask>) -> bool {
        let mut state = self.lock();
        state.queues.entry(user_id).or_default().extend(tasks);
        state.active.insert(user_id)
    }

    /// Whether a worker is currently marked active for this user
    pub fn is_active(&self, user_id: Uuid) -> bool {
        self.lock().active.contains(&user_id)
    }

    /// Number of tasks waiting (not yet dequeued) for this user
    pub fn pending_count(&self, user_id: Uuid) -> usize {
        self.lock()
            .queues
            .get(&user_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}
