use crate::core::space::SpaceContext;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// The outcome of a deferred operation; failures are logged by the
/// draining tick and never abort it
pub type TaskResult = crate::Result<()>;

/// A deferred operation executed on the simulation thread
///
/// The `SpaceContext` argument is the only way to reach the native world,
/// which makes off-thread backend access a compile-time error rather than
/// a convention.
pub type Task = Box<dyn FnOnce(&mut SpaceContext<'_>) -> TaskResult + Send + 'static>;

/// A multi-producer, single-consumer queue of deferred operations
///
/// The only legal channel for non-simulation threads to affect simulation
/// objects. Producers never block; the simulation thread drains the queue
/// to empty once per tick, in enqueue order, before stepping. Tasks
/// enqueued during a drain (including requeues) run on the next tick.
pub struct TaskQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl TaskQueue {
    /// Creates a new empty queue
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Enqueues a task for the next tick; callable from any thread
    pub fn enqueue(&self, task: Task) {
        // The queue owns both ends, so the channel cannot be disconnected
        let _ = self.sender.send(task);
    }

    /// Requeues a task from within a running task; it fires on the next
    /// tick, not the current one
    pub fn requeue(&self, task: Task) {
        self.enqueue(task);
    }

    /// Takes a snapshot of every currently queued task
    pub(crate) fn drain(&self) -> Vec<Task> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of queued tasks
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
