//! Dispatch Tick - post-dispatch task queue
//!
//! A tick spans one outermost [`Tick::batch`]. Work registered with
//! [`Tick::defer`] runs once that batch returns, after every synchronous
//! listener of the batch has run.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

type Deferred = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TickState {
    depth: usize,
    queue: Vec<Deferred>,
}

/// Shared dispatch tick. A change source creates one and every registry fed
/// by it (directly or through parents) uses the same handle.
#[derive(Default)]
pub struct Tick {
    state: Mutex<TickState>,
}

/// Leaves the batch on drop, so a panicking listener still closes it
struct BatchGuard<'a> {
    tick: &'a Tick,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.tick.leave();
    }
}

impl Tick {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run `f` inside a batch. Nested batches join the outer one.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.state.lock().depth += 1;
        let _guard = BatchGuard { tick: self };
        f()
    }

    /// Queue `task` for the end of the current tick. Outside a batch the task
    /// waits for the next batch to end, or for an explicit [`Tick::flush`].
    pub fn defer(&self, task: impl FnOnce() + Send + 'static) {
        self.state.lock().queue.push(Box::new(task));
    }

    /// Whether a batch is running
    pub fn in_batch(&self) -> bool {
        self.state.lock().depth > 0
    }

    /// Number of queued tasks
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Run queued tasks until the queue stays empty
    pub fn flush(&self) {
        loop {
            let tasks = std::mem::take(&mut self.state.lock().queue);
            if tasks.is_empty() {
                break;
            }
            trace!(tasks = tasks.len(), "Flushing deferred tasks");
            for task in tasks {
                task();
            }
        }
    }

    fn leave(&self) {
        let outermost = {
            let mut state = self.state.lock();
            state.depth = state.depth.saturating_sub(1);
            state.depth == 0
        };
        if outermost {
            self.flush();
        }
    }
}

impl std::fmt::Debug for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Tick")
            .field("depth", &state.depth)
            .field("pending", &state.queue.len())
            .finish()
    }
}
