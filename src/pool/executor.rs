use std::fmt;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget task submission. Results travel back through channels,
/// never through the executor itself.
pub trait Executor: Send + Sync + fmt::Debug {
    fn submit(&self, task: Task);

    fn num_workers(&self) -> usize;
}

/// Runs every task inline on the submitting thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrivialExecutor;

impl Executor for TrivialExecutor {
    fn submit(&self, task: Task) {
        task();
    }

    fn num_workers(&self) -> usize {
        1
    }
}
