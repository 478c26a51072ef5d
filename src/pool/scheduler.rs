use super::executor::{Executor, Task};
use crossbeam::channel;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

// Minimal thread pool
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<channel::Sender<Task>>,
}

struct Worker {
    thread: Option<thread::JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = channel::unbounded::<Task>();

        let mut workers = Vec::with_capacity(size);

        for _ in 0..size {
            let receiver = receiver.clone();

            let thread = thread::spawn(move || {
                while let Ok(job) = receiver.recv() {
                    // a panicking job must not take its worker down with it
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::warn!("thread pool job panicked");
                    }
                }
            });

            workers.push(Worker {
                thread: Some(thread),
            });
        }

        ThreadPool {
            workers,
            sender: Some(sender),
        }
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let task: Task = Box::new(f);
        let Some(sender) = self.sender.as_ref() else {
            task();
            return;
        };
        // with no worker left to receive it, the caller runs the task itself
        if let Err(channel::SendError(task)) = sender.send(task) {
            tracing::warn!("thread pool has no workers; running task inline");
            task();
        }
    }
}

impl Executor for ThreadPool {
    fn submit(&self, task: Task) {
        self.execute(task);
    }

    fn num_workers(&self) -> usize {
        self.workers.len()
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.sender.take();

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join(); // Ignore panics in worker threads
            }
        }
    }
}
