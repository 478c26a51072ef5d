pub mod file;
pub mod memory;

pub use file::FileSource;
pub use memory::MemorySource;

use crate::error::{ReadError, Result};
use crate::pipeline::Notification;
use crate::pool::Executor;
use crossbeam::channel::Sender;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Raw bytes of one basket as read from a source, key prefix included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub start: u64,
    pub stop: u64,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }
}

/// Bulk byte-range reader behind a tree.
///
/// `chunks` only schedules the reads. Every completed range is pushed onto
/// `notifications` as [`Notification::Chunk`], in any order; a failed read is
/// pushed as [`Notification::Failed`]. Nothing is returned directly.
pub trait Source: Send + Sync + fmt::Debug {
    fn file_path(&self) -> &str;

    fn chunks(&self, ranges: &[(u64, u64)], notifications: &Sender<Notification>);
}

/// Runs one range read on `executor` and reports its outcome, a panic included.
pub(crate) fn submit_read<F>(executor: &dyn Executor, notifications: &Sender<Notification>, read: F)
where
    F: FnOnce() -> Result<Chunk> + Send + 'static,
{
    let notifications = notifications.clone();
    executor.submit(Box::new(move || {
        let notification = match catch_unwind(AssertUnwindSafe(read)) {
            Ok(Ok(chunk)) => Notification::Chunk(chunk),
            Ok(Err(err)) => Notification::Failed(err),
            Err(panic) => Notification::Failed(ReadError::from_panic("read", panic)),
        };
        // the consumer may have already given up on this call
        let _ = notifications.send(notification);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ThreadPool;
    use crossbeam::channel::unbounded;

    #[test]
    fn panicking_read_becomes_a_failure() {
        let pool = ThreadPool::new(1);
        let (tx, rx) = unbounded();
        submit_read(&pool, &tx, || panic!("disk on fire"));
        submit_read(&pool, &tx, || {
            Ok(Chunk {
                start: 0,
                stop: 1,
                data: vec![7],
            })
        });

        match rx.recv().unwrap() {
            Notification::Failed(ReadError::TaskPanicked { stage, message }) => {
                assert_eq!(stage, "read");
                assert_eq!(message, "disk on fire");
            }
            other => panic!("expected a panic failure, got {other:?}"),
        }
        // the worker survives and serves the next read
        assert!(matches!(rx.recv().unwrap(), Notification::Chunk(chunk) if chunk.data == [7]));
    }
}
