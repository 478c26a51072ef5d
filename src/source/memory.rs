use super::{submit_read, Chunk, Source};
use crate::error::ReadError;
use crate::pipeline::Notification;
use crate::pool::{Executor, TrivialExecutor};
use crossbeam::channel::Sender;
use std::io;
use std::sync::Arc;

/// A source backed by a byte buffer that is already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    file_path: String,
    bytes: Arc<Vec<u8>>,
    executor: Arc<dyn Executor>,
}

impl MemorySource {
    pub fn new(file_path: impl Into<String>, bytes: Vec<u8>) -> Self {
        MemorySource {
            file_path: file_path.into(),
            bytes: Arc::new(bytes),
            executor: Arc::new(TrivialExecutor),
        }
    }

    /// Serves each range from a task on `executor` instead of inline.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Source for MemorySource {
    fn file_path(&self) -> &str {
        &self.file_path
    }

    fn chunks(&self, ranges: &[(u64, u64)], notifications: &Sender<Notification>) {
        for &(start, stop) in ranges {
            let bytes = Arc::clone(&self.bytes);
            let file_path = self.file_path.clone();
            submit_read(self.executor.as_ref(), notifications, move || {
                match bytes.get(start as usize..stop as usize) {
                    Some(data) => Ok(Chunk {
                        start,
                        stop,
                        data: data.to_vec(),
                    }),
                    None => Err(ReadError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "range {start}..{stop} is outside the {} bytes of {file_path}",
                            bytes.len()
                        ),
                    ))),
                }
            });
        }
    }
}
