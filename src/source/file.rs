use super::{submit_read, Chunk, Source};
use crate::error::Result;
use crate::pipeline::Notification;
use crate::pool::{Executor, ThreadPool};
use crossbeam::channel::Sender;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Reads byte ranges of a local file, one positioned read per range on a
/// worker pool.
#[derive(Debug, Clone)]
pub struct FileSource {
    file_path: String,
    executor: Arc<dyn Executor>,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>, num_workers: usize) -> Result<Self> {
        let file_path = path.as_ref().to_string_lossy().into_owned();
        // fail at open time rather than on the first read
        File::open(&file_path)?;
        Ok(FileSource {
            file_path,
            executor: Arc::new(ThreadPool::new(num_workers)),
        })
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    fn read_range(path: &str, start: u64, stop: u64) -> Result<Chunk> {
        let mut fd = File::open(path)?;
        fd.seek(SeekFrom::Start(start))?;
        let mut data = vec![0; (stop - start) as usize];
        fd.read_exact(&mut data)?;
        Ok(Chunk { start, stop, data })
    }
}

impl Source for FileSource {
    fn file_path(&self) -> &str {
        &self.file_path
    }

    fn chunks(&self, ranges: &[(u64, u64)], notifications: &Sender<Notification>) {
        trace!(file = %self.file_path, ranges = ranges.len(), "scheduling reads");
        for &(start, stop) in ranges {
            let path = self.file_path.clone();
            submit_read(self.executor.as_ref(), notifications, move || {
                FileSource::read_range(&path, start, stop)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::io::Write;

    #[test]
    fn reads_requested_ranges_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let source = FileSource::open(file.path(), 2).unwrap();

        let (tx, rx) = unbounded();
        source.chunks(&[(2, 5), (7, 10)], &tx);

        let mut chunks: Vec<Chunk> = (0..2)
            .map(|_| match rx.recv().unwrap() {
                Notification::Chunk(chunk) => chunk,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        chunks.sort_by_key(|chunk| chunk.start);
        assert_eq!(chunks[0].data, b"234");
        assert_eq!(chunks[1].data, b"789");
    }

    #[test]
    fn short_read_is_reported_on_the_channel() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let source = FileSource::open(file.path(), 1).unwrap();

        let (tx, rx) = unbounded();
        source.chunks(&[(0, 10)], &tx);
        assert!(matches!(rx.recv().unwrap(), Notification::Failed(_)));
    }
}
