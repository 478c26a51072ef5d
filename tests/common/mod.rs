#![allow(dead_code)]

use arborist::array::{Array, JaggedArray};
use arborist::basket::Basket;
use arborist::branch::Branch;
use arborist::fixture::TreeWriter;
use arborist::interpretation::{ArrayGroup, Interpretation};
use arborist::pipeline::Notification;
use arborist::source::{MemorySource, Source};
use arborist::{ReaderOptions, Result, Tree};
use crossbeam::channel::Sender;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Decoded (branch name, basket number) pairs, in decode order.
pub type DecodeLog = Arc<Mutex<Vec<(String, usize)>>>;

/// Delegates to another interpretation and records every basket it decodes.
#[derive(Debug)]
pub struct CountingInterpretation {
    inner: Arc<dyn Interpretation>,
    log: DecodeLog,
}

impl CountingInterpretation {
    pub fn new(inner: Arc<dyn Interpretation>, log: DecodeLog) -> Self {
        CountingInterpretation { inner, log }
    }
}

impl Interpretation for CountingInterpretation {
    fn cache_key(&self) -> String {
        self.inner.cache_key()
    }

    fn typename(&self) -> String {
        self.inner.typename()
    }

    fn is_jagged(&self) -> bool {
        self.inner.is_jagged()
    }

    fn basket_array(
        &self,
        data: &[u8],
        byte_offsets: Option<&[u32]>,
        basket: &Basket,
        branch: &Branch,
        key_len: usize,
    ) -> Result<Array> {
        self.log
            .lock()
            .unwrap()
            .push((branch.name().to_string(), basket.basket_num()));
        self.inner
            .basket_array(data, byte_offsets, basket, branch, key_len)
    }

    fn final_array(
        &self,
        fragments: &BTreeMap<usize, Array>,
        entry_start: u64,
        entry_stop: u64,
        entry_offsets: &[u64],
        branch: Option<&Branch>,
    ) -> Result<Array> {
        self.inner
            .final_array(fragments, entry_start, entry_stop, entry_offsets, branch)
    }
}

/// Counts the byte ranges requested from an in-memory source.
#[derive(Debug)]
pub struct CountingSource {
    inner: MemorySource,
    ranges: AtomicUsize,
}

impl CountingSource {
    pub fn new(inner: MemorySource) -> Self {
        CountingSource {
            inner,
            ranges: AtomicUsize::new(0),
        }
    }

    pub fn ranges(&self) -> usize {
        self.ranges.load(Ordering::SeqCst)
    }
}

impl Source for CountingSource {
    fn file_path(&self) -> &str {
        self.inner.file_path()
    }

    fn chunks(&self, ranges: &[(u64, u64)], notifications: &Sender<Notification>) {
        self.ranges.fetch_add(ranges.len(), Ordering::SeqCst);
        self.inner.chunks(ranges, notifications);
    }
}

pub struct Instrumented {
    pub tree: Tree,
    pub decoded: DecodeLog,
    pub source: Arc<CountingSource>,
}

impl Instrumented {
    pub fn decodes(&self) -> usize {
        self.decoded.lock().unwrap().len()
    }

    pub fn decodes_of(&self, branch: &str) -> Vec<usize> {
        self.decoded
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == branch)
            .map(|(_, basket)| *basket)
            .collect()
    }

    pub fn reset(&self) {
        self.decoded.lock().unwrap().clear();
    }
}

/// Opens the writer's tree with every top-level leaf branch decoding through
/// a [`CountingInterpretation`] and the bytes served by a [`CountingSource`].
pub fn instrumented(writer: &TreeWriter, options: &ReaderOptions) -> Instrumented {
    let (mut meta, bytes) = writer.build().unwrap();
    let decoded: DecodeLog = Arc::new(Mutex::new(Vec::new()));
    for branch in &mut meta.branches {
        if branch.interpretation.as_grouped().is_none() {
            branch.interpretation = Arc::new(CountingInterpretation::new(
                Arc::clone(&branch.interpretation),
                Arc::clone(&decoded),
            ));
        }
    }
    let source = Arc::new(CountingSource::new(MemorySource::new("counted.tree", bytes)));
    let tree = Tree::open(meta, Arc::clone(&source) as Arc<dyn Source>, options).unwrap();
    Instrumented {
        tree,
        decoded,
        source,
    }
}

pub fn jagged_f32(entries: &[Vec<f32>]) -> Array {
    let mut offsets = vec![0];
    let mut content = Vec::new();
    for entry in entries {
        content.extend_from_slice(entry);
        offsets.push(content.len());
    }
    Array::Jagged(JaggedArray::new(offsets, Array::Float32(content)).unwrap())
}

/// `num_entries` events with fixed-width, jagged, string and grouped columns.
pub fn events_writer(num_entries: usize, basket_size: u64) -> TreeWriter {
    let jets: Vec<Vec<f32>> = (0..num_entries)
        .map(|i| (0..i % 4).map(|k| i as f32 + k as f32 * 0.25).collect())
        .collect();
    TreeWriter::new("/events")
        .file_path("events.tree")
        .basket_size(basket_size)
        .column("x", Array::Int64((0..num_entries as i64).collect()))
        .column(
            "px",
            Array::Float64((0..num_entries).map(|i| i as f64 * 0.5).collect()),
        )
        .column("flag", Array::Bool((0..num_entries).map(|i| i % 3 == 0).collect()))
        .column("jets", jagged_f32(&jets))
        .column(
            "name",
            Array::Strings((0..num_entries).map(|i| format!("evt{i}")).collect()),
        )
        .grouped(
            "p4",
            vec![
                (
                    "p4.x".to_string(),
                    Array::Float64((0..num_entries).map(|i| i as f64).collect()),
                ),
                (
                    "p4.y".to_string(),
                    Array::Int32((0..num_entries as i32).map(|i| -i).collect()),
                ),
            ],
        )
}

pub fn column<'a>(group: &'a ArrayGroup, name: &str) -> &'a Array {
    group
        .get(name)
        .unwrap_or_else(|| panic!("no column {name} in {:?}", group.columns()))
}
