use arborist::array::Array;
use arborist::entry_range::entries_to_ranges_or_baskets;
use arborist::fixture::TreeWriter;
use arborist::pipeline::{BranchRequest, ChunkPipeline};
use arborist::pool::TrivialExecutor;
use arborist::source::MemorySource;
use arborist::ReaderOptions;
use std::sync::Arc;

fn run_x(retain_after: Option<u64>, entry_start: u64, entry_stop: u64) -> (Array, Vec<usize>) {
    let writer = TreeWriter::new("/t")
        .basket_size(10)
        .column("x", Array::Int64((0..100).collect()));
    let (_, bytes) = writer.build().unwrap();
    let tree = writer.open(&ReaderOptions::new()).unwrap();
    let source = MemorySource::new("t.tree", bytes);

    let branch = tree.branch("x").unwrap();
    let request = BranchRequest {
        branch: Arc::clone(branch),
        interpretation: Arc::clone(branch.interpretation()),
        selectors: entries_to_ranges_or_baskets(branch, entry_start, entry_stop).unwrap(),
    };
    let pipeline = ChunkPipeline::new(&source, Arc::new(TrivialExecutor), Arc::new(TrivialExecutor));
    let mut output = pipeline
        .run(vec![request], entry_start, entry_stop, retain_after)
        .unwrap();

    let mut kept: Vec<usize> = output.baskets.iter().map(|b| b.basket_num()).collect();
    kept.sort_unstable();
    let array = output.arrays.remove(branch.cache_key()).unwrap();
    (array, kept)
}

#[test]
fn full_window_keeps_no_baskets() {
    let (array, kept) = run_x(None, 0, 100);
    assert_eq!(array, Array::Int64((0..100).collect()));
    assert!(kept.is_empty());
}

#[test]
fn only_baskets_past_the_window_are_kept() {
    let (array, kept) = run_x(Some(25), 0, 25);
    assert_eq!(array, Array::Int64((0..25).collect()));
    assert_eq!(kept, vec![2]);

    let (_, kept) = run_x(Some(30), 0, 30);
    // basket 3 starts at the stop and is selected, but holds nothing for this window
    assert_eq!(kept, vec![3]);
}
