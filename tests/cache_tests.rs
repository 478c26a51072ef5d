mod common;

use arborist::array::Array;
use arborist::cache::{ArrayCache, LruArrayCache};
use arborist::{ArraysRequest, CacheSetting, ReaderOptions};
use common::{column, events_writer, init_tracing, instrumented};
use std::sync::Arc;

#[test]
fn second_read_is_served_from_cache() {
    init_tracing();
    let counted = instrumented(&events_writer(80, 15), &ReaderOptions::new());
    let request = ArraysRequest::new()
        .expressions(["x", "jets", "name", "p4"])
        .entry_start(10)
        .entry_stop(70);

    let first = counted.tree.arrays(&request).unwrap();
    assert!(counted.decodes() > 0);
    let ranges = counted.source.ranges();

    counted.reset();
    let second = counted.tree.arrays(&request).unwrap();
    assert_eq!(first, second);
    assert_eq!(counted.decodes(), 0);
    assert_eq!(counted.source.ranges(), ranges);
}

#[test]
fn cache_keys_include_the_entry_window() {
    let counted = instrumented(&events_writer(80, 15), &ReaderOptions::new());
    let request = ArraysRequest::new().expression("x");

    counted.tree.arrays(&request.clone().entry_stop(40)).unwrap();
    counted.reset();
    counted.tree.arrays(&request.entry_stop(41)).unwrap();
    let mut decoded = counted.decodes_of("x");
    decoded.sort_unstable();
    assert_eq!(decoded, vec![0, 1, 2]);
}

#[test]
fn disabled_caches_always_decode() {
    let options = ReaderOptions::new().array_cache(CacheSetting::Disabled);
    let counted = instrumented(&events_writer(30, 10), &options);
    assert!(counted.tree.array_cache().is_none());

    let request = ArraysRequest::new().expression("px");
    counted.tree.arrays(&request).unwrap();
    counted.tree.arrays(&request).unwrap();
    assert_eq!(counted.decodes(), 6);

    let cached = instrumented(&events_writer(30, 10), &ReaderOptions::new());
    let request = ArraysRequest::new().expression("px").no_cache();
    cached.tree.arrays(&request).unwrap();
    cached.tree.arrays(&request).unwrap();
    assert_eq!(cached.decodes(), 6);
}

#[test]
fn alias_dependencies_are_not_cached() {
    let writer = events_writer(30, 10).alias("y", "x * 2");
    let counted = instrumented(&writer, &ReaderOptions::new());

    let group = counted
        .tree
        .arrays(&ArraysRequest::new().expression("y"))
        .unwrap();
    assert_eq!(column(&group, "y"), &Array::Int64((0..30).map(|x| x * 2).collect()));
    assert_eq!(counted.decodes_of("x").len(), 3);

    counted.reset();
    counted
        .tree
        .arrays(&ArraysRequest::new().expression("x"))
        .unwrap();
    assert_eq!(counted.decodes_of("x").len(), 3);

    counted.reset();
    counted
        .tree
        .arrays(&ArraysRequest::new().expression("x"))
        .unwrap();
    assert_eq!(counted.decodes(), 0);
}

#[test]
fn shared_cache_keeps_trees_apart() {
    let cache = Arc::new(LruArrayCache::new(1 << 20));
    let options =
        ReaderOptions::new().array_cache(CacheSetting::Shared(Arc::clone(&cache) as Arc<dyn ArrayCache>));
    let writer = events_writer(20, 10);
    let first = instrumented(&writer, &options);
    let second = instrumented(&writer, &options);
    assert_ne!(first.tree.cache_key(), second.tree.cache_key());

    let request = ArraysRequest::new().expressions(["x", "px"]);
    first.tree.arrays(&request).unwrap();
    assert_eq!(cache.len(), 2);

    second.tree.arrays(&request).unwrap();
    assert_eq!(cache.len(), 4);
    assert_eq!(second.decodes(), 4);
}

#[test]
fn byte_limit_evicts_least_recently_used_branch() {
    // each of x and px holds 40 eight-byte values
    let options = ReaderOptions::new().array_cache(CacheSetting::Limit(400));
    let counted = instrumented(&events_writer(40, 20), &options);
    let x = ArraysRequest::new().expression("x");
    let px = ArraysRequest::new().expression("px");

    counted.tree.arrays(&x).unwrap();
    counted.tree.arrays(&px).unwrap();
    counted.reset();

    counted.tree.arrays(&px).unwrap();
    assert_eq!(counted.decodes(), 0);

    counted.tree.arrays(&x).unwrap();
    assert_eq!(counted.decodes_of("x"), vec![0, 1]);
}

#[test]
fn oversized_results_are_not_cached() {
    let options = ReaderOptions::new().array_cache(CacheSetting::MemorySize("100 B".to_string()));
    let counted = instrumented(&events_writer(40, 20), &options);
    let request = ArraysRequest::new().expression("x");
    counted.tree.arrays(&request).unwrap();
    counted.tree.arrays(&request).unwrap();
    assert_eq!(counted.decodes(), 4);
}
