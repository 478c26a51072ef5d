mod common;

use arborist::array::Array;
use arborist::entry_range::entries_to_ranges_or_baskets;
use arborist::fixture::TreeWriter;
use arborist::{ArraysRequest, Columns, How, ReadError, ReaderOptions};
use common::{column, events_writer, init_tracing, instrumented, jagged_f32};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const COLUMNS: [&str; 6] = ["x", "px", "jets", "name", "p4", "px * 2 + x"];

#[test]
fn direct_window_matches_slice_of_full_read() {
    init_tracing();
    let tree = events_writer(137, 20)
        .embedded_baskets(1)
        .open(&ReaderOptions::new())
        .unwrap();
    let full = tree
        .arrays(&ArraysRequest::new().expressions(COLUMNS).no_cache())
        .unwrap();
    assert_eq!(full.num_entries(), 137);

    let mut rng = StdRng::seed_from_u64(0x7EE5);
    for _ in 0..25 {
        let a = rng.gen_range(0..=137usize);
        let b = rng.gen_range(a..=137usize);
        let direct = tree
            .arrays(
                &ArraysRequest::new()
                    .expressions(COLUMNS)
                    .entry_start(a as i64)
                    .entry_stop(b as i64)
                    .no_cache(),
            )
            .unwrap();
        assert_eq!(direct.entry_start(), a as u64);
        for name in COLUMNS {
            assert_eq!(
                column(&direct, name),
                &column(&full, name).slice(a, b),
                "{name} over {a}..{b}"
            );
        }
    }
}

#[test]
fn negative_and_oversized_bounds_regularize() {
    let tree = events_writer(137, 20).open(&ReaderOptions::new()).unwrap();
    let read = |request: ArraysRequest| tree.arrays(&request.expression("x")).unwrap();

    let tail = read(ArraysRequest::new().entry_start(-10));
    assert_eq!(column(&tail, "x"), &Array::Int64((127..137).collect()));
    assert_eq!(tail.entry_start(), 127);

    let clamped = read(ArraysRequest::new().entry_start(-1000).entry_stop(1000));
    assert_eq!(clamped.num_entries(), 137);

    let inverted = read(ArraysRequest::new().entry_start(50).entry_stop(20));
    assert_eq!(column(&inverted, "x"), &Array::Int64(vec![]));

    let before_start = read(ArraysRequest::new().entry_stop(-200));
    assert_eq!(before_start.num_entries(), 0);
}

#[test]
fn window_selects_overlapping_baskets_only() {
    let writer = TreeWriter::new("/events")
        .entry_boundaries(vec![0, 100, 250, 400, 520])
        .column("x", Array::Int64((0..520).collect()));
    let counted = instrumented(&writer, &ReaderOptions::new());

    let branch = counted.tree.branch("x").unwrap();
    let selected: Vec<usize> = entries_to_ranges_or_baskets(branch, 90, 260)
        .unwrap()
        .into_iter()
        .map(|(basket_num, _)| basket_num)
        .collect();
    assert_eq!(selected, vec![0, 1, 2]);

    let group = counted
        .tree
        .arrays(
            &ArraysRequest::new()
                .expression("x")
                .entry_start(90)
                .entry_stop(260),
        )
        .unwrap();
    assert_eq!(column(&group, "x"), &Array::Int64((90..260).collect()));
    let mut decoded = counted.decodes_of("x");
    decoded.sort_unstable();
    assert_eq!(decoded, vec![0, 1, 2]);
    assert_eq!(counted.source.ranges(), 3);
}

#[test]
fn alias_shares_decoded_branch() {
    let writer = events_writer(60, 25).alias("y", "x + 1");
    let counted = instrumented(&writer, &ReaderOptions::new());

    let group = counted
        .tree
        .arrays(&ArraysRequest::new().expressions(["x", "y"]))
        .unwrap();
    assert_eq!(column(&group, "x"), &Array::Int64((0..60).collect()));
    assert_eq!(column(&group, "y"), &Array::Int64((1..61).collect()));

    let mut decoded = counted.decodes_of("x");
    decoded.sort_unstable();
    assert_eq!(decoded, vec![0, 1, 2]);
    assert_eq!(counted.decodes(), 3);
}

#[test]
fn request_aliases_shadow_tree_aliases() {
    let tree = events_writer(10, 4)
        .alias("y", "x + 1")
        .open(&ReaderOptions::new())
        .unwrap();
    let group = tree
        .arrays(&ArraysRequest::new().expression("y").alias("y", "x * 10"))
        .unwrap();
    assert_eq!(
        column(&group, "y"),
        &Array::Int64((0..10).map(|x| x * 10).collect())
    );
}

#[test]
fn grouped_branch_becomes_one_record() {
    let tree = events_writer(30, 8).open(&ReaderOptions::new()).unwrap();
    let group = tree.arrays(&ArraysRequest::new().expression("p4")).unwrap();

    assert_eq!(group.width(), 1);
    assert!(group.get("p4.x").is_none());
    let record = column(&group, "p4").as_record().unwrap();
    let names: Vec<&str> = record.fields().iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["x", "y"]);
    assert_eq!(
        record.field("x"),
        Some(&Array::Float64((0..30i32).map(f64::from).collect()))
    );
    assert_eq!(
        record.field("y"),
        Some(&Array::Int32((0..30i32).map(|i| -i).collect()))
    );
}

#[test]
fn jagged_entries_survive_basket_boundaries() {
    let tree = events_writer(100, 20)
        .header_bytes(2)
        .open(&ReaderOptions::new())
        .unwrap();
    let group = tree
        .arrays(
            &ArraysRequest::new()
                .expression("jets")
                .entry_start(15)
                .entry_stop(45),
        )
        .unwrap();
    let jets = column(&group, "jets").as_jagged().unwrap();
    assert_eq!(jets.len(), 30);
    for (row, entry) in (15..45).enumerate() {
        let expected: Vec<f32> = (0..entry % 4)
            .map(|k| entry as f32 + k as f32 * 0.25)
            .collect();
        assert_eq!(jets.entry(row), Array::Float32(expected), "entry {entry}");
    }
}

#[test]
fn embedded_baskets_are_read_without_fetching() {
    let writer = events_writer(50, 20).embedded_baskets(1);
    let counted = instrumented(&writer, &ReaderOptions::new());
    let group = counted
        .tree
        .arrays(
            &ArraysRequest::new()
                .expression("name")
                .entry_start(42),
        )
        .unwrap();
    assert_eq!(
        column(&group, "name"),
        &Array::Strings((42..50).map(|i| format!("evt{i}")).collect())
    );
    assert_eq!(counted.source.ranges(), 0);
    assert_eq!(counted.decodes_of("name"), vec![2]);
}

#[test]
fn cut_filters_outputs_without_being_emitted() {
    let tree = events_writer(40, 16).open(&ReaderOptions::new()).unwrap();

    let group = tree
        .arrays(&ArraysRequest::new().expressions(["x", "jets"]).cut("flag"))
        .unwrap();
    assert_eq!(group.width(), 2);
    assert!(group.get("flag").is_none());
    assert_eq!(
        column(&group, "x"),
        &Array::Int64((0..40).filter(|i| i % 3 == 0).collect())
    );
    assert_eq!(column(&group, "jets").len(), 14);

    let computed = tree
        .arrays(&ArraysRequest::new().expression("px").cut("x >= 35"))
        .unwrap();
    assert_eq!(
        column(&computed, "px"),
        &Array::Float64((35..40i32).map(|i| f64::from(i) * 0.5).collect())
    );
}

#[test]
fn item_cut_filters_matching_lists() {
    let tree = events_writer(12, 5).open(&ReaderOptions::new()).unwrap();

    let group = tree
        .arrays(&ArraysRequest::new().expression("jets").cut("jets > 5"))
        .unwrap();
    let expected: Vec<Vec<f32>> = (0..12)
        .map(|i| {
            (0..i % 4)
                .map(|k| i as f32 + k as f32 * 0.25)
                .filter(|value| *value > 5.0)
                .collect()
        })
        .collect();
    assert_eq!(column(&group, "jets"), &jagged_f32(&expected));

    // one value per entry has no items to line the cut up with
    match tree.arrays(&ArraysRequest::new().expressions(["jets", "x"]).cut("jets > 5")) {
        Err(ReadError::Expression { expression, reason }) => {
            assert_eq!(expression, "jets > 5");
            assert!(reason.ends_with("of x"), "{reason}");
        }
        other => panic!("expected an expression error, got {other:?}"),
    }
}

#[test]
fn alias_to_name_that_is_not_an_identifier() {
    let tree = TreeWriter::new("/t")
        .column("a/b", Array::Int32(vec![1, 2, 3]))
        .alias("ab", "a/b")
        .open(&ReaderOptions::new())
        .unwrap();

    let group = tree.arrays(&ArraysRequest::new().expression("ab")).unwrap();
    assert_eq!(column(&group, "ab"), &Array::Int32(vec![1, 2, 3]));
}

#[test]
fn unknown_names_suggest_closest() {
    let tree = events_writer(10, 5).open(&ReaderOptions::new()).unwrap();

    match tree.arrays(&ArraysRequest::new().expression("pxx")) {
        Err(ReadError::MissingName {
            name, suggestions, ..
        }) => {
            assert_eq!(name, "pxx");
            assert_eq!(suggestions[0], "px");
        }
        other => panic!("expected a missing name, got {other:?}"),
    }

    match tree.branch("nam") {
        Err(ReadError::MissingName { suggestions, .. }) => assert_eq!(suggestions[0], "name"),
        other => panic!("expected a missing name, got {other:?}"),
    }
}

#[test]
fn output_shapes() {
    let tree = events_writer(12, 5).open(&ReaderOptions::new()).unwrap();
    let request = ArraysRequest::new().expressions(["x", "px"]);

    match tree.arrays(&request.clone().how(How::Tuple)).unwrap().into_columns() {
        Columns::Tuple(arrays) => {
            assert_eq!(arrays.len(), 2);
            assert_eq!(arrays[0], Array::Int64((0..12).collect()));
        }
        other => panic!("expected a tuple, got {other:?}"),
    }

    match tree.arrays(&request.clone().how(How::List)).unwrap().into_columns() {
        Columns::List(arrays) => assert_eq!(arrays.len(), 2),
        other => panic!("expected a list, got {other:?}"),
    }

    let record = tree.arrays(&request.how(How::Record)).unwrap();
    assert_eq!(record.width(), 2);
    assert_eq!(
        record.get("px"),
        Some(&Array::Float64((0..12i32).map(|i| f64::from(i) * 0.5).collect()))
    );
}

#[test]
fn renamed_expressions_and_getters() {
    use arborist::pipeline::ExpressionSpec;

    let tree = TreeWriter::new("/t")
        .column("a/b", Array::Int32(vec![1, 2, 3]))
        .open(&ReaderOptions::new())
        .unwrap();
    let group = tree
        .arrays(
            &ArraysRequest::new()
                .expression(ExpressionSpec::new("get('a/b') * 2").rename("doubled"))
                .expression("a/b"),
        )
        .unwrap();
    assert_eq!(column(&group, "doubled"), &Array::Int64(vec![2, 4, 6]));
    assert_eq!(column(&group, "a/b"), &Array::Int32(vec![1, 2, 3]));
}

#[test]
fn all_branches_respect_filter_and_skip_opaque() {
    let tree = events_writer(10, 5)
        .opaque("blob", "TObjArray", Array::Int32((0..10).collect()))
        .open(&ReaderOptions::new())
        .unwrap();

    let names = |request: ArraysRequest| -> Vec<String> {
        match tree.arrays(&request).unwrap().into_columns() {
            Columns::Dict(pairs) => pairs.into_iter().map(|(name, _)| name).collect(),
            other => panic!("expected a dict, got {other:?}"),
        }
    };

    assert_eq!(
        names(ArraysRequest::new()),
        ["x", "px", "flag", "jets", "name", "p4.x", "p4.y"]
    );
    assert_eq!(names(ArraysRequest::new().filter_name("p*")), ["px", "p4.x", "p4.y"]);
    assert_eq!(names(ArraysRequest::new().filter_name("/^(x|PX)$/i")), ["x", "px"]);
    assert!(tree
        .arrays(&ArraysRequest::new().filter_name("/(unclosed/"))
        .is_err());
}

#[test]
fn branch_array_evaluates_one_expression() {
    let tree = events_writer(10, 3).open(&ReaderOptions::new()).unwrap();
    let doubled = tree.branch_array("px * 2", Some(0), Some(4)).unwrap();
    assert_eq!(doubled, Array::Float64(vec![0.0, 1.0, 2.0, 3.0]));
    let flags = tree.branch_array("flag", Some(-3), None).unwrap();
    assert_eq!(flags, Array::Bool(vec![false, false, true]));
}

#[test]
fn file_source_with_worker_pools_matches_memory() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let writer = events_writer(90, 11).embedded_baskets(2);
    let options = ReaderOptions::new()
        .decompression_workers(3)
        .interpretation_workers(2);

    let on_disk = writer
        .write_to(dir.path().join("events.tree"), 2, &options)
        .unwrap();
    let in_memory = writer.open(&ReaderOptions::new()).unwrap();

    let request = ArraysRequest::new()
        .expressions(COLUMNS)
        .entry_start(7)
        .entry_stop(83);
    let a = on_disk.arrays(&request).unwrap();
    let b = in_memory.arrays(&request).unwrap();
    assert_eq!(a.columns(), b.columns());
    assert!(on_disk.file_path().ends_with("events.tree"));
}

#[test]
fn keys_list_nested_branches_depth_first() {
    let tree = events_writer(4, 2).open(&ReaderOptions::new()).unwrap();
    assert_eq!(
        tree.keys(),
        ["x", "px", "flag", "jets", "name", "p4", "p4.x", "p4.y"]
    );
    assert_eq!(tree.branch("p4.x").unwrap().object_path(), "/events/p4/p4.x");
}

#[test]
fn common_offsets_cover_shared_boundaries() {
    let tree = events_writer(45, 20)
        .embedded_baskets(1)
        .open(&ReaderOptions::new())
        .unwrap();
    let offsets = tree
        .common_entry_offsets(&ArraysRequest::new().expressions(["x", "jets"]))
        .unwrap();
    assert_eq!(offsets, vec![0, 20, 40, 45]);
}
