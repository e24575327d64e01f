use rand::prelude::random;

use std::{env, ffi, fs, path};

use super::*;
use crate::{bloom::Bloom, kmer::Kmers, registry::Lookup, store::MemStore};

fn test_dir(name: &str) -> path::PathBuf {
    let mut dir = env::temp_dir();
    dir.push(format!("bigsi-test-{}-{:x}", name, random::<u64>()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn bloom_file(
    dir: &path::Path,
    name: &str,
    (m, h): (u64, u64),
    seq: &[u8],
    k: usize,
) -> ffi::OsString {
    let filter = Bloom::from_kmers(m, h, Kmers::new(seq, k)).unwrap();
    let loc = dir.join(format!("{}.bloom", name)).into_os_string();
    filter.to_file(&loc).unwrap();
    loc
}

// every hash position of every inserted kmer must carry the column.
fn assert_contained(store: &MemStore, n: u64, (m, h): (u64, u64), seq: &[u8], k: usize, col: u64) {
    for item in Kmers::new(seq, k) {
        for p in crate::hash::positions(&item, m, h) {
            let row = matrix::read_row(store, n, p).unwrap();
            assert!(
                bits::get(&row, col as usize),
                "row {} column {} for {:?}", p, col, item
            );
        }
    }
}

#[test]
fn test_build_in_memory() {
    let dir = test_dir("build-mem");
    let (m, h) = (64, 2);
    let k = 3;

    let paths = vec![
        bloom_file(&dir, "s0", (m, h), b"ACGT", k),
        bloom_file(&dir, "s1", (m, h), b"TTTTT", k),
    ];
    let samples = vec!["s0".to_string(), "s1".to_string()];

    let mut store = MemStore::new();
    let mut registry = Registry::new();
    let n = build(
        &mut store,
        &mut registry,
        (m, h),
        &paths,
        Some(&samples),
        &BuildParams::new(),
    )
    .unwrap();

    assert_eq!(n, 2);
    assert_eq!(registry.resolve("s0"), Some(0));
    assert_eq!(registry.resolve("s1"), Some(1));
    assert_contained(&store, n, (m, h), b"ACGT", k, 0);
    assert_contained(&store, n, (m, h), b"TTTTT", k, 1);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_build_samples_default_to_paths() {
    let dir = test_dir("build-names");
    let (m, h) = (32, 1);

    let paths = vec![bloom_file(&dir, "s0", (m, h), b"AAAA", 3)];

    let mut store = MemStore::new();
    let mut registry = Registry::new();
    build(&mut store, &mut registry, (m, h), &paths, None, &BuildParams::new()).unwrap();

    let name = paths[0].to_string_lossy().into_owned();
    assert_eq!(registry.resolve(&name), Some(0));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_build_input_validation() {
    let dir = test_dir("build-validate");
    let (m, h) = (32, 2);
    let paths = vec![bloom_file(&dir, "s0", (m, h), b"ACG", 3)];

    let mut store = MemStore::new();
    let mut registry = Registry::new();

    // sample list must match the path list.
    let samples = vec!["a".to_string(), "b".to_string()];
    assert!(build(
        &mut store,
        &mut registry,
        (m, h),
        &paths,
        Some(&samples),
        &BuildParams::new()
    )
    .is_err());

    // bf_range must stay within [0, m).
    let mut params = BuildParams::new();
    params.set_bf_range(8, 40);
    assert!(build(&mut store, &mut registry, (m, h), &paths, None, &params).is_err());

    // a batch cannot repeat a name.
    let paths2 = vec![paths[0].clone(), paths[0].clone()];
    let samples2 = vec!["x".to_string(), "x".to_string()];
    match build(
        &mut store,
        &mut registry,
        (m, h),
        &paths2,
        Some(&samples2),
        &BuildParams::new(),
    ) {
        Err(Error::DuplicateSample(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    // an empty batch is a no-op.
    let n = build(&mut store, &mut registry, (m, h), &[], None, &BuildParams::new()).unwrap();
    assert_eq!(n, 0);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_build_bloom_param_mismatch() {
    let dir = test_dir("build-mismatch");
    let paths = vec![bloom_file(&dir, "s0", (64, 3), b"ACG", 3)];

    let mut store = MemStore::new();
    let mut registry = Registry::new();
    match build(&mut store, &mut registry, (64, 2), &paths, None, &BuildParams::new()) {
        Err(Error::ParameterMismatch(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_build_partition_equivalence() {
    let dir = test_dir("build-partition");
    let (m, h) = (16, 2);
    let k = 3;

    let seqs: Vec<&[u8]> = vec![b"ACGTACGT", b"TTTTTTT", b"GATTACA"];
    let paths: Vec<ffi::OsString> = seqs
        .iter()
        .enumerate()
        .map(|(i, seq)| bloom_file(&dir, &format!("s{}", i), (m, h), seq, k))
        .collect();
    let samples: Vec<String> = (0..3).map(|i| format!("s{}", i)).collect();

    // one full-range build.
    let (mut full_store, mut full_registry) = (MemStore::new(), Registry::new());
    build(
        &mut full_store,
        &mut full_registry,
        (m, h),
        &paths,
        Some(&samples),
        &BuildParams::new(),
    )
    .unwrap();

    // same inputs, one build call per row partition.
    let (mut part_store, mut part_registry) = (MemStore::new(), Registry::new());
    for (i, j) in [(0, m / 2), (m / 2, m)].iter() {
        let mut params = BuildParams::new();
        params.set_bf_range(*i, *j);
        build(
            &mut part_store,
            &mut part_registry,
            (m, h),
            &paths,
            Some(&samples),
            &params,
        )
        .unwrap();
    }

    assert_eq!(full_registry.len(), part_registry.len());
    for r in 0..m {
        assert_eq!(
            matrix::read_row(&full_store, 3, r).unwrap(),
            matrix::read_row(&part_store, 3, r).unwrap(),
            "row {}", r
        );
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_build_streaming_equals_in_memory() {
    let dir = test_dir("build-stream");
    let (m, h) = (48, 2);
    let k = 4;

    let seqs: Vec<Vec<u8>> = (0..9)
        .map(|i| {
            (0..20)
                .map(|t| b"ACGT"[(i * 7 + t * 3) % 4])
                .collect::<Vec<u8>>()
        })
        .collect();
    let paths: Vec<ffi::OsString> = seqs
        .iter()
        .enumerate()
        .map(|(i, seq)| bloom_file(&dir, &format!("s{}", i), (m, h), seq, k))
        .collect();
    let samples: Vec<String> = (0..9).map(|i| format!("s{}", i)).collect();

    let (mut mem_store, mut mem_registry) = (MemStore::new(), Registry::new());
    build(
        &mut mem_store,
        &mut mem_registry,
        (m, h),
        &paths,
        Some(&samples),
        &BuildParams::new(),
    )
    .unwrap();

    // cap the buffer to m bytes, one column stripe at a time: the cap
    // allows floor(48/48)*8 = 8 columns per stripe, forcing two passes.
    let (mut low_store, mut low_registry) = (MemStore::new(), Registry::new());
    let mut params = BuildParams::new();
    params.set_max_memory(m).set_lowmem(true);
    build(
        &mut low_store,
        &mut low_registry,
        (m, h),
        &paths,
        Some(&samples),
        &params,
    )
    .unwrap();

    for r in 0..m {
        assert_eq!(
            matrix::read_row(&mem_store, 9, r).unwrap(),
            matrix::read_row(&low_store, 9, r).unwrap(),
            "row {}", r
        );
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_build_resource_exceeded() {
    let dir = test_dir("build-resource");
    let (m, h) = (64, 1);
    let paths = vec![bloom_file(&dir, "s0", (m, h), b"ACGT", 3)];

    let mut store = MemStore::new();
    let mut registry = Registry::new();
    // 7 bytes cannot hold one column of 64 rows.
    let mut params = BuildParams::new();
    params.set_max_memory(7);
    match build(&mut store, &mut registry, (m, h), &paths, None, &params) {
        Err(Error::ResourceExceeded(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_build_cancelled() {
    let dir = test_dir("build-cancel");
    let (m, h) = (32, 1);
    let paths = vec![bloom_file(&dir, "s0", (m, h), b"ACGT", 3)];

    let mut store = MemStore::new();
    let mut registry = Registry::new();
    let cancel = Cancel::new();
    cancel.cancel();
    let mut params = BuildParams::new();
    params.set_cancel(cancel);
    match build(&mut store, &mut registry, (m, h), &paths, None, &params) {
        Err(Error::Cancelled(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }
    // nothing was registered.
    assert_eq!(registry.len(), 0);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_insert_bloom_partitions() {
    let dir = test_dir("insert-bloom");
    let (m, h) = (32, 2);
    let k = 3;
    let loc = bloom_file(&dir, "s0", (m, h), b"ACGTACG", k);

    let mut store = MemStore::new();
    let mut registry = Registry::new();

    // first partition registers the sample.
    let col = insert_bloom(&mut store, &mut registry, (m, h), &loc, "s0", Some((0, 16)))
        .unwrap();
    assert_eq!(col, 0);
    assert_eq!(registry.lookup(0), Lookup::Name("s0".to_string()));

    // second partition completes the rows under the same column.
    let col = insert_bloom(&mut store, &mut registry, (m, h), &loc, "s0", Some((16, 32)))
        .unwrap();
    assert_eq!(col, 0);
    assert_eq!(registry.len(), 1);

    assert_contained(&store, 1, (m, h), b"ACGTACG", k, 0);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_merge_rows_and_registry() {
    let dir = test_dir("merge");
    let (m, h) = (32, 2);
    let k = 3;

    let (mut store_a, mut registry_a) = (MemStore::new(), Registry::new());
    let paths = vec![
        bloom_file(&dir, "a0", (m, h), b"AAAA", k),
        bloom_file(&dir, "a1", (m, h), b"CCCC", k),
    ];
    let samples = vec!["a0".to_string(), "a1".to_string()];
    build(&mut store_a, &mut registry_a, (m, h), &paths, Some(&samples), &BuildParams::new())
        .unwrap();
    registry_a.tombstone("a1").unwrap();

    let (mut store_b, mut registry_b) = (MemStore::new(), Registry::new());
    let paths = vec![bloom_file(&dir, "b0", (m, h), b"GGGG", k)];
    let samples = vec!["b0".to_string()];
    build(&mut store_b, &mut registry_b, (m, h), &paths, Some(&samples), &BuildParams::new())
        .unwrap();

    let (mut acc_store, mut acc_registry) = (store_a.clone(), registry_a.clone());
    let n = merge(&mut acc_store, &mut acc_registry, &store_b, &registry_b, m).unwrap();
    assert_eq!(n, 3);

    // donor tombstones would also ride along; here the donor is live
    // and lands at the next column.
    assert_eq!(acc_registry.resolve("b0"), Some(2));
    assert_eq!(acc_registry.lookup(1), Lookup::Tombstoned);

    // acceptor rows keep their bits, donor bits shift by n_a.
    assert_contained(&acc_store, n, (m, h), b"AAAA", k, 0);
    assert_contained(&acc_store, n, (m, h), b"GGGG", k, 2);

    // a name clash refuses the merge up front.
    let mut clash_registry = Registry::new();
    clash_registry.add("b0").unwrap();
    let mut clash_store = MemStore::new();
    match merge(&mut clash_store, &mut clash_registry, &store_b, &registry_b, m) {
        Err(Error::DuplicateSample(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_merge_associative() {
    let dir = test_dir("merge-assoc");
    let (m, h) = (24, 2);
    let k = 3;

    let mut stores = vec![];
    for (i, seq) in [b"AAAAA" as &[u8], b"CCCCC", b"GGGGG"].iter().enumerate() {
        let (mut store, mut registry) = (MemStore::new(), Registry::new());
        let paths = vec![bloom_file(&dir, &format!("m{}", i), (m, h), seq, k)];
        let samples = vec![format!("m{}", i)];
        build(&mut store, &mut registry, (m, h), &paths, Some(&samples), &BuildParams::new())
            .unwrap();
        stores.push((store, registry));
    }

    // ((a . b) . c)
    let (mut left_store, mut left_registry) = (stores[0].0.clone(), stores[0].1.clone());
    merge(&mut left_store, &mut left_registry, &stores[1].0, &stores[1].1, m).unwrap();
    merge(&mut left_store, &mut left_registry, &stores[2].0, &stores[2].1, m).unwrap();

    // (a . (b . c))
    let (mut bc_store, mut bc_registry) = (stores[1].0.clone(), stores[1].1.clone());
    merge(&mut bc_store, &mut bc_registry, &stores[2].0, &stores[2].1, m).unwrap();
    let (mut right_store, mut right_registry) = (stores[0].0.clone(), stores[0].1.clone());
    merge(&mut right_store, &mut right_registry, &bc_store, &bc_registry, m).unwrap();

    // column order a, b, c either way here, matrices agree row by row.
    assert_eq!(left_registry.len(), right_registry.len());
    for r in 0..m {
        assert_eq!(
            matrix::read_row(&left_store, 3, r).unwrap(),
            matrix::read_row(&right_store, 3, r).unwrap(),
            "row {}", r
        );
    }

    fs::remove_dir_all(&dir).ok();
}
