//! Module `build` implement the pipeline turning bloom filter files
//! into bitsliced matrix rows.
//!
//! The pipeline absorbs a batch of `B` filters into a working buffer of
//! `(j - i) x B` bits, one row per output bit position and one column
//! per input sample, then folds the buffer into the stored rows. Under a
//! `max_memory` cap, or the `lowmem` hint, the columns are processed in
//! stripes so the buffer never exceeds the cap; stripes OR into stored
//! rows, which makes re-running an interrupted call idempotent.
//!
//! The registry is updated strictly after the row writes, and the whole
//! call becomes durable at the facade's single commit. An interrupted
//! call leaves the persisted index as it was; re-running the same
//! partition converges on the same final state.

use log::{debug, info};

use std::{cmp, collections::HashSet, convert::TryFrom, ffi};

use crate::{
    bloom::Bloom,
    matrix,
    registry::Registry,
    store::RowStore,
    util::{bits, Cancel},
    Error, Result,
};

/// Stripe width, in columns, for `lowmem` builds running without an
/// explicit memory cap.
pub const LOWMEM_STRIPE_COLS: usize = 1024;

// row batch size for merge writes.
const MERGE_BATCH: usize = 4096;

/// Parameters for [Bigsi::build][crate::Bigsi::build].
#[derive(Clone, Default)]
pub struct BuildParams {
    /// Hard cap, in bytes, on the build's working buffer. Forces the
    /// streaming variant when the full buffer would not fit.
    pub max_memory: Option<u64>,
    /// Prefer the streaming variant regardless of cap.
    pub lowmem: bool,
    /// Row interval `[i, j)` to build, defaults to the whole of
    /// `[0, m)`. Partitions are independent, one call per partition.
    pub bf_range: Option<(u64, u64)>,
    /// Cooperative cancellation, checked between stripes.
    pub cancel: Option<Cancel>,
}

impl BuildParams {
    pub fn new() -> BuildParams {
        BuildParams::default()
    }

    pub fn set_max_memory(&mut self, max_memory: u64) -> &mut Self {
        self.max_memory = Some(max_memory);
        self
    }

    pub fn set_lowmem(&mut self, lowmem: bool) -> &mut Self {
        self.lowmem = lowmem;
        self
    }

    pub fn set_bf_range(&mut self, i: u64, j: u64) -> &mut Self {
        self.bf_range = Some((i, j));
        self
    }

    pub fn set_cancel(&mut self, cancel: Cancel) -> &mut Self {
        self.cancel = Some(cancel);
        self
    }
}

// validate a half-open row interval against the filter width.
fn to_bf_range(bf_range: Option<(u64, u64)>, m: u64) -> Result<(u64, u64)> {
    let (i, j) = bf_range.unwrap_or((0, m));
    if i < j && j <= m {
        Ok((i, j))
    } else {
        err_at!(InvalidInput, msg: "bf_range [{}, {}) not within [0, {})", i, j, m)
    }
}

// Column offset for this batch of names. Either every name is new, a
// fresh batch starting at `n`, or every name is already registered at a
// consecutive run of columns, a continuation of the same batch over
// another bf_range partition.
fn to_columns(registry: &Registry, names: &[String]) -> Result<(u64, bool)> {
    let resolved: Vec<Option<u64>> = names.iter().map(|nm| registry.resolve(nm)).collect();

    if resolved.iter().all(|c| c.is_none()) {
        return Ok((registry.len(), true));
    }

    match resolved[0] {
        Some(col0) => {
            for (t, c) in resolved.iter().enumerate() {
                if *c != Some(col0 + t as u64) {
                    return err_at!(
                        DuplicateSample,
                        msg: "{} clashes with registered columns", names[t]
                    );
                }
            }
            Ok((col0, false))
        }
        None => err_at!(
            DuplicateSample,
            msg: "batch mixes new samples with registered ones"
        ),
    }
}

/// Convert bloom filter files into row updates for rows `[i, j)` and,
/// for a fresh batch, register the samples once the rows are down.
/// Return the column count after the build.
pub(crate) fn build<S>(
    store: &mut S,
    registry: &mut Registry,
    (m, h): (u64, u64),
    paths: &[ffi::OsString],
    samples: Option<&[String]>,
    params: &BuildParams,
) -> Result<u64>
where
    S: RowStore,
{
    let (i, j) = to_bf_range(params.bf_range, m)?;
    let b = paths.len();

    let names: Vec<String> = match samples {
        Some(names) if names.len() == b => names.to_vec(),
        Some(names) => {
            return err_at!(
                InvalidInput,
                msg: "{} samples for {} bloom filters", names.len(), b
            )
        }
        None => paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
    };
    {
        let distinct: HashSet<&String> = names.iter().collect();
        if distinct.len() != b {
            return err_at!(DuplicateSample, msg: "batch repeats a sample name");
        }
    }
    if b == 0 {
        return Ok(registry.len());
    }

    let (col0, fresh) = to_columns(registry, &names)?;
    let n_after = cmp::max(registry.len(), col0 + b as u64);
    let stripe = to_stripe_cols(params, j - i, b)?;

    debug!(
        target: "bigsi",
        "build rows [{}, {}) columns [{}, {}) stripe {}", i, j, col0, col0 + b as u64, stripe
    );

    for (s_idx, chunk) in paths.chunks(stripe).enumerate() {
        if let Some(cancel) = &params.cancel {
            cancel.check("build")?;
        }
        let off = col0 as usize + s_idx * stripe;
        absorb_stripe(store, (i, j), (m, h), n_after, off, chunk)?;
    }

    if fresh {
        for name in names.iter() {
            registry.add(name)?;
        }
        registry.persist(store, col0)?;
    }

    info!(
        target: "bigsi",
        "built rows [{}, {}) for {} samples, {} columns now", i, j, b, registry.len()
    );

    Ok(registry.len())
}

// stripe width in columns, from the memory cap and the lowmem hint.
fn to_stripe_cols(params: &BuildParams, n_rows: u64, b: usize) -> Result<usize> {
    let capped = match params.max_memory {
        Some(mem) => {
            let s = usize::try_from((mem / n_rows).saturating_mul(8)).unwrap_or(usize::MAX);
            if s == 0 {
                return err_at!(
                    ResourceExceeded,
                    msg: "max_memory {} below one column of {} rows", mem, n_rows
                );
            }
            cmp::min(s, b)
        }
        None => b,
    };
    let cols = if params.lowmem {
        cmp::min(capped, LOWMEM_STRIPE_COLS)
    } else {
        capped
    };
    Ok(cols)
}

// Scatter one stripe of filters into a working buffer, then OR the
// buffer into the stored rows at the stripe's column offset, writing
// every touched row at the width `n_after` dictates.
fn absorb_stripe<S>(
    store: &mut S,
    (i, j): (u64, u64),
    (m, h): (u64, u64),
    n_after: u64,
    off: usize,
    chunk: &[ffi::OsString],
) -> Result<()>
where
    S: RowStore,
{
    let n_rows = (j - i) as usize;
    let mut buffer: Vec<Vec<u8>> = vec![vec![0; bits::size_of(chunk.len())]; n_rows];

    for (t, path) in chunk.iter().enumerate() {
        let filter = Bloom::from_file(path)?;
        filter.expect_params(m, h)?;
        let slice = filter.slice(i, j);
        for r in bits::ones(&slice, n_rows) {
            bits::set(&mut buffer[r], t);
        }
    }

    let width = bits::size_of(n_after as usize);
    let mut rows = vec![];
    for (r, stripe_row) in buffer.into_iter().enumerate() {
        let key = i + r as u64;
        let mut row = match store.get(key)? {
            Some(value) if value.len() > width => {
                return err_at!(
                    CorruptRow,
                    msg: "row {} holds {} bytes, want {}", key, value.len(), width
                )
            }
            Some(value) => value,
            None if bits::is_zero(&stripe_row) => continue,
            None => vec![],
        };
        bits::resize(&mut row, n_after as usize);
        bits::splice(&mut row, off, &stripe_row, chunk.len());
        rows.push((key, row));
    }

    matrix::write_rows(store, n_after, rows)
}

/// Insert a single pre-computed bloom filter under `sample`, updating
/// rows `[i, j)` only. A registered `sample` means another partition of
/// the same insert already ran, the bits land in its issued column.
pub(crate) fn insert_bloom<S>(
    store: &mut S,
    registry: &mut Registry,
    (m, h): (u64, u64),
    loc: &ffi::OsStr,
    sample: &str,
    bf_range: Option<(u64, u64)>,
) -> Result<u64>
where
    S: RowStore,
{
    let (i, j) = to_bf_range(bf_range, m)?;
    let filter = Bloom::from_file(loc)?;
    filter.expect_params(m, h)?;

    match registry.resolve(sample) {
        Some(column) => {
            let n = registry.len();
            for r in i..j {
                if filter.bit(r) {
                    matrix::set_bit(store, n, r, column)?;
                }
            }
            Ok(column)
        }
        None => {
            let column = registry.len();
            let n_after = column + 1;
            let mut rows = vec![];
            for r in i..j {
                if filter.bit(r) {
                    let mut row = matrix::read_row(store, n_after, r)?;
                    bits::set(&mut row, column as usize);
                    rows.push((r, row));
                }
            }
            matrix::write_rows(store, n_after, rows)?;

            registry.add(sample)?;
            registry.persist(store, column)?;
            Ok(column)
        }
    }
}

/// Concatenate the donor's columns onto the acceptor, row by row, and
/// append the donor's registry at offset `n_a`. Tombstoned donor
/// columns stay tombstoned in their new range.
pub(crate) fn merge<A, D>(
    store: &mut A,
    registry: &mut Registry,
    donor_store: &D,
    donor_registry: &Registry,
    m: u64,
) -> Result<u64>
where
    A: RowStore,
    D: RowStore,
{
    let (n_a, n_d) = (registry.len(), donor_registry.len());

    // refuse name clashes before any row is touched.
    for (_, record) in donor_registry.iter() {
        if !record.dead && registry.resolve(&record.name).is_some() {
            return err_at!(DuplicateSample, msg: "{} present in both indices", record.name);
        }
    }

    let keys = {
        let mut keys = store.iter_keys(0..m)?;
        keys.extend(donor_store.iter_keys(0..m)?);
        keys.sort_unstable();
        keys.dedup();
        keys
    };

    let n_after = n_a + n_d;
    let mut rows = vec![];
    for key in keys {
        let mut row = matrix::read_row(store, n_a, key)?;
        let donor_row = matrix::read_row(donor_store, n_d, key)?;
        bits::resize(&mut row, n_after as usize);
        bits::splice(&mut row, n_a as usize, &donor_row, n_d as usize);
        rows.push((key, row));

        if rows.len() >= MERGE_BATCH {
            matrix::write_rows(store, n_after, rows)?;
            rows = vec![];
        }
    }
    matrix::write_rows(store, n_after, rows)?;

    for (_, record) in donor_registry.iter() {
        registry.append(record.clone())?;
    }
    registry.persist(store, n_a)?;

    info!(
        target: "bigsi",
        "merged {} donor columns onto {}, {} columns now", n_d, n_a, registry.len()
    );

    Ok(registry.len())
}

#[cfg(test)]
#[path = "build_test.rs"]
mod build_test;
