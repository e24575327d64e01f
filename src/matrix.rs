//! Module `matrix` implement the bitsliced matrix view over a row store.
//!
//! Logical view, `m` rows by `n` columns of bits; row `r` holds bit `r`
//! of every sample's bloom filter, so one row read answers "which
//! samples have this bit set" in a single contiguous fetch. Physical
//! view, row `r` is the value at store key `r`, packed as
//! [bits][crate::util::bits].
//!
//! Column growth is lazy. Rows whose stored value is shorter than the
//! current width read as zero-padded on the right; every write emits the
//! full current width. A stored value wider than `ceil(n/8)` means the
//! registry and the store disagree and surfaces as [Error::CorruptRow].
//!
//! The matrix is oblivious to sample semantics, `n` is supplied by the
//! caller from the registry.

use crate::{store::RowStore, util::bits, Error, Result};

// fetch a raw row and check it against the current width.
fn get_checked<S>(store: &S, n: u64, r: u64) -> Result<Option<Vec<u8>>>
where
    S: RowStore,
{
    let width = bits::size_of(n as usize);
    match store.get(r)? {
        Some(value) if value.len() > width => {
            err_at!(CorruptRow, msg: "row {} holds {} bytes, want {}", r, value.len(), width)
        }
        value => Ok(value),
    }
}

/// Read row `r` at the full current width. An absent row reads as all
/// zeroes.
pub fn read_row<S>(store: &S, n: u64, r: u64) -> Result<Vec<u8>>
where
    S: RowStore,
{
    let mut row = get_checked(store, n, r)?.unwrap_or_default();
    bits::resize(&mut row, n as usize);
    Ok(row)
}

/// Set column `c` in row `r`, read-modify-write. Single-insert path
/// only, bulk writers go through [write_rows].
pub fn set_bit<S>(store: &mut S, n: u64, r: u64, c: u64) -> Result<()>
where
    S: RowStore,
{
    let mut row = read_row(store, n, r)?;
    bits::set(&mut row, c as usize);
    store.put(r, row)
}

/// Bulk overwrite of whole rows. Every vector must already be packed at
/// the full current width.
pub fn write_rows<S, I>(store: &mut S, n: u64, rows: I) -> Result<()>
where
    S: RowStore,
    I: IntoIterator<Item = (u64, Vec<u8>)>,
{
    let width = bits::size_of(n as usize);
    let mut batch = vec![];
    for (r, row) in rows {
        if row.len() != width {
            return err_at!(Fatal, msg: "row {} written at {} bytes, want {}", r, row.len(), width);
        }
        batch.push((r, row));
    }
    store.batch_put(batch)
}

/// Bitwise AND of the requested rows at the full current width. An
/// absent row short-circuits the result to all zeroes.
pub fn and_rows<S>(store: &S, n: u64, rs: &[u64]) -> Result<Vec<u8>>
where
    S: RowStore,
{
    let width = bits::size_of(n as usize);
    let mut acc = vec![0xff; width];
    bits::mask_trailing(&mut acc, n as usize);

    for r in rs {
        match get_checked(store, n, *r)? {
            Some(row) => bits::and_into(&mut acc, &row),
            None => {
                for byte in acc.iter_mut() {
                    *byte = 0;
                }
                break;
            }
        }
        if bits::is_zero(&acc) {
            break;
        }
    }
    Ok(acc)
}

/// Clear column `c` in every live row. Tombstoning path; rows that were
/// never written stay absent.
pub fn zero_column<S>(store: &mut S, n: u64, c: u64) -> Result<usize>
where
    S: RowStore,
{
    let keys = store.iter_keys(0..crate::store::META_BASE)?;
    let mut batch = vec![];
    for r in keys {
        let mut row = read_row(store, n, r)?;
        if bits::get(&row, c as usize) {
            bits::unset(&mut row, c as usize);
            batch.push((r, row));
        }
    }
    let count = batch.len();
    store.batch_put(batch)?;
    Ok(count)
}

#[cfg(test)]
#[path = "matrix_test.rs"]
mod matrix_test;
