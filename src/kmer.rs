//! Module `kmer` implement canonical k-mer enumeration over DNA sequences.
//!
//! A k-mer is a window of `k` symbols from `{A, C, G, T}`. Its canonical
//! form is the lexicographically smaller of the window and its reverse
//! complement, every hashing and indexing operation works on the canonical
//! form. Windows holding any other symbol yield no k-mer.

use crate::{Error, Result};

/// Upper bound on the supported k-mer length.
pub const MAX_KMER_SIZE: usize = 63;

/// Validate a k-mer length at index-create time.
pub fn validate_kmer_size(k: usize) -> Result<usize> {
    if k >= 1 && k <= MAX_KMER_SIZE {
        Ok(k)
    } else {
        err_at!(InvalidInput, msg: "kmer size {} not within 1..={}", k, MAX_KMER_SIZE)
    }
}

#[inline]
fn complement(base: u8) -> Option<u8> {
    match base {
        b'A' => Some(b'T'),
        b'C' => Some(b'G'),
        b'G' => Some(b'C'),
        b'T' => Some(b'A'),
        _ => None,
    }
}

/// Reverse complement of `seq`, None if `seq` holds a symbol outside
/// `{A, C, G, T}`.
pub fn reverse_complement(seq: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(seq.len());
    for base in seq.iter().rev() {
        out.push(complement(*base)?);
    }
    Some(out)
}

/// Canonical form of `kmer`, the lexicographic min of the window and its
/// reverse complement. None if the window holds an ambiguous symbol.
///
/// Byte-wise comparison is base-wise comparison here, `A < C < G < T`
/// holds in ASCII.
pub fn canonical(kmer: &[u8]) -> Option<Vec<u8>> {
    let rc = reverse_complement(kmer)?;
    if kmer <= rc.as_slice() {
        Some(kmer.to_vec())
    } else {
        Some(rc)
    }
}

/// Lazy iterator of canonical k-mers over a sequence window.
///
/// Yields one canonical k-mer per window position, in sequence order,
/// skipping windows with ambiguous symbols. The iterator is finite and
/// non-restartable, downstream code must not assume it can rewind.
pub struct Kmers<'a> {
    seq: &'a [u8],
    k: usize,
    off: usize,
}

impl<'a> Kmers<'a> {
    pub fn new(seq: &'a [u8], k: usize) -> Kmers<'a> {
        Kmers { seq, k, off: 0 }
    }
}

impl<'a> Iterator for Kmers<'a> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        while self.k > 0 && self.off + self.k <= self.seq.len() {
            let window = &self.seq[self.off..self.off + self.k];
            self.off += 1;
            if let Some(kmer) = canonical(window) {
                return Some(kmer);
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "kmer_test.rs"]
mod kmer_test;
