//! Module `bloom` implement the per-sample bloom filter.
//!
//! A filter is a fixed-width bit vector of `m` bits; inserting a k-mer
//! sets the `h` positions computed by [hash::positions] and testing a
//! k-mer checks that all of them are set. There is no deletion and no
//! auto-grow, capacity is the caller's responsibility.
//!
//! **File format**
//!
//! An 8-byte little-endian header `(m: u32, h: u32)` followed by the
//! packed bits of [util::bits]. Loaders reject files whose `(m, h)`
//! disagree with the expected parameters.

use std::{convert::TryFrom, ffi, fs};

use crate::{hash, util, util::bits, Error, Result};

/// Fixed-width bloom filter parametrised by `(m, h)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Bloom {
    m: u64,
    h: u64,
    bits: Vec<u8>,
}

impl Bloom {
    pub fn new(m: u64, h: u64) -> Result<Bloom> {
        if m == 0 || m > u64::from(u32::MAX) {
            return err_at!(InvalidInput, msg: "bloom width {} not in 1..={}", m, u32::MAX);
        }
        if h == 0 {
            return err_at!(InvalidInput, msg: "bloom needs at least one hash position");
        }
        let bits = vec![0; bits::size_of(m as usize)];
        Ok(Bloom { m, h, bits })
    }

    /// Fold a k-mer source into a fresh filter. The source is lazy and
    /// non-restartable, it is consumed here.
    pub fn from_kmers<I>(m: u64, h: u64, kmers: I) -> Result<Bloom>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut filter = Bloom::new(m, h)?;
        for kmer in kmers {
            filter.insert(&kmer);
        }
        Ok(filter)
    }

    /// Set the hash positions of `kmer`.
    pub fn insert(&mut self, kmer: &[u8]) {
        for p in hash::positions(kmer, self.m, self.h) {
            bits::set(&mut self.bits, p as usize);
        }
    }

    /// True iff every hash position of `kmer` is set. Diagnostics only,
    /// the build path never calls this.
    pub fn test(&self, kmer: &[u8]) -> bool {
        hash::positions(kmer, self.m, self.h).all(|p| bits::get(&self.bits, p as usize))
    }

    pub fn to_params(&self) -> (u64, u64) {
        (self.m, self.h)
    }

    /// Fail with ParameterMismatch unless this filter was built with
    /// `(m, h)`.
    pub fn expect_params(&self, m: u64, h: u64) -> Result<()> {
        if self.m == m && self.h == h {
            Ok(())
        } else {
            err_at!(
                ParameterMismatch,
                msg: "bloom ({}, {}) vs index ({}, {})", self.m, self.h, m, h
            )
        }
    }

    #[inline]
    pub fn bit(&self, r: u64) -> bool {
        bits::get(&self.bits, r as usize)
    }

    /// Packed bits `[i, j)`, re-based so the slice's bit 0 is filter bit
    /// `i`. This is the per-partition view the build pipeline scatters.
    pub fn slice(&self, i: u64, j: u64) -> Vec<u8> {
        bits::slice(&self.bits, i as usize, j as usize)
    }
}

impl Bloom {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.bits.len());
        buf.extend_from_slice(&(self.m as u32).to_le_bytes());
        buf.extend_from_slice(&(self.h as u32).to_le_bytes());
        buf.extend_from_slice(&self.bits);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Bloom> {
        if buf.len() < 8 {
            return err_at!(InvalidFile, msg: "bloom header missing, {} bytes", buf.len());
        }
        let m = u64::from(u32::from_le_bytes(
            err_at!(FailConvert, <[u8; 4]>::try_from(&buf[0..4]))?,
        ));
        let h = u64::from(u32::from_le_bytes(
            err_at!(FailConvert, <[u8; 4]>::try_from(&buf[4..8]))?,
        ));
        let mut filter = Bloom::new(m, h)?;
        if buf.len() - 8 != filter.bits.len() {
            return err_at!(
                InvalidFile,
                msg: "bloom body {} bytes, want {}", buf.len() - 8, filter.bits.len()
            );
        }
        filter.bits.copy_from_slice(&buf[8..]);
        bits::mask_trailing(&mut filter.bits, m as usize);
        Ok(filter)
    }

    pub fn to_file(&self, loc: &ffi::OsStr) -> Result<()> {
        let mut fd = util::create_file_w(loc)?;
        util::sync_write(&mut fd, &self.to_bytes())?;
        Ok(())
    }

    pub fn from_file(loc: &ffi::OsStr) -> Result<Bloom> {
        let data = err_at!(IOError, fs::read(loc), "bloom file {:?}", loc)?;
        Bloom::from_bytes(&data)
    }
}

#[cfg(test)]
#[path = "bloom_test.rs"]
mod bloom_test;
