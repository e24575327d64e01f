//! Package implement the index facade, its build/merge pipeline and its
//! query engine.
//!
//! Use [Config] and [Bigsi::create] to create a fresh index on disk, or
//! [Bigsi::open] to load an existing one. A writable handle admits
//! exactly one mutating operation at a time, build, insert, merge or
//! delete; read-only handles can be cloned and searched concurrently.
//!
//! **Building an index**
//!
//! Indexing happens in two stages. First every sample is summarised into
//! a bloom filter file, [crate::bloom::Bloom::from_kmers] folded over a
//! k-mer source, written out with [crate::bloom::Bloom::to_file]. Then a
//! batch of filter files is turned into matrix rows:
//!
//! ```ignore
//! let mut config = Config::new(&dir);
//! config.set_kmer_size(31).set_bloom_filter(25_000_000, 3);
//! let index = Bigsi::create(config, false /*force*/)?;
//! index.build(&bloom_files, Some(&samples), &BuildParams::new())?;
//! ```
//!
//! The row axis is embarrassingly parallel. `[0, m)` decomposes into
//! disjoint `bf_range` partitions, one build call per partition, in any
//! order and from independent processes; [Bigsi::bf_range_for] computes
//! the partition bounds. Building rows `[i, j)` only needs bits `[i, j)`
//! of each input filter and only writes keys `[i, j)`.
//!
//! With a `max_memory` cap the pipeline switches to a streaming variant
//! that absorbs the inputs in column stripes, trading extra row reads
//! for a bounded working buffer.
//!
//! **Querying**
//!
//! [Bigsi::search] enumerates the distinct canonical k-mers of the query
//! sequence, probes the matrix once per k-mer across a pool of `nproc`
//! workers and thresholds the per-column tallies by containment, the
//! fraction of the query's k-mers a sample carries.

use arbitrary::{Arbitrary, Unstructured};

use std::ffi;

mod bigsi;
mod build;
mod query;

pub use self::bigsi::{Bigsi, Header, Mode, SampleInfo, Stats};
pub use build::BuildParams;
pub use query::SearchResult;

/// Default k-mer length, in bases.
pub const KMER_SIZE: u64 = 31;
/// Default bloom filter width, in bits.
pub const BLOOM_WIDTH: u64 = 25_000_000;
/// Default number of hash positions per k-mer.
pub const NUM_HASHES: u64 = 3;

/// Configuration for creating a [Bigsi] index.
///
/// `(kmer_size, bloom_width, num_hashes)` are fixed at create time and
/// persisted in the index header; subsequent opens read them from the
/// header and ignore whatever the process environment says.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory under which the index files are created.
    pub dir: ffi::OsString,
    /// K-mer length `k`, within `1..=63`.
    ///
    /// Default: [KMER_SIZE]
    pub kmer_size: u64,
    /// Bloom filter width `m`, in bits.
    ///
    /// Default: [BLOOM_WIDTH]
    pub bloom_width: u64,
    /// Hash positions per k-mer `h`.
    ///
    /// Default: [NUM_HASHES]
    pub num_hashes: u64,
    /// Worker threads for query row-probing.
    ///
    /// Default: number of cores.
    pub nproc: usize,
}

impl Config {
    /// Create a new configuration value, use the `set_*` methods to add
    /// more configuration.
    pub fn new(dir: &ffi::OsStr) -> Config {
        Config {
            dir: dir.to_os_string(),
            kmer_size: KMER_SIZE,
            bloom_width: BLOOM_WIDTH,
            num_hashes: NUM_HASHES,
            nproc: num_cpus::get(),
        }
    }

    /// Configure the k-mer length.
    pub fn set_kmer_size(&mut self, kmer_size: u64) -> &mut Self {
        self.kmer_size = kmer_size;
        self
    }

    /// Configure the bloom filter, width in bits and hash positions per
    /// k-mer.
    pub fn set_bloom_filter(&mut self, width: u64, num_hashes: u64) -> &mut Self {
        self.bloom_width = width;
        self.num_hashes = num_hashes;
        self
    }

    /// Configure the query worker pool size.
    pub fn set_nproc(&mut self, nproc: usize) -> &mut Self {
        self.nproc = nproc;
        self
    }
}

impl<'a> Arbitrary<'a> for Config {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        use std::env;

        let dir = env::temp_dir().into_os_string();
        let kmer_size = *u.choose(&[1, 3, 11, 31, 63])?;
        let bloom_width = *u.choose(&[1, 16, 64, 1024, 100_003])?;
        let num_hashes = *u.choose(&[1, 2, 3, 4])?;
        let nproc = *u.choose(&[1, 2, 4])?;

        let config = Config {
            dir,
            kmer_size,
            bloom_width,
            num_hashes,
            nproc,
        };
        Ok(config)
    }
}
