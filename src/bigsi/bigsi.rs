//! Package implement the BIGSI index facade.
//!
//! [Bigsi] owns the row store handle, the sample registry and the
//! parameter header. It enforces parameter immutability, serialises
//! writes and dispatches into the build pipeline and the query engine.

use cbordata::Cborize;
use log::info;

use std::{
    ffi,
    sync::{Arc, RwLock},
};

use crate::{
    bigsi::{build, query, BuildParams, Config, SearchResult},
    hash, kmer, matrix,
    registry::Registry,
    store::{FileStore, RowStore, HEADER_KEY, META_BASE},
    util::{self, Cancel},
    Error, Result,
};

const HEADER_VER: u32 = 0x000d0001;

/// Magic prefix identifying an index header.
pub const MAGIC: &str = "bigsi";
/// On-disk format version.
pub const VERSION: u32 = 1;

/// Parameter header, persisted at [HEADER_KEY] and immutable after
/// create except for `n_columns`, which writers update in place.
#[derive(Clone, Debug, Cborize)]
pub struct Header {
    pub magic: String,
    pub version: u32,
    pub kmer_size: u64,
    pub bloom_width: u64,
    pub num_hashes: u64,
    pub hasher_id: u32,
    pub n_columns: u64,
}

impl Header {
    const ID: u32 = HEADER_VER;

    fn from_config(config: &Config) -> Result<Header> {
        kmer::validate_kmer_size(config.kmer_size as usize)?;
        if config.bloom_width == 0 || config.bloom_width > u64::from(u32::MAX) {
            return err_at!(
                InvalidInput,
                msg: "bloom width {} not in 1..={}", config.bloom_width, u32::MAX
            );
        }
        if config.num_hashes == 0 {
            return err_at!(InvalidInput, msg: "need at least one hash position");
        }

        let header = Header {
            magic: MAGIC.to_string(),
            version: VERSION,
            kmer_size: config.kmer_size,
            bloom_width: config.bloom_width,
            num_hashes: config.num_hashes,
            hasher_id: hash::HASHER_CITY128,
            n_columns: 0,
        };
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.magic != MAGIC || self.version != VERSION {
            return err_at!(
                InvalidFile,
                msg: "bad header magic/version {:?}/{}", self.magic, self.version
            );
        }
        if self.hasher_id != hash::HASHER_CITY128 {
            return err_at!(ParameterMismatch, msg: "unknown hasher {}", self.hasher_id);
        }
        kmer::validate_kmer_size(self.kmer_size as usize)?;
        Ok(())
    }
}

/// Index open mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mode {
    /// Queries only, shared access with other readers.
    Read,
    /// Exclusive access, one mutating operation at a time.
    Write,
}

// Everything behind the state lock, shared between facade clones and
// the query workers.
pub(crate) struct State<S> {
    pub(crate) header: Header,
    pub(crate) registry: Registry,
    pub(crate) store: S,
}

/// Index facade. Refer to [package docs][crate::bigsi] for the
/// operational life-cycle.
///
/// Cloning is cheap and clones share the underlying state; read-only
/// handles can be cloned across threads and searched concurrently.
pub struct Bigsi {
    mode: Mode,
    nproc: usize,
    // (k, m, h), read once from the header at open.
    params: (u64, u64, u64),

    op: Arc<RwLock<()>>,
    state: Arc<RwLock<State<FileStore>>>,
}

impl Clone for Bigsi {
    fn clone(&self) -> Bigsi {
        Bigsi {
            mode: self.mode,
            nproc: self.nproc,
            params: self.params,

            op: Arc::clone(&self.op),
            state: Arc::clone(&self.state),
        }
    }
}

impl Bigsi {
    /// Create a fresh, empty index under `config.dir`. Fails if an
    /// index is already present, unless `force`. The returned handle is
    /// writable.
    pub fn create(config: Config, force: bool) -> Result<Bigsi> {
        let header = Header::from_config(&config)?;

        let mut store = FileStore::create(&config.dir, force)?;
        store.put(HEADER_KEY, util::into_cbor_bytes(header.clone())?)?;
        store.commit()?;

        info!(
            target: "bigsi",
            "created index at {:?} (k {} m {} h {})",
            config.dir, header.kmer_size, header.bloom_width, header.num_hashes
        );

        let val = Bigsi {
            mode: Mode::Write,
            nproc: config.nproc,
            params: (header.kmer_size, header.bloom_width, header.num_hashes),

            op: Arc::new(RwLock::new(())),
            state: Arc::new(RwLock::new(State {
                header,
                registry: Registry::new(),
                store,
            })),
        };
        Ok(val)
    }

    /// Open an existing index under `dir`. `(k, m, h, hasher_id)` come
    /// from the persisted header, mismatched or unknown headers are
    /// refused.
    pub fn open(dir: &ffi::OsStr, mode: Mode) -> Result<Bigsi> {
        let store = FileStore::open(dir, mode == Mode::Write)?;

        let header = match store.get(HEADER_KEY)? {
            Some(data) => util::from_cbor_bytes::<Header>(&data)?.0,
            None => return err_at!(InvalidFile, msg: "no header under {:?}", dir),
        };
        header.validate()?;

        let registry = Registry::load(&store, header.n_columns)?;

        let val = Bigsi {
            mode,
            nproc: num_cpus::get(),
            params: (header.kmer_size, header.bloom_width, header.num_hashes),

            op: Arc::new(RwLock::new(())),
            state: Arc::new(RwLock::new(State {
                header,
                registry,
                store,
            })),
        };
        Ok(val)
    }

    /// Configure the query worker pool size for this handle.
    pub fn set_nproc(&mut self, nproc: usize) -> &mut Self {
        self.nproc = nproc;
        self
    }

    /// Close this handle. The last handle releases the store lock;
    /// return value tells whether this was the last one.
    pub fn close(self) -> Result<bool> {
        let mode = self.mode;
        drop(self.op);
        match Arc::try_unwrap(self.state) {
            Ok(state) => {
                let mut state = err_at!(Fatal, state.into_inner())?;
                if mode == Mode::Write {
                    state.store.commit()?;
                }
                state.store.close()?;
                Ok(true)
            }
            Err(_) => Ok(false), // there are active clones
        }
    }

    /// Close this handle and remove the index from disk. No-op when
    /// other clones are still active.
    pub fn purge(self) -> Result<bool> {
        if self.mode != Mode::Write {
            return err_at!(InvalidInput, msg: "cannot purge read-only index");
        }
        drop(self.op);
        match Arc::try_unwrap(self.state) {
            Ok(state) => {
                let state = err_at!(Fatal, state.into_inner())?;
                state.store.purge()?;
                Ok(true)
            }
            Err(_) => Ok(false), // there are active clones
        }
    }
}

impl Bigsi {
    /// `(k, m, h)` this index was created with.
    pub fn to_params(&self) -> (u64, u64, u64) {
        self.params
    }

    pub fn to_mode(&self) -> Mode {
        self.mode
    }

    /// Row interval for one-based partition `part` of `of`, mirroring
    /// the row-axis decomposition used for distributed builds.
    pub fn bf_range_for(&self, part: u64, of: u64) -> Result<(u64, u64)> {
        let (_, m, _) = self.params;
        if of == 0 || part == 0 || part > of {
            return err_at!(InvalidInput, msg: "partition {}/{}", part, of);
        }
        let batch = (m - 1) / of + 1;
        let i = (part - 1) * batch;
        if i >= m {
            return err_at!(InvalidInput, msg: "partition {}/{} past {} rows", part, of, m);
        }
        Ok((i, u64::min(i + batch, m)))
    }

    /// Enumerate every issued column.
    pub fn samples(&self) -> Result<Vec<SampleInfo>> {
        let st = err_at!(Fatal, self.state.read())?;
        let mut items = vec![];
        for (column, record) in st.registry.iter() {
            items.push(SampleInfo {
                column,
                name: record.name.clone(),
                live: !record.dead,
            });
        }
        Ok(items)
    }

    pub fn to_stats(&self) -> Result<Stats> {
        let st = err_at!(Fatal, self.state.read())?;
        let n_live = st.registry.iter().filter(|(_, r)| !r.dead).count() as u64;
        let val = Stats {
            kmer_size: st.header.kmer_size,
            bloom_width: st.header.bloom_width,
            num_hashes: st.header.num_hashes,
            hasher_id: st.header.hasher_id,
            n_columns: st.registry.len(),
            n_live,
            n_tombstoned: st.registry.len() - n_live,
            n_rows: st.store.iter_keys(0..META_BASE)?.len() as u64,
        };
        Ok(val)
    }
}

impl Bigsi {
    /// Insert one pre-computed bloom filter file as `sample`, restricted
    /// to rows `bf_range` when given. Return the sample's column.
    pub fn insert_bloom(
        &self,
        bloom: &ffi::OsStr,
        sample: &str,
        bf_range: Option<(u64, u64)>,
    ) -> Result<u64> {
        let (_, m, h) = self.params;
        self.write_op(|st| {
            build::insert_bloom(&mut st.store, &mut st.registry, (m, h), bloom, sample, bf_range)
        })
    }

    /// Convert a batch of bloom filter files into matrix rows. `samples`
    /// defaults to the file paths. Return the column count afterwards.
    ///
    /// Refer to [BuildParams] for the memory cap, the streaming variant
    /// and `bf_range` partitioned builds.
    pub fn build(
        &self,
        blooms: &[ffi::OsString],
        samples: Option<&[String]>,
        params: &BuildParams,
    ) -> Result<u64> {
        let (_, m, h) = self.params;
        self.write_op(|st| {
            build::build(&mut st.store, &mut st.registry, (m, h), blooms, samples, params)
        })
    }

    /// Append every column of `donor` onto this index. Both must share
    /// `(k, m, h, hasher_id)`. The merge becomes visible atomically at
    /// the final commit, an interrupted merge leaves this index
    /// untouched and can simply be re-run.
    pub fn merge(&self, donor: &Bigsi) -> Result<u64> {
        if Arc::ptr_eq(&self.state, &donor.state) {
            return err_at!(InvalidInput, msg: "cannot merge an index into itself");
        }
        if self.params != donor.params {
            return err_at!(
                ParameterMismatch,
                msg: "{:?} vs {:?}", self.params, donor.params
            );
        }

        let (_, m, _) = self.params;
        self.write_op(|st| {
            let donor_st = err_at!(Fatal, donor.state.read())?;
            build::merge(
                &mut st.store,
                &mut st.registry,
                &donor_st.store,
                &donor_st.registry,
                m,
            )
        })
    }

    /// Tombstone `sample` and zero its column in every live row. The
    /// column index is never reused.
    pub fn delete_sample(&self, sample: &str) -> Result<u64> {
        self.write_op(|st| {
            let column = st.registry.tombstone(sample)?;
            matrix::zero_column(&mut st.store, st.registry.len(), column)?;
            st.registry.persist(&mut st.store, column)?;
            info!(target: "bigsi", "tombstoned {} at column {}", sample, column);
            Ok(column)
        })
    }

    /// Samples containing at least `threshold` of the sequence's
    /// distinct canonical k-mers, ordered by descending containment
    /// then ascending column.
    pub fn search(&self, seq: &[u8], threshold: f64) -> Result<Vec<SearchResult>> {
        let _r = err_at!(Fatal, self.op.read())?;
        query::search_seq(&self.state, self.nproc, seq, threshold, None)
    }

    /// Same as [Bigsi::search], cancellable at row probing boundaries.
    pub fn search_cancel(
        &self,
        seq: &[u8],
        threshold: f64,
        cancel: &Cancel,
    ) -> Result<Vec<SearchResult>> {
        let _r = err_at!(Fatal, self.op.read())?;
        query::search_seq(&self.state, self.nproc, seq, threshold, Some(cancel))
    }

    /// Search from an external k-mer source instead of a sequence. The
    /// source must yield canonical k-mers of this index's `k`.
    pub fn search_kmers<I>(&self, kmers: I, threshold: f64) -> Result<Vec<SearchResult>>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let _r = err_at!(Fatal, self.op.read())?;
        query::search_kmers(&self.state, self.nproc, kmers, threshold, None)
    }

    // Single-writer discipline. Every mutating operation runs under the
    // exclusive op lock, then the header's column count is re-synced
    // and the store committed; the registry update that exposes fresh
    // columns is already ordered after their row writes inside `f`.
    fn write_op<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut State<FileStore>) -> Result<T>,
    {
        if self.mode != Mode::Write {
            return err_at!(InvalidInput, msg: "index opened read-only");
        }
        let _w = err_at!(Fatal, self.op.write())?;
        let mut guard = err_at!(Fatal, self.state.write())?;
        let st = &mut *guard;

        let res = f(st)?;

        st.header.n_columns = st.registry.len();
        let data = util::into_cbor_bytes(st.header.clone())?;
        st.store.put(HEADER_KEY, data)?;
        st.store.commit()?;
        Ok(res)
    }
}

/// One issued column, refer [Bigsi::samples].
#[derive(Clone, Debug, PartialEq)]
pub struct SampleInfo {
    pub column: u64,
    pub name: String,
    pub live: bool,
}

/// Point-in-time statistics for an index.
#[derive(Clone, Debug, PartialEq)]
pub struct Stats {
    pub kmer_size: u64,
    pub bloom_width: u64,
    pub num_hashes: u64,
    pub hasher_id: u32,
    /// Issued columns, including tombstones.
    pub n_columns: u64,
    pub n_live: u64,
    pub n_tombstoned: u64,
    /// Rows present in the store.
    pub n_rows: u64,
}

#[cfg(test)]
#[path = "bigsi_test.rs"]
mod bigsi_test;
