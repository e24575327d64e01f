//! Module `query` implement the search pipeline.
//!
//! Per sequence, enumerate the distinct canonical k-mers in first-seen
//! order, probe the matrix once per k-mer, `and_rows` over its `h` hash
//! positions, and tally per column how many k-mers report present. A
//! column is a hit when its tally clears the containment threshold.
//!
//! Probes fan out over a pool of gen-server workers sized by `nproc`.
//! The only shared state is the row store, read-only for the duration of
//! the query, and the tally, which reduces on the caller's side from the
//! workers' responses in any order.

use log::debug;

use std::{
    collections::HashSet,
    sync::{mpsc, Arc, RwLock},
};

use crate::{
    bigsi::bigsi::State,
    hash, kmer, matrix,
    registry::Lookup,
    store::RowStore,
    util::{bits, thread, Cancel},
    Error, Result,
};

/// One matching sample, refer [Bigsi::search][crate::Bigsi::search].
///
/// `containment` is `num_kmers_found / num_kmers`, the fraction of the
/// query's distinct k-mers this sample's bloom filter reports present.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
    pub sample: String,
    pub column: u64,
    pub containment: f64,
    pub num_kmers_found: usize,
    pub num_kmers: usize,
}

// (kmer ordinal, row positions to AND)
type Req = (usize, Vec<u64>);
// (kmer ordinal, AND of the rows)
type Res = (usize, Result<Vec<u8>>);

pub(crate) fn search_seq<S>(
    state: &Arc<RwLock<State<S>>>,
    nproc: usize,
    seq: &[u8],
    threshold: f64,
    cancel: Option<&Cancel>,
) -> Result<Vec<SearchResult>>
where
    S: RowStore + Send + Sync + 'static,
{
    let k = {
        let st = err_at!(Fatal, state.read())?;
        st.header.kmer_size
    };
    search_kmers(state, nproc, kmer::Kmers::new(seq, k as usize), threshold, cancel)
}

/// Search from an external k-mer source. The source must yield
/// canonical k-mers of the index's `k`; duplicates are tolerated and
/// collapse into the distinct set.
pub(crate) fn search_kmers<S, I>(
    state: &Arc<RwLock<State<S>>>,
    nproc: usize,
    kmers: I,
    threshold: f64,
    cancel: Option<&Cancel>,
) -> Result<Vec<SearchResult>>
where
    S: RowStore + Send + Sync + 'static,
    I: IntoIterator<Item = Vec<u8>>,
{
    if !(0.0..=1.0).contains(&threshold) {
        return err_at!(InvalidInput, msg: "threshold {} not within 0..=1", threshold);
    }

    let (k, m, h, n) = {
        let st = err_at!(Fatal, state.read())?;
        (
            st.header.kmer_size,
            st.header.bloom_width,
            st.header.num_hashes,
            st.registry.len(),
        )
    };

    // the distinct set, preserving first-seen order.
    let distinct: Vec<Vec<u8>> = {
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut distinct = vec![];
        for item in kmers {
            if item.len() != k as usize {
                return err_at!(
                    InvalidInput,
                    msg: "kmer of {} bases, index built for {}", item.len(), k
                );
            }
            if seen.insert(item.clone()) {
                distinct.push(item);
            }
        }
        distinct
    };

    let q = distinct.len();
    if q == 0 || n == 0 {
        return Ok(vec![]);
    }

    let counts = tally(state, nproc, m, h, n, &distinct, threshold, cancel)?;

    let mut hits = vec![];
    {
        let st = err_at!(Fatal, state.read())?;
        for (c, count) in counts.iter().enumerate() {
            let count = *count as usize;
            if (count as f64) / (q as f64) < threshold {
                continue;
            }
            // tombstoned and unissued columns are suppressed.
            match st.registry.lookup(c as u64) {
                Lookup::Name(sample) => hits.push(SearchResult {
                    sample,
                    column: c as u64,
                    containment: (count as f64) / (q as f64),
                    num_kmers_found: count,
                    num_kmers: q,
                }),
                Lookup::Tombstoned | Lookup::Absent => (),
            }
        }
    }

    // descending containment, then ascending column.
    hits.sort_by(|a, b| {
        b.num_kmers_found
            .cmp(&a.num_kmers_found)
            .then(a.column.cmp(&b.column))
    });

    debug!(target: "bigsi", "search {} kmers {} hits", q, hits.len());

    Ok(hits)
}

// Fan the row-AND probes out over a worker pool and reduce the
// per-column tally. With `threshold == 1` a running AND over the
// responses short-circuits the query once it empties.
#[allow(clippy::too_many_arguments)]
fn tally<S>(
    state: &Arc<RwLock<State<S>>>,
    nproc: usize,
    m: u64,
    h: u64,
    n: u64,
    distinct: &[Vec<u8>],
    threshold: f64,
    cancel: Option<&Cancel>,
) -> Result<Vec<u32>>
where
    S: RowStore + Send + Sync + 'static,
{
    let q = distinct.len();
    let n_workers = usize::max(1, usize::min(nproc, q));

    let workers: Vec<thread::Thread<Req, Res, Result<()>>> = (0..n_workers)
        .map(|w| {
            let state = Arc::clone(state);
            thread::Thread::new(&format!("query-{}", w), move |rx| {
                move || worker_loop(state, n, rx)
            })
        })
        .collect();

    let (res_tx, res_rx) = mpsc::channel::<Res>();
    for (idx, item) in distinct.iter().enumerate() {
        let rows: Vec<u64> = hash::positions(item, m, h).collect();
        workers[idx % n_workers]
            .to_tx()
            .request_tx((idx, rows), res_tx.clone())?;
    }
    drop(res_tx);

    let exact = (threshold - 1.0).abs() < f64::EPSILON;
    let mut running: Vec<u8> = vec![0xff; bits::size_of(n as usize)];
    bits::mask_trailing(&mut running, n as usize);

    let mut counts: Vec<u32> = vec![0; n as usize];
    for _ in 0..q {
        if let Some(cancel) = cancel {
            cancel.check("search")?;
        }
        let (_, present) = err_at!(IPCFail, res_rx.recv())?;
        let present = present?;
        for c in bits::ones(&present, n as usize) {
            counts[c] += 1;
        }
        if exact {
            bits::and_into(&mut running, &present);
            if bits::is_zero(&running) {
                // no column carries every kmer, drop the rest.
                return Ok(vec![0; n as usize]);
            }
        }
    }

    for worker in workers {
        worker.join()??;
    }

    Ok(counts)
}

fn worker_loop<S>(
    state: Arc<RwLock<State<S>>>,
    n: u64,
    rx: thread::Rx<Req, Res>,
) -> Result<()>
where
    S: RowStore,
{
    for (req, res_tx) in rx {
        let (idx, rows) = req;
        let out = {
            match state.read() {
                Ok(st) => matrix::and_rows(&st.store, n, &rows),
                Err(err) => err_at!(Fatal, msg: "poisoned lock {}", err),
            }
        };
        if let Some(tx) = res_tx {
            tx.send((idx, out)).ok();
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;
