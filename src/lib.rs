//! Package implement BIGSI, a BItsliced Genomic Signature Index.
//!
//! Every indexed sample is summarised as a fixed-width [bloom filter][bloom]
//! over its canonical k-mer content. The index stores the filters as a bit
//! matrix that is transposed relative to the natural layout, rows are bloom
//! filter bit positions and columns are samples, so that probing a k-mer
//! reduces to fetching `h` rows and intersecting them.
//!
//! **Inventory of modules**
//!
//! * [kmer] enumerate canonical k-mers over a DNA sequence window.
//! * [hash] map a canonical k-mer to `h` bit positions in `[0, m)`.
//! * [bloom] fixed-width bloom filter, one per sample, with a file format.
//! * [store] row store, a persistent map from integer keys to byte-strings.
//! * [registry] bijection between sample names and matrix columns.
//! * [matrix] row oriented view over the store, AND-probing and row updates.
//! * [bigsi] the index facade, build/merge pipeline and query engine.
//!
//! Use [Bigsi] to create, open, build and search an index:
//!
//! ```ignore
//! let mut config = Config::new(dir);
//! config.set_kmer_size(31).set_bloom_filter(25_000_000, 3);
//! let index = Bigsi::create(config, false /*force*/)?;
//! index.build(&bloom_files, None, &BuildParams::new())?;
//! let hits = index.search(b"ACACAAACCATGGCCGGACGCAGC", 1.0)?;
//! ```
//!
//! [bloom]: https://en.wikipedia.org/wiki/Bloom_filter

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Macro variants:
///
/// * `err_at!(variant, msg: format-string, args ..)`
/// * `err_at!(variant, error-value)`
/// * `err_at!(variant, error-value, format-string, args ..)`
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

pub mod bigsi;
pub mod bloom;
pub mod hash;
pub mod kmer;
pub mod matrix;
pub mod registry;
pub mod store;
pub mod util;

pub use crate::bigsi::{Bigsi, BuildParams, Config, Header, Mode, SearchResult, Stats};
pub use crate::bloom::Bloom;
pub use crate::kmer::Kmers;
pub use crate::registry::Registry;
pub use crate::store::{FileStore, MemStore, RowStore};
pub use crate::util::Cancel;

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the failing
/// module's file and line number, and a message.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Supplied API arguments are invalid.
    InvalidInput(String, String),
    /// Index or bloom filter file is invalid.
    InvalidFile(String, String),
    /// De-serialization failed.
    FailCbor(String, String),
    /// Integer conversion failed.
    FailConvert(String, String),
    /// Error from underlying file-system.
    IOError(String, String),
    /// Inter-thread communication failed.
    IPCFail(String, String),
    /// Worker thread failed.
    ThreadFail(String, String),
    /// Header parameters `(k, m, h, hasher_id)` disagree between the
    /// index and its caller or peer.
    ParameterMismatch(String, String),
    /// Sample name already registered and live.
    DuplicateSample(String, String),
    /// Sample name not present in the registry.
    MissingSample(String, String),
    /// Persisted row is wider than the registry's column count allows.
    CorruptRow(String, String),
    /// Build cannot fit within the configured memory cap.
    ResourceExceeded(String, String),
    /// Operation was cooperatively cancelled.
    Cancelled(String, String),
    /// Invariant failed, typically means a bug in this package.
    Fatal(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            InvalidInput(p, m) => write!(f, "{} InvalidInput: {}", p, m),
            InvalidFile(p, m) => write!(f, "{} InvalidFile: {}", p, m),
            FailCbor(p, m) => write!(f, "{} FailCbor: {}", p, m),
            FailConvert(p, m) => write!(f, "{} FailConvert: {}", p, m),
            IOError(p, m) => write!(f, "{} IOError: {}", p, m),
            IPCFail(p, m) => write!(f, "{} IPCFail: {}", p, m),
            ThreadFail(p, m) => write!(f, "{} ThreadFail: {}", p, m),
            ParameterMismatch(p, m) => write!(f, "{} ParameterMismatch: {}", p, m),
            DuplicateSample(p, m) => write!(f, "{} DuplicateSample: {}", p, m),
            MissingSample(p, m) => write!(f, "{} MissingSample: {}", p, m),
            CorruptRow(p, m) => write!(f, "{} CorruptRow: {}", p, m),
            ResourceExceeded(p, m) => write!(f, "{} ResourceExceeded: {}", p, m),
            Cancelled(p, m) => write!(f, "{} Cancelled: {}", p, m),
            Fatal(p, m) => write!(f, "{} Fatal: {}", p, m),
        }
    }
}

impl error::Error for Error {}

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;
