//! Module implement common utility functions and types.

use cbordata::{Cbor, FromCbor, IntoCbor};

use std::{
    ffi, fs, path,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc,
    },
};

use crate::{Error, Result};

pub mod bits;
pub mod thread;

pub use thread::Thread;

/// Serialize a value into its CBOR byte-string form.
pub fn into_cbor_bytes<T>(val: T) -> Result<Vec<u8>>
where
    T: IntoCbor,
{
    let cbor = err_at!(FailCbor, val.into_cbor())?;
    let mut out: Vec<u8> = Vec::default();
    match err_at!(FailCbor, cbor.encode(&mut out))? {
        m if m == out.len() => Ok(out),
        m => err_at!(Fatal, msg: "encoder reported {} bytes for a {}-byte buffer", m, out.len()),
    }
}

/// Deserialize a value from its CBOR byte-string form. Return the value
/// along with the number of bytes consumed.
pub fn from_cbor_bytes<T>(buf: &[u8]) -> Result<(T, usize)>
where
    T: FromCbor,
{
    let mut rdr = buf;
    let (cbor, m) = err_at!(FailCbor, Cbor::decode(&mut rdr))?;
    let val = err_at!(FailCbor, T::from_cbor(cbor))?;
    Ok((val, m))
}

// truncate-and-create, the target is replaced wholesale.
pub fn create_file_w(loc: &ffi::OsStr) -> Result<fs::File> {
    let target = path::Path::new(loc);
    match target.parent() {
        Some(parent) => err_at!(IOError, fs::create_dir_all(parent))?,
        None => return err_at!(InvalidFile, msg: "no parent dir for {:?}", loc),
    };

    let mut opts = fs::OpenOptions::new();
    err_at!(IOError, opts.write(true).create(true).truncate(true).open(target))
}

pub fn sync_write(fd: &mut fs::File, data: &[u8]) -> Result<usize> {
    use std::io::Write;

    match err_at!(IOError, fd.write(data))? {
        m if m == data.len() => {
            err_at!(IOError, fd.sync_all())?;
            Ok(m)
        }
        m => err_at!(IOError, msg: "short write {}/{}", m, data.len()),
    }
}

/// Replace `loc` with `data` in a single step, by staging the bytes in a
/// temporary sibling and renaming it over the target.
pub fn atomic_replace(loc: &ffi::OsStr, data: &[u8]) -> Result<()> {
    let staged = {
        let mut staged = loc.to_os_string();
        staged.push(".tmp");
        staged
    };

    let mut fd = create_file_w(&staged)?;
    sync_write(&mut fd, data)?;
    drop(fd);

    err_at!(IOError, fs::rename(path::Path::new(&staged), path::Path::new(loc)))
}

/// Cooperative cancellation token.
///
/// Clones share the same flag. Long running operations, query and build,
/// poll the token at their natural suspension boundaries and bail out
/// with [Error::Cancelled] once the flag is raised.
#[derive(Clone, Default)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
}

impl Cancel {
    pub fn new() -> Cancel {
        Cancel::default()
    }

    /// Raise the flag, every clone observes it.
    pub fn cancel(&self) {
        self.flag.store(true, SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(SeqCst)
    }

    /// Convert a raised flag into an error value.
    pub fn check(&self, context: &str) -> Result<()> {
        if self.is_cancelled() {
            err_at!(Cancelled, msg: "{}", context)
        } else {
            Ok(())
        }
    }
}
