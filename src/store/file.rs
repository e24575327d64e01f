//! Module `file` implement the durable row store engine.
//!
//! The whole key space lives in memory as an ordered map and is made
//! durable as a single self-describing CBOR snapshot, staged to a
//! temporary sibling and renamed over the data file, so a crashed commit
//! leaves the previous snapshot intact. An advisory lock on a separate
//! lock file, exclusive for writable handles and shared for read-only
//! handles, enforces the single-writer multi-reader discipline across
//! processes.

use cbordata::Cborize;
use fs2::FileExt;

use std::{collections::BTreeMap, ffi, fs, ops, path};

use crate::{store::RowStore, util, Error, Result};

/// Name of the snapshot file under the index directory.
pub const STORE_FILE: &str = "bigsi.store";
/// Name of the lock file under the index directory.
pub const LOCK_FILE: &str = "bigsi.lock";

const ENTRY_VER: u32 = 0x000a0001;

/// Compose the snapshot file location under `dir`.
pub fn to_store_location(dir: &ffi::OsStr) -> ffi::OsString {
    let loc: path::PathBuf = [dir, ffi::OsStr::new(STORE_FILE)].iter().collect();
    loc.into_os_string()
}

/// Compose the lock file location under `dir`.
pub fn to_lock_location(dir: &ffi::OsStr) -> ffi::OsString {
    let loc: path::PathBuf = [dir, ffi::OsStr::new(LOCK_FILE)].iter().collect();
    loc.into_os_string()
}

// one key/value pair inside the snapshot.
#[derive(Clone, Cborize)]
struct Entry {
    key: u64,
    value: Vec<u8>,
}

impl Entry {
    const ID: u32 = ENTRY_VER;
}

/// Durable row store engine, refer to [module docs][self] for the
/// on-disk discipline.
pub struct FileStore {
    dir: ffi::OsString,
    writable: bool,
    lock_fd: fs::File,
    entries: BTreeMap<u64, Vec<u8>>,
}

impl FileStore {
    /// Create a fresh store under `dir`. Fails if a store is already
    /// present, unless `force`, in which case the old one is clobbered.
    pub fn create(dir: &ffi::OsStr, force: bool) -> Result<FileStore> {
        err_at!(IOError, fs::create_dir_all(dir))?;

        let store_loc = to_store_location(dir);
        if path::Path::new(&store_loc).exists() && !force {
            return err_at!(InvalidInput, msg: "store exists at {:?}", store_loc);
        }

        let lock_fd = open_lock_file(dir)?;
        err_at!(IOError, lock_fd.try_lock_exclusive(), "database locked {:?}", dir)?;

        let mut store = FileStore {
            dir: dir.to_os_string(),
            writable: true,
            lock_fd,
            entries: BTreeMap::new(),
        };
        store.commit()?;

        Ok(store)
    }

    /// Open an existing store under `dir`. A writable handle takes the
    /// exclusive lock, a read-only handle takes the shared lock.
    pub fn open(dir: &ffi::OsStr, writable: bool) -> Result<FileStore> {
        let store_loc = to_store_location(dir);
        if !path::Path::new(&store_loc).exists() {
            return err_at!(InvalidFile, msg: "no store at {:?}", store_loc);
        }

        let lock_fd = open_lock_file(dir)?;
        if writable {
            err_at!(IOError, lock_fd.try_lock_exclusive(), "database locked {:?}", dir)?;
        } else {
            err_at!(IOError, lock_fd.try_lock_shared(), "database locked {:?}", dir)?;
        }

        let data = err_at!(IOError, fs::read(path::Path::new(&store_loc)))?;
        let (items, _) = util::from_cbor_bytes::<Vec<Entry>>(&data)?;
        let entries = items.into_iter().map(|e| (e.key, e.value)).collect();

        let store = FileStore {
            dir: dir.to_os_string(),
            writable,
            lock_fd,
            entries,
        };

        Ok(store)
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn to_dir(&self) -> ffi::OsString {
        self.dir.clone()
    }

    /// Release the advisory lock and drop the handle.
    pub fn close(self) -> Result<()> {
        err_at!(IOError, self.lock_fd.unlock())?;
        Ok(())
    }

    /// Close this store and remove its files from disk.
    pub fn purge(self) -> Result<()> {
        if !self.writable {
            return err_at!(InvalidInput, msg: "cannot purge read-only store");
        }

        let dir = self.dir.clone();
        fs::remove_file(path::Path::new(&to_store_location(&dir))).ok();
        self.close()?;
        fs::remove_file(path::Path::new(&to_lock_location(&dir))).ok();
        fs::remove_dir(path::Path::new(&dir)).ok(); // only when empty
        Ok(())
    }
}

impl RowStore for FileStore {
    fn get(&self, key: u64) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(&key).cloned())
    }

    fn put(&mut self, key: u64, value: Vec<u8>) -> Result<()> {
        if !self.writable {
            return err_at!(InvalidInput, msg: "read-only store");
        }
        self.entries.insert(key, value);
        Ok(())
    }

    fn batch_put<I>(&mut self, iter: I) -> Result<()>
    where
        I: IntoIterator<Item = (u64, Vec<u8>)>,
    {
        if !self.writable {
            return err_at!(InvalidInput, msg: "read-only store");
        }
        for (key, value) in iter {
            self.entries.insert(key, value);
        }
        Ok(())
    }

    fn iter_keys(&self, within: ops::Range<u64>) -> Result<Vec<u64>> {
        Ok(self.entries.range(within).map(|(k, _)| *k).collect())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.writable {
            return err_at!(InvalidInput, msg: "read-only store");
        }

        let items: Vec<Entry> = self
            .entries
            .iter()
            .map(|(key, value)| Entry {
                key: *key,
                value: value.clone(),
            })
            .collect();
        let data = util::into_cbor_bytes(items)?;

        util::atomic_replace(&to_store_location(&self.dir), &data)
    }
}

fn open_lock_file(dir: &ffi::OsStr) -> Result<fs::File> {
    let loc = to_lock_location(dir);
    let mut opts = fs::OpenOptions::new();
    err_at!(
        IOError,
        opts.read(true).write(true).create(true).open(path::Path::new(&loc))
    )
}

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;
