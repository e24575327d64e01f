//! Module `mem` implement an ephemeral row store.
//!
//! Same contract as [FileStore][crate::store::FileStore] without the
//! persistence, commit is a no-op. Useful for embedding a throw-away
//! index and as the engine under the unit tests of the matrix, build and
//! query modules.

use std::{collections::BTreeMap, ops};

use crate::{store::RowStore, Result};

#[derive(Clone, Default)]
pub struct MemStore {
    entries: BTreeMap<u64, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RowStore for MemStore {
    fn get(&self, key: u64) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(&key).cloned())
    }

    fn put(&mut self, key: u64, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn batch_put<I>(&mut self, iter: I) -> Result<()>
    where
        I: IntoIterator<Item = (u64, Vec<u8>)>,
    {
        for (key, value) in iter {
            self.entries.insert(key, value);
        }
        Ok(())
    }

    fn iter_keys(&self, within: ops::Range<u64>) -> Result<Vec<u64>> {
        Ok(self.entries.range(within).map(|(k, _)| *k).collect())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}
