//! Module `registry` implement the sample registry.
//!
//! A sample is a pair `(name, column)`. Live names are unique, non-empty
//! byte strings and the map between live names and columns is a
//! bijection. Columns are issued monotonically and never reissued;
//! deleting a sample leaves a tombstone that keeps the column occupied.
//! Re-registering a tombstoned name allocates a fresh column.
//!
//! The registry's length `n` is the sole authority for matrix row width.
//! Persistence is one CBOR record per column under the metadata key
//! range, written strictly after the row writes that depend on it.

use cbordata::Cborize;

use std::collections::HashMap;

use crate::{
    store::{RowStore, SAMPLE_BASE},
    util, Error, Result,
};

const SAMPLE_RECORD_VER: u32 = 0x000c0001;

/// Persisted record for one issued column.
#[derive(Clone, Debug, Cborize)]
pub struct SampleRecord {
    pub name: String,
    pub dead: bool,
}

impl SampleRecord {
    const ID: u32 = SAMPLE_RECORD_VER;
}

/// Result of looking up a column, refer [Registry::lookup].
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    Name(String),
    Tombstoned,
    Absent,
}

/// Bijection between live sample names and matrix columns, plus the
/// tombstone set.
#[derive(Clone, Default)]
pub struct Registry {
    records: Vec<SampleRecord>,
    names: HashMap<String, u64>, // live names only
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Load the registry from the store's metadata range. `n` comes from
    /// the index header and must agree with the persisted records.
    pub fn load<S>(store: &S, n: u64) -> Result<Registry>
    where
        S: RowStore,
    {
        let mut registry = Registry::new();

        let keys = store.iter_keys(SAMPLE_BASE..u64::MAX)?;
        for (i, key) in keys.iter().enumerate() {
            if *key != SAMPLE_BASE + (i as u64) {
                return err_at!(InvalidFile, msg: "registry hole at key {}", key);
            }
            let value = match store.get(*key)? {
                Some(value) => value,
                None => return err_at!(Fatal, msg: "registry key {} vanished", key),
            };
            let (record, _) = util::from_cbor_bytes::<SampleRecord>(&value)?;
            registry.append(record)?;
        }

        if registry.len() != n {
            return err_at!(
                InvalidFile,
                msg: "registry has {} columns, header says {}", registry.len(), n
            );
        }

        Ok(registry)
    }

    /// Number of issued columns, including tombstones. This is `n`, the
    /// matrix row width.
    pub fn len(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Register `name` under the next free column and return it.
    pub fn add(&mut self, name: &str) -> Result<u64> {
        if name.is_empty() {
            return err_at!(InvalidInput, msg: "sample name cannot be empty");
        }
        if self.names.contains_key(name) {
            return err_at!(DuplicateSample, msg: "{}", name);
        }

        let column = self.len();
        self.records.push(SampleRecord {
            name: name.to_string(),
            dead: false,
        });
        self.names.insert(name.to_string(), column);
        Ok(column)
    }

    /// Append a record under the next free column, preserving its dead
    /// flag. Merge path, the donor's tombstones stay tombstones.
    pub fn append(&mut self, record: SampleRecord) -> Result<u64> {
        if !record.dead {
            if record.name.is_empty() {
                return err_at!(InvalidFile, msg: "sample name cannot be empty");
            }
            if self.names.contains_key(&record.name) {
                return err_at!(DuplicateSample, msg: "{}", record.name);
            }
            self.names.insert(record.name.clone(), self.len());
        }
        self.records.push(record);
        Ok(self.len() - 1)
    }

    /// Column for a live `name`.
    pub fn resolve(&self, name: &str) -> Option<u64> {
        self.names.get(name).copied()
    }

    /// Name behind `column`, or whether it was tombstoned or never
    /// issued.
    pub fn lookup(&self, column: u64) -> Lookup {
        match self.records.get(column as usize) {
            Some(record) if record.dead => Lookup::Tombstoned,
            Some(record) => Lookup::Name(record.name.clone()),
            None => Lookup::Absent,
        }
    }

    pub fn is_live(&self, column: u64) -> bool {
        matches!(self.records.get(column as usize), Some(record) if !record.dead)
    }

    /// Tombstone the column behind a live `name` and return it.
    pub fn tombstone(&mut self, name: &str) -> Result<u64> {
        let column = match self.names.remove(name) {
            Some(column) => column,
            None => return err_at!(MissingSample, msg: "{}", name),
        };
        self.records[column as usize].dead = true;
        Ok(column)
    }

    /// Iterate `(column, record)` over every issued column.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &SampleRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| (i as u64, record))
    }

    /// Write the records for columns `[from, n)` into the store's
    /// metadata range. Callers order this after the row writes the new
    /// columns depend on.
    pub fn persist<S>(&self, store: &mut S, from: u64) -> Result<()>
    where
        S: RowStore,
    {
        let mut batch = vec![];
        for (column, record) in self.iter().skip(from as usize) {
            batch.push((SAMPLE_BASE + column, util::into_cbor_bytes(record.clone())?));
        }
        store.batch_put(batch)
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
