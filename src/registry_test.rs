use super::*;
use crate::{store::MemStore, Error};

#[test]
fn test_registry_add_resolve() {
    let mut registry = Registry::new();
    assert_eq!(registry.len(), 0);
    assert!(registry.is_empty());

    assert_eq!(registry.add("s0").unwrap(), 0);
    assert_eq!(registry.add("s1").unwrap(), 1);
    assert_eq!(registry.len(), 2);

    assert_eq!(registry.resolve("s0"), Some(0));
    assert_eq!(registry.resolve("s1"), Some(1));
    assert_eq!(registry.resolve("missing"), None);

    assert_eq!(registry.lookup(0), Lookup::Name("s0".to_string()));
    assert_eq!(registry.lookup(7), Lookup::Absent);

    match registry.add("s0") {
        Err(Error::DuplicateSample(_, msg)) => assert_eq!(msg, "s0"),
        res => panic!("unexpected {:?}", res.map(|_| ())),
    }
    assert!(registry.add("").is_err());
}

#[test]
fn test_registry_tombstone() {
    let mut registry = Registry::new();
    registry.add("s0").unwrap();
    registry.add("s1").unwrap();

    assert_eq!(registry.tombstone("s0").unwrap(), 0);
    assert_eq!(registry.lookup(0), Lookup::Tombstoned);
    assert_eq!(registry.resolve("s0"), None);
    assert!(!registry.is_live(0));
    assert!(registry.is_live(1));

    match registry.tombstone("s0") {
        Err(Error::MissingSample(_, msg)) => assert_eq!(msg, "s0"),
        res => panic!("unexpected {:?}", res),
    }

    // tombstoned columns are not reissued, re-adding the name gets a
    // fresh column.
    assert_eq!(registry.add("s0").unwrap(), 2);
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_registry_append_preserves_tombstones() {
    let mut registry = Registry::new();
    registry.add("live").unwrap();

    let column = registry
        .append(SampleRecord {
            name: "gone".to_string(),
            dead: true,
        })
        .unwrap();
    assert_eq!(column, 1);
    assert_eq!(registry.lookup(1), Lookup::Tombstoned);
    assert_eq!(registry.resolve("gone"), None);

    // a live duplicate is refused even via append.
    assert!(registry
        .append(SampleRecord {
            name: "live".to_string(),
            dead: false,
        })
        .is_err());
}

#[test]
fn test_registry_persist_load() {
    let mut store = MemStore::new();

    let mut registry = Registry::new();
    registry.add("s0").unwrap();
    registry.add("s1").unwrap();
    registry.add("s2").unwrap();
    registry.tombstone("s1").unwrap();
    registry.persist(&mut store, 0).unwrap();

    let loaded = Registry::load(&store, 3).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.resolve("s0"), Some(0));
    assert_eq!(loaded.lookup(1), Lookup::Tombstoned);
    assert_eq!(loaded.lookup(2), Lookup::Name("s2".to_string()));

    // header disagreement is flagged.
    assert!(Registry::load(&store, 2).is_err());
    assert!(Registry::load(&store, 4).is_err());
}

#[test]
fn test_registry_persist_from() {
    let mut store = MemStore::new();

    let mut registry = Registry::new();
    registry.add("s0").unwrap();
    registry.persist(&mut store, 0).unwrap();

    registry.add("s1").unwrap();
    registry.add("s2").unwrap();
    // only the new columns hit the store.
    registry.persist(&mut store, 1).unwrap();

    let loaded = Registry::load(&store, 3).unwrap();
    assert_eq!(loaded.resolve("s2"), Some(2));
}
