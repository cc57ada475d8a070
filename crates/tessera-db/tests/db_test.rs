//! End-to-end validation: engine durability and recovery, relational
//! operations, secondary indexes, scanners, and transactions.

use bytes::Bytes;
use tempfile::tempdir;
use tessera_common::{EngineConfig, TesseraError};
use tessera_db::codec::encode_key;
use tessera_db::{
    Database, IndexDef, KvEngine, Record, TableDef, TxManager, Value, ValueType,
    MAX_BYTES_PK_LEN,
};
use tessera_wal::{WalRecord, WalWriter};

fn config(dir: &tempfile::TempDir) -> EngineConfig {
    EngineConfig::new(dir.path().join("data.db"), dir.path().join("data.wal"))
}

fn people() -> TableDef {
    TableDef {
        name: "people".to_string(),
        cols: vec!["id".to_string(), "name".to_string(), "age".to_string()],
        types: vec![ValueType::Int64, ValueType::Bytes, ValueType::Int64],
        pkey_n: 1,
        prefix: 3,
        indexes: vec![IndexDef {
            name: "idx_name".to_string(),
            cols: vec!["name".to_string()],
            prefix: 4,
        }],
    }
}

fn person(id: i64, name: &str, age: i64) -> Record {
    Record::new()
        .add_int64("id", id)
        .add_bytes("name", name.as_bytes().to_vec())
        .add_int64("age", age)
}

// =========================================================================
// Engine: durability and recovery
// =========================================================================

#[test]
fn test_engine_set_get_del() {
    let dir = tempdir().unwrap();
    let mut engine = KvEngine::open(&config(&dir)).unwrap();

    engine.set(b"k1", b"v1").unwrap();
    engine.set(b"k2", b"v2").unwrap();

    assert_eq!(engine.get(b"k1").unwrap().unwrap().as_ref(), b"v1");
    assert!(engine.get(b"missing").unwrap().is_none());

    assert!(engine.del(b"k1").unwrap());
    assert!(!engine.del(b"k1").unwrap());
    assert!(engine.get(b"k1").unwrap().is_none());
}

#[test]
fn test_engine_scan_inclusive_bounds() {
    let dir = tempdir().unwrap();
    let mut engine = KvEngine::open(&config(&dir)).unwrap();

    for k in [b"a", b"b", b"c", b"d"] {
        engine.set(k, b"v").unwrap();
    }

    let mut seen = Vec::new();
    engine
        .scan(b"b", Some(b"c"), |key, _| {
            seen.push(key.to_vec());
            true
        })
        .unwrap();
    assert_eq!(seen, vec![b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_engine_survives_reopen() {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);

    {
        let mut engine = KvEngine::open(&cfg).unwrap();
        for i in 0..100i64 {
            engine
                .set(&i.to_be_bytes(), format!("v{}", i).as_bytes())
                .unwrap();
        }
        engine.close().unwrap();
    }

    let engine = KvEngine::open(&cfg).unwrap();
    for i in 0..100i64 {
        let val = engine.get(&i.to_be_bytes()).unwrap().unwrap();
        assert_eq!(val.as_ref(), format!("v{}", i).as_bytes());
    }
}

#[test]
fn test_recovery_applies_wal_after_crash() {
    // Crash model: the WAL append fsynced but the process died before the
    // tree mutation reached the data file.
    let dir = tempdir().unwrap();
    let cfg = config(&dir);

    {
        let mut engine = KvEngine::open(&cfg).unwrap();
        engine.set(b"before", b"1").unwrap();
        engine.close().unwrap();
    }

    {
        let mut wal = WalWriter::open(&cfg.wal_path, true).unwrap();
        wal.append(&WalRecord::set(&b"crashed"[..], &b"2"[..]))
            .unwrap();
        wal.append(&WalRecord::del(&b"before"[..])).unwrap();
    }

    let engine = KvEngine::open(&cfg).unwrap();
    assert_eq!(engine.get(b"crashed").unwrap().unwrap().as_ref(), b"2");
    assert!(engine.get(b"before").unwrap().is_none());

    // Replayed operations are durable in the data file and the WAL is
    // truncated.
    assert_eq!(std::fs::metadata(&cfg.wal_path).unwrap().len(), 0);
}

#[test]
fn test_recovery_replays_in_wal_order() {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);

    {
        let mut engine = KvEngine::open(&cfg).unwrap();
        engine.close().unwrap();
    }
    {
        let mut wal = WalWriter::open(&cfg.wal_path, true).unwrap();
        wal.append(&WalRecord::set(&b"k"[..], &b"old"[..])).unwrap();
        wal.append(&WalRecord::set(&b"k"[..], &b"new"[..])).unwrap();
    }

    let engine = KvEngine::open(&cfg).unwrap();
    assert_eq!(engine.get(b"k").unwrap().unwrap().as_ref(), b"new");
}

#[test]
fn test_recovery_ignores_torn_tail() {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);

    {
        let mut engine = KvEngine::open(&cfg).unwrap();
        engine.close().unwrap();
    }
    {
        let mut wal = WalWriter::open(&cfg.wal_path, true).unwrap();
        wal.append(&WalRecord::set(&b"complete"[..], &b"1"[..]))
            .unwrap();
        // A torn record: only part of the serialized bytes hit the disk.
        let torn = WalRecord::set(&b"torn"[..], &b"2"[..]).serialize();
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&cfg.wal_path)
            .unwrap();
        file.write_all(&torn[..torn.len() - 3]).unwrap();
    }

    let engine = KvEngine::open(&cfg).unwrap();
    assert_eq!(engine.get(b"complete").unwrap().unwrap().as_ref(), b"1");
    assert!(engine.get(b"torn").unwrap().is_none());
}

#[test]
fn test_recovery_is_idempotent() {
    // A crash between replay and truncate leaves already-applied records
    // in the WAL; replaying them again must be harmless.
    let dir = tempdir().unwrap();
    let cfg = config(&dir);

    {
        let mut engine = KvEngine::open(&cfg).unwrap();
        engine.set(b"applied", b"v").unwrap();
        engine.close().unwrap();
    }
    {
        // Re-append the same operation as if truncate never happened.
        let mut wal = WalWriter::open(&cfg.wal_path, true).unwrap();
        wal.append(&WalRecord::set(&b"applied"[..], &b"v"[..]))
            .unwrap();
    }

    let engine = KvEngine::open(&cfg).unwrap();
    assert_eq!(engine.get(b"applied").unwrap().unwrap().as_ref(), b"v");
}

// =========================================================================
// Relational layer
// =========================================================================

#[test]
fn test_insert_then_get_roundtrip() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = people();

    db.insert(&tdef, &mut person(1, "Alice", 30)).unwrap();

    let mut rec = Record::new().add_int64("id", 1);
    db.get(&tdef, &mut rec).unwrap();
    assert_eq!(rec.get("name"), Some(&Value::bytes(&b"Alice"[..])));
    assert_eq!(rec.get("age"), Some(&Value::Int64(30)));
}

#[test]
fn test_insert_conflict_and_upsert() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = people();

    db.insert(&tdef, &mut person(1, "Alice", 30)).unwrap();
    let err = db.insert(&tdef, &mut person(1, "Alice", 31)).unwrap_err();
    assert!(matches!(err, TesseraError::Conflict));

    db.upsert(&tdef, &mut person(1, "Alice", 31)).unwrap();
    let mut rec = Record::new().add_int64("id", 1);
    db.get(&tdef, &mut rec).unwrap();
    assert_eq!(rec.get("age"), Some(&Value::Int64(31)));
}

#[test]
fn test_upsert_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = people();

    db.upsert(&tdef, &mut person(9, "Ida", 40)).unwrap();
    db.upsert(&tdef, &mut person(9, "Ida", 40)).unwrap();

    let mut count = 0;
    db.define_table(tdef.clone()).unwrap();
    db.scan("people", None, None, |_| {
        count += 1;
        true
    })
    .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_update_missing_row() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = people();

    let err = db.update(&tdef, &mut person(5, "Nobody", 0)).unwrap_err();
    assert!(matches!(err, TesseraError::NotFound));
}

#[test]
fn test_delete_removes_row_and_index() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = people();

    db.insert(&tdef, &mut person(1, "Alice", 30)).unwrap();
    db.insert(&tdef, &mut person(2, "Bob", 25)).unwrap();

    db.delete(&tdef, &mut Record::new().add_int64("id", 2))
        .unwrap();

    let mut rec = Record::new().add_int64("id", 2);
    assert!(matches!(
        db.get(&tdef, &mut rec).unwrap_err(),
        TesseraError::NotFound
    ));

    // The index entry is gone too: a secondary scan for Bob yields
    // nothing.
    let probe = Record::new()
        .add_int64("id", 0)
        .add_bytes("name", &b"Bob"[..])
        .add_int64("age", 0);
    let idx = &tdef.indexes[0];
    let scanner = db
        .new_scanner(&tdef, Some(idx), Some(&probe), Some(&probe))
        .unwrap();
    assert!(!scanner.valid());
}

#[test]
fn test_primary_scan_range() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = people();
    db.define_table(tdef.clone()).unwrap();

    for id in 1..=20 {
        db.insert(&tdef, &mut person(id, &format!("p{}", id), id + 100))
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut scanner = db
        .new_scanner(
            &tdef,
            None,
            Some(&person(5, "", 0)),
            Some(&person(15, "", 0)),
        )
        .unwrap();
    while scanner.valid() {
        let rec = scanner.deref().unwrap();
        seen.push(rec.get("id").unwrap().as_int64().unwrap());
        scanner.next().unwrap();
    }
    assert_eq!(seen, (5..=15).collect::<Vec<_>>());
}

#[test]
fn test_secondary_scan_finds_row_by_name() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = people();

    db.insert(&tdef, &mut person(1, "Alice", 30)).unwrap();
    db.insert(&tdef, &mut person(2, "Bob", 25)).unwrap();
    db.insert(&tdef, &mut person(3, "Charlie", 35)).unwrap();

    let probe = person(0, "Bob", 0);
    let idx = &tdef.indexes[0];
    let mut scanner = db
        .new_scanner(&tdef, Some(idx), Some(&probe), Some(&probe))
        .unwrap();

    let mut rows = Vec::new();
    while scanner.valid() {
        rows.push(scanner.deref().unwrap());
        scanner.next().unwrap();
    }

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Int64(2)));
    assert_eq!(rows[0].get("age"), Some(&Value::Int64(25)));
}

#[test]
fn test_secondary_scan_covers_duplicate_names() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = people();

    db.insert(&tdef, &mut person(1, "Sam", 20)).unwrap();
    db.insert(&tdef, &mut person(2, "Sam", 21)).unwrap();
    db.insert(&tdef, &mut person(3, "Tess", 22)).unwrap();

    let probe = person(0, "Sam", 0);
    let idx = &tdef.indexes[0];
    let mut scanner = db
        .new_scanner(&tdef, Some(idx), Some(&probe), Some(&probe))
        .unwrap();

    let mut ids = Vec::new();
    while scanner.valid() {
        ids.push(scanner.deref().unwrap().get("id").unwrap().as_int64().unwrap());
        scanner.next().unwrap();
    }
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_update_moves_index_entry() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = people();

    db.insert(&tdef, &mut person(1, "Old", 30)).unwrap();
    db.update(&tdef, &mut person(1, "New", 30)).unwrap();

    let idx = &tdef.indexes[0];

    let old_probe = person(0, "Old", 0);
    let scanner = db
        .new_scanner(&tdef, Some(idx), Some(&old_probe), Some(&old_probe))
        .unwrap();
    assert!(!scanner.valid());

    let new_probe = person(0, "New", 0);
    let scanner = db
        .new_scanner(&tdef, Some(idx), Some(&new_probe), Some(&new_probe))
        .unwrap();
    assert!(scanner.valid());
}

#[test]
fn test_scanner_stays_inside_namespace() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = people();
    db.define_table(tdef.clone()).unwrap();

    // Rows exist in the table namespace (prefix 3) and index entries in
    // prefix 4; an unbounded primary scan must not walk into them.
    db.insert(&tdef, &mut person(1, "Alice", 30)).unwrap();
    db.insert(&tdef, &mut person(2, "Bob", 25)).unwrap();

    let mut count = 0;
    db.scan("people", None, None, |_| {
        count += 1;
        true
    })
    .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_index_entry_without_row_is_corrupt() {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);
    let tdef = people();

    {
        // Plant an index entry with no backing row.
        let mut engine = KvEngine::open(&cfg).unwrap();
        let idx_key = encode_key(
            tdef.indexes[0].prefix,
            &[Value::bytes(&b"Ghost"[..]), Value::int64(99)],
        );
        engine.set(&idx_key, &[]).unwrap();
        engine.close().unwrap();
    }

    let db = Database::open(&cfg).unwrap();
    let probe = person(0, "Ghost", 0);
    let idx = &tdef.indexes[0];
    let scanner = db
        .new_scanner(&tdef, Some(idx), Some(&probe), Some(&probe))
        .unwrap();
    assert!(scanner.valid());
    assert!(matches!(
        scanner.deref().unwrap_err(),
        TesseraError::Corrupt { .. }
    ));
}

#[test]
fn test_rows_survive_reopen() {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);
    let tdef = people();

    {
        let mut db = Database::open(&cfg).unwrap();
        db.insert(&tdef, &mut person(1, "Alice", 30)).unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&cfg).unwrap();
    let mut rec = Record::new().add_int64("id", 1);
    db.get(&tdef, &mut rec).unwrap();
    assert_eq!(rec.get("name"), Some(&Value::bytes(&b"Alice"[..])));
}

fn events() -> TableDef {
    TableDef {
        name: "events".to_string(),
        cols: vec!["tag".to_string(), "kind".to_string(), "seq".to_string()],
        types: vec![ValueType::Bytes, ValueType::Bytes, ValueType::Int64],
        pkey_n: 1,
        prefix: 5,
        indexes: vec![IndexDef {
            name: "idx_kind".to_string(),
            cols: vec!["kind".to_string()],
            prefix: 6,
        }],
    }
}

fn event(tag: &[u8], kind: &str, seq: i64) -> Record {
    Record::new()
        .add_bytes("tag", tag.to_vec())
        .add_bytes("kind", kind.as_bytes().to_vec())
        .add_int64("seq", seq)
}

#[test]
fn test_bytes_pk_over_sentinel_length_rejected() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = events();

    let err = db
        .insert(&tdef, &mut event(&[0u8; MAX_BYTES_PK_LEN + 1], "alert", 1))
        .unwrap_err();
    assert!(matches!(err, TesseraError::KeyTooLarge { .. }));

    let err = db
        .upsert(&tdef, &mut event(&[0u8; MAX_BYTES_PK_LEN + 1], "alert", 1))
        .unwrap_err();
    assert!(matches!(err, TesseraError::KeyTooLarge { .. }));
}

#[test]
fn test_secondary_scan_covers_maximum_length_bytes_pk() {
    let dir = tempdir().unwrap();
    let mut db = Database::open(&config(&dir)).unwrap();
    let tdef = events();

    // The worst-case key sits exactly on the closing sentinel: a
    // maximum-length all-0xFF primary key.
    db.insert(&tdef, &mut event(b"aaa", "alert", 1)).unwrap();
    db.insert(&tdef, &mut event(&[0xFF; MAX_BYTES_PK_LEN], "alert", 2))
        .unwrap();
    db.insert(&tdef, &mut event(b"zzz", "notice", 3)).unwrap();

    let probe = event(b"", "alert", 0);
    let idx = &tdef.indexes[0];
    let mut scanner = db
        .new_scanner(&tdef, Some(idx), Some(&probe), Some(&probe))
        .unwrap();

    let mut seqs = Vec::new();
    while scanner.valid() {
        seqs.push(scanner.deref().unwrap().get("seq").unwrap().as_int64().unwrap());
        scanner.next().unwrap();
    }
    seqs.sort_unstable();
    assert_eq!(seqs, vec![1, 2]);
}

// =========================================================================
// Transactions
// =========================================================================

#[test]
fn test_tx_read_your_own_writes() {
    let dir = tempdir().unwrap();
    let mgr = TxManager::open(&config(&dir)).unwrap();

    let mut tx = mgr.begin();
    tx.set(b"k", b"staged").unwrap();
    assert_eq!(tx.get(b"k").unwrap().unwrap().as_ref(), b"staged");

    // Not visible outside until commit.
    assert!(mgr.get(b"k").unwrap().is_none());

    tx.commit().unwrap();
    assert_eq!(mgr.get(b"k").unwrap().unwrap().as_ref(), b"staged");
}

#[test]
fn test_tx_delete_shadows_engine_state() {
    let dir = tempdir().unwrap();
    let mgr = TxManager::open(&config(&dir)).unwrap();
    mgr.set(b"k", b"v").unwrap();

    let mut tx = mgr.begin();
    tx.del(b"k").unwrap();
    assert!(tx.get(b"k").unwrap().is_none());

    tx.commit().unwrap();
    assert!(mgr.get(b"k").unwrap().is_none());
}

#[test]
fn test_tx_conflict_on_read_written_by_later_commit() {
    let dir = tempdir().unwrap();
    let mgr = TxManager::open(&config(&dir)).unwrap();
    mgr.set(b"shared", b"0").unwrap();

    let mut tx1 = mgr.begin();
    let _ = tx1.get(b"shared").unwrap();

    let mut tx2 = mgr.begin();
    tx2.set(b"shared", b"2").unwrap();
    tx2.commit().unwrap();

    tx1.set(b"other", b"1").unwrap();
    assert!(matches!(tx1.commit().unwrap_err(), TesseraError::TxConflict));
}

#[test]
fn test_tx_no_conflict_on_disjoint_keys() {
    let dir = tempdir().unwrap();
    let mgr = TxManager::open(&config(&dir)).unwrap();

    let mut tx1 = mgr.begin();
    let _ = tx1.get(b"a").unwrap();

    let mut tx2 = mgr.begin();
    tx2.set(b"b", b"2").unwrap();
    tx2.commit().unwrap();

    tx1.set(b"a", b"1").unwrap();
    tx1.commit().unwrap();

    assert_eq!(mgr.get(b"a").unwrap().unwrap().as_ref(), b"1");
    assert_eq!(mgr.get(b"b").unwrap().unwrap().as_ref(), b"2");
}

#[test]
fn test_tx_abort_discards_pending() {
    let dir = tempdir().unwrap();
    let mgr = TxManager::open(&config(&dir)).unwrap();

    let mut tx = mgr.begin();
    tx.set(b"gone", b"v").unwrap();
    tx.abort();

    assert!(mgr.get(b"gone").unwrap().is_none());
}

#[test]
fn test_tx_scan_overlays_pending() {
    let dir = tempdir().unwrap();
    let mgr = TxManager::open(&config(&dir)).unwrap();
    mgr.set(b"a", b"1").unwrap();
    mgr.set(b"b", b"2").unwrap();

    let mut tx = mgr.begin();
    tx.set(b"a", b"staged").unwrap();
    tx.del(b"b").unwrap();

    let mut seen = Vec::new();
    tx.scan(b"a", None, |key, val| {
        seen.push((key.to_vec(), val.to_vec()));
        true
    })
    .unwrap();

    assert_eq!(seen, vec![(b"a".to_vec(), b"staged".to_vec())]);

    let bytes_val: Bytes = tx.get(b"a").unwrap().unwrap();
    assert_eq!(bytes_val.as_ref(), b"staged");
}
