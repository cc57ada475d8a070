//! WAL-backed key-value engine.

use bytes::Bytes;
use std::path::Path;
use tessera_common::{EngineConfig, Result, TesseraError};
use tessera_storage::{BPlusTree, BTreeIter, MAX_KEY_SIZE, MAX_VAL_SIZE};
use tessera_wal::{read_all, WalOp, WalRecord, WalWriter};
use tracing::{debug, info};

/// The durable key-value surface: a disk B+tree fronted by a write-ahead
/// log.
///
/// Every mutation is appended to the WAL and fsynced before the tree is
/// touched, so a crash after the fsync is recoverable: on the next open
/// the log is replayed into the tree, the tree is flushed and synced, and
/// the log is truncated.
pub struct KvEngine {
    tree: BPlusTree,
    wal: WalWriter,
}

impl KvEngine {
    /// Opens the engine, running recovery if the WAL holds committed
    /// operations that may not have reached the data file.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let tree = BPlusTree::open(&config.data_path, config.fsync_enabled)?;
        let wal = WalWriter::open(&config.wal_path, config.fsync_enabled)?;

        let mut engine = Self { tree, wal };
        engine.recover()?;
        Ok(engine)
    }

    /// Convenience constructor from the two file paths.
    pub fn open_paths(data_path: &Path, wal_path: &Path) -> Result<Self> {
        Self::open(&EngineConfig::new(data_path, wal_path))
    }

    /// Replays the WAL into the tree, then truncates it once the tree is
    /// durable. Replay is idempotent, so a crash anywhere in here leaves
    /// a recoverable state.
    fn recover(&mut self) -> Result<()> {
        let contents = self.wal.read_contents()?;
        let records = read_all(&contents)?;
        if records.is_empty() {
            if !contents.is_empty() {
                // Only a torn intent was present; discard it.
                self.wal.truncate()?;
            }
            return Ok(());
        }

        let count = records.len();
        for record in records {
            match record.op {
                WalOp::Set => self.tree.set(&record.key, &record.val)?,
                WalOp::Del => {
                    self.tree.delete(&record.key)?;
                }
            }
        }

        self.tree.flush()?;
        self.tree.sync()?;
        self.wal.truncate()?;

        info!(count, "replayed WAL into data file");
        Ok(())
    }

    /// Rejects keys and values the tree could never store. Checked
    /// before the WAL append: a record the tree would refuse must not
    /// become durable, or replay would fail on the next open.
    fn check_sizes(key: &[u8], val: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_SIZE {
            return Err(TesseraError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        if val.len() > MAX_VAL_SIZE {
            return Err(TesseraError::ValueTooLarge {
                size: val.len(),
                max: MAX_VAL_SIZE,
            });
        }
        Ok(())
    }

    /// Point lookup. No mutation.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.tree.find(key)
    }

    /// Upsert. Durable once this returns.
    pub fn set(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        Self::check_sizes(key, val)?;
        self.wal.append(&WalRecord::set(
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(val),
        ))?;
        self.tree.set(key, val)
    }

    /// Deletes a key; returns whether it existed.
    pub fn del(&mut self, key: &[u8]) -> Result<bool> {
        Self::check_sizes(key, &[])?;
        self.wal
            .append(&WalRecord::del(Bytes::copy_from_slice(key)))?;
        self.tree.delete(key)
    }

    /// Range scan over `[start, end]`, both inclusive; the visitor
    /// returns `false` to stop.
    pub fn scan<F>(&self, start: &[u8], end: Option<&[u8]>, visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.tree.scan(start, end, visit)
    }

    /// Positions an iterator at the first key `>=` the target.
    pub fn seek_ge(&self, key: &[u8]) -> Result<BTreeIter<'_>> {
        self.tree.seek_ge(key)
    }

    /// Flushes everything and fsyncs. The WAL is truncated afterwards:
    /// every logged operation is durable in the data file by then.
    pub fn close(&mut self) -> Result<()> {
        debug!("closing engine");
        self.tree.close()?;
        self.wal.truncate()
    }
}
