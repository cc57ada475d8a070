//! Optimistic serializable transactions.
//!
//! `begin` snapshots a version counter. Reads go through to the engine
//! while recording a read set; writes accumulate in a pending map
//! (read-your-own-writes). `commit` takes the write lock and aborts with
//! `TxConflict` if any transaction committed after the snapshot wrote a
//! key this one read; otherwise the pending operations replay through
//! the engine. Unscoped reads and writes share the same lock, so they
//! are mutually exclusive with commits.

use crate::engine::KvEngine;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tessera_common::{EngineConfig, Result, TesseraError};
use tracing::debug;

/// Committed write sets kept for conflict detection.
const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone)]
enum PendingOp {
    Put(Bytes),
    Delete,
}

struct CommittedTx {
    version: u64,
    writes: Vec<Vec<u8>>,
}

struct Shared {
    engine: KvEngine,
    version: u64,
    history: Vec<CommittedTx>,
}

/// Serializes transactions and unscoped operations over one engine.
pub struct TxManager {
    shared: RwLock<Shared>,
}

impl TxManager {
    /// Wraps an already-open engine.
    pub fn new(engine: KvEngine) -> Self {
        Self {
            shared: RwLock::new(Shared {
                engine,
                version: 0,
                history: Vec::new(),
            }),
        }
    }

    /// Opens the engine and wraps it.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        Ok(Self::new(KvEngine::open(config)?))
    }

    /// Starts a transaction at the current version.
    pub fn begin(&self) -> Tx<'_> {
        let shared = self.shared.read();
        Tx {
            mgr: self,
            version: shared.version,
            pending: BTreeMap::new(),
            reads: Vec::new(),
            aborted: false,
        }
    }

    /// Unscoped point lookup.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.shared.read().engine.get(key)
    }

    /// Unscoped upsert, mutually exclusive with commits.
    pub fn set(&self, key: &[u8], val: &[u8]) -> Result<()> {
        self.shared.write().engine.set(key, val)
    }

    /// Unscoped delete, mutually exclusive with commits.
    pub fn del(&self, key: &[u8]) -> Result<bool> {
        self.shared.write().engine.del(key)
    }

    /// Unscoped range scan.
    pub fn scan<F>(&self, start: &[u8], end: Option<&[u8]>, visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.shared.read().engine.scan(start, end, visit)
    }

    /// Flushes everything and fsyncs.
    pub fn close(&self) -> Result<()> {
        self.shared.write().engine.close()
    }
}

/// A transaction in progress.
pub struct Tx<'a> {
    mgr: &'a TxManager,
    version: u64,
    pending: BTreeMap<Vec<u8>, PendingOp>,
    reads: Vec<Vec<u8>>,
    aborted: bool,
}

impl Tx<'_> {
    /// Reads a key, seeing this transaction's own pending writes first.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        if self.aborted {
            return Err(TesseraError::TxAborted);
        }

        if let Some(op) = self.pending.get(key) {
            return Ok(match op {
                PendingOp::Put(val) => Some(val.clone()),
                PendingOp::Delete => None,
            });
        }

        self.reads.push(key.to_vec());
        self.mgr.shared.read().engine.get(key)
    }

    /// Stages an upsert.
    pub fn set(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        if self.aborted {
            return Err(TesseraError::TxAborted);
        }
        self.pending
            .insert(key.to_vec(), PendingOp::Put(Bytes::copy_from_slice(val)));
        Ok(())
    }

    /// Stages a delete.
    pub fn del(&mut self, key: &[u8]) -> Result<()> {
        if self.aborted {
            return Err(TesseraError::TxAborted);
        }
        self.pending.insert(key.to_vec(), PendingOp::Delete);
        Ok(())
    }

    /// Range scan overlaying this transaction's pending writes onto the
    /// engine's state. Keys staged for deletion are skipped; staged
    /// values replace stored ones. Every visited key joins the read set.
    pub fn scan<F>(&mut self, start: &[u8], end: Option<&[u8]>, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        if self.aborted {
            return Err(TesseraError::TxAborted);
        }

        let reads = &mut self.reads;
        let pending = &self.pending;
        self.mgr
            .shared
            .read()
            .engine
            .scan(start, end, |key, val| {
                reads.push(key.to_vec());
                match pending.get(key) {
                    Some(PendingOp::Put(staged)) => visit(key, staged),
                    Some(PendingOp::Delete) => true,
                    None => visit(key, val),
                }
            })
    }

    /// Commits: conflict-checks the read set against transactions that
    /// committed after this one began, then replays pending writes.
    pub fn commit(self) -> Result<()> {
        if self.aborted {
            return Err(TesseraError::TxAborted);
        }

        let mut shared = self.mgr.shared.write();

        for committed in shared.history.iter().rev() {
            if committed.version <= self.version {
                break;
            }
            let overlap = self
                .reads
                .iter()
                .any(|read| committed.writes.iter().any(|write| write == read));
            if overlap {
                debug!(
                    tx_version = self.version,
                    conflicting_version = committed.version,
                    "transaction conflict"
                );
                return Err(TesseraError::TxConflict);
            }
        }

        let writes: Vec<Vec<u8>> = self.pending.keys().cloned().collect();
        for (key, op) in &self.pending {
            match op {
                PendingOp::Put(val) => shared.engine.set(key, val)?,
                PendingOp::Delete => {
                    shared.engine.del(key)?;
                }
            }
        }

        shared.version += 1;
        let version = shared.version;
        shared.history.push(CommittedTx { version, writes });
        let overflow = shared.history.len().saturating_sub(HISTORY_LIMIT);
        shared.history.drain(..overflow);

        Ok(())
    }

    /// Discards all pending state.
    pub fn abort(mut self) {
        self.aborted = true;
        self.pending.clear();
        self.reads.clear();
    }
}
