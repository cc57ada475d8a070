//! WAL writer for appending log records.

use crate::record::WalRecord;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tessera_common::Result;
use tracing::debug;

/// Appends log records to a single WAL file.
///
/// Every append is followed by an fsync (when enabled) so a record is
/// durable before the caller mutates the tree. The file is truncated to
/// zero after recovery has replayed it into the data file.
pub struct WalWriter {
    file: File,
    path: PathBuf,
    fsync_enabled: bool,
}

impl WalWriter {
    /// Opens (or creates) the WAL file in append mode.
    pub fn open(path: &Path, fsync_enabled: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            fsync_enabled,
        })
    }

    /// Returns the WAL file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record and makes it durable.
    ///
    /// The record is only considered committed once this returns; callers
    /// must not mutate the tree before then.
    pub fn append(&mut self, record: &WalRecord) -> Result<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&record.serialize())?;
        if self.fsync_enabled {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Reads the entire current log contents.
    pub fn read_contents(&mut self) -> Result<Vec<u8>> {
        use std::io::Read;
        let mut buf = Vec::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Truncates the log to zero length.
    ///
    /// Called after replayed operations are durable in the data file.
    /// A crash between replay and truncate is harmless: replay is
    /// idempotent.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        if self.fsync_enabled {
            self.file.sync_all()?;
        }
        debug!(path = %self.path.display(), "truncated WAL");
        Ok(())
    }
}
