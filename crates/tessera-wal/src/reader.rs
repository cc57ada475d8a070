//! WAL reader for log replay during recovery.

use crate::record::WalRecord;
use tessera_common::Result;
use tracing::debug;

/// Parses every complete record from raw log contents.
///
/// A torn trailing record (short header or short payload) terminates the
/// scan without error: it represents an intent that never committed. An
/// unknown op tag mid-stream is surfaced as `Corrupt`.
pub fn read_all(data: &[u8]) -> Result<Vec<WalRecord>> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        match WalRecord::deserialize(&data[offset..])? {
            Some((record, consumed)) => {
                records.push(record);
                offset += consumed;
            }
            None => {
                debug!(
                    offset,
                    remaining = data.len() - offset,
                    "torn trailing WAL record, stopping replay scan"
                );
                break;
            }
        }
    }

    Ok(records)
}
