//! Range iteration over decoded records.

use crate::codec::{decode_record, extract_primary_key};
use crate::engine::KvEngine;
use crate::record::Record;
use crate::table::{IndexDef, TableDef};
use tessera_common::{Result, TesseraError};
use tessera_storage::BTreeIter;

/// Iterates records of one table (or one of its indexes) in key order.
///
/// The scanner is valid only while the underlying iterator points inside
/// the requested namespace and below the upper bound: range scans never
/// cross from one table or index into the next.
pub struct Scanner<'a> {
    pub(crate) iter: BTreeIter<'a>,
    pub(crate) engine: &'a KvEngine,
    pub(crate) tdef: &'a TableDef,
    /// `None` means a primary scan.
    pub(crate) index: Option<&'a IndexDef>,
    /// `None` means no upper bound.
    pub(crate) end_key: Option<Vec<u8>>,
}

impl Scanner<'_> {
    fn prefix(&self) -> u8 {
        self.index.map_or(self.tdef.prefix, |idx| idx.prefix)
    }

    /// True while the scanner points at a record of the requested
    /// namespace within bounds.
    pub fn valid(&self) -> bool {
        let Some(key) = self.iter.key() else {
            return false;
        };
        if key.first() != Some(&self.prefix()) {
            return false;
        }
        match &self.end_key {
            Some(end) => key <= end.as_slice(),
            None => true,
        }
    }

    /// Advances to the next record.
    pub fn next(&mut self) -> Result<()> {
        self.iter.next()
    }

    /// Decodes the current record.
    ///
    /// Secondary scans recover the primary key from the index key and
    /// fetch the row through a primary lookup; an index entry whose row
    /// is missing is corruption and is surfaced, never skipped.
    pub fn deref(&self) -> Result<Record> {
        let (key, val) = self
            .iter
            .entry()
            .ok_or_else(|| TesseraError::Internal("deref of invalid scanner".to_string()))?;

        match self.index {
            None => decode_record(self.tdef, key, val),
            Some(_) => {
                let pk = extract_primary_key(key, self.tdef)?;
                let row = self.engine.get(&pk)?.ok_or_else(|| {
                    TesseraError::corrupt(format!(
                        "index entry without primary row in table {}",
                        self.tdef.name
                    ))
                })?;
                decode_record(self.tdef, &pk, &row)
            }
        }
    }
}
