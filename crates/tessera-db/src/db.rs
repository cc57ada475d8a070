//! Relational operations layered on the key-value engine.

use crate::codec::{
    check_pk_bounds, decode_value, encode_index_key, encode_key, encode_value,
    extract_index_values, max_pk_values, min_pk_values,
};
use crate::engine::KvEngine;
use crate::record::Record;
use crate::scanner::Scanner;
use crate::table::{meta_table, table_catalog, IndexDef, TableDef, MIN_USER_PREFIX};
use std::collections::HashMap;
use tessera_common::{EngineConfig, Result, TesseraError};

/// Reorders record columns in place to match the table definition.
fn reorder_record(tdef: &TableDef, rec: &mut Record) -> Result<()> {
    if rec.cols.len() != tdef.cols.len() {
        return Err(TesseraError::ColumnCountMismatch {
            expected: tdef.cols.len(),
            actual: rec.cols.len(),
        });
    }

    let mut ordered = Vec::with_capacity(tdef.cols.len());
    for (col, ty) in tdef.cols.iter().zip(&tdef.types) {
        let val = rec
            .get(col)
            .ok_or_else(|| TesseraError::ColumnNotFound(col.clone()))?;
        if val.value_type() != *ty {
            return Err(TesseraError::TypeMismatch {
                expected: ty.name().to_string(),
                actual: val.value_type().name().to_string(),
            });
        }
        ordered.push(val.clone());
    }

    rec.cols = tdef.cols.clone();
    rec.vals = ordered;
    Ok(())
}

/// Relational database over the key-value engine: typed rows, primary
/// keys, secondary indexes, and range scanners.
pub struct Database {
    engine: KvEngine,
    tables: HashMap<String, TableDef>,
}

impl Database {
    /// Opens (and if needed recovers) the database.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let engine = KvEngine::open(config)?;
        let mut tables = HashMap::new();
        for tdef in [meta_table(), table_catalog()] {
            tables.insert(tdef.name.clone(), tdef);
        }
        Ok(Self { engine, tables })
    }

    /// Registers a user table definition.
    pub fn define_table(&mut self, tdef: TableDef) -> Result<()> {
        if tdef.prefix < MIN_USER_PREFIX {
            return Err(TesseraError::Internal(format!(
                "table prefix {} collides with reserved prefixes",
                tdef.prefix
            )));
        }
        self.tables.insert(tdef.name.clone(), tdef);
        Ok(())
    }

    /// Looks up a registered table definition.
    pub fn table(&self, name: &str) -> Result<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| TesseraError::TableNotFound(name.to_string()))
    }

    /// Fetches a row by primary key. The record supplies the key columns
    /// on input and is filled with the remaining columns on success.
    pub fn get(&self, tdef: &TableDef, rec: &mut Record) -> Result<()> {
        // Only the key columns need to be present for a lookup.
        let pk_vals = tdef.cols[..tdef.pkey_n]
            .iter()
            .map(|col| {
                rec.get(col)
                    .cloned()
                    .ok_or_else(|| TesseraError::ColumnNotFound(col.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let key = encode_key(tdef.prefix, &pk_vals);
        let raw = self.engine.get(&key)?.ok_or(TesseraError::NotFound)?;
        let vals = decode_value(&raw)?;

        rec.cols = tdef.cols.clone();
        rec.vals = pk_vals.into_iter().chain(vals).collect();
        Ok(())
    }

    /// Inserts a new row; fails with `Conflict` if the primary key exists.
    pub fn insert(&mut self, tdef: &TableDef, rec: &mut Record) -> Result<()> {
        reorder_record(tdef, rec)?;
        check_pk_bounds(tdef, rec)?;

        let key = encode_key(tdef.prefix, &rec.vals[..tdef.pkey_n]);
        if self.engine.get(&key)?.is_some() {
            return Err(TesseraError::Conflict);
        }

        let val = encode_value(&rec.vals[tdef.pkey_n..]);
        self.engine.set(&key, &val)?;

        let pk_vals = rec.vals[..tdef.pkey_n].to_vec();
        for idx in &tdef.indexes {
            let idx_key = encode_index_key(idx, rec, &pk_vals)?;
            self.engine.set(&idx_key, &[])?;
        }

        Ok(())
    }

    /// Updates an existing row; fails with `NotFound` if absent. Index
    /// entries whose columns changed are replaced.
    pub fn update(&mut self, tdef: &TableDef, rec: &mut Record) -> Result<()> {
        reorder_record(tdef, rec)?;
        check_pk_bounds(tdef, rec)?;

        let key = encode_key(tdef.prefix, &rec.vals[..tdef.pkey_n]);
        let old_raw = self.engine.get(&key)?.ok_or(TesseraError::NotFound)?;
        let old_rec = Record {
            cols: tdef.cols.clone(),
            vals: rec.vals[..tdef.pkey_n]
                .iter()
                .cloned()
                .chain(decode_value(&old_raw)?)
                .collect(),
        };

        let val = encode_value(&rec.vals[tdef.pkey_n..]);
        self.engine.set(&key, &val)?;

        let pk_vals = rec.vals[..tdef.pkey_n].to_vec();
        for idx in &tdef.indexes {
            let old_key = encode_index_key(idx, &old_rec, &pk_vals)?;
            let new_key = encode_index_key(idx, rec, &pk_vals)?;
            if old_key != new_key {
                self.engine.del(&old_key)?;
            }
            self.engine.set(&new_key, &[])?;
        }

        Ok(())
    }

    /// Updates the row if present, inserts it otherwise.
    pub fn upsert(&mut self, tdef: &TableDef, rec: &mut Record) -> Result<()> {
        match self.update(tdef, rec) {
            Err(TesseraError::NotFound) => self.insert(tdef, rec),
            other => other,
        }
    }

    /// Deletes a row by primary key, along with its index entries. The
    /// record only needs to supply the key columns.
    pub fn delete(&mut self, tdef: &TableDef, rec: &mut Record) -> Result<()> {
        // The stored row supplies the indexed column values.
        let mut old_rec = rec.clone();
        self.get(tdef, &mut old_rec)?;

        let pk_vals = old_rec.vals[..tdef.pkey_n].to_vec();
        for idx in &tdef.indexes {
            let mut vals = extract_index_values(idx, &old_rec)?;
            vals.extend(pk_vals.iter().cloned());
            self.engine.del(&encode_key(idx.prefix, &vals))?;
        }

        let key = encode_key(tdef.prefix, &pk_vals);
        if !self.engine.del(&key)? {
            return Err(TesseraError::NotFound);
        }
        Ok(())
    }

    /// Scans a table in primary-key order, invoking `visit` per record
    /// until it returns `false`.
    pub fn scan<F>(
        &self,
        table: &str,
        start: Option<&Record>,
        end: Option<&Record>,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(&Record) -> bool,
    {
        let tdef = self.table(table)?;
        let mut scanner = self.new_scanner(tdef, None, start, end)?;
        while scanner.valid() {
            let rec = scanner.deref()?;
            if !visit(&rec) {
                break;
            }
            scanner.next()?;
        }
        Ok(())
    }

    /// Builds a scanner over the table's primary key space, or over one
    /// of its secondary indexes.
    ///
    /// For secondary scans the records supply the indexed column values;
    /// the engine brackets the range with the lowest and highest possible
    /// primary keys so every row under those values is covered.
    pub fn new_scanner<'a>(
        &'a self,
        tdef: &'a TableDef,
        index: Option<&'a IndexDef>,
        start: Option<&Record>,
        end: Option<&Record>,
    ) -> Result<Scanner<'a>> {
        let (start_key, end_key) = match index {
            None => {
                let start_key = match start {
                    Some(rec) => {
                        let mut rec = rec.clone();
                        reorder_record(tdef, &mut rec)?;
                        encode_key(tdef.prefix, &rec.vals[..tdef.pkey_n])
                    }
                    None => vec![tdef.prefix],
                };
                let end_key = match end {
                    Some(rec) => {
                        let mut rec = rec.clone();
                        reorder_record(tdef, &mut rec)?;
                        Some(encode_key(tdef.prefix, &rec.vals[..tdef.pkey_n]))
                    }
                    None => None,
                };
                (start_key, end_key)
            }
            Some(idx) => {
                let start_rec = start.ok_or_else(|| {
                    TesseraError::Internal("secondary scan requires start values".to_string())
                })?;
                let end_rec = end.ok_or_else(|| {
                    TesseraError::Internal("secondary scan requires end values".to_string())
                })?;

                let mut start_vals = extract_index_values(idx, start_rec)?;
                start_vals.extend(min_pk_values(tdef));
                let mut end_vals = extract_index_values(idx, end_rec)?;
                end_vals.extend(max_pk_values(tdef));

                (
                    encode_key(idx.prefix, &start_vals),
                    Some(encode_key(idx.prefix, &end_vals)),
                )
            }
        };

        Ok(Scanner {
            iter: self.engine.seek_ge(&start_key)?,
            engine: &self.engine,
            tdef,
            index,
            end_key,
        })
    }

    /// Flushes everything and fsyncs.
    pub fn close(&mut self) -> Result<()> {
        self.engine.close()
    }
}
