//! Relational overlay and WAL-backed engine for TesseraDB.
//!
//! This crate provides:
//! - `KvEngine`: the durable key-value surface (B+tree + write-ahead log)
//! - Typed values and records with an order-preserving tuple codec
//! - Tables, primary and secondary indexes namespaced by key prefix
//! - Range scanners decoding records straight off the key space
//! - Optimistic serializable transactions

pub mod codec;
pub mod db;
pub mod engine;
pub mod record;
pub mod scanner;
pub mod table;
pub mod tx;
pub mod value;

pub use db::Database;
pub use engine::KvEngine;
pub use record::Record;
pub use scanner::Scanner;
pub use table::{IndexDef, TableDef, MAX_BYTES_PK_LEN};
pub use tx::{Tx, TxManager};
pub use value::{Value, ValueType};
