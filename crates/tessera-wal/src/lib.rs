//! Write-Ahead Log (WAL) for TesseraDB.
//!
//! Provides durability by logging all modifications before they are applied
//! to the B+tree. Supports crash recovery through log replay: the engine
//! replays every complete record on open, flushes the tree, and then
//! truncates the log.

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::read_all;
pub use record::{WalOp, WalRecord};
pub use writer::WalWriter;
