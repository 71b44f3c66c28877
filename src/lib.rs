//! aliasdb - a small transactional record store in Rust
//!
//! This crate provides:
//! - Typed values, schemas and fixed-width records
//! - MVCC-based transactions over a pluggable key-value storage engine
//! - Alias bindings and a lazy scan/join/projection query engine
//!
//! ```no_run
//! use aliasdb::sql::engine::{Engine, KVEngine};
//! use aliasdb::storage::memory::MemoryEngine;
//!
//! # fn main() -> aliasdb::error::Result<()> {
//! let engine = KVEngine::new(MemoryEngine::new());
//! let mut session = engine.session()?;
//! session.query_as("Students", "S")?;
//! session.query_as("Enrollments", "E")?;
//!
//! let mut plan = session.query("S")?;
//! plan.join("E", "S.sid", "E.sid")?.select(&["S.name", "E.cid"])?;
//! for record in plan.execute()? {
//!     println!("{}", record?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod sql;
pub mod storage;
