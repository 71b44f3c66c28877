//! Byte-level storage
//!
//! - `engine`: ordered key-value engine trait
//! - `memory`: in-memory engine
//! - `mvcc`: snapshot-isolated transactions over any engine

pub mod engine;
pub(crate) mod keycode;
pub mod memory;
pub mod mvcc;
