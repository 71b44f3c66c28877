//! Record processing module
//!
//! This module provides:
//! - `types`: data types, values and records
//! - `schema`: table definitions and alias-qualified plan schemas
//! - `plan`: query plans over aliased tables
//! - `executor`: lazy scan, join and projection operators
//! - `engine`: transactions, sessions and alias bindings

pub mod types;
pub mod schema;
pub mod plan;
pub mod executor;
pub mod engine;
