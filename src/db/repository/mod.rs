//! Repository layer: table-scoped database operations.
//!
//! `catalog` covers the read-mostly reference tables, `acknowledgement`
//! the practitioner ledger.

mod acknowledgement;
mod catalog;

pub use acknowledgement::*;
pub use catalog::*;
