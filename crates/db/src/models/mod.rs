//! Row structs for the PostgreSQL tables.
//!
//! Each submodule contains a `FromRow` struct matching the database row and
//! the conversion into the domain record from `tribunal_core`.

pub mod integration_run;
pub mod proposal;
