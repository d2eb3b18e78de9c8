//! Tribunal domain layer.
//!
//! Pure types and rules for the proposal workflow. Nothing in this crate
//! performs I/O; the `db`, `pipeline` and `api` crates build on it.

pub mod blocks;
pub mod error;
pub mod permissions;
pub mod proposal;
pub mod types;
pub mod workflow;
