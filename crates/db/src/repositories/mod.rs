//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod integration_run_repo;
pub mod proposal_repo;

pub use integration_run_repo::IntegrationRunRepo;
pub use proposal_repo::ProposalRepo;
