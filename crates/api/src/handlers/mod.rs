//! Request handlers.
//!
//! Handlers stay thin: they load records through the [`ProposalStore`],
//! delegate every rule to `tribunal_core::workflow`, and map failures via
//! [`AppError`].
//!
//! [`ProposalStore`]: tribunal_db::store::ProposalStore
//! [`AppError`]: crate::error::AppError

pub mod blocks;
pub mod integration;
pub mod me;
pub mod proposals;
