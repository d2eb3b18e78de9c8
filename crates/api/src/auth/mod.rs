//! Authentication primitives.
//!
//! - [`jwt`] -- verification (and, for tooling and tests, minting) of the
//!   HS256 access tokens issued by the session provider.

pub mod jwt;
