//! Authentication and authorization extractors.
//!
//! - [`auth::AuthUser`] -- the caller's principal, from a JWT Bearer token.
//! - [`rbac::RequireAuthority`] -- requires an authority identity.
//! - [`rbac::RequireCreator`] -- requires proposal-creation rights.

pub mod auth;
pub mod rbac;
