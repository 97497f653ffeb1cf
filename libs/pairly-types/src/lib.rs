//! Shared wire types for the Pairly API.
//!
//! This crate provides:
//! - Access token claims (`AccessClaims`) and the `Role` they carry
//! - API error codes
//! - Access token verification

mod claims;
mod errors;
mod role;
mod token;

pub use claims::AccessClaims;
pub use errors::{ErrorCode, JwtError};
pub use role::Role;
pub use token::verify_access_token;
