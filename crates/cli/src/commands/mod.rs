//! CLI command implementations.

pub mod session;
pub mod token;
