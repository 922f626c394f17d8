//! Core types for Examhub.
//!
//! This module provides type-safe wrappers for the records the portal reads
//! from the identity provider and the data backend.

pub mod email;
pub mod id;
pub mod profile;
pub mod role;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use profile::{AuthUser, Profile, School};
pub use role::{Role, RoleParseError};
pub use status::SubscriptionStatus;
