//! Examhub Core - Shared session and routing types.
//!
//! This crate provides the types used across all Examhub components:
//! - `portal` - Front-end shell serving the role dashboards
//! - `cli` - Command-line client for the same session machinery
//!
//! # Architecture
//!
//! The core crate contains only types and pure decisions - no I/O, no storage,
//! no HTTP clients. Everything that talks to the identity provider or the
//! data backend lives in the portal crate.
//!
//! # Modules
//!
//! - [`types`] - Ids, emails, roles, subscription statuses and profile records
//! - [`session`] - The `{user, profile, loading}` snapshot and the profile cache entry
//! - [`guard`] - Route guard, root redirect and auth-route decisions
//! - [`paths`] - Well-known paths and the role-scoped route table

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod guard;
pub mod paths;
pub mod session;
pub mod types;

pub use guard::{AuthRouteDecision, GuardDecision, RootDecision, auth_route, guard, root_redirect};
pub use session::{CacheEntry, SessionState};
pub use types::*;
