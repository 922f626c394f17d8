//! Session core: the profile cache and the controller that owns the
//! `{user, profile, loading}` state.

pub mod cache;
pub mod controller;

pub use cache::{CACHE_KEY, CACHE_TTL, Clock, ManualClock, SessionCache, SystemClock};
pub use controller::{DEFAULT_REFRESH_DELAY, SessionController};
