//! Session snapshot and profile cache entry.

use serde::{Deserialize, Serialize};

use crate::{AuthUser, Profile, UserId};

/// What the rest of the portal knows about the signed-in user.
///
/// `loading` is true while no authoritative profile is known for the current
/// user: before the first resolution, and while a sign-in is being resolved.
/// A profile is only ever present alongside the user it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl SessionState {
    /// Process start: nothing known yet.
    #[must_use]
    pub const fn initializing() -> Self {
        Self {
            user: None,
            profile: None,
            loading: true,
        }
    }

    /// No session, or signed out.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user: None,
            profile: None,
            loading: false,
        }
    }

    /// A finished resolution for `user`.
    ///
    /// A profile whose id does not match the user is dropped rather than
    /// published.
    #[must_use]
    pub fn resolved(user: AuthUser, profile: Option<Profile>) -> Self {
        let profile = profile.filter(|p| p.id == user.id);
        Self {
            user: Some(user),
            profile,
            loading: false,
        }
    }

    /// Whether the state is final for the current auth event.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !self.loading
    }

    /// Id of the signed-in user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|u| &u.id)
    }

    /// Whether the profile/user pairing holds.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        match (&self.user, &self.profile) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(user), Some(profile)) => user.id == profile.id,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initializing()
    }
}

/// The durable profile cache slot.
///
/// `ts` is the write time in milliseconds since the Unix epoch. An
/// invalidated entry keeps its payload and has `ts == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Profile,
    pub id: UserId,
    pub ts: i64,
}

impl CacheEntry {
    /// Whether the entry may be used for `user_id` at `now_ms`.
    ///
    /// An entry exactly `ttl_ms` old is already stale.
    #[must_use]
    pub fn is_valid_for(&self, user_id: &UserId, now_ms: i64, ttl_ms: i64) -> bool {
        &self.id == user_id && now_ms.saturating_sub(self.ts) < ttl_ms
    }
}
