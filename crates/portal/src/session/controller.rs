//! Session controller.
//!
//! One controller per process owns the authoritative [`SessionState`] and
//! publishes every change through a `watch` channel. It reacts to identity
//! provider events, resolves profiles through the [`SessionCache`] or the
//! [`ProfileDirectory`], and never surfaces an error to its readers: every
//! failure settles into a valid state.
//!
//! # Ordering
//!
//! - At most one full profile fetch runs per sign-out epoch. Overlapping
//!   requests are dropped; the running fetch's result is authoritative.
//! - `user` and `profile` always change in one publish.
//! - Sign-out bumps the epoch. Work started under an older epoch neither
//!   publishes nor writes the cache. The epoch check, the cache write and
//!   the publish happen under the watch lock, so they cannot interleave
//!   with a sign-out.
//! - After [`SessionController::dispose`] nothing is published and the
//!   cache is left alone.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use examhub_core::{AuthUser, Email, Profile, SessionState, UserId};
use secrecy::SecretString;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::cache::SessionCache;
use crate::baas::{AuthEvent, BaasError, IdentityProvider, ProfileDirectory, SignUp};

/// Delay before the background refresh that follows a cache hit.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(200);

/// Owner of the session state.
///
/// Cheaply cloneable; clones share the same state.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    directory: Arc<dyn ProfileDirectory>,
    cache: SessionCache,
    state: watch::Sender<SessionState>,
    refresh_delay: Duration,
    /// `epoch + 1` of the running full fetch, 0 when idle
    in_flight: AtomicU64,
    /// Bumped on every sign-out
    epoch: AtomicU64,
    /// Set once the first sign-in has been resolved with a full fetch
    baseline: AtomicBool,
    active: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// `loading` as it was before an action entered resolving.
#[derive(Debug, Clone, Copy)]
struct PendingAction {
    epoch: u64,
    was_loading: bool,
}

/// Exclusive right to run a full fetch. Released on drop.
struct FetchPermit {
    inner: Arc<Inner>,
    token: u64,
}

impl Drop for FetchPermit {
    fn drop(&mut self) {
        // A newer epoch may already have taken over the slot.
        let _ = self.inner.in_flight.compare_exchange(
            self.token,
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

impl SessionController {
    /// Create a controller in the initializing state. Nothing happens until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        directory: Arc<dyn ProfileDirectory>,
        cache: SessionCache,
    ) -> Self {
        Self::with_refresh_delay(identity, directory, cache, DEFAULT_REFRESH_DELAY)
    }

    /// Like [`new`](Self::new) with a custom background refresh delay.
    #[must_use]
    pub fn with_refresh_delay(
        identity: Arc<dyn IdentityProvider>,
        directory: Arc<dyn ProfileDirectory>,
        cache: SessionCache,
        refresh_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::initializing());
        Self {
            inner: Arc::new(Inner {
                identity,
                directory,
                cache,
                state,
                refresh_delay,
                in_flight: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                baseline: AtomicBool::new(false),
                active: AtomicBool::new(true),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the state is settled and return it.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(SessionState::is_settled)
            .await
            .map(|state| state.clone());
        // The sender lives in `inner`, which `self` keeps alive.
        settled.unwrap_or_else(|_| self.state())
    }

    /// The cache this controller reads and writes.
    #[must_use]
    pub fn cache(&self) -> &SessionCache {
        &self.inner.cache
    }

    /// Subscribe to identity events and resolve the restored session.
    ///
    /// The subscription is taken before the session is queried, so a sign-in
    /// racing startup is never missed.
    pub async fn start(&self) {
        let events = self.inner.identity.subscribe();
        let listener = tokio::spawn(listen(self.clone(), events));
        *self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);

        match self.inner.identity.current_session().await {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user.id, "Restored session");
                let epoch = self.epoch();
                self.handle_sign_in(session.user, epoch).await;
            }
            Ok(None) => {
                tracing::debug!("No existing session");
                self.settle_anonymous();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not restore session");
                self.settle_anonymous();
            }
        }
    }

    /// Stop reacting to events. In-flight work finishes without publishing.
    pub fn dispose(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        if let Some(listener) = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }
    }

    /// Whether [`dispose`](Self::dispose) has not been called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Event handling
    // =========================================================================

    /// React to a sign-in observed under `epoch`.
    pub(crate) async fn handle_sign_in(&self, user: AuthUser, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }

        let first = !self.inner.baseline.swap(true, Ordering::SeqCst);
        if !first && let Some(profile) = self.inner.cache.get(&user.id) {
            tracing::debug!(user_id = %user.id, "Profile served from cache");
            self.publish_if_current(epoch, |state| {
                *state = SessionState::resolved(user.clone(), Some(profile));
            });
            self.spawn_background_refresh(user, epoch);
            return;
        }

        let Some(permit) = self.try_begin_fetch(epoch) else {
            tracing::debug!(user_id = %user.id, "Profile fetch already in flight");
            return;
        };

        self.publish_if_current(epoch, |state| state.loading = true);
        let profile = self.fetch_or_none(&user.id).await;
        self.finish_fetch(user, profile, epoch);
        drop(permit);
    }

    /// React to a sign-out: expire the outgoing user's cache entry and clear
    /// the session in one publish.
    pub(crate) fn handle_sign_out(&self) {
        let active = self.is_active();
        let mut outgoing = None;
        self.inner.state.send_if_modified(|state| {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            if active {
                outgoing = state.user_id().cloned();
                *state = SessionState::anonymous();
            }
            active
        });

        // Any fetch that had not published by now sees the new epoch and
        // skips its cache write, so this invalidation is final.
        if let Some(user_id) = &outgoing {
            self.inner.cache.invalidate(user_id);
            tracing::info!(user_id = %user_id, "Signed out");
        }
    }

    /// React to a renewed token: replace `user`, keep `profile`.
    pub(crate) fn handle_token_refreshed(&self, user: AuthUser) {
        if !self.is_active() {
            return;
        }
        self.inner.state.send_if_modified(|state| match &state.user {
            Some(current) if current.id == user.id => {
                state.user = Some(user);
                true
            }
            _ => false,
        });
    }

    /// Force a full fetch for the signed-in user, bypassing the cache.
    pub async fn refetch_profile(&self) {
        let epoch = self.epoch();
        let Some(user) = self.inner.state.borrow().user.clone() else {
            return;
        };
        let Some(permit) = self.try_begin_fetch(epoch) else {
            tracing::debug!(user_id = %user.id, "Profile fetch already in flight");
            return;
        };

        self.publish_if_current(epoch, |state| state.loading = true);
        let profile = self.fetch_or_none(&user.id).await;
        self.finish_fetch(user, profile, epoch);
        drop(permit);
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// The state enters resolving before the provider is called, so a reader
    /// that looks right after a successful call sees a pending state rather
    /// than an anonymous one. The profile arrives with the sign-in event.
    ///
    /// # Errors
    ///
    /// Returns the provider's error; `loading` falls back to what it was.
    pub async fn sign_in(&self, email: &Email, password: &SecretString) -> Result<(), BaasError> {
        let pending = self.begin_action();
        match self.inner.identity.sign_in_with_password(email, password).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.abandon_action(pending);
                Err(e)
            }
        }
    }

    /// Create an account. Returns whether the user is now signed in.
    ///
    /// Like [`sign_in`](Self::sign_in), the state enters resolving first and
    /// stays there when a session comes back.
    ///
    /// # Errors
    ///
    /// Returns the provider's error; `loading` falls back to what it was.
    pub async fn sign_up(&self, request: &SignUp) -> Result<bool, BaasError> {
        let pending = self.begin_action();
        match self.inner.identity.sign_up(request).await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => {
                self.abandon_action(pending);
                Ok(false)
            }
            Err(e) => {
                self.abandon_action(pending);
                Err(e)
            }
        }
    }

    /// End the session.
    ///
    /// # Errors
    ///
    /// Returns the provider's error. The local state is cleared regardless.
    pub async fn sign_out(&self) -> Result<(), BaasError> {
        let result = self.inner.identity.sign_out().await;
        self.handle_sign_out();
        result
    }

    /// Change the signed-in user's password.
    ///
    /// # Errors
    ///
    /// Returns the provider's error.
    pub async fn update_password(&self, password: &SecretString) -> Result<(), BaasError> {
        self.inner.identity.update_password(password).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.is_active() && self.epoch() == epoch
    }

    /// Leave initializing for anonymous, unless a sign-in got there first.
    fn settle_anonymous(&self) {
        self.publish_if_current(self.epoch(), |state| {
            if state.user.is_none() {
                *state = SessionState::anonymous();
            }
        });
    }

    /// Apply `modify` and notify, unless `epoch` is stale. The check runs
    /// under the watch lock, which also serializes sign-out.
    fn publish_if_current(&self, epoch: u64, modify: impl FnOnce(&mut SessionState)) -> bool {
        self.inner.state.send_if_modified(|state| {
            if !self.is_current(epoch) {
                return false;
            }
            modify(state);
            true
        })
    }

    /// Enter resolving ahead of a provider call that may sign the user in.
    fn begin_action(&self) -> PendingAction {
        let epoch = self.epoch();
        let mut was_loading = false;
        self.publish_if_current(epoch, |state| {
            was_loading = state.loading;
            state.loading = true;
        });
        PendingAction { epoch, was_loading }
    }

    /// Undo [`begin_action`](Self::begin_action) after a call that did not
    /// produce a session. A fetch that started meanwhile owns `loading`.
    fn abandon_action(&self, pending: PendingAction) {
        if self.inner.in_flight.load(Ordering::SeqCst) == pending.epoch + 1 {
            return;
        }
        self.publish_if_current(pending.epoch, |state| {
            state.loading = pending.was_loading;
        });
    }

    /// Claim the fetch slot for `epoch`. Fails if a fetch from the same epoch
    /// is running; a fetch left over from an older epoch is superseded.
    fn try_begin_fetch(&self, epoch: u64) -> Option<FetchPermit> {
        let token = epoch + 1;
        let mut observed = self.inner.in_flight.load(Ordering::SeqCst);
        loop {
            if observed == token {
                return None;
            }
            match self.inner.in_flight.compare_exchange(
                observed,
                token,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    return Some(FetchPermit {
                        inner: Arc::clone(&self.inner),
                        token,
                    });
                }
                Err(actual) => observed = actual,
            }
        }
    }

    /// Profile lookup plus, for school-scoped roles, the school lookup.
    async fn fetch_full(&self, user_id: &UserId) -> Result<Option<Profile>, BaasError> {
        let Some(profile) = self.inner.directory.profile_by_id(user_id).await? else {
            return Ok(None);
        };
        if profile.role.is_platform_admin() {
            return Ok(Some(profile));
        }
        let Some(school_id) = profile.school_id.clone() else {
            return Ok(Some(profile));
        };

        Ok(Some(match self.inner.directory.school_by_id(&school_id).await? {
            Some(school) => profile.with_school(school),
            None => {
                tracing::warn!(user_id = %user_id, school_id = %school_id, "School not found");
                profile
            }
        }))
    }

    async fn fetch_or_none(&self, user_id: &UserId) -> Option<Profile> {
        match self.fetch_full(user_id).await {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => {
                tracing::info!(user_id = %user_id, "No profile for user");
                None
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Profile fetch failed");
                None
            }
        }
    }

    fn finish_fetch(&self, user: AuthUser, profile: Option<Profile>, epoch: u64) {
        let user_id = user.id.clone();
        let published = self.publish_if_current(epoch, |state| {
            if let Some(profile) = &profile {
                self.inner.cache.set(&user.id, profile);
            }
            *state = SessionState::resolved(user, profile);
        });
        if !published {
            tracing::debug!(user_id = %user_id, "Discarding fetch from a previous session");
        }
    }

    fn spawn_background_refresh(&self, user: AuthUser, epoch: u64) {
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(controller.inner.refresh_delay).await;
            if !controller.is_current(epoch) {
                return;
            }
            let Some(_permit) = controller.try_begin_fetch(epoch) else {
                return;
            };

            let profile = match controller.fetch_full(&user.id).await {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Background profile refresh failed");
                    return;
                }
            };
            controller.inner.state.send_if_modified(|state| {
                if !controller.is_current(epoch) || state.user_id() != Some(&user.id) {
                    return false;
                }
                if let Some(profile) = &profile {
                    controller.inner.cache.set(&user.id, profile);
                }
                let changed = state.profile != profile;
                state.profile = profile;
                changed
            });
        });
    }
}

async fn listen(controller: SessionController, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(AuthEvent::SignedIn(user)) => {
                // Captured now so a sign-out queued behind this event wins.
                let epoch = controller.epoch();
                let controller = controller.clone();
                tokio::spawn(async move { controller.handle_sign_in(user, epoch).await });
            }
            Ok(AuthEvent::SignedOut) => controller.handle_sign_out(),
            Ok(AuthEvent::TokenRefreshed(user)) => controller.handle_token_refreshed(user),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Auth events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
