//! Integration tests for Examhub.
//!
//! The session controller is driven end to end through in-process fakes of
//! the identity provider and the profile directory, and the portal router is
//! exercised with `tower::ServiceExt::oneshot`. No backend is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p examhub-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_cache` - TTL, isolation and invalidation of the profile cache
//! - `session_controller` - State transitions, single-flight and fail-open fetches
//! - `portal_routes` - Guard, root redirect and auth-route behaviour over HTTP

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use examhub_core::{
    AuthUser, Email, Profile, Role, School, SchoolId, SessionState, SubscriptionStatus, UserId,
};
use examhub_portal::baas::{
    AuthEvent, AuthSession, BaasError, IdentityProvider, ProfileDirectory, SignUp,
};
use examhub_portal::session::{ManualClock, SessionCache, SessionController};
use examhub_portal::state::AppState;
use examhub_portal::storage::{KeyValueStore, MemoryStore};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Semaphore, broadcast};
use tower::ServiceExt;

/// Wall-clock origin of every test clock.
pub const EPOCH_MS: i64 = 1_760_000_000_000;

/// Upper bound on how long a test waits for the controller to settle.
pub const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Fixtures
// =============================================================================

#[must_use]
pub fn user(id: &str) -> AuthUser {
    AuthUser::new(id, Some(Email::parse(&format!("{id}@school.test")).unwrap()))
}

#[must_use]
pub fn school(id: &str, status: SubscriptionStatus) -> School {
    School::new(id, format!("School {id}")).with_status(status)
}

/// A profile linked to `school_id` (not merged: the controller merges).
#[must_use]
pub fn profile(id: &str, role: Role, school_id: Option<&str>) -> Profile {
    let mut profile = Profile::new(id, role);
    profile.school_id = school_id.map(SchoolId::new);
    profile.full_name = Some(format!("User {id}"));
    profile
}

fn session_for(user: AuthUser) -> AuthSession {
    AuthSession {
        user,
        access_token: SecretString::from("access-token"),
        refresh_token: SecretString::from("refresh-token"),
        expires_at: i64::MAX / 2,
    }
}

// =============================================================================
// Identity provider fake
// =============================================================================

/// In-process identity provider with password accounts and an event stream.
pub struct FakeIdentity {
    events: broadcast::Sender<AuthEvent>,
    session: Mutex<Option<AuthSession>>,
    accounts: Mutex<HashMap<String, (String, AuthUser)>>,
    /// Sign-ups wait for email confirmation instead of signing in
    confirm_signups: AtomicBool,
    fail_restore: AtomicBool,
    pub sign_out_calls: AtomicUsize,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            session: Mutex::new(None),
            accounts: Mutex::new(HashMap::new()),
            confirm_signups: AtomicBool::new(false),
            fail_restore: AtomicBool::new(false),
            sign_out_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeIdentity {
    /// Register an account that can sign in with `password`.
    pub fn add_account(&self, user: &AuthUser, password: &str) {
        let email = user.email.as_ref().map(|e| e.as_str().to_string()).unwrap();
        self.accounts
            .lock()
            .unwrap()
            .insert(email, (password.to_string(), user.clone()));
    }

    /// Make `user` the persisted session found at startup.
    pub fn restore_session(&self, user: &AuthUser) {
        *self.session.lock().unwrap() = Some(session_for(user.clone()));
    }

    pub fn set_confirm_signups(&self, confirm: bool) {
        self.confirm_signups.store(confirm, Ordering::SeqCst);
    }

    /// Make reading the persisted session fail.
    pub fn set_fail_restore(&self, fail: bool) {
        self.fail_restore.store(fail, Ordering::SeqCst);
    }

    /// Push an event to every subscriber.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    fn password_for(&self, email: &Email) -> Option<(String, AuthUser)> {
        self.accounts.lock().unwrap().get(email.as_str()).cloned()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn current_session(&self) -> Result<Option<AuthSession>, BaasError> {
        if self.fail_restore.load(Ordering::SeqCst) {
            return Err(BaasError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BaasError> {
        let Some((expected, user)) = self.password_for(email) else {
            return Err(BaasError::InvalidCredentials);
        };
        if expected != password.expose_secret() {
            return Err(BaasError::InvalidCredentials);
        }
        let session = session_for(user.clone());
        *self.session.lock().unwrap() = Some(session.clone());
        self.emit(AuthEvent::SignedIn(user));
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUp) -> Result<Option<AuthSession>, BaasError> {
        if self.password_for(&request.email).is_some() {
            return Err(BaasError::UserAlreadyExists);
        }
        let id = request.email.local_part().to_string();
        let user = AuthUser::new(id, Some(request.email.clone()));
        self.add_account(&user, request.password.expose_secret());

        if self.confirm_signups.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let session = session_for(user.clone());
        *self.session.lock().unwrap() = Some(session.clone());
        self.emit(AuthEvent::SignedIn(user));
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<(), BaasError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.session.lock().unwrap() = None;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn update_password(&self, password: &SecretString) -> Result<(), BaasError> {
        let Some(session) = self.session.lock().unwrap().clone() else {
            return Err(BaasError::NoSession);
        };
        self.add_account(&session.user, password.expose_secret());
        Ok(())
    }

    async fn refresh_session(&self) -> Result<AuthSession, BaasError> {
        let Some(session) = self.session.lock().unwrap().clone() else {
            return Err(BaasError::NoSession);
        };
        self.emit(AuthEvent::TokenRefreshed(session.user.clone()));
        Ok(session)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

// =============================================================================
// Profile directory fake
// =============================================================================

/// In-process `profiles`/`schools` tables with call counters, a failure
/// switch and an optional gate that holds profile lookups until released.
pub struct FakeDirectory {
    profiles: Mutex<HashMap<UserId, Profile>>,
    schools: Mutex<HashMap<SchoolId, School>>,
    pub profile_calls: AtomicUsize,
    pub school_calls: AtomicUsize,
    fail: AtomicBool,
    gated: AtomicBool,
    gate: Semaphore,
}

impl Default for FakeDirectory {
    fn default() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            schools: Mutex::new(HashMap::new()),
            profile_calls: AtomicUsize::new(0),
            school_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }
}

impl FakeDirectory {
    pub fn insert_profile(&self, profile: Profile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile);
    }

    pub fn insert_school(&self, school: School) {
        self.schools.lock().unwrap().insert(school.id.clone(), school);
    }

    /// Make every lookup fail with a backend error.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Hold profile lookups until [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Let `n` held lookups through and stop gating new ones.
    pub fn release(&self, n: usize) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(n);
    }

    #[must_use]
    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn school_calls(&self) -> usize {
        self.school_calls.load(Ordering::SeqCst)
    }

    fn check_fail(&self) -> Result<(), BaasError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BaasError::Api {
                status: 500,
                message: "connection reset".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for FakeDirectory {
    async fn profile_by_id(&self, id: &UserId) -> Result<Option<Profile>, BaasError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            self.gate.acquire().await.unwrap().forget();
        }
        self.check_fail()?;
        Ok(self.profiles.lock().unwrap().get(id).cloned())
    }

    async fn school_by_id(&self, id: &SchoolId) -> Result<Option<School>, BaasError> {
        self.school_calls.fetch_add(1, Ordering::SeqCst);
        self.check_fail()?;
        Ok(self.schools.lock().unwrap().get(id).cloned())
    }
}

// =============================================================================
// Test context
// =============================================================================

/// A controller wired to fresh fakes, a memory store and a manual clock.
pub struct TestContext {
    pub identity: Arc<FakeIdentity>,
    pub directory: Arc<FakeDirectory>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub controller: SessionController,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Build an unstarted controller.
    #[must_use]
    pub fn new() -> Self {
        let identity = Arc::new(FakeIdentity::default());
        let directory = Arc::new(FakeDirectory::default());
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(EPOCH_MS));
        let controller = SessionController::new(
            identity.clone(),
            directory.clone(),
            SessionCache::with_clock(store.clone(), clock.clone()),
        );
        Self {
            identity,
            directory,
            store,
            clock,
            controller,
        }
    }

    /// A second view of the controller's cache slot.
    #[must_use]
    pub fn cache(&self) -> SessionCache {
        let store: Arc<dyn KeyValueStore> = self.store.clone();
        SessionCache::with_clock(store, self.clock.clone())
    }

    /// Seed a teacher `id` in school `school_id` with the given status.
    pub fn seed_teacher(&self, id: &str, school_id: &str, status: SubscriptionStatus) {
        self.directory
            .insert_profile(profile(id, Role::Teacher, Some(school_id)));
        self.directory.insert_school(school(school_id, status));
    }

    /// Wait until the state satisfies `predicate`, panicking after [`WAIT`].
    pub async fn wait_for(&self, predicate: impl FnMut(&SessionState) -> bool) -> SessionState {
        let mut rx = self.controller.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(predicate))
            .await
            .expect("timed out waiting for session state")
            .map(|state| state.clone())
            .unwrap()
    }

    /// Wait until `user_id` is signed in and settled.
    pub async fn wait_signed_in(&self, user_id: &str) -> SessionState {
        self.wait_for(|s| s.is_settled() && s.user_id().is_some_and(|id| id.as_str() == user_id))
            .await
    }

    /// Wait until the directory has seen `n` profile lookups.
    pub async fn wait_profile_calls(&self, n: usize) {
        tokio::time::timeout(WAIT, async {
            while self.directory.profile_calls() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("timed out waiting for profile lookups");
    }

    /// The portal router over this controller.
    #[must_use]
    pub fn app(&self) -> Router {
        examhub_portal::app(AppState::new(self.controller.clone()))
    }

    /// `GET path` against the portal.
    pub async fn get(&self, path: &str) -> Response {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        self.app().oneshot(request).await.unwrap()
    }

    /// `POST path` with a urlencoded form body.
    pub async fn post_form(&self, path: &str, form: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        self.app().oneshot(request).await.unwrap()
    }
}

// =============================================================================
// Response helpers
// =============================================================================

/// `Location` of a redirect response.
#[must_use]
pub fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

/// Whether `response` is a `303` to `target`.
#[must_use]
pub fn is_redirect_to(response: &Response, target: &str) -> bool {
    response.status() == StatusCode::SEE_OTHER && location(response) == Some(target)
}

/// Collect a response body as text.
pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
