//! Backend-as-a-Service integration.
//!
//! The portal owns no data. Authentication, the `profiles` and `schools`
//! tables, storage and payments all live in a hosted backend. This module
//! defines the two seams the session core consumes and a `reqwest` client
//! implementing both against the backend's REST surface.
//!
//! # Architecture
//!
//! - [`IdentityProvider`] - sessions, sign-in/up/out, password changes and the
//!   auth event stream
//! - [`ProfileDirectory`] - read-only record lookups by id
//! - [`BaasClient`] - the production implementation of both
//!
//! The traits are object safe so tests can drive the session controller with
//! in-process fakes.

pub mod auth;
pub mod client;

pub use auth::{AuthSession, SignUp};
pub use client::BaasClient;

use async_trait::async_trait;
use examhub_core::{AuthUser, Email, Profile, School, SchoolId, UserId};
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BaasError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The backend answered with an error status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Wrong email or password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// The password was rejected by the backend's policy.
    #[error("password rejected: {0}")]
    WeakPassword(String),

    /// The operation needs a signed-in user.
    #[error("no active session")]
    NoSession,

    /// Refresh token rejected or expired.
    #[error("session expired")]
    SessionExpired,

    /// Reading or writing the persisted session failed.
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Authentication lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in (explicitly, or a session was re-established).
    SignedIn(AuthUser),
    /// The session ended.
    SignedOut,
    /// The access token was renewed for the same user.
    TokenRefreshed(AuthUser),
}

/// The identity provider as seen by the session core.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The persisted session, refreshed if its access token is about to expire.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted session cannot be read.
    async fn current_session(&self) -> Result<Option<AuthSession>, BaasError>;

    /// Sign in with email and password. Emits [`AuthEvent::SignedIn`].
    ///
    /// # Errors
    ///
    /// Returns [`BaasError::InvalidCredentials`] on a wrong email or password.
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BaasError>;

    /// Create an account. Returns the new session when the backend signs the
    /// user in immediately, `None` when email confirmation is required.
    ///
    /// # Errors
    ///
    /// Returns [`BaasError::UserAlreadyExists`] or [`BaasError::WeakPassword`]
    /// when the backend rejects the request.
    async fn sign_up(&self, request: &SignUp) -> Result<Option<AuthSession>, BaasError>;

    /// End the session locally and on the backend. Emits [`AuthEvent::SignedOut`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the local session cannot be cleared; backend
    /// failures are logged.
    async fn sign_out(&self) -> Result<(), BaasError>;

    /// Change the signed-in user's password.
    ///
    /// # Errors
    ///
    /// Returns [`BaasError::NoSession`] when nobody is signed in.
    async fn update_password(&self, password: &SecretString) -> Result<(), BaasError>;

    /// Renew the access token. Emits [`AuthEvent::TokenRefreshed`].
    ///
    /// # Errors
    ///
    /// Returns [`BaasError::SessionExpired`] if the refresh token is rejected.
    async fn refresh_session(&self) -> Result<AuthSession, BaasError>;

    /// Subscribe to auth events. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Read-only access to application records.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Look up a profile by its user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or answers badly.
    async fn profile_by_id(&self, id: &UserId) -> Result<Option<Profile>, BaasError>;

    /// Look up a school by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or answers badly.
    async fn school_by_id(&self, id: &SchoolId) -> Result<Option<School>, BaasError>;
}
