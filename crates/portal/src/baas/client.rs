//! REST client for the hosted backend.
//!
//! Speaks the backend's auth endpoints (`/auth/v1/*`) and its table endpoints
//! (`/rest/v1/<table>`). Every request carries the project's anon key in the
//! `apikey` header; table reads additionally carry the signed-in user's access
//! token so row-level security applies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use examhub_core::{Email, Profile, School, SchoolId, UserId};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::instrument;

use super::auth::{StoredSession, TokenResponse, classify_auth_error};
use super::{AuthEvent, AuthSession, BaasError, IdentityProvider, ProfileDirectory, SignUp};
use crate::config::BaasConfig;
use crate::storage::KeyValueStore;

/// Storage key of the persisted auth session.
pub const SESSION_KEY: &str = "examhub.auth_session";

/// Capacity of the auth event channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Delay before retrying an automatic refresh that failed transiently.
const REFRESH_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Backend client implementing [`IdentityProvider`] and [`ProfileDirectory`].
///
/// Cheaply cloneable; clones share the session and the event channel.
#[derive(Clone)]
pub struct BaasClient {
    inner: Arc<BaasClientInner>,
}

struct BaasClientInner {
    http: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
    /// In-memory copy of the persisted session
    session: RwLock<Option<AuthSession>>,
    store: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<AuthEvent>,
}

impl BaasClient {
    /// Create a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns an error if the anon key is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &BaasConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, BaasError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(config.anon_key.expose_secret()).map_err(|e| {
                BaasError::Api {
                    status: 0,
                    message: format!("Invalid anon key format: {e}"),
                }
            })?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(BaasClientInner {
                http,
                base_url: config.url.as_str().trim_end_matches('/').to_owned(),
                anon_key: config.anon_key.clone(),
                session: RwLock::new(None),
                store,
                events,
            }),
        })
    }

    /// Keep the access token fresh in the background.
    ///
    /// Sleeps until shortly before the current token expires, then refreshes
    /// it (emitting [`AuthEvent::TokenRefreshed`]). A rejected refresh token
    /// ends the session and emits [`AuthEvent::SignedOut`].
    #[must_use]
    pub fn spawn_auto_refresh(&self) -> JoinHandle<()> {
        let client = self.clone();
        let mut events = self.inner.events.subscribe();

        tokio::spawn(async move {
            loop {
                let due = client
                    .inner
                    .session
                    .read()
                    .await
                    .as_ref()
                    .map(AuthSession::refresh_due_in);

                let Some(due) = due else {
                    // Nothing to refresh until somebody signs in.
                    if matches!(
                        events.recv().await,
                        Err(broadcast::error::RecvError::Closed)
                    ) {
                        break;
                    }
                    continue;
                };

                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(due)) => {
                        match client.refresh_session().await {
                            Ok(_) => {}
                            Err(BaasError::SessionExpired | BaasError::NoSession) => {
                                tracing::info!("Session expired, signing out");
                                client.end_local_session().await;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Automatic token refresh failed");
                                tokio::time::sleep(REFRESH_RETRY_DELAY).await;
                            }
                        }
                    }
                    event = events.recv() => {
                        if matches!(event, Err(broadcast::error::RecvError::Closed)) {
                            break;
                        }
                    }
                }
            }
        })
    }

    // =========================================================================
    // Session bookkeeping
    // =========================================================================

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn load_persisted(&self) -> Result<Option<AuthSession>, BaasError> {
        let Some(raw) = self.inner.store.get_item(SESSION_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(stored) => Ok(Some(stored.into())),
            Err(e) => {
                tracing::debug!(error = %e, "Discarding corrupt persisted session");
                Ok(None)
            }
        }
    }

    async fn install_session(&self, session: &AuthSession) -> Result<(), BaasError> {
        *self.inner.session.write().await = Some(session.clone());
        let encoded = serde_json::to_string(&StoredSession::from(session))?;
        self.inner.store.set_item(SESSION_KEY, &encoded)?;
        Ok(())
    }

    /// Forget the session locally and tell subscribers.
    async fn end_local_session(&self) -> Option<AuthSession> {
        let previous = self.inner.session.write().await.take();
        if let Err(e) = self.inner.store.remove_item(SESSION_KEY) {
            tracing::warn!(error = %e, "Failed to remove persisted session");
        }
        self.emit(AuthEvent::SignedOut);
        previous
    }

    async fn session_snapshot(&self) -> Result<Option<AuthSession>, BaasError> {
        if let Some(session) = self.inner.session.read().await.clone() {
            return Ok(Some(session));
        }
        let persisted = self.load_persisted()?;
        if let Some(session) = &persisted {
            *self.inner.session.write().await = Some(session.clone());
        }
        Ok(persisted)
    }

    /// Token used for table reads: the user's when signed in, else the anon key.
    async fn bearer(&self) -> SecretString {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map_or_else(|| self.inner.anon_key.clone(), |s| s.access_token.clone())
    }

    // =========================================================================
    // HTTP helpers
    // =========================================================================

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<AuthSession, BaasError> {
        let now = chrono::Utc::now().timestamp();
        let url = self.endpoint(&format!("/auth/v1/token?grant_type={grant_type}"));

        let response = self.inner.http.post(&url).json(&body).send().await?;
        let status = response.status();

        if status.is_success() {
            let token: TokenResponse = response.json().await?;
            Ok(token.into_session(now))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_auth_error(status.as_u16(), &body))
        }
    }

    /// Fetch at most one row of `table` by primary key.
    async fn select_by_id<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
    ) -> Result<Option<T>, BaasError> {
        let url = self.endpoint(&format!(
            "/rest/v1/{table}?id=eq.{}&select=*&limit=1",
            urlencoding::encode(id)
        ));
        let bearer = self.bearer().await;

        let response = self
            .inner
            .http
            .get(&url)
            .bearer_auth(bearer.expose_secret())
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BaasError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let rows: Vec<T> = serde_json::from_str(&response.text().await?)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl IdentityProvider for BaasClient {
    async fn current_session(&self) -> Result<Option<AuthSession>, BaasError> {
        let Some(session) = self.session_snapshot().await? else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        match self.refresh_session().await {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::info!(error = %e, "Persisted session could not be refreshed");
                *self.inner.session.write().await = None;
                self.inner.store.remove_item(SESSION_KEY)?;
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BaasError> {
        let session = self
            .token_grant(
                "password",
                serde_json::json!({
                    "email": email.as_str(),
                    "password": password.expose_secret(),
                }),
            )
            .await?;

        self.install_session(&session).await?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        self.emit(AuthEvent::SignedIn(session.user.clone()));
        Ok(session)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn sign_up(&self, request: &SignUp) -> Result<Option<AuthSession>, BaasError> {
        let now = chrono::Utc::now().timestamp();
        let body = serde_json::json!({
            "email": request.email.as_str(),
            "password": request.password.expose_secret(),
            "data": {
                "full_name": request.full_name,
                "role": request.role,
            },
        });

        let response = self
            .inner
            .http
            .post(self.endpoint("/auth/v1/signup"))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(classify_auth_error(status.as_u16(), &text));
        }

        // Without auto-confirm the backend returns the bare user and no tokens.
        let value: serde_json::Value = serde_json::from_str(&text)?;
        if value.get("access_token").is_none() {
            tracing::info!("Sign-up pending email confirmation");
            return Ok(None);
        }

        let session = serde_json::from_value::<TokenResponse>(value)?.into_session(now);
        self.install_session(&session).await?;
        self.emit(AuthEvent::SignedIn(session.user.clone()));
        Ok(Some(session))
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BaasError> {
        let Some(previous) = self.end_local_session().await else {
            return Ok(());
        };

        let response = self
            .inner
            .http
            .post(self.endpoint("/auth/v1/logout"))
            .bearer_auth(previous.access_token.expose_secret())
            .send()
            .await;

        // The local session is already gone; a failed revoke only means the
        // refresh token lives until it expires.
        match response {
            Ok(r) if r.status().is_success() => {}
            Ok(r) => tracing::warn!(status = %r.status(), "Remote sign-out rejected"),
            Err(e) => tracing::warn!(error = %e, "Remote sign-out failed"),
        }
        Ok(())
    }

    #[instrument(skip(self, password))]
    async fn update_password(&self, password: &SecretString) -> Result<(), BaasError> {
        let session = self.session_snapshot().await?.ok_or(BaasError::NoSession)?;

        let response = self
            .inner
            .http
            .put(self.endpoint("/auth/v1/user"))
            .bearer_auth(session.access_token.expose_secret())
            .json(&serde_json::json!({ "password": password.expose_secret() }))
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            tracing::info!(user_id = %session.user.id, "Password updated");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_auth_error(status.as_u16(), &body))
        }
    }

    #[instrument(skip(self))]
    async fn refresh_session(&self) -> Result<AuthSession, BaasError> {
        let current = self.session_snapshot().await?.ok_or(BaasError::NoSession)?;

        let session = self
            .token_grant(
                "refresh_token",
                serde_json::json!({
                    "refresh_token": current.refresh_token.expose_secret(),
                }),
            )
            .await
            .map_err(|e| match e {
                BaasError::InvalidCredentials => BaasError::SessionExpired,
                other => other,
            })?;

        self.install_session(&session).await?;
        self.emit(AuthEvent::TokenRefreshed(session.user.clone()));
        Ok(session)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

#[async_trait]
impl ProfileDirectory for BaasClient {
    #[instrument(skip(self), fields(user_id = %id))]
    async fn profile_by_id(&self, id: &UserId) -> Result<Option<Profile>, BaasError> {
        self.select_by_id("profiles", id.as_str()).await
    }

    #[instrument(skip(self), fields(school_id = %id))]
    async fn school_by_id(&self, id: &SchoolId) -> Result<Option<School>, BaasError> {
        self.select_by_id("schools", id.as_str()).await
    }
}
