//! Auth session types and token-endpoint payloads.

use examhub_core::{AuthUser, Email, Role};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::BaasError;

/// Seconds before expiry at which an access token is treated as expired.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// An authenticated session issued by the identity provider.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// The signed-in user.
    pub user: AuthUser,
    /// Bearer token for backend requests.
    pub access_token: SecretString,
    /// Token used to obtain a new access token.
    pub refresh_token: SecretString,
    /// Unix timestamp when the access token expires.
    pub expires_at: i64,
}

impl AuthSession {
    /// Check if the access token has expired (with a 60 second buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_within(EXPIRY_LEEWAY_SECS)
    }

    /// Check if the access token will expire within the given number of seconds.
    #[must_use]
    pub fn expires_within(&self, seconds: i64) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at - seconds
    }

    /// Seconds until the token should be refreshed (zero if already due).
    #[must_use]
    pub fn refresh_due_in(&self) -> u64 {
        let now = chrono::Utc::now().timestamp();
        u64::try_from(self.expires_at - EXPIRY_LEEWAY_SECS - now).unwrap_or(0)
    }
}

/// Sign-up request.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub email: Email,
    pub password: SecretString,
    pub full_name: Option<String>,
    /// Role requested at sign-up; the backend decides what profile to create.
    pub role: Option<Role>,
}

/// On-disk form of [`AuthSession`].
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredSession {
    user: AuthUser,
    access_token: String,
    refresh_token: String,
    expires_at: i64,
}

impl From<&AuthSession> for StoredSession {
    fn from(session: &AuthSession) -> Self {
        Self {
            user: session.user.clone(),
            access_token: session.access_token.expose_secret().to_owned(),
            refresh_token: session.refresh_token.expose_secret().to_owned(),
            expires_at: session.expires_at,
        }
    }
}

impl From<StoredSession> for AuthSession {
    fn from(stored: StoredSession) -> Self {
        Self {
            user: stored.user,
            access_token: SecretString::from(stored.access_token),
            refresh_token: SecretString::from(stored.refresh_token),
            expires_at: stored.expires_at,
        }
    }
}

/// Response from the token and sign-up endpoints when a session is issued.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Token lifetime in seconds.
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    /// Convert into a session, computing the expiry from `now` when the
    /// backend did not send an absolute one.
    pub(crate) fn into_session(self, now: i64) -> AuthSession {
        AuthSession {
            user: self.user,
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at: self.expires_at.unwrap_or(now + self.expires_in),
        }
    }
}

/// Error body returned by the auth endpoints. Different endpoints use
/// different field names for the same thing.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuthErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AuthErrorResponse {
    fn text(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "Unknown error".to_owned())
    }
}

/// Map an auth endpoint failure to a [`BaasError`].
pub(crate) fn classify_auth_error(status: u16, body: &str) -> BaasError {
    let parsed: AuthErrorResponse = serde_json::from_str(body).unwrap_or_default();
    let code = parsed
        .error_code
        .as_deref()
        .or(parsed.error.as_deref())
        .unwrap_or_default();
    let text = parsed.text();

    match code {
        "invalid_grant" | "invalid_credentials" if text.to_lowercase().contains("refresh") => {
            BaasError::SessionExpired
        }
        "invalid_grant" | "invalid_credentials" => BaasError::InvalidCredentials,
        "refresh_token_not_found" | "refresh_token_already_used" | "session_not_found" => {
            BaasError::SessionExpired
        }
        "user_already_exists" | "email_exists" => BaasError::UserAlreadyExists,
        "weak_password" => BaasError::WeakPassword(text),
        _ if text.contains("already registered") => BaasError::UserAlreadyExists,
        _ => BaasError::Api {
            status,
            message: text,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session(expires_at: i64) -> AuthSession {
        AuthSession {
            user: AuthUser::new("u1", None),
            access_token: SecretString::from("access"),
            refresh_token: SecretString::from("refresh"),
            expires_at,
        }
    }

    #[test]
    fn test_session_expiry() {
        let now = chrono::Utc::now().timestamp();
        assert!(session(now - 3600).is_expired());
        assert!(!session(now + 3600).is_expired());
        // Inside the 60 second buffer
        assert!(session(now + 30).is_expired());
        assert_eq!(session(now - 10).refresh_due_in(), 0);
        assert!(session(now + 3600).refresh_due_in() > 3000);
    }

    #[test]
    fn test_token_response_expiry() {
        let json = r#"{
            "access_token": "a",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r",
            "user": {"id": "u1", "email": "t@school.edu", "aud": "authenticated"}
        }"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let session = response.into_session(1_000);
        assert_eq!(session.expires_at, 4_600);
        assert_eq!(session.user.id.as_str(), "u1");
        assert_eq!(session.access_token.expose_secret(), "a");
    }

    #[test]
    fn test_stored_session_round_trip() {
        let original = session(42);
        let stored = serde_json::to_string(&StoredSession::from(&original)).unwrap();
        let restored: AuthSession = serde_json::from_str::<StoredSession>(&stored)
            .unwrap()
            .into();
        assert_eq!(restored.user, original.user);
        assert_eq!(restored.refresh_token.expose_secret(), "refresh");
        assert_eq!(restored.expires_at, 42);
    }

    #[test]
    fn test_classify_auth_errors() {
        assert!(matches!(
            classify_auth_error(
                400,
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#
            ),
            BaasError::InvalidCredentials
        ));
        assert!(matches!(
            classify_auth_error(
                400,
                r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token: Refresh Token Not Found"}"#
            ),
            BaasError::SessionExpired
        ));
        assert!(matches!(
            classify_auth_error(422, r#"{"code":422,"msg":"User already registered"}"#),
            BaasError::UserAlreadyExists
        ));
        assert!(matches!(
            classify_auth_error(
                422,
                r#"{"error_code":"weak_password","msg":"Password should be at least 8 characters"}"#
            ),
            BaasError::WeakPassword(msg) if msg.contains("8 characters")
        ));
        assert!(matches!(
            classify_auth_error(503, "upstream down"),
            BaasError::Api { status: 503, .. }
        ));
    }
}
