//! Sign-in, sign-up and sign-out handlers.
//!
//! Failures redirect back to the form with a short `?error=` code rather
//! than rendering an error page, so a reload never resubmits the form.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use examhub_core::{Email, Role, paths};
use secrecy::SecretString;
use serde::Deserialize;

use crate::baas::{BaasError, SignUp};
use crate::error::add_breadcrumb;
use crate::state::AppState;

/// Shortest password the forms accept.
pub const MIN_PASSWORD_LENGTH: usize = 8;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Sign-up form data.
#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub full_name: Option<String>,
    pub role: Option<String>,
}

/// Query parameters for error/notice display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub notice: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub notice: Option<String>,
}

/// Sign-up page template.
#[derive(Template, WebTemplate)]
#[template(path = "signup.html")]
pub struct SignupTemplate {
    pub error: Option<String>,
}

fn error_message(code: &str) -> String {
    match code {
        "credentials" => "Invalid email or password.",
        "email" => "Please enter a valid email address.",
        "password_mismatch" => "The passwords do not match.",
        "password_short" => "Passwords must be at least 8 characters.",
        "password_rejected" => "That password is not allowed. Please choose a stronger one.",
        "exists" => "An account with this email already exists.",
        "role" => "Please choose a valid account type.",
        _ => "Something went wrong. Please try again.",
    }
    .to_string()
}

fn notice_message(code: &str) -> Option<String> {
    match code {
        "confirm" => Some("Check your inbox to confirm your email, then sign in.".to_string()),
        "signed_out" => Some("You have been signed out.".to_string()),
        _ => None,
    }
}

fn redirect_with_error(path: &str, code: &str) -> Response {
    Redirect::to(&format!("{path}?error={code}")).into_response()
}

// =============================================================================
// Sign in
// =============================================================================

/// `GET /login`
pub async fn login_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    LoginTemplate {
        error: query.error.as_deref().map(error_message),
        notice: query.notice.as_deref().and_then(notice_message),
    }
}

/// `POST /login`
///
/// Hands the credentials to the controller and sends the browser to `/`,
/// which shows the pending page until the profile has resolved.
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let Ok(email) = Email::parse(&form.email) else {
        return redirect_with_error(paths::LOGIN, "email");
    };
    let password = SecretString::from(form.password);

    match state.controller().sign_in(&email, &password).await {
        Ok(()) => {
            add_breadcrumb("auth", "Signed in", None);
            Redirect::to(paths::ROOT).into_response()
        }
        Err(BaasError::InvalidCredentials) => redirect_with_error(paths::LOGIN, "credentials"),
        Err(e) => {
            tracing::warn!(error = %e, "Sign-in failed");
            redirect_with_error(paths::LOGIN, "unavailable")
        }
    }
}

// =============================================================================
// Sign up
// =============================================================================

/// `GET /signup`
pub async fn signup_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    SignupTemplate {
        error: query.error.as_deref().map(error_message),
    }
}

/// Check a sign-up form, returning the `?error=` code on failure.
fn validate_signup(form: SignupForm) -> Result<SignUp, &'static str> {
    let email = Email::parse(&form.email).map_err(|_| "email")?;
    if form.password != form.password_confirm {
        return Err("password_mismatch");
    }
    if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err("password_short");
    }

    let role = match form.role.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<Role>() {
            // The platform role is never self-assigned.
            Ok(role) if !role.is_platform_admin() => Some(role),
            _ => return Err("role"),
        },
    };

    let full_name = form
        .full_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    Ok(SignUp {
        email,
        password: SecretString::from(form.password),
        full_name,
        role,
    })
}

/// `POST /signup`
pub async fn signup(State(state): State<AppState>, Form(form): Form<SignupForm>) -> Response {
    let request = match validate_signup(form) {
        Ok(request) => request,
        Err(code) => return redirect_with_error(paths::SIGNUP, code),
    };

    match state.controller().sign_up(&request).await {
        Ok(true) => {
            add_breadcrumb("auth", "Signed up", None);
            Redirect::to(paths::ROOT).into_response()
        }
        Ok(false) => Redirect::to(&format!("{}?notice=confirm", paths::LOGIN)).into_response(),
        Err(BaasError::UserAlreadyExists) => redirect_with_error(paths::SIGNUP, "exists"),
        Err(BaasError::WeakPassword(reason)) => {
            tracing::debug!(%reason, "Password rejected by backend");
            redirect_with_error(paths::SIGNUP, "password_rejected")
        }
        Err(e) => {
            tracing::warn!(error = %e, "Sign-up failed");
            redirect_with_error(paths::SIGNUP, "unavailable")
        }
    }
}

// =============================================================================
// Sign out
// =============================================================================

/// `POST /logout`
///
/// The local session is cleared even when the backend cannot be reached.
pub async fn logout(State(state): State<AppState>) -> Response {
    if let Err(e) = state.controller().sign_out().await {
        tracing::warn!(error = %e, "Sign-out did not complete cleanly");
    }
    add_breadcrumb("auth", "Signed out", None);
    Redirect::to(&format!("{}?notice=signed_out", paths::LOGIN)).into_response()
}
