//! Account self-service.

use axum::{
    Form,
    extract::State,
    response::Redirect,
};
use examhub_core::paths;
use secrecy::SecretString;
use serde::Deserialize;

use super::auth::MIN_PASSWORD_LENGTH;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;

/// Password change form data.
#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    pub password: String,
    pub password_confirm: String,
}

/// `POST /account/password`
pub async fn update_password(
    State(state): State<AppState>,
    Form(form): Form<PasswordForm>,
) -> Result<Redirect> {
    if state.session().user.is_none() {
        return Err(AppError::Unauthorized("sign in first".to_string()));
    }
    if form.password != form.password_confirm {
        return Err(AppError::BadRequest("passwords do not match".to_string()));
    }
    if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    state
        .controller()
        .update_password(&SecretString::from(form.password))
        .await?;

    add_breadcrumb("account", "Password changed", None);
    Ok(Redirect::to(paths::ROOT))
}
