//! Root redirect, the unauthorized page and the two in-place pages the
//! guards render instead of redirecting.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use examhub_core::{RootDecision, SessionState, root_redirect};

use crate::state::AppState;

/// Seconds between reloads of the pending page.
pub const POLL_INTERVAL_SECS: u32 = 1;

/// Placeholder shown while the session resolves. Reloads itself in place.
#[derive(Template, WebTemplate)]
#[template(path = "loading.html")]
pub struct LoadingTemplate {
    pub poll_interval_secs: u32,
}

/// "Access suspended" interstitial.
#[derive(Template, WebTemplate)]
#[template(path = "suspended.html")]
pub struct SuspendedTemplate {
    pub school_name: Option<String>,
    pub status: String,
}

/// Unauthorized page template.
#[derive(Template, WebTemplate)]
#[template(path = "unauthorized.html")]
pub struct UnauthorizedTemplate {
    pub signed_in: bool,
}

/// `200` placeholder for a pending session. Never a redirect: the URL the
/// user asked for must survive the loading window.
pub fn pending() -> Response {
    LoadingTemplate {
        poll_interval_secs: POLL_INTERVAL_SECS,
    }
    .into_response()
}

/// `403` interstitial for a suspended school, rendered at the requested URL.
pub fn suspended(session: &SessionState) -> Response {
    let school = session.profile.as_ref().and_then(|p| p.school.as_ref());
    let template = SuspendedTemplate {
        school_name: school.map(|s| s.name.clone()),
        status: school.map_or_else(
            || "suspended".to_string(),
            |s| {
                if s.is_active {
                    s.subscription_status.to_string()
                } else {
                    "inactive".to_string()
                }
            },
        ),
    };
    (StatusCode::FORBIDDEN, template).into_response()
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Response {
    match root_redirect(&state.session()) {
        RootDecision::Pending => pending(),
        RootDecision::Redirect(target) => Redirect::to(target).into_response(),
    }
}

/// `GET /unauthorized`
pub async fn unauthorized(State(state): State<AppState>) -> impl IntoResponse {
    UnauthorizedTemplate {
        signed_in: state.session().user.is_some(),
    }
}

/// `GET /health`
///
/// Returns "ok" if the server is running. Does not check the backend.
pub async fn health() -> &'static str {
    "ok"
}
