//! Session gating for page trees.
//!
//! [`route_guard_middleware`] protects every path in the role route table;
//! [`auth_route_middleware`] keeps signed-in users off the sign-in and
//! sign-up forms. Both decide from the controller's current snapshot and map
//! the pure decisions from `examhub_core::guard` onto responses.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use examhub_core::{AuthRouteDecision, GuardDecision, auth_route, guard, paths};

use crate::routes::pages;
use crate::state::AppState;

/// Guard role-scoped paths.
///
/// | Decision | Response |
/// |----------|----------|
/// | pending | `200` loading placeholder |
/// | no user | `303` to `/login` |
/// | no profile / wrong role | `303` to `/unauthorized` |
/// | school suspended | `403` interstitial at the same URL |
/// | allowed | the page |
pub async fn route_guard_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(roles) = paths::required_roles(request.uri().path()) else {
        return next.run(request).await;
    };

    let session = state.session();
    match guard(&session, roles) {
        GuardDecision::Allow => next.run(request).await,
        GuardDecision::Pending => pages::pending(),
        GuardDecision::Suspended => {
            tracing::info!(path = %request.uri().path(), "School suspended, showing interstitial");
            pages::suspended(&session)
        }
        GuardDecision::RedirectToLogin => Redirect::to(paths::LOGIN).into_response(),
        GuardDecision::RedirectToUnauthorized => {
            Redirect::to(paths::UNAUTHORIZED).into_response()
        }
    }
}

/// Send fully signed-in users from the auth forms to their home.
///
/// Only page loads are gated; form submissions pass through.
pub async fn auth_route_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return next.run(request).await;
    }

    match auth_route(&state.session()) {
        AuthRouteDecision::Render => next.run(request).await,
        AuthRouteDecision::Pending => pages::pending(),
        AuthRouteDecision::Redirect(home) => Redirect::to(home).into_response(),
    }
}
