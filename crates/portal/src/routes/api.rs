//! JSON view of the session, for scripts and the CLI.

use axum::{Json, extract::State};
use examhub_core::SessionState;

use crate::state::AppState;

/// `GET /api/session`
pub async fn session(State(state): State<AppState>) -> Json<SessionState> {
    Json(state.session())
}

/// `POST /api/session/refresh`
///
/// Refetches the profile, bypassing the cache, and returns the new state.
pub async fn refresh(State(state): State<AppState>) -> Json<SessionState> {
    state.controller().refetch_profile().await;
    Json(state.session())
}
