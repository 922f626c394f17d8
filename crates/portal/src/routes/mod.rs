//! HTTP route handlers for the portal shell.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Root redirect (role home, login or unauthorized)
//! GET  /health                 - Health check
//!
//! # Auth (signed-in users are sent home from the GET pages)
//! GET  /login                  - Login page
//! POST /login                  - Login action
//! GET  /signup                 - Sign-up page
//! POST /signup                 - Sign-up action
//! POST /logout                 - Logout action
//! GET  /unauthorized           - No profile / wrong role
//!
//! # Role dashboards (route guard)
//! GET  /super-admin            - Platform admin home
//! GET  /school-admin           - School admin home
//! GET  /teacher                - Teacher home
//! GET  /teacher/exam-token     - New exam access token (JSON)
//! GET  /student                - Student home
//!
//! # Account
//! POST /account/password       - Change password
//!
//! # API
//! GET  /api/session            - Session snapshot
//! POST /api/session/refresh    - Refetch the profile
//! ```

pub mod account;
pub mod api;
pub mod auth;
pub mod dashboard;
pub mod pages;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use examhub_core::paths;

use crate::middleware::{auth_route_middleware, route_guard_middleware};
use crate::state::AppState;

/// Sign-in and sign-up forms, gated by the auth-route check.
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(paths::LOGIN, get(auth::login_page).post(auth::login))
        .route(paths::SIGNUP, get(auth::signup_page).post(auth::signup))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_route_middleware,
        ))
}

/// The four role trees. Guarded by path through the role route table.
pub fn dashboard_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(paths::SUPER_ADMIN_HOME, get(dashboard::dashboard))
        .route(paths::SCHOOL_ADMIN_HOME, get(dashboard::dashboard))
        .route(paths::TEACHER_HOME, get(dashboard::dashboard))
        .route("/teacher/exam-token", get(dashboard::exam_token))
        .route(paths::STUDENT_HOME, get(dashboard::dashboard))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            route_guard_middleware,
        ))
}

/// Session API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(api::session))
        .route("/session/refresh", post(api::refresh))
}

/// Every page and endpoint of the shell.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(paths::ROOT, get(pages::root))
        .route("/health", get(pages::health))
        .route(paths::UNAUTHORIZED, get(pages::unauthorized))
        .route("/logout", post(auth::logout))
        .route("/account/password", post(account::update_password))
        .merge(auth_routes(state))
        .merge(dashboard_routes(state))
        .nest("/api", api_routes())
}
