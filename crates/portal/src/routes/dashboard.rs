//! Role dashboards and the teacher's exam-token endpoint.
//!
//! Everything here sits behind the route guard, so a handler only runs for a
//! settled session whose profile has the right role and an unsuspended
//! school.

use askama::Template;
use askama_web::WebTemplate;
use axum::{Json, extract::State};
use examhub_core::Role;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::services::ExamToken;
use crate::state::AppState;

/// Dashboard template shared by the four role homes.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub heading: &'static str,
    pub role: &'static str,
    pub display_name: String,
    pub school_name: Option<String>,
}

const fn heading(role: Role) -> &'static str {
    match role {
        Role::SuperAdmin => "Platform administration",
        Role::SchoolAdmin => "School administration",
        Role::Teacher => "Teacher dashboard",
        Role::Student => "My exams",
    }
}

/// `GET /super-admin`, `/school-admin`, `/teacher`, `/student`
pub async fn dashboard(State(state): State<AppState>) -> Result<DashboardTemplate> {
    // The guard already checked this; the session may have changed since.
    let profile = state
        .session()
        .profile
        .ok_or_else(|| AppError::Unauthorized("no profile".to_string()))?;

    Ok(DashboardTemplate {
        heading: heading(profile.role),
        role: profile.role.as_str(),
        display_name: profile.display_name().to_string(),
        school_name: profile.school.map(|s| s.name),
    })
}

/// Response body of the exam-token endpoint.
#[derive(Debug, Serialize)]
pub struct ExamTokenResponse {
    pub token: ExamToken,
}

/// `GET /teacher/exam-token`
pub async fn exam_token() -> Json<ExamTokenResponse> {
    let token = ExamToken::generate();
    tracing::info!(token = %token, "Exam token issued");
    Json(ExamTokenResponse { token })
}
