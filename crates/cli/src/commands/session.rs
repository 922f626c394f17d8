//! Session commands.
//!
//! Each invocation builds the same stack the portal binary runs (store,
//! backend client, profile cache, controller), resolves the persisted session
//! and acts on it.
//!
//! # Environment Variables
//!
//! - `EXAMHUB_BAAS_URL`, `EXAMHUB_BAAS_ANON_KEY` - Backend connection
//! - `EXAMHUB_STORAGE_PATH` - Shared with the portal (default: .examhub/storage.json)
//! - `EXAMHUB_PASSWORD` - Password for `login`/`signup`/`passwd`, instead of stdin

use std::io::BufRead;
use std::sync::Arc;

use examhub_core::{
    AuthRouteDecision, Email, EmailError, GuardDecision, Role, RoleParseError, RootDecision,
    SessionState, auth_route, guard, paths, root_redirect,
};
use examhub_portal::baas::{BaasClient, BaasError, SignUp};
use examhub_portal::config::{BaasConfig, ConfigError, storage_path_from_env};
use examhub_portal::session::{SessionCache, SessionController};
use examhub_portal::storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
use secrecy::SecretString;
use thiserror::Error;

/// Errors that can occur during session commands.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Backend error: {0}")]
    Baas(#[from] BaasError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("{0}. Valid roles: school_admin, teacher, student")]
    InvalidRole(#[from] RoleParseError),

    #[error("Could not read password: {0}")]
    Io(#[from] std::io::Error),

    #[error("The {0} role cannot be chosen at sign-up")]
    RoleNotSelfServe(Role),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Password must not be empty")]
    EmptyPassword,
}

/// A started session controller over the configured backend.
pub struct Portal {
    controller: SessionController,
    auto_refresh: tokio::task::JoinHandle<()>,
}

impl Portal {
    /// Build the stack and resolve the persisted session.
    pub async fn open(ephemeral: bool) -> Result<Self, SessionError> {
        let config = BaasConfig::from_env()?;

        let store: Arc<dyn KeyValueStore> = if ephemeral {
            Arc::new(MemoryStore::new())
        } else {
            let path = storage_path_from_env();
            tracing::debug!(path = %path.display(), "Opening storage");
            Arc::new(FileStore::open(path)?)
        };

        let client = BaasClient::new(&config, Arc::clone(&store))?;
        let auto_refresh = client.spawn_auto_refresh();
        let client = Arc::new(client);

        let controller = SessionController::new(client.clone(), client, SessionCache::new(store));
        controller.start().await;

        Ok(Self {
            controller,
            auto_refresh,
        })
    }

    /// Stop background work.
    pub fn close(&self) {
        self.controller.dispose();
        self.auto_refresh.abort();
    }
}

/// Password from `EXAMHUB_PASSWORD`, else the first line of stdin.
fn read_password(prompt: &str) -> Result<SecretString, SessionError> {
    if let Ok(password) = std::env::var("EXAMHUB_PASSWORD") {
        return Ok(SecretString::from(password));
    }

    #[allow(clippy::print_stderr)]
    {
        eprint!("{prompt}: ");
    }
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(SessionError::EmptyPassword);
    }
    Ok(SecretString::from(password))
}

/// One-line summary of a settled session.
fn describe(state: &SessionState) -> String {
    match (&state.user, &state.profile) {
        (None, _) => "Not signed in".to_string(),
        (Some(user), None) => format!("Signed in as {} (no profile)", user.id),
        (Some(_), Some(profile)) => {
            let mut line = format!("Signed in as {} ({})", profile.display_name(), profile.role);
            if let Some(school) = &profile.school {
                line.push_str(&format!(" at {} [{}]", school.name, school.subscription_status));
            }
            if profile.is_suspended() {
                line.push_str(" - access suspended");
            }
            line
        }
    }
}

#[allow(clippy::print_stdout)]
fn print_state(state: &SessionState) {
    println!("{}", describe(state));
}

/// `examhub login`
pub async fn login(portal: &Portal, email: &str) -> Result<(), SessionError> {
    let email = Email::parse(email)?;
    let password = read_password("Password")?;

    portal.controller.sign_in(&email, &password).await?;
    let state = portal.controller.settled().await;
    print_state(&state);
    Ok(())
}

/// `examhub logout`
pub async fn logout(portal: &Portal) -> Result<(), SessionError> {
    portal.controller.sign_out().await?;
    print_state(&portal.controller.state());
    Ok(())
}

/// `examhub signup`
pub async fn signup(
    portal: &Portal,
    email: &str,
    full_name: Option<String>,
    role: Option<&str>,
) -> Result<(), SessionError> {
    let email = Email::parse(email)?;
    let role = role.map(str::parse::<Role>).transpose()?;
    if let Some(role) = role.filter(|role| role.is_platform_admin()) {
        return Err(SessionError::RoleNotSelfServe(role));
    }
    let password = read_password("Choose a password")?;

    let request = SignUp {
        email,
        password,
        full_name,
        role,
    };
    if portal.controller.sign_up(&request).await? {
        print_state(&portal.controller.settled().await);
    } else {
        #[allow(clippy::print_stdout)]
        {
            println!("Account created. Confirm your email, then run `examhub login`.");
        }
    }
    Ok(())
}

/// `examhub whoami`
pub async fn whoami(portal: &Portal, json: bool) -> Result<(), SessionError> {
    let state = portal.controller.settled().await;
    if json {
        #[allow(clippy::print_stdout)]
        {
            println!(
                "{}",
                serde_json::to_string_pretty(&state).unwrap_or_else(|_| describe(&state))
            );
        }
    } else {
        print_state(&state);
    }
    Ok(())
}

/// `examhub refresh`
pub async fn refresh(portal: &Portal) -> Result<(), SessionError> {
    if portal.controller.settled().await.user.is_none() {
        return Err(SessionError::NotSignedIn);
    }
    portal.controller.refetch_profile().await;
    print_state(&portal.controller.state());
    Ok(())
}

/// What the portal does for `path` in `state`.
fn route_outcome(state: &SessionState, path: &str) -> String {
    if path == paths::ROOT {
        return match root_redirect(state) {
            RootDecision::Pending => "pending".to_string(),
            RootDecision::Redirect(target) => format!("redirect {target}"),
        };
    }
    if path == paths::LOGIN || path == paths::SIGNUP {
        return match auth_route(state) {
            AuthRouteDecision::Pending => "pending".to_string(),
            AuthRouteDecision::Redirect(target) => format!("redirect {target}"),
            AuthRouteDecision::Render => "render".to_string(),
        };
    }
    let Some(roles) = paths::required_roles(path) else {
        return "render (public)".to_string();
    };
    match guard(state, roles) {
        GuardDecision::Pending => "pending".to_string(),
        GuardDecision::Suspended => "suspended (403, URL kept)".to_string(),
        GuardDecision::Allow => "render".to_string(),
        decision => decision
            .redirect_target()
            .map_or_else(|| "render".to_string(), |target| format!("redirect {target}")),
    }
}

/// `examhub route`
pub async fn route(portal: &Portal, path: &str) -> Result<(), SessionError> {
    let state = portal.controller.settled().await;
    #[allow(clippy::print_stdout)]
    {
        println!("{path}: {}", route_outcome(&state, path));
    }
    Ok(())
}

/// `examhub passwd`
pub async fn passwd(portal: &Portal) -> Result<(), SessionError> {
    if portal.controller.settled().await.user.is_none() {
        return Err(SessionError::NotSignedIn);
    }
    let password = read_password("New password")?;
    portal.controller.update_password(&password).await?;
    tracing::info!("Password updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use examhub_core::{AuthUser, Profile, School, SubscriptionStatus};

    fn signed_in(role: Role, status: SubscriptionStatus) -> SessionState {
        let profile = Profile::new("u1", role).with_school(School::new("s1", "Hillcrest").with_status(status));
        SessionState::resolved(AuthUser::new("u1", None), Some(profile))
    }

    #[test]
    fn test_route_outcomes() {
        let anonymous = SessionState::anonymous();
        assert_eq!(route_outcome(&anonymous, "/"), "redirect /login");
        assert_eq!(route_outcome(&anonymous, "/teacher"), "redirect /login");
        assert_eq!(route_outcome(&anonymous, "/login"), "render");
        assert_eq!(route_outcome(&SessionState::initializing(), "/teacher"), "pending");

        let teacher = signed_in(Role::Teacher, SubscriptionStatus::Active);
        assert_eq!(route_outcome(&teacher, "/"), "redirect /teacher");
        assert_eq!(route_outcome(&teacher, "/teacher/exam-token"), "render");
        assert_eq!(route_outcome(&teacher, "/student"), "redirect /unauthorized");
        assert_eq!(route_outcome(&teacher, "/login"), "redirect /teacher");
        assert_eq!(route_outcome(&teacher, "/about"), "render (public)");

        let suspended = signed_in(Role::Student, SubscriptionStatus::Expired);
        assert_eq!(route_outcome(&suspended, "/student"), "suspended (403, URL kept)");
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&SessionState::anonymous()), "Not signed in");
        let no_profile = SessionState::resolved(AuthUser::new("u9", None), None);
        assert_eq!(describe(&no_profile), "Signed in as u9 (no profile)");
        let suspended = signed_in(Role::Teacher, SubscriptionStatus::Suspended);
        assert_eq!(
            describe(&suspended),
            "Signed in as u1 (teacher) at Hillcrest [suspended] - access suspended"
        );
    }
}
