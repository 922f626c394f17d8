//! Navigation decisions derived from a [`SessionState`].
//!
//! These are pure functions: the portal maps each decision to an HTTP
//! response, the CLI prints it. Keeping them here means both agree on what a
//! given session may open.
//!
//! The one rule everything else depends on: while the session is loading, no
//! decision redirects. A valid session that is still resolving must never be
//! bounced to the login page.

use crate::{Role, SessionState, paths};

/// Outcome of guarding a role-scoped page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still resolving; show an in-place placeholder.
    Pending,
    /// No signed-in user.
    RedirectToLogin,
    /// Signed in, but no profile or a role outside the allowed set.
    RedirectToUnauthorized,
    /// The user's school is suspended, expired or inactive. Rendered in place
    /// so the attempted URL is preserved.
    Suspended,
    /// Render the page.
    Allow,
}

impl GuardDecision {
    /// Redirect target, for the decisions that redirect.
    #[must_use]
    pub const fn redirect_target(self) -> Option<&'static str> {
        match self {
            Self::RedirectToLogin => Some(paths::LOGIN),
            Self::RedirectToUnauthorized => Some(paths::UNAUTHORIZED),
            Self::Pending | Self::Suspended | Self::Allow => None,
        }
    }
}

/// Decide whether `state` may open a page restricted to `allowed` roles.
#[must_use]
pub fn guard(state: &SessionState, allowed: &[Role]) -> GuardDecision {
    if state.loading {
        return GuardDecision::Pending;
    }
    if state.user.is_none() {
        return GuardDecision::RedirectToLogin;
    }
    let Some(profile) = &state.profile else {
        return GuardDecision::RedirectToUnauthorized;
    };
    if !allowed.contains(&profile.role) {
        return GuardDecision::RedirectToUnauthorized;
    }
    if profile.is_suspended() {
        return GuardDecision::Suspended;
    }
    GuardDecision::Allow
}

/// Outcome of opening `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootDecision {
    Pending,
    Redirect(&'static str),
}

/// Send the user to their role's home, to login, or to unauthorized.
#[must_use]
pub fn root_redirect(state: &SessionState) -> RootDecision {
    if state.loading {
        return RootDecision::Pending;
    }
    if state.user.is_none() {
        return RootDecision::Redirect(paths::LOGIN);
    }
    match &state.profile {
        Some(profile) => RootDecision::Redirect(profile.role.home_path()),
        None => RootDecision::Redirect(paths::UNAUTHORIZED),
    }
}

/// Outcome of opening a sign-in or sign-up page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRouteDecision {
    Pending,
    /// Already signed in with a profile; go home instead.
    Redirect(&'static str),
    /// Show the form.
    Render,
}

/// The inverse guard used by the sign-in and sign-up pages.
///
/// A signed-in user without a profile still gets the form: they are most
/// likely mid-onboarding and may need to sign in as someone else.
#[must_use]
pub fn auth_route(state: &SessionState) -> AuthRouteDecision {
    if state.loading {
        return AuthRouteDecision::Pending;
    }
    match (&state.user, &state.profile) {
        (Some(_), Some(profile)) => AuthRouteDecision::Redirect(profile.role.home_path()),
        _ => AuthRouteDecision::Render,
    }
}
