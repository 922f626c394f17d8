//! Application state shared across handlers.

use std::sync::Arc;

use examhub_core::SessionState;

use crate::session::SessionController;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. The portal serves one session, so the state
/// is little more than the process-wide [`SessionController`].
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    controller: SessionController,
}

impl AppState {
    /// Create a new application state around a started controller.
    #[must_use]
    pub fn new(controller: SessionController) -> Self {
        Self {
            inner: Arc::new(AppStateInner { controller }),
        }
    }

    /// Get a reference to the session controller.
    #[must_use]
    pub fn controller(&self) -> &SessionController {
        &self.inner.controller
    }

    /// Snapshot of the current session.
    #[must_use]
    pub fn session(&self) -> SessionState {
        self.inner.controller.state()
    }
}
