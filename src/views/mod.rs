//! Headless screen controllers, one per page.
//!
//! A screen owns its form state and a [`ScreenStatus`]; actions take the
//! [`Session`](crate::app::Session) explicitly. While an action runs the
//! screen is busy; when it fails the error text is kept for inline display
//! and the screen otherwise stays as it was.

pub mod admin;
pub mod branches;
pub mod contact;
pub mod dashboard;
pub mod login;
pub mod menu_editor;
pub mod orders;
pub mod pos;
pub mod public_menu;
pub mod settings;

use tracing::warn;

use crate::error::PosResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenStatus {
    pub busy: bool,
    pub error: Option<String>,
}

impl ScreenStatus {
    /// Mark an action as started and clear the previous error.
    pub fn begin(&mut self) {
        self.busy = true;
        self.error = None;
    }

    /// Record the outcome of an action and pass it through.
    pub fn finish<T>(&mut self, result: PosResult<T>) -> PosResult<T> {
        self.busy = false;
        if let Err(e) = &result {
            warn!(error = %e, "screen action failed");
            self.error = Some(e.to_string());
        }
        result
    }

    /// Reject input before any request; the screen never becomes busy.
    pub fn reject<T>(&mut self, result: PosResult<T>) -> PosResult<T> {
        if let Err(e) = &result {
            self.error = Some(e.to_string());
        }
        result
    }
}

/// Whether a screen should be redirected to the login page.
pub fn needs_login(session: &crate::app::Session) -> bool {
    session.auth.user().is_none()
}
