//! Login and registration screen.

use super::ScreenStatus;
use crate::app::Session;
use crate::auth::Identity;
use crate::error::{PosError, PosResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthTab {
    #[default]
    Login,
    Register,
}

#[derive(Debug, Default)]
pub struct LoginScreen {
    pub tab: AuthTab,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub success: Option<String>,
    pub status: ScreenStatus,
}

impl LoginScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switch_tab(&mut self, tab: AuthTab) {
        self.tab = tab;
        self.status.error = None;
        self.success = None;
    }

    /// Sign in or register depending on the tab. A successful sign-in loads
    /// the account; a successful registration switches back to the login tab.
    pub async fn submit(&mut self, session: &mut Session) -> PosResult<Option<Identity>> {
        self.success = None;
        self.status.begin();
        let result = match self.tab {
            AuthTab::Login => self.login(session).await.map(Some),
            AuthTab::Register => self.register(session).await.map(|_| None),
        };
        let result = result.map_err(|e| match e {
            PosError::Validation(_) | PosError::Forbidden(_) | PosError::Http(_) => e,
            _ => PosError::Backend(
                session
                    .t(match self.tab {
                        AuthTab::Login => "auth.error.login",
                        AuthTab::Register => "auth.error.register",
                    })
                    .to_string(),
            ),
        });
        self.status.finish(result)
    }

    async fn login(&mut self, session: &mut Session) -> PosResult<Identity> {
        let identity = session.auth.login(&self.email, &self.password).await?;
        session.sync_auth().await?;
        self.password.clear();
        Ok(identity)
    }

    async fn register(&mut self, session: &mut Session) -> PosResult<()> {
        if self.full_name.trim().is_empty() {
            return Err(PosError::validation("Full name is required"));
        }
        session
            .auth
            .register(&self.email, &self.password, &self.full_name)
            .await?;
        session.sync_auth().await?;
        self.success = Some(session.t("auth.success.register").to_string());
        self.tab = AuthTab::Login;
        self.password.clear();
        Ok(())
    }

    pub async fn logout(session: &mut Session) -> PosResult<()> {
        session.auth.logout().await?;
        session.sync_auth().await?;
        Ok(())
    }
}
