//! Service wiring and the per-user session that screens operate on.
//!
//! [`PosApp`] owns the collaborators (database, tabular backend, auth,
//! object storage) chosen by configuration. [`Session`] owns one instance of
//! every store; screens receive it explicitly instead of reaching for
//! globals, so each test builds its own.

use chrono::FixedOffset;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::auth::{AuthService, AuthStore, Identity, LocalAuthService, RestAuthService};
use crate::backend::rest::AccessToken;
use crate::backend::{Backend, LocalBackend, RestBackend};
use crate::config::{BackendMode, PosConfig};
use crate::db::{self, DbState};
use crate::error::{PosError, PosResult};
use crate::media::{LocalObjectStorage, ObjectStorage, RestObjectStorage};
use crate::menu::MenuCatalog;
use crate::orders::OrderStore;
use crate::plan::PlanStore;
use crate::settings::SettingsStore;
use crate::shops::ShopDirectory;

pub struct PosApp {
    pub config: PosConfig,
    pub db: Arc<DbState>,
    pub backend: Arc<dyn Backend>,
    pub auth: Arc<dyn AuthService>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl PosApp {
    /// Open the local database and build the collaborators for the
    /// configured backend mode.
    pub fn bootstrap(config: PosConfig) -> PosResult<Self> {
        let db = Arc::new(db::init(&config.data_dir)?);
        let (backend, auth, storage): (Arc<dyn Backend>, Arc<dyn AuthService>, Arc<dyn ObjectStorage>) =
            match &config.backend {
                BackendMode::Local => (
                    Arc::new(LocalBackend::new(db.clone())),
                    Arc::new(LocalAuthService::new(db.clone(), config.bcrypt_cost)),
                    Arc::new(LocalObjectStorage::new(&config.data_dir)),
                ),
                BackendMode::Remote { url, anon_key } => {
                    let token = Arc::new(AccessToken::new());
                    (
                        Arc::new(RestBackend::new(url, anon_key, token.clone())?),
                        Arc::new(RestAuthService::new(url, anon_key, token.clone())?),
                        Arc::new(RestObjectStorage::new(url, anon_key, token)?),
                    )
                }
            };
        info!(version = env!("CARGO_PKG_VERSION"), "Shop POS services ready");
        Ok(Self::from_parts(config, db, backend, auth, storage))
    }

    pub fn from_parts(
        config: PosConfig,
        db: Arc<DbState>,
        backend: Arc<dyn Backend>,
        auth: Arc<dyn AuthService>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            config,
            db,
            backend,
            auth,
            storage,
        }
    }

    /// Fresh stores bound to these services.
    pub fn session(&self) -> PosResult<Session> {
        Ok(Session {
            backend: self.backend.clone(),
            auth_service: self.auth.clone(),
            storage: self.storage.clone(),
            auth_events: self.auth.subscribe(),
            public_origin: self.config.public_origin.clone(),
            display_offset: self.config.display_offset(),
            auth: AuthStore::new(self.backend.clone(), self.auth.clone()),
            shops: ShopDirectory::new(self.backend.clone(), self.auth.clone()),
            menu: MenuCatalog::new(self.backend.clone()),
            orders: OrderStore::new(self.backend.clone(), self.auth.clone()),
            plan: PlanStore::new(self.backend.clone(), self.auth.clone()),
            settings: SettingsStore::load(self.db.clone())?,
        })
    }
}

pub struct Session {
    backend: Arc<dyn Backend>,
    auth_service: Arc<dyn AuthService>,
    storage: Arc<dyn ObjectStorage>,
    auth_events: watch::Receiver<Option<Identity>>,
    pub public_origin: String,
    pub display_offset: FixedOffset,
    pub auth: AuthStore,
    pub shops: ShopDirectory,
    pub menu: MenuCatalog,
    pub orders: OrderStore,
    pub plan: PlanStore,
    pub settings: SettingsStore,
}

impl Session {
    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    pub fn auth_service(&self) -> Arc<dyn AuthService> {
        self.auth_service.clone()
    }

    pub fn storage(&self) -> &dyn ObjectStorage {
        self.storage.as_ref()
    }

    /// Restore a previous session and, if one exists, load the user's data.
    pub async fn start(&mut self) -> PosResult<Option<Identity>> {
        let user = self.auth.initialize().await?;
        self.auth_events.borrow_and_update();
        if user.is_some() {
            self.load_account().await?;
        }
        Ok(user)
    }

    /// Shops (auto-selecting the first) and the plan of the signed-in user.
    pub async fn load_account(&mut self) -> PosResult<()> {
        self.shops.fetch_shops().await?;
        self.plan.fetch_plan().await?;
        Ok(())
    }

    /// React to a sign-in or sign-out made through any store. Returns whether
    /// the session changed.
    pub async fn sync_auth(&mut self) -> PosResult<bool> {
        if !self.auth_events.has_changed().unwrap_or(false) {
            return Ok(false);
        }
        let user = self.auth_events.borrow_and_update().clone();
        self.auth.refresh();
        match user {
            Some(user) => {
                debug!(user_id = %user.id, "session changed, reloading account");
                self.reset_stores();
                self.load_account().await?;
            }
            None => {
                debug!("signed out, clearing stores");
                self.reset_stores();
            }
        }
        Ok(true)
    }

    fn reset_stores(&mut self) {
        self.shops = ShopDirectory::new(self.backend.clone(), self.auth_service.clone());
        self.menu = MenuCatalog::new(self.backend.clone());
        self.orders = OrderStore::new(self.backend.clone(), self.auth_service.clone());
        self.plan = PlanStore::new(self.backend.clone(), self.auth_service.clone());
    }

    pub fn require_user(&self) -> PosResult<Identity> {
        self.auth.user().cloned().ok_or(PosError::NotAuthenticated)
    }

    /// Translate a key in the selected language.
    pub fn t<'a>(&self, key: &'a str) -> &'a str {
        self.settings.t(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewShop, ShopType};
    use crate::testing;

    #[test]
    fn bootstrap_local_creates_database_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let config = PosConfig::from_lookup(|key| match key {
            "POS_DATA_DIR" => Some(data_dir.to_string_lossy().into_owned()),
            _ => None,
        })
        .unwrap();
        let app = PosApp::bootstrap(config).unwrap();
        assert!(data_dir.join("pos.db").exists());
        assert!(app.session().is_ok());
    }

    #[tokio::test]
    async fn sign_out_clears_account_stores() {
        let (_dir, app) = testing::app();
        let mut session = app.session().unwrap();
        session
            .auth
            .register("owner@shop.th", "secret1", "Owner")
            .await
            .unwrap();
        assert!(session.sync_auth().await.unwrap());
        assert!(session.plan.plan().is_some());

        session
            .shops
            .create_shop(NewShop {
                name: "Baan".into(),
                slug: "baan".into(),
                shop_type: ShopType::Cafe,
            })
            .await
            .unwrap();
        assert!(session.shops.current_shop().is_some());
        assert!(!session.sync_auth().await.unwrap());

        session.auth.logout().await.unwrap();
        assert!(session.sync_auth().await.unwrap());
        assert!(session.shops.shops().is_empty());
        assert!(session.shops.current_shop().is_none());
        assert!(session.auth.user().is_none());
    }

    #[tokio::test]
    async fn restored_session_loads_shops() {
        let (_dir, app) = testing::app();
        {
            let mut first = app.session().unwrap();
            first.auth.register("owner@shop.th", "secret1", "Owner").await.unwrap();
            first.sync_auth().await.unwrap();
            first
                .shops
                .create_shop(NewShop {
                    name: "Baan".into(),
                    slug: "baan".into(),
                    shop_type: ShopType::Restaurant,
                })
                .await
                .unwrap();
        }
        let mut second = app.session().unwrap();
        let user = second.start().await.unwrap();
        assert_eq!(user.map(|u| u.email), Some("owner@shop.th".to_string()));
        assert_eq!(second.shops.current_shop().map(|s| s.slug.as_str()), Some("baan"));
    }
}
