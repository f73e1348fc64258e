//! Shop POS core.
//!
//! Multi-tenant point of sale for small shops: shops own branches, tables
//! and a menu; cashiers build carts and check out; customers order from a
//! table QR code. Data lives behind a [`backend::Backend`] (local SQLite or
//! a hosted PostgREST service) and screens in [`views`] drive the stores
//! held by a [`Session`].

pub mod app;
pub mod auth;
pub mod backend;
pub mod cart;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod format;
pub mod i18n;
pub mod inquiries;
pub mod logging;
pub mod media;
pub mod menu;
pub mod models;
pub mod orders;
pub mod payments;
pub mod plan;
pub mod settings;
pub mod shops;
pub mod views;

#[cfg(test)]
mod testing;

pub use app::{PosApp, Session};
pub use config::PosConfig;
pub use error::{PosError, PosResult};
pub use logging::init_logging;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

/// Everything a front end needs after startup.
pub struct Runtime {
    pub app: PosApp,
    pub session: Session,
    /// Keep alive for the life of the process; dropping it flushes and stops
    /// file logging.
    pub log_guard: WorkerGuard,
}

/// Load configuration, start logging, wire the services and restore any
/// previous session.
pub async fn start() -> PosResult<Runtime> {
    let config = PosConfig::from_env()?;
    let guard = init_logging(&config.log_dir)?;
    info!("Starting Shop POS v{}", env!("CARGO_PKG_VERSION"));

    let app = PosApp::bootstrap(config)?;
    let mut session = app.session()?;
    match session.start().await? {
        Some(user) => info!(
            user_id = %user.id,
            shops = session.shops.shops().len(),
            "session restored"
        ),
        None => info!("no saved session, showing login"),
    }
    Ok(Runtime {
        app,
        session,
        log_guard: guard,
    })
}
