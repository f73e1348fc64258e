//! Shared fixtures for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::app::PosApp;
use crate::auth::{AuthService, Identity, LocalAuthService};
use crate::backend::{Backend, LocalBackend, Query, Table};
use crate::config::PosConfig;
use crate::db::{self, DbState};
use crate::error::{PosError, PosResult};
use crate::media::LocalObjectStorage;

/// Lowest cost bcrypt accepts; keeps hashing fast in tests.
pub const TEST_BCRYPT_COST: u32 = 4;

pub fn local_backend() -> (Arc<DbState>, Arc<dyn Backend>) {
    let db = Arc::new(db::open_in_memory().expect("in-memory db"));
    let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(db.clone()));
    (db, backend)
}

pub fn local_auth(db: &Arc<DbState>) -> Arc<LocalAuthService> {
    Arc::new(LocalAuthService::new(db.clone(), TEST_BCRYPT_COST))
}

pub async fn signed_in_owner(auth: &LocalAuthService) -> Identity {
    auth.sign_up("owner@shop.th", "secret1", "Owner")
        .await
        .expect("sign up test owner")
}

/// Local services over an in-memory database; images go to the temp dir.
pub fn app() -> (tempfile::TempDir, PosApp) {
    app_wrapping(|backend| backend)
}

/// Same as [`app`], with every backend call going through a
/// [`CountingBackend`].
pub fn counting_app() -> (tempfile::TempDir, PosApp, Arc<CountingBackend>) {
    let mut counting = None;
    let (dir, app) = app_wrapping(|inner| {
        let wrapped = CountingBackend::new(inner);
        counting = Some(wrapped.clone());
        let backend: Arc<dyn Backend> = wrapped;
        backend
    });
    (dir, app, counting.expect("backend wrapped"))
}

fn app_wrapping(
    wrap: impl FnOnce(Arc<dyn Backend>) -> Arc<dyn Backend>,
) -> (tempfile::TempDir, PosApp) {
    let dir = tempfile::tempdir().expect("temp dir");
    let data_dir = dir.path().to_string_lossy().into_owned();
    let config = PosConfig::from_lookup(|key| match key {
        "POS_DATA_DIR" => Some(data_dir.clone()),
        "POS_PUBLIC_ORIGIN" => Some("https://pos.example.com".into()),
        _ => None,
    })
    .expect("test config");
    let (db, backend) = local_backend();
    let backend = wrap(backend);
    let auth: Arc<dyn AuthService> = local_auth(&db);
    let storage = Arc::new(LocalObjectStorage::new(dir.path()));
    (dir, PosApp::from_parts(config, db, backend, auth, storage))
}

/// Wraps a backend, counting calls and optionally failing requests to one
/// table. It can also play a second till that sells one unit of stock just
/// before each conditional stock write.
pub struct CountingBackend {
    inner: Arc<dyn Backend>,
    calls: AtomicUsize,
    fail_inserts_into: Mutex<Option<Table>>,
    fail_selects_from: Mutex<Option<Table>>,
    stock_races: AtomicUsize,
}

impl CountingBackend {
    pub fn new(inner: Arc<dyn Backend>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_inserts_into: Mutex::new(None),
            fail_selects_from: Mutex::new(None),
            stock_races: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_inserts_into(&self, table: Option<Table>) {
        *self.fail_inserts_into.lock().expect("lock") = table;
    }

    pub fn fail_selects_from(&self, table: Option<Table>) {
        *self.fail_selects_from.lock().expect("lock") = table;
    }

    /// The next `times` conditional stock writes lose to a concurrent sale.
    pub fn race_stock_updates(&self, times: usize) {
        self.stock_races.store(times, Ordering::SeqCst);
    }

    async fn sell_one_elsewhere(&self, query: &Query) -> PosResult<()> {
        let Some(id) = query.filters.iter().find(|f| f.column == "id") else {
            return Ok(());
        };
        let by_id = Query::new().eq("id", id.value.clone());
        let rows = self.inner.select(Table::MenuItems, &by_id).await?;
        let Some(stock) = rows.first().and_then(|r| r["stock_quantity"].as_i64()) else {
            return Ok(());
        };
        self.inner
            .update(
                Table::MenuItems,
                &by_id,
                serde_json::json!({ "stock_quantity": stock - 1 }),
            )
            .await?;
        Ok(())
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for CountingBackend {
    async fn select(&self, table: Table, query: &Query) -> PosResult<Vec<Value>> {
        self.tick();
        let failing = *self.fail_selects_from.lock().expect("lock");
        if failing == Some(table) {
            return Err(PosError::Http("network dropped".into()));
        }
        self.inner.select(table, query).await
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> PosResult<Vec<Value>> {
        self.tick();
        let failing = *self.fail_inserts_into.lock().expect("lock");
        if failing == Some(table) {
            return Err(PosError::Backend(format!(
                "insert into {} rejected",
                table.as_str()
            )));
        }
        self.inner.insert(table, rows).await
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Value>,
        on_conflict: &str,
    ) -> PosResult<Vec<Value>> {
        self.tick();
        self.inner.upsert(table, rows, on_conflict).await
    }

    async fn update(&self, table: Table, query: &Query, patch: Value) -> PosResult<Vec<Value>> {
        self.tick();
        let conditional_stock = table == Table::MenuItems
            && query.filters.iter().any(|f| f.column == "stock_quantity");
        if conditional_stock
            && self
                .stock_races
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            self.sell_one_elsewhere(query).await?;
        }
        self.inner.update(table, query, patch).await
    }

    async fn delete(&self, table: Table, query: &Query) -> PosResult<usize> {
        self.tick();
        self.inner.delete(table, query).await
    }
}
