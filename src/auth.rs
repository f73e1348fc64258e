//! Authentication collaborator and the auth store.
//!
//! [`AuthService`] covers session restore, email/password sign-in, sign-up,
//! sign-out and a session-change channel. Two implementations:
//!
//! - [`LocalAuthService`]: accounts in the sqlite `users` table, bcrypt
//!   password hashes, failed-attempt lockout persisted in `local_settings`.
//! - [`RestAuthService`]: the hosted auth endpoints. The refresh token lives
//!   in the OS keyring so a session survives restarts; the access token is
//!   shared with the table and storage clients.
//!
//! Privileged access is a role claim on [`Identity`], never an email match.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::backend::rest::{
    authorized, build_client, friendly_error, normalize_base_url, read_json_response, AccessToken,
};
use crate::backend::{Backend, Table};
use crate::credentials::{self, KEY_REFRESH_TOKEN};
use crate::db::{self, DbState};
use crate::error::{PosError, PosResult};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const MIN_PASSWORD_LEN: usize = 6;
const LOCKOUT_CATEGORY: &str = "auth_lockout";
const SESSION_CATEGORY: &str = "auth";
const SESSION_USER_KEY: &str = "session_user_id";
const INVALID_CREDENTIALS: &str = "Invalid login credentials";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Owner,
    Staff,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }

    /// Unknown role strings degrade to `Owner`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "staff" => Self::Staff,
            _ => Self::Owner,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The signed-in account as seen by stores and screens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: UserRole,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Re-establish a session persisted by an earlier run, if any.
    async fn restore_session(&self) -> PosResult<Option<Identity>>;

    async fn sign_in(&self, email: &str, password: &str) -> PosResult<Identity>;

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> PosResult<Identity>;

    async fn sign_out(&self) -> PosResult<()>;

    fn current_identity(&self) -> Option<Identity>;

    /// Session-change notification. The receiver sees `None` after sign-out.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_credentials(email: &str, password: &str) -> PosResult<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(PosError::validation("A valid email is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PosError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ===========================================================================
// Local accounts
// ===========================================================================

/// Lockout tracking entry.
#[derive(Debug, Clone, Copy)]
struct LockoutEntry {
    attempts: u32,
    last_attempt: DateTime<Utc>,
}

/// Check whether the account is currently locked out.
fn check_lockout(lockout: &LockoutEntry) -> PosResult<()> {
    if lockout.attempts >= MAX_FAILED_ATTEMPTS {
        let elapsed = Utc::now() - lockout.last_attempt;
        if elapsed < Duration::minutes(LOCKOUT_MINUTES) {
            let remaining = LOCKOUT_MINUTES - elapsed.num_minutes();
            return Err(PosError::Forbidden(format!(
                "Too many failed attempts. Try again in {remaining} minute(s)."
            )));
        }
    }
    Ok(())
}

fn load_lockout(conn: &rusqlite::Connection, email: &str) -> LockoutEntry {
    db::get_setting(conn, LOCKOUT_CATEGORY, email)
        .and_then(|raw| {
            let (attempts, at) = raw.split_once('|')?;
            Some(LockoutEntry {
                attempts: attempts.parse().ok()?,
                last_attempt: DateTime::parse_from_rfc3339(at).ok()?.with_timezone(&Utc),
            })
        })
        .unwrap_or(LockoutEntry {
            attempts: 0,
            last_attempt: Utc::now(),
        })
}

fn persist_lockout(conn: &rusqlite::Connection, email: &str, lockout: &LockoutEntry) {
    let raw = format!("{}|{}", lockout.attempts, lockout.last_attempt.to_rfc3339());
    if let Err(e) = db::set_setting(conn, LOCKOUT_CATEGORY, email, &raw) {
        warn!(error = %e, "failed to persist lockout state");
    }
}

struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    full_name: Option<String>,
    role: String,
}

impl UserRow {
    fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: UserRole::parse(&self.role),
        }
    }
}

fn find_user(conn: &rusqlite::Connection, column: &str, value: &str) -> PosResult<Option<UserRow>> {
    let sql = match column {
        "id" => "SELECT id, email, password_hash, full_name, role FROM users WHERE id = ?1",
        _ => "SELECT id, email, password_hash, full_name, role FROM users WHERE email = ?1",
    };
    let row = conn
        .query_row(sql, params![value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                full_name: row.get(3)?,
                role: row.get(4)?,
            })
        })
        .optional()?;
    Ok(row)
}

/// Accounts stored in the local database.
pub struct LocalAuthService {
    db: Arc<DbState>,
    bcrypt_cost: u32,
    session: watch::Sender<Option<Identity>>,
    /// Serializes lockout read-modify-write across concurrent sign-ins.
    attempt_guard: Mutex<()>,
}

impl LocalAuthService {
    pub fn new(db: Arc<DbState>, bcrypt_cost: u32) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            db,
            bcrypt_cost,
            session,
            attempt_guard: Mutex::new(()),
        }
    }

    /// Change an account's role claim. Takes effect at next sign-in.
    pub fn grant_role(&self, user_id: &str, role: UserRole) -> PosResult<()> {
        let conn = self.db.conn.lock()?;
        let changed = conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.as_str(), user_id],
        )?;
        if changed == 0 {
            return Err(PosError::not_found(format!("User {user_id} not found")));
        }
        info!(user_id, role = role.as_str(), "role granted");
        Ok(())
    }

    fn start_session(&self, conn: &rusqlite::Connection, identity: &Identity) -> PosResult<()> {
        db::set_setting(conn, SESSION_CATEGORY, SESSION_USER_KEY, &identity.id)?;
        self.session.send_replace(Some(identity.clone()));
        Ok(())
    }
}

#[async_trait]
impl AuthService for LocalAuthService {
    async fn restore_session(&self) -> PosResult<Option<Identity>> {
        let conn = self.db.conn.lock()?;
        let Some(user_id) = db::get_setting(&conn, SESSION_CATEGORY, SESSION_USER_KEY) else {
            return Ok(None);
        };
        match find_user(&conn, "id", &user_id)? {
            Some(user) => {
                let identity = user.identity();
                self.session.send_replace(Some(identity.clone()));
                info!(user_id = %identity.id, "local session restored");
                Ok(Some(identity))
            }
            None => {
                db::delete_all_settings(&conn, SESSION_CATEGORY)?;
                Ok(None)
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> PosResult<Identity> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(PosError::validation("Email and password are required"));
        }

        let _guard = self.attempt_guard.lock()?;
        let conn = self.db.conn.lock()?;

        let mut lockout = load_lockout(&conn, &email);
        check_lockout(&lockout)?;

        let user = find_user(&conn, "email", &email)?;
        let verified = user
            .as_ref()
            .map(|u| bcrypt::verify(password, &u.password_hash).unwrap_or(false))
            .unwrap_or(false);

        match (user, verified) {
            (Some(user), true) => {
                lockout.attempts = 0;
                lockout.last_attempt = Utc::now();
                persist_lockout(&conn, &email, &lockout);
                let identity = user.identity();
                self.start_session(&conn, &identity)?;
                info!(user_id = %identity.id, role = %identity.role, "local sign-in");
                Ok(identity)
            }
            _ => {
                lockout.attempts += 1;
                lockout.last_attempt = Utc::now();
                persist_lockout(&conn, &email, &lockout);
                warn!(attempts = lockout.attempts, "failed sign-in attempt");
                Err(PosError::Backend(INVALID_CREDENTIALS.into()))
            }
        }
    }

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> PosResult<Identity> {
        validate_credentials(email, password)?;
        let email = normalize_email(email);
        let hash = bcrypt::hash(password, self.bcrypt_cost)
            .map_err(|e| PosError::Storage(format!("Failed to hash password: {e}")))?;

        let conn = self.db.conn.lock()?;
        if find_user(&conn, "email", &email)?.is_some() {
            return Err(PosError::Backend("User already registered".into()));
        }

        let identity = Identity {
            id: Uuid::new_v4().to_string(),
            email,
            full_name: non_empty(full_name),
            role: UserRole::Owner,
        };
        conn.execute(
            "INSERT INTO users (id, email, password_hash, full_name, role) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                identity.id,
                identity.email,
                hash,
                identity.full_name,
                identity.role.as_str()
            ],
        )?;
        self.start_session(&conn, &identity)?;
        info!(user_id = %identity.id, "local account created");
        Ok(identity)
    }

    async fn sign_out(&self) -> PosResult<()> {
        let conn = self.db.conn.lock()?;
        db::delete_all_settings(&conn, SESSION_CATEGORY)?;
        if let Some(previous) = self.session.send_replace(None) {
            info!(user_id = %previous.id, "signed out");
        }
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

// ===========================================================================
// Hosted auth
// ===========================================================================

/// Build an [`Identity`] from the hosted auth service's `user` object.
pub(crate) fn identity_from_user(user: &Value) -> PosResult<Identity> {
    let id = user
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PosError::Backend("Auth response is missing the user id".into()))?;
    let email = user
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let full_name = user
        .pointer("/user_metadata/full_name")
        .and_then(Value::as_str)
        .and_then(non_empty);
    let role = user
        .pointer("/app_metadata/role")
        .and_then(Value::as_str)
        .map(UserRole::parse)
        .unwrap_or_default();
    Ok(Identity {
        id: id.to_string(),
        email: email.to_string(),
        full_name,
        role,
    })
}

/// Tokens and user from a token or sign-up response. Sign-up returns a bare
/// user when email confirmation is pending.
struct SessionGrant {
    access_token: Option<Zeroizing<String>>,
    refresh_token: Option<Zeroizing<String>>,
    identity: Identity,
}

fn parse_grant(body: &Value) -> PosResult<SessionGrant> {
    let user = body.get("user").unwrap_or(body);
    let token = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| Zeroizing::new(s.to_string()))
    };
    Ok(SessionGrant {
        access_token: token("access_token"),
        refresh_token: token("refresh_token"),
        identity: identity_from_user(user)?,
    })
}

pub struct RestAuthService {
    client: Client,
    base_url: String,
    anon_key: Zeroizing<String>,
    token: Arc<AccessToken>,
    session: watch::Sender<Option<Identity>>,
}

impl RestAuthService {
    pub fn new(base_url: &str, anon_key: &str, token: Arc<AccessToken>) -> PosResult<Self> {
        let (session, _) = watch::channel(None);
        Ok(Self {
            client: build_client()?,
            base_url: normalize_base_url(base_url),
            anon_key: Zeroizing::new(anon_key.trim().to_string()),
            token,
            session,
        })
    }

    async fn post(&self, path: &str, body: Value) -> PosResult<Value> {
        let url = format!("{}/auth/v1/{path}", self.base_url);
        let bearer = self.token.get();
        let req = authorized(
            self.client.post(url),
            &self.anon_key,
            bearer.as_deref().map(String::as_str),
        )
        .json(&body);
        let resp = req
            .send()
            .await
            .map_err(|e| PosError::Http(friendly_error(&self.base_url, &e)))?;
        read_json_response(resp).await
    }

    fn apply_grant(&self, grant: SessionGrant) -> Identity {
        if let Some(access) = grant.access_token {
            self.token.set(Some(access.to_string()));
            self.session.send_replace(Some(grant.identity.clone()));
        }
        if let Some(refresh) = grant.refresh_token {
            if let Err(e) = credentials::set_credential(KEY_REFRESH_TOKEN, &refresh) {
                warn!(error = %e, "could not persist refresh token");
            }
        }
        grant.identity
    }

    fn clear_session(&self) {
        self.token.set(None);
        if let Err(e) = credentials::delete_credential(KEY_REFRESH_TOKEN) {
            warn!(error = %e, "could not delete refresh token");
        }
        self.session.send_replace(None);
    }
}

#[async_trait]
impl AuthService for RestAuthService {
    async fn restore_session(&self) -> PosResult<Option<Identity>> {
        let Some(refresh) = credentials::get_credential(KEY_REFRESH_TOKEN).map(Zeroizing::new) else {
            return Ok(None);
        };
        match self
            .post(
                "token?grant_type=refresh_token",
                json!({ "refresh_token": refresh.as_str() }),
            )
            .await
            .and_then(|body| parse_grant(&body))
        {
            Ok(grant) => {
                let identity = self.apply_grant(grant);
                info!(user_id = %identity.id, "session restored");
                Ok(Some(identity))
            }
            Err(PosError::Http(msg)) => {
                // Keep the refresh token; the backend may just be unreachable.
                warn!(error = %msg, "session restore failed");
                Err(PosError::Http(msg))
            }
            Err(e) => {
                warn!(error = %e, "stored session rejected");
                self.clear_session();
                Ok(None)
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> PosResult<Identity> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(PosError::validation("Email and password are required"));
        }
        let body = self
            .post(
                "token?grant_type=password",
                json!({ "email": normalize_email(email), "password": password }),
            )
            .await?;
        let identity = self.apply_grant(parse_grant(&body)?);
        info!(user_id = %identity.id, role = %identity.role, "signed in");
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> PosResult<Identity> {
        validate_credentials(email, password)?;
        let body = self
            .post(
                "signup",
                json!({
                    "email": normalize_email(email),
                    "password": password,
                    "data": { "full_name": full_name.trim() },
                }),
            )
            .await?;
        let grant = parse_grant(&body)?;
        if grant.access_token.is_none() {
            info!("sign-up pending email confirmation");
        }
        Ok(self.apply_grant(grant))
    }

    async fn sign_out(&self) -> PosResult<()> {
        if self.token.get().is_some() {
            if let Err(e) = self.post("logout", json!({})).await {
                warn!(error = %e, "remote sign-out failed; clearing local session anyway");
            }
        }
        self.clear_session();
        info!("signed out");
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

// ===========================================================================
// Auth store
// ===========================================================================

/// Free-tier limits granted to every new account.
pub const FREE_PLAN_MAX_SHOPS: u32 = 1;
pub const FREE_PLAN_MAX_BRANCHES: u32 = 1;
pub const FREE_PLAN_MAX_MENU_ITEMS: u32 = 30;

/// Session state for screens, plus account bootstrap on registration.
pub struct AuthStore {
    backend: Arc<dyn Backend>,
    auth: Arc<dyn AuthService>,
    user: Option<Identity>,
}

impl AuthStore {
    pub fn new(backend: Arc<dyn Backend>, auth: Arc<dyn AuthService>) -> Self {
        let user = auth.current_identity();
        Self {
            backend,
            auth,
            user,
        }
    }

    pub fn user(&self) -> Option<&Identity> {
        self.user.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().map(Identity::is_admin).unwrap_or(false)
    }

    pub async fn initialize(&mut self) -> PosResult<Option<Identity>> {
        self.user = self.auth.restore_session().await?;
        Ok(self.user.clone())
    }

    pub async fn login(&mut self, email: &str, password: &str) -> PosResult<Identity> {
        let identity = self.auth.sign_in(email, password).await?;
        self.user = Some(identity.clone());
        Ok(identity)
    }

    /// Create the account, then its owner profile and free plan.
    pub async fn register(
        &mut self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> PosResult<Identity> {
        let identity = self.auth.sign_up(email, password, full_name).await?;

        self.backend
            .upsert(
                Table::Profiles,
                vec![json!({
                    "id": identity.id,
                    "email": identity.email,
                    "full_name": identity.full_name,
                    "role": UserRole::Owner.as_str(),
                })],
                "id",
            )
            .await?;
        self.backend
            .upsert(
                Table::UserPlans,
                vec![json!({
                    "user_id": identity.id,
                    "plan": "free",
                    "max_shops": FREE_PLAN_MAX_SHOPS,
                    "max_branches": FREE_PLAN_MAX_BRANCHES,
                    "max_menu_items": FREE_PLAN_MAX_MENU_ITEMS,
                })],
                "user_id",
            )
            .await?;

        info!(user_id = %identity.id, "account bootstrapped");
        self.user = self.auth.current_identity();
        Ok(identity)
    }

    pub async fn logout(&mut self) -> PosResult<()> {
        self.auth.sign_out().await?;
        self.user = None;
        Ok(())
    }

    /// Pick up a session change made elsewhere (e.g. another store).
    pub fn refresh(&mut self) {
        self.user = self.auth.current_identity();
    }
}
