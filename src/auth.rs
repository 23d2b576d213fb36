//! Email/password login against a fixed station user list.
//!
//! Users carry bcrypt hashes and belong to one station location; only the
//! configured locations may sign in. Sessions are kept in memory and handed
//! out as opaque bearer tokens (also set as the `erp_session` cookie).
//! Failed-attempt counters are persisted in `local_settings` so a restart
//! does not lift a lockout.

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::db::{self, DbState};
use crate::dispensers::{self, RegisterRow};
use crate::lubricants::LubricantRegister;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const SESSION_INACTIVITY_MINUTES: i64 = 60;
const SESSION_MAX_DURATION_HOURS: i64 = 12;
const LOCKOUT_CATEGORY: &str = "lockout";

pub const SESSION_COOKIE: &str = "erp_session";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Cashier,
    Manager,
}

/// A station user as listed in the users file.
#[derive(Debug, Clone, Deserialize)]
pub struct StationUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub employee_number: String,
    pub location: String,
    pub password_hash: String,
}

/// What a page may know about the signed-in user. Never carries the hash.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub employee_number: String,
    pub location: String,
}

impl From<&StationUser> for SessionUser {
    fn from(u: &StationUser) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
            employee_number: u.employee_number.clone(),
            location: u.location.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingCredentials,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Too many failed attempts. Try again in {minutes} minute(s).")]
    LockedOut { minutes: i64 },

    #[error("Failed to load users: {0}")]
    UserList(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::LockedOut { .. } => StatusCode::LOCKED,
            AuthError::UserList(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Per-session working state: what the pages used to keep client-side.
#[derive(Debug, Clone)]
pub struct SessionDrafts {
    pub register_rows: Vec<RegisterRow>,
    pub lubricants: LubricantRegister,
}

impl SessionDrafts {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            register_rows: dispensers::initial_register_rows(&now),
            lubricants: LubricantRegister::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    user: SessionUser,
    login_time: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    drafts: SessionDrafts,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
            || now - self.last_activity > Duration::minutes(SESSION_INACTIVITY_MINUTES)
    }
}

/// Returned by a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

struct LockoutEntry {
    attempts: u32,
    last_attempt: DateTime<Utc>,
}

pub struct AuthState {
    users: Vec<StationUser>,
    allowed_locations: HashSet<String>,
    sessions: Mutex<HashMap<String, Session>>,
}

// ---------------------------------------------------------------------------
// User list
// ---------------------------------------------------------------------------

/// Read users from a JSON array file.
pub fn load_users_file(path: &Path) -> Result<Vec<StationUser>, AuthError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AuthError::UserList(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&raw).map_err(|e| AuthError::UserList(format!("{}: {e}", path.display())))
}

/// The two demo accounts the station started with, hashed at `cost`.
pub fn demo_users(cost: u32) -> Result<Vec<StationUser>, AuthError> {
    let password = Zeroizing::new(String::from("pass123"));
    let hash = |label: &str| {
        bcrypt::hash(password.as_str(), cost)
            .map_err(|e| AuthError::UserList(format!("hash {label}: {e}")))
    };
    Ok(vec![
        StationUser {
            id: "1".into(),
            name: "Sikatuna Cashier".into(),
            email: "sikatuna@email.com".into(),
            role: Role::Cashier,
            employee_number: "10001".into(),
            location: "sikatuna".into(),
            password_hash: hash("sikatuna")?,
        },
        StationUser {
            id: "2".into(),
            name: "Loboc Manager".into(),
            email: "loboc@email.com".into(),
            role: Role::Manager,
            employee_number: "10002".into(),
            location: "loboc".into(),
            password_hash: hash("loboc")?,
        },
    ])
}

// ---------------------------------------------------------------------------
// Lockout helpers
// ---------------------------------------------------------------------------

fn lockout_keys(email: &str) -> (String, String) {
    (format!("{email}:attempts"), format!("{email}:last_attempt"))
}

fn load_lockout(conn: &rusqlite::Connection, email: &str) -> LockoutEntry {
    let (attempts_key, last_key) = lockout_keys(email);
    let attempts = db::get_setting(conn, LOCKOUT_CATEGORY, &attempts_key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let last_attempt = db::get_setting(conn, LOCKOUT_CATEGORY, &last_key)
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    LockoutEntry {
        attempts,
        last_attempt,
    }
}

fn persist_lockout(conn: &rusqlite::Connection, email: &str, lockout: &LockoutEntry) {
    let (attempts_key, last_key) = lockout_keys(email);
    if let Err(e) = db::set_setting(
        conn,
        LOCKOUT_CATEGORY,
        &attempts_key,
        &lockout.attempts.to_string(),
    )
    .and_then(|_| {
        db::set_setting(
            conn,
            LOCKOUT_CATEGORY,
            &last_key,
            &lockout.last_attempt.to_rfc3339(),
        )
    }) {
        warn!(error = %e, "failed to persist lockout state");
    }
}

fn check_lockout(lockout: &LockoutEntry) -> Result<(), AuthError> {
    if lockout.attempts >= MAX_FAILED_ATTEMPTS {
        let elapsed = Utc::now() - lockout.last_attempt;
        if elapsed < Duration::minutes(LOCKOUT_MINUTES) {
            return Err(AuthError::LockedOut {
                minutes: LOCKOUT_MINUTES - elapsed.num_minutes(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AuthState
// ---------------------------------------------------------------------------

impl AuthState {
    pub fn new(users: Vec<StationUser>, allowed_locations: &[String]) -> Self {
        Self {
            users,
            allowed_locations: allowed_locations
                .iter()
                .map(|l| l.trim().to_lowercase())
                .collect(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find_user(&self, email: &str) -> Option<&StationUser> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    /// Verify credentials and open a session.
    pub fn login(&self, db: &DbState, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        {
            let conn = db.lock();
            check_lockout(&load_lockout(&conn, &email))?;
        }

        // bcrypt is slow; the database lock is not held across it.
        let matched = self.find_user(&email).filter(|u| {
            bcrypt::verify(password, &u.password_hash).unwrap_or(false)
                && self.allowed_locations.contains(&u.location.to_lowercase())
        });

        let conn = db.lock();
        let mut lockout = load_lockout(&conn, &email);
        let Some(user) = matched else {
            lockout.attempts += 1;
            lockout.last_attempt = Utc::now();
            persist_lockout(&conn, &email, &lockout);
            warn!(email = %email, attempts = lockout.attempts, "failed login attempt");
            return Err(AuthError::InvalidCredentials);
        };

        if lockout.attempts > 0 {
            lockout.attempts = 0;
            lockout.last_attempt = Utc::now();
            persist_lockout(&conn, &email, &lockout);
        }
        drop(conn);

        let now = Utc::now();
        let token = Uuid::new_v4().simple().to_string();
        let session = Session {
            user: SessionUser::from(user),
            login_time: now,
            last_activity: now,
            expires_at: now + Duration::hours(SESSION_MAX_DURATION_HOURS),
            drafts: SessionDrafts::new(now),
        };
        let outcome = LoginOutcome {
            token: token.clone(),
            user: session.user.clone(),
            expires_at: session.expires_at,
        };

        self.sessions().insert(token, session);
        info!(user_id = %outcome.user.id, location = %outcome.user.location, "login successful");
        Ok(outcome)
    }

    /// Drop the session behind `token`. Returns whether one existed.
    pub fn logout(&self, token: &str) -> bool {
        let removed = self.sessions().remove(token).is_some();
        if removed {
            info!("session logged out");
        }
        removed
    }

    /// Resolve a token to its user, refreshing the inactivity timer.
    /// Expired sessions are removed.
    pub fn authenticate(&self, token: &str) -> Option<SessionUser> {
        let now = Utc::now();
        let mut sessions = self.sessions();
        let expired = sessions.get(token)?.is_expired(now);
        if expired {
            sessions.remove(token);
            return None;
        }
        let session = sessions.get_mut(token)?;
        session.last_activity = now;
        Some(session.user.clone())
    }

    /// Session summary for the page, or `None` when not signed in.
    pub fn session_json(&self, token: &str) -> Option<Value> {
        let now = Utc::now();
        let sessions = self.sessions();
        let s = sessions.get(token).filter(|s| !s.is_expired(now))?;
        Some(serde_json::json!({
            "user": s.user,
            "loginTime": s.login_time.to_rfc3339(),
            "lastActivity": s.last_activity.to_rfc3339(),
            "expires": s.expires_at.to_rfc3339(),
        }))
    }

    /// Run `f` against the session's drafts.
    pub fn with_drafts<R>(&self, token: &str, f: impl FnOnce(&mut SessionDrafts) -> R) -> Option<R> {
        let mut sessions = self.sessions();
        sessions.get_mut(token).map(|s| f(&mut s.drafts))
    }

    /// Forget every expired session.
    pub fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        before - sessions.len()
    }
}
