//! Password verification and cookie-backed sessions.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::credentials::{CookieSettings, Credentials};
use crate::error::{StoreError, StoreResult};

lazy_static! {
    /// Verified against when the username is unknown, so a miss costs as much as a wrong password.
    static ref DUMMY_HASH: Option<String> = hash_password("rekap-dummy-password").ok();
}

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> StoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| StoreError::Hash)
}

/// Check a plaintext password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("stored password hash is malformed: {e}");
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

pub const HOME_PAGE: &str = "home";
pub const ADMIN_PAGE: &str = "admin";
pub const GUEST_ROLE: &str = "guest";

/// Per-connection authentication and navigation state.
///
/// Each cookie token owns its own value; nothing here is shared between users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub authenticated: bool,
    pub username: Option<String>,
    pub role: String,
    /// `"home"`, `"admin"` or a spreadsheet resource id.
    pub current_page: String,
    pub theme: Theme,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            authenticated: false,
            username: None,
            role: GUEST_ROLE.to_string(),
            current_page: HOME_PAGE.to_string(),
            theme: Theme::Light,
        }
    }
}

impl Session {
    pub fn signed_in(username: &str, role: &str) -> Self {
        Session {
            authenticated: true,
            username: Some(username.to_string()),
            role: role.to_string(),
            ..Session::default()
        }
    }

    pub fn is_admin(&self) -> bool {
        self.authenticated && self.role == crate::config::ADMIN_ROLE
    }
}

/// Submitted login form.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginAttempt {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    Success,
    Failure,
    /// Nothing submitted yet.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub status: LoginStatus,
    pub username: Option<String>,
    pub role: Option<String>,
}

impl LoginOutcome {
    fn with_status(status: LoginStatus) -> Self {
        LoginOutcome {
            status,
            username: None,
            role: None,
        }
    }
}

/// Verify an attempt against the credential document.
///
/// Unknown users and wrong passwords produce the same `Failure`.
pub fn authenticate(credentials: &Credentials, attempt: Option<&LoginAttempt>) -> LoginOutcome {
    let Some(attempt) = attempt else {
        return LoginOutcome::with_status(LoginStatus::Pending);
    };

    match credentials.user(&attempt.username) {
        Some(user) if verify_password(&attempt.password, &user.password_hash) => LoginOutcome {
            status: LoginStatus::Success,
            username: Some(attempt.username.clone()),
            role: Some(user.role.clone()),
        },
        Some(_) => LoginOutcome::with_status(LoginStatus::Failure),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(&attempt.password, dummy);
            }
            LoginOutcome::with_status(LoginStatus::Failure)
        }
    }
}

/// Unix seconds, the unit of the token's `iat`/`exp`.
fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// What the signed session cookie carries. Nothing else is needed to
/// recognise the caller, so a login outlives the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username
    pub sub: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// Token id; keys the per-login page and theme state
    pub jti: String,
}

struct SessionEntry {
    session: Session,
    expires_at: i64,
}

#[derive(Default)]
struct Entries {
    live: HashMap<String, SessionEntry>,
    /// Logged-out token ids, kept until the token would have expired anyway.
    revoked: HashMap<String, i64>,
}

impl Entries {
    fn prune(&mut self, now: i64) {
        self.live.retain(|_, entry| entry.expires_at > now);
        self.revoked.retain(|_, expires_at| *expires_at > now);
    }
}

/// Per-login UI state (current page, theme) and the logout list, keyed by token id.
///
/// Authentication does not depend on this store: an entry missing after a
/// restart only means the page and theme start over. Expired entries are
/// pruned on every write, so abandoned logins do not accumulate.
#[derive(Clone, Default)]
pub struct SessionStore {
    entries: Arc<RwLock<Entries>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored state for token id `id`, if it has not expired.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let entries = self.entries.read().await;
        entries
            .live
            .get(id)
            .filter(|entry| entry.expires_at > now())
            .map(|entry| entry.session.clone())
    }

    /// Insert or replace the state for `id` until `expires_at`.
    ///
    /// # Arguments
    /// * `id` - Token id (`jti`) of the login
    /// * `session` - State to keep
    /// * `expires_at` - Unix timestamp after which the entry is dropped
    pub async fn put(&self, id: &str, session: Session, expires_at: i64) {
        let mut entries = self.entries.write().await;
        entries.prune(now());
        entries
            .live
            .insert(id.to_string(), SessionEntry { session, expires_at });
    }

    /// Forget the state for `id` and refuse its token from now on.
    pub async fn revoke(&self, id: &str, expires_at: i64) {
        let mut entries = self.entries.write().await;
        entries.prune(now());
        entries.live.remove(id);
        entries.revoked.insert(id.to_string(), expires_at);
    }

    pub async fn is_revoked(&self, id: &str) -> bool {
        self.entries.read().await.revoked.contains_key(id)
    }

    /// Number of live entries, expired ones included until the next write.
    pub async fn len(&self) -> usize {
        self.entries.read().await.live.len()
    }
}

/// Issues and checks signed session cookies on top of the credential document.
///
/// The cookie value is an HS256 JWT signed with `cookie.key`; it names the
/// user and its expiry. The role is always re-read from the credentials.
#[derive(Clone)]
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime_secs: i64,
    sessions: SessionStore,
}

impl Authenticator {
    pub fn new(cookie: &CookieSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cookie.key.as_bytes()),
            decoding: DecodingKey::from_secret(cookie.key.as_bytes()),
            lifetime_secs: i64::from(cookie.expiry_days) * 24 * 60 * 60,
            sessions: SessionStore::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn issue(&self, username: &str) -> Result<(String, Claims), jsonwebtoken::errors::Error> {
        let iat = now();
        let claims = Claims {
            sub: username.to_string(),
            iat,
            exp: iat + self.lifetime_secs,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((token, claims))
    }

    /// Check the signature and expiry of a cookie value.
    ///
    /// # Returns
    /// * `Some(Claims)` - The token is ours and still valid
    /// * `None` - Forged, signed with another key, malformed or expired
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("session cookie rejected: {e}");
                None
            }
        }
    }

    /// Authenticate a login attempt and, on success, issue a signed token.
    ///
    /// # Arguments
    /// * `credentials` - Current credential document
    /// * `attempt` - The submitted form, or `None` when nothing was submitted
    ///
    /// # Returns
    /// * `(LoginOutcome, Option<String>)` - The outcome, plus the cookie value on success
    pub async fn login(
        &self,
        credentials: &Credentials,
        attempt: Option<&LoginAttempt>,
    ) -> (LoginOutcome, Option<String>) {
        let outcome = authenticate(credentials, attempt);
        match (&outcome.status, &outcome.username, &outcome.role) {
            (LoginStatus::Success, Some(username), Some(role)) => match self.issue(username) {
                Ok((token, claims)) => {
                    self.sessions
                        .put(&claims.jti, Session::signed_in(username, role), claims.exp)
                        .await;
                    info!(%username, %role, "login succeeded");
                    (outcome, Some(token))
                }
                Err(e) => {
                    error!(%username, "could not sign session token: {e}");
                    (outcome, None)
                }
            },
            (LoginStatus::Failure, ..) => {
                if let Some(attempt) = attempt {
                    warn!(username = %attempt.username, "login failed");
                }
                (outcome, None)
            }
            _ => (outcome, None),
        }
    }

    /// Revoke the token so a copy of the cookie stops working.
    pub async fn logout(&self, token: &str) {
        if let Some(claims) = self.verify(token) {
            self.sessions.revoke(&claims.jti, claims.exp).await;
            info!(username = %claims.sub, "logged out");
        }
    }

    /// Resolve the session behind a cookie value.
    ///
    /// The role comes from the credentials, page and theme from the stored
    /// state when there is any. A token whose account has been deleted is
    /// revoked and treated as logged out.
    ///
    /// # Arguments
    /// * `token` - Cookie value
    /// * `credentials` - Current credential document
    ///
    /// # Returns
    /// * `Option<Session>` - The signed-in session, or `None` for a logged-out caller
    pub async fn session(&self, token: &str, credentials: &Credentials) -> Option<Session> {
        let claims = self.verify(token)?;
        if self.sessions.is_revoked(&claims.jti).await {
            return None;
        }
        let Some(user) = credentials.user(&claims.sub) else {
            info!(username = %claims.sub, "account no longer exists; signing out");
            self.sessions.revoke(&claims.jti, claims.exp).await;
            return None;
        };
        let mut session = self
            .sessions
            .get(&claims.jti)
            .await
            .unwrap_or_else(|| Session::signed_in(&claims.sub, &user.role));
        session.role = user.role.clone();
        Some(session)
    }

    /// Remember page and theme for the login behind `token`.
    pub async fn store(&self, token: &str, session: Session) {
        if let Some(claims) = self.verify(token) {
            self.sessions.put(&claims.jti, session, claims.exp).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;

    fn attempt(username: &str, password: &str) -> LoginAttempt {
        LoginAttempt {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    async fn sign_in(auth: &Authenticator, credentials: &Credentials) -> String {
        let (outcome, token) = auth
            .login(credentials, Some(&attempt("user", "user")))
            .await;
        assert_eq!(outcome.status, LoginStatus::Success);
        token.unwrap()
    }

    #[test]
    fn hash_roundtrip() {
        let hash = hash_password("rahasia").unwrap();
        assert!(verify_password("rahasia", &hash));
        assert!(!verify_password("salah", &hash));
        assert!(!verify_password("rahasia", "not-a-phc-string"));
    }

    #[test]
    fn authenticate_outcomes() {
        let credentials = Credentials::with_default_accounts().unwrap();

        let pending = authenticate(&credentials, None);
        assert_eq!(pending.status, LoginStatus::Pending);

        let ok = authenticate(&credentials, Some(&attempt("user", "user")));
        assert_eq!(ok.status, LoginStatus::Success);
        assert_eq!(ok.role.as_deref(), Some("user"));

        let wrong = authenticate(&credentials, Some(&attempt("user", "nope")));
        let unknown = authenticate(&credentials, Some(&attempt("ghost", "nope")));
        assert_eq!(wrong, unknown);
        assert_eq!(wrong.status, LoginStatus::Failure);
    }

    #[tokio::test]
    async fn expired_entries_are_pruned_on_write() {
        let store = SessionStore::new();
        let past = now() - 1;
        for i in 0..1000 {
            store
                .put(&format!("old-{i}"), Session::signed_in("user", "user"), past)
                .await;
        }
        assert!(store.get("old-0").await.is_none());

        store
            .put("fresh", Session::signed_in("user", "user"), now() + 60)
            .await;
        assert_eq!(store.len().await, 1);
        assert!(store.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn revoked_ids_expire_too() {
        let store = SessionStore::new();
        store.revoke("gone", now() - 1).await;
        store.revoke("kept", now() + 60).await;
        assert!(!store.is_revoked("gone").await);
        assert!(store.is_revoked("kept").await);
    }

    #[tokio::test]
    async fn token_outlives_the_authenticator() {
        let credentials = Credentials::with_default_accounts().unwrap();
        let token = sign_in(&Authenticator::new(&credentials.cookie), &credentials).await;

        // A fresh authenticator with the same key and an empty store.
        let restarted = Authenticator::new(&credentials.cookie);
        let session = restarted.session(&token, &credentials).await.unwrap();
        assert_eq!(session.username.as_deref(), Some("user"));
        assert_eq!(session.role, "user");
        assert_eq!(session.current_page, HOME_PAGE);
    }

    #[tokio::test]
    async fn token_from_another_key_is_rejected() {
        let credentials = Credentials::with_default_accounts().unwrap();
        let token = sign_in(&Authenticator::new(&credentials.cookie), &credentials).await;

        let mut other = credentials.cookie.clone();
        other.key = "kunci-lain".to_string();
        let auth = Authenticator::new(&other);
        assert!(auth.session(&token, &credentials).await.is_none());
        assert!(auth.session("bukan.token.jwt", &credentials).await.is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let credentials = Credentials::with_default_accounts().unwrap();
        let auth = Authenticator::new(&credentials.cookie);
        let claims = Claims {
            sub: "user".to_string(),
            iat: now() - 120,
            exp: now() - 60,
            jti: "lama".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(credentials.cookie.key.as_bytes()),
        )
        .unwrap();
        assert!(auth.verify(&token).is_none());
    }

    #[tokio::test]
    async fn logout_revokes_token() {
        let credentials = Credentials::with_default_accounts().unwrap();
        let auth = Authenticator::new(&credentials.cookie);
        let token = sign_in(&auth, &credentials).await;
        assert_eq!(auth.sessions().len().await, 1);

        auth.logout(&token).await;
        assert!(auth.session(&token, &credentials).await.is_none());
        assert_eq!(auth.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn deleted_account_drops_session() {
        let mut credentials = Credentials::with_default_accounts().unwrap();
        let auth = Authenticator::new(&credentials.cookie);
        let token = sign_in(&auth, &credentials).await;
        assert!(auth.session(&token, &credentials).await.is_some());

        credentials.usernames.remove("user");
        assert!(auth.session(&token, &credentials).await.is_none());
        assert_eq!(auth.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn role_change_applies_to_live_session() {
        let mut credentials = Credentials::with_default_accounts().unwrap();
        let auth = Authenticator::new(&credentials.cookie);
        let token = sign_in(&auth, &credentials).await;

        credentials.usernames.get_mut("user").unwrap().role = "admin".to_string();
        let session = auth.session(&token, &credentials).await.unwrap();
        assert!(session.is_admin());
    }
}
