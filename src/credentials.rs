//! User accounts and cookie settings (`credentials.yaml`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::hash_password;
use crate::config::{ADMIN_ROLE, Config, USER_ROLE};
use crate::error::{StoreError, StoreResult, UserError};
use crate::saving::{self, Document};

/// A stored account. The password is only ever kept as an argon2 PHC string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
}

/// How the session cookie is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSettings {
    pub name: String,
    pub key: String,
    pub expiry_days: u32,
}

impl Default for CookieSettings {
    fn default() -> Self {
        CookieSettings {
            name: "barjas_app_cookie".to_string(),
            key: "barjas_app_cookie".to_string(),
            expiry_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub usernames: BTreeMap<String, UserRecord>,
    #[serde(default)]
    pub cookie: CookieSettings,
}

impl Credentials {
    /// The two first-run accounts, `admin`/`admin` and `user`/`user`.
    pub fn with_default_accounts() -> StoreResult<Self> {
        let mut usernames = BTreeMap::new();
        usernames.insert(
            "admin".to_string(),
            UserRecord {
                email: "admin@example.com".to_string(),
                name: "Admin".to_string(),
                password_hash: hash_password("admin")?,
                role: ADMIN_ROLE.to_string(),
            },
        );
        usernames.insert(
            "user".to_string(),
            UserRecord {
                email: "user@example.com".to_string(),
                name: "User".to_string(),
                password_hash: hash_password("user")?,
                role: USER_ROLE.to_string(),
            },
        );
        Ok(Credentials {
            usernames,
            cookie: CookieSettings::default(),
        })
    }

    pub fn user(&self, username: &str) -> Option<&UserRecord> {
        self.usernames.get(username)
    }

    /// `(username, role)` pairs whose role is not in the config's role table.
    ///
    /// Such accounts can still sign in; they are treated as having no access.
    pub fn unknown_roles(&self, config: &Config) -> Vec<(String, String)> {
        self.usernames
            .iter()
            .filter(|(_, user)| !config.roles.contains_key(&user.role))
            .map(|(username, user)| (username.clone(), user.role.clone()))
            .collect()
    }
}

/// Form data for a new account; `password` is plaintext and hashed on insert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

fn encode(credentials: &Credentials) -> StoreResult<Vec<u8>> {
    serde_yaml::to_string(credentials)
        .map(String::into_bytes)
        .map_err(|e| StoreError::Encode(e.to_string()))
}

pub struct CredentialStore {
    doc: Document<Credentials>,
}

impl CredentialStore {
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let credentials = Self::load(&path)?;
        Ok(Self {
            doc: Document::new(path, credentials, encode),
        })
    }

    /// Read the document, writing the default accounts first if it does not exist.
    pub fn load(path: &Path) -> StoreResult<Credentials> {
        match saving::read_optional(path)? {
            Some(text) => {
                serde_yaml::from_str(&text).map_err(|source| StoreError::CredentialsLoad {
                    path: path.to_path_buf(),
                    source,
                })
            }
            None => {
                let credentials = Credentials::with_default_accounts()?;
                saving::write_atomic(path, &encode(&credentials)?)?;
                info!(path = %path.display(), "created default credentials");
                Ok(credentials)
            }
        }
    }

    pub fn save(&self, credentials: &Credentials) -> StoreResult<()> {
        self.doc.save(credentials)
    }

    pub fn current(&self) -> Credentials {
        self.doc.snapshot()
    }

    pub fn path(&self) -> &Path {
        self.doc.path()
    }

    /// Insert a new account. An existing username leaves the store untouched.
    pub fn add_user(&self, new_user: NewUser) -> Result<Credentials, UserError> {
        let username = new_user.username.trim().to_string();
        if username.is_empty() {
            return Err(UserError::MissingField("Username"));
        }
        if new_user.password.is_empty() {
            return Err(UserError::MissingField("Password"));
        }
        if self.current().usernames.contains_key(&username) {
            return Err(UserError::DuplicateUser);
        }

        let password_hash = hash_password(&new_user.password)?;
        let record = UserRecord {
            email: new_user.email,
            name: new_user.name,
            password_hash,
            role: new_user.role,
        };

        let updated = self.doc.update(|credentials| {
            // Re-checked under the write guard; another admin may have raced us.
            if credentials.usernames.contains_key(&username) {
                return Err(UserError::DuplicateUser);
            }
            credentials.usernames.insert(username.clone(), record);
            Ok(())
        })?;
        info!(%username, "user added");
        Ok(updated)
    }

    /// Remove `username`, refusing to remove the account `acting_username` is signed in as.
    pub fn delete_user(&self, username: &str, acting_username: &str) -> Result<Credentials, UserError> {
        if username == acting_username {
            return Err(UserError::CannotDeleteSelf);
        }
        let updated = self.doc.update(|credentials| {
            credentials
                .usernames
                .remove(username)
                .map(|_| ())
                .ok_or_else(|| UserError::UnknownUser(username.to_string()))
        })?;
        info!(%username, "user deleted");
        Ok(updated)
    }
}
