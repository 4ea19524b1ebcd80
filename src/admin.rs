//! Administrator operations over the two stores.
//!
//! Every operation re-checks that the acting session is an admin and that the
//! relevant feature flag is on, then persists immediately and returns the new
//! document so the caller can re-render from it.

use std::collections::BTreeSet;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Serialize;
use tracing::info;

use crate::auth::Session;
use crate::config::{Config, ConfigStore, FEATURE_FLAGS};
use crate::credentials::{CredentialStore, Credentials, NewUser};
use crate::error::{AccessDenied, AdminError, UserError};

/// Flag that unlocks the users tab.
pub const USER_MANAGEMENT: &str = "user_management";
/// Flag that unlocks the spreadsheet links tab.
pub const LINK_MANAGEMENT: &str = "link_management";
/// Flag that unlocks the app name and logo forms.
pub const PAGE_EDITING: &str = "page_editing";

fn require_admin(acting: &Session) -> Result<(), AccessDenied> {
    if acting.is_admin() { Ok(()) } else { Err(AccessDenied) }
}

fn require_feature(config: &Config, flag: &str) -> Result<(), AccessDenied> {
    if config.feature(flag) { Ok(()) } else { Err(AccessDenied) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRow {
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

pub fn list_users(credentials: &Credentials) -> Vec<UserRow> {
    credentials
        .usernames
        .iter()
        .map(|(username, user)| UserRow {
            username: username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        })
        .collect()
}

/// Add an account
///
/// The role must exist in the config's role table. The password is hashed
/// before the credentials document is written.
///
/// # Arguments
/// * `acting` - Session submitting the form
/// * `config` - Current config, for the role table and the `user_management` flag
/// * `store` - Credential store to write to
/// * `new_user` - The submitted form
///
/// # Returns
/// * `Result<Credentials, AdminError>` - The new credential document
///
/// # Errors
/// * `Denied` if `acting` is not an admin or user management is off
/// * `User(UnknownRole)`, `User(DuplicateUser)` or `User(MissingField)` for a bad form
pub fn add_user(
    acting: &Session,
    config: &Config,
    store: &CredentialStore,
    new_user: NewUser,
) -> Result<Credentials, AdminError> {
    require_admin(acting)?;
    require_feature(config, USER_MANAGEMENT)?;
    if !config.roles.contains_key(&new_user.role) {
        return Err(UserError::UnknownRole(new_user.role).into());
    }
    Ok(store.add_user(new_user)?)
}

/// Delete an account other than the acting admin's own
///
/// # Errors
/// * `Denied` if `acting` is not an admin or user management is off
/// * `User(CannotDeleteSelf)` or `User(UnknownUser)`
pub fn delete_user(
    acting: &Session,
    config: &Config,
    store: &CredentialStore,
    username: &str,
) -> Result<Credentials, AdminError> {
    require_admin(acting)?;
    require_feature(config, USER_MANAGEMENT)?;
    let acting_username = acting.username.as_deref().unwrap_or_default();
    Ok(store.delete_user(username, acting_username)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpreadsheetRow {
    pub id: String,
    pub name: String,
    pub url: String,
    pub embed: bool,
    pub download: bool,
}

pub fn list_spreadsheets(config: &Config) -> Vec<SpreadsheetRow> {
    config
        .spreadsheets
        .iter()
        .map(|(id, entry)| SpreadsheetRow {
            id: id.clone(),
            name: entry.name.clone(),
            url: entry.url.clone(),
            embed: entry.embed,
            download: entry.download,
        })
        .collect()
}

/// Overwrite one registry entry. The URL is stored as given.
///
/// # Arguments
/// * `acting` - Session submitting the form
/// * `store` - Config store to write to
/// * `edit` - New name, URL and flags; `edit.id` picks the entry
///
/// # Returns
/// * `Result<Config, AdminError>` - The new config
///
/// # Errors
/// * `Denied` if `acting` is not an admin or link management is off
/// * `UnknownSpreadsheet` if `edit.id` is not in the registry
pub fn edit_spreadsheet(
    acting: &Session,
    store: &ConfigStore,
    edit: SpreadsheetRow,
) -> Result<Config, AdminError> {
    require_admin(acting)?;
    require_feature(&store.current(), LINK_MANAGEMENT)?;
    let config = store.update(|config| {
        let entry = config
            .spreadsheets
            .get_mut(&edit.id)
            .ok_or_else(|| AdminError::UnknownSpreadsheet(edit.id.clone()))?;
        entry.name = edit.name.clone();
        entry.url = edit.url.clone();
        entry.embed = edit.embed;
        entry.download = edit.download;
        Ok::<_, AdminError>(())
    })?;
    info!(id = %edit.id, "spreadsheet link updated");
    Ok(config)
}

/// Rename the application; surrounding whitespace is dropped.
pub fn set_app_name(acting: &Session, store: &ConfigStore, name: &str) -> Result<Config, AdminError> {
    require_admin(acting)?;
    require_feature(&store.current(), PAGE_EDITING)?;
    let name = name.trim().to_string();
    let config = store.update(|config| {
        config.app_name = name.clone();
        Ok::<_, AdminError>(())
    })?;
    info!(app_name = %config.app_name, "app name updated");
    Ok(config)
}

/// Set every known flag: on if listed in `enabled`, off otherwise.
///
/// Always allowed for admins so a disabled tab can be switched back on.
pub fn set_features(
    acting: &Session,
    store: &ConfigStore,
    enabled: &BTreeSet<String>,
) -> Result<Config, AdminError> {
    require_admin(acting)?;
    let config = store.update(|config| {
        let known: BTreeSet<String> = FEATURE_FLAGS
            .iter()
            .map(|flag| flag.to_string())
            .chain(config.features.keys().cloned())
            .collect();
        for flag in known {
            let on = enabled.contains(&flag);
            config.features.insert(flag, on);
        }
        Ok::<_, AdminError>(())
    })?;
    info!(features = ?config.features, "feature flags updated");
    Ok(config)
}

/// MIME type for an allowed logo file name, by extension.
pub fn logo_mime(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Encode an uploaded image as `data:{mime};base64,{payload}`.
pub fn logo_data_uri(filename: &str, bytes: &[u8]) -> Result<String, AdminError> {
    if bytes.is_empty() {
        return Err(AdminError::EmptyLogo);
    }
    let mime = logo_mime(filename).ok_or(AdminError::UnsupportedLogo)?;
    Ok(format!("data:{mime};base64,{}", B64.encode(bytes)))
}

/// Store an uploaded image as the application logo
///
/// # Arguments
/// * `acting` - Session submitting the form
/// * `store` - Config store to write to
/// * `filename` - Uploaded file name; its extension picks the MIME type
/// * `bytes` - File contents
///
/// # Returns
/// * `Result<Config, AdminError>` - The new config, with `app_logo` as a data URI
///
/// # Errors
/// * `Denied` if `acting` is not an admin or page editing is off
/// * `EmptyLogo` or `UnsupportedLogo`; the stored logo is left as it was
pub fn set_logo(
    acting: &Session,
    store: &ConfigStore,
    filename: &str,
    bytes: &[u8],
) -> Result<Config, AdminError> {
    require_admin(acting)?;
    require_feature(&store.current(), PAGE_EDITING)?;
    let logo = logo_data_uri(filename, bytes)?;
    let config = store.update(|config| {
        config.app_logo = logo;
        Ok::<_, AdminError>(())
    })?;
    info!(%filename, size = bytes.len(), "logo updated");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logo_extensions() {
        assert_eq!(logo_mime("logo.PNG"), Some("image/png"));
        assert_eq!(logo_mime("a.jpeg"), Some("image/jpeg"));
        assert_eq!(logo_mime("a.jpg"), Some("image/jpeg"));
        assert_eq!(logo_mime("vector.svg"), Some("image/svg+xml"));
        assert_eq!(logo_mime("anim.gif"), None);
        assert_eq!(logo_mime("noext"), None);
    }

    #[test]
    fn logo_data_uri_encodes_payload() {
        assert_eq!(
            logo_data_uri("x.png", b"abc").unwrap(),
            "data:image/png;base64,YWJj"
        );
        assert!(matches!(
            logo_data_uri("x.gif", b"abc"),
            Err(AdminError::UnsupportedLogo)
        ));
        assert!(matches!(
            logo_data_uri("x.png", b""),
            Err(AdminError::EmptyLogo)
        ));
    }
}
