//! Role-based access checks over the config's role table.

use crate::config::{ADMIN_ROLE, Config, SpreadsheetEntry};

/// Whether `role` may open the spreadsheet `resource_id`.
///
/// Admins may open anything in the registry. Other roles need the id in their
/// access list; ids that are not in the registry are never accessible.
pub fn can_access(config: &Config, role: &str, resource_id: &str) -> bool {
    if !config.spreadsheets.contains_key(resource_id) {
        return false;
    }
    if role == ADMIN_ROLE {
        return true;
    }
    config
        .roles
        .get(role)
        .is_some_and(|r| r.access.iter().any(|id| id == resource_id))
}

/// Registry entries `role` may open, for the navigation menu.
pub fn visible_spreadsheets<'a>(
    config: &'a Config,
    role: &str,
) -> Vec<(&'a str, &'a SpreadsheetEntry)> {
    config
        .spreadsheets
        .iter()
        .filter(|(id, _)| can_access(config, role, id))
        .map(|(id, entry)| (id.as_str(), entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::USER_ROLE;

    #[test]
    fn admin_sees_every_registered_sheet() {
        let config = Config::default();
        for id in config.spreadsheets.keys() {
            assert!(can_access(&config, ADMIN_ROLE, id));
        }
        assert!(!can_access(&config, ADMIN_ROLE, "tidak_ada"));
    }

    #[test]
    fn user_follows_access_list() {
        let config = Config::default();
        let access = &config.roles[USER_ROLE].access;
        for id in config.spreadsheets.keys() {
            assert_eq!(can_access(&config, USER_ROLE, id), access.contains(id));
        }
        assert!(!can_access(&config, USER_ROLE, "barang_jasa"));
    }

    #[test]
    fn unknown_role_gets_nothing() {
        let config = Config::default();
        assert!(!can_access(&config, "guest", "bun"));
        assert!(visible_spreadsheets(&config, "guest").is_empty());
    }

    #[test]
    fn dangling_access_entry_is_ignored() {
        let mut config = Config::default();
        config
            .roles
            .get_mut(USER_ROLE)
            .unwrap()
            .access
            .push("perubahan".into());
        assert!(!can_access(&config, USER_ROLE, "perubahan"));
        assert_eq!(visible_spreadsheets(&config, USER_ROLE).len(), 5);
    }
}
