//! Page state machine: which view a session sees for a requested page.

use crate::access::can_access;
use crate::auth::{ADMIN_PAGE, HOME_PAGE, Session};
use crate::config::Config;

/// What the renderer should draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    LoggedOut,
    Home,
    Admin,
    Spreadsheet(String),
    /// Authenticated but not allowed; shown as a notice on Home.
    Denied,
    /// No such spreadsheet; shown as a notice on Home.
    NotFound(String),
}

/// A menu selection or a direct page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Home,
    Admin,
    Spreadsheet(String),
}

impl PageRequest {
    pub fn parse(page_id: &str) -> Self {
        match page_id {
            HOME_PAGE => PageRequest::Home,
            ADMIN_PAGE => PageRequest::Admin,
            id => PageRequest::Spreadsheet(id.to_string()),
        }
    }

    pub fn page_id(&self) -> &str {
        match self {
            PageRequest::Home => HOME_PAGE,
            PageRequest::Admin => ADMIN_PAGE,
            PageRequest::Spreadsheet(id) => id,
        }
    }
}

fn decide(session: &Session, config: &Config, request: &PageRequest) -> View {
    match request {
        PageRequest::Home => View::Home,
        PageRequest::Admin if session.is_admin() => View::Admin,
        PageRequest::Admin => View::Denied,
        PageRequest::Spreadsheet(id) if can_access(config, &session.role, id) => {
            View::Spreadsheet(id.clone())
        }
        PageRequest::Spreadsheet(id) if !config.spreadsheets.contains_key(id) => {
            View::NotFound(id.clone())
        }
        PageRequest::Spreadsheet(_) => View::Denied,
    }
}

/// The view for the session's current page, re-checked against the current config.
///
/// A page that has become inaccessible since it was selected falls back to Home.
pub fn resolve(session: &Session, config: &Config) -> View {
    if !session.authenticated {
        return View::LoggedOut;
    }
    match decide(session, config, &PageRequest::parse(&session.current_page)) {
        View::Denied | View::NotFound(_) => View::Home,
        view => view,
    }
}

/// Apply a page request. Returns the updated session and the view to draw.
///
/// Denied and unknown pages reset `current_page` to Home.
pub fn navigate(session: &Session, config: &Config, request: &PageRequest) -> (Session, View) {
    if !session.authenticated {
        return (session.clone(), View::LoggedOut);
    }
    let view = decide(session, config, request);
    let mut next = session.clone();
    next.current_page = match view {
        View::Denied | View::NotFound(_) => HOME_PAGE.to_string(),
        _ => request.page_id().to_string(),
    };
    (next, view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_denied_restricted_sheet_falls_back_home() {
        let config = Config::default();
        let mut session = Session::signed_in("user", "user");
        session.current_page = "bun".into();

        let (next, view) = navigate(
            &session,
            &config,
            &PageRequest::Spreadsheet("barang_jasa".into()),
        );
        assert_eq!(view, View::Denied);
        assert_eq!(next.current_page, HOME_PAGE);
        assert_eq!(resolve(&next, &config), View::Home);
    }

    #[test]
    fn admin_page_requires_admin_role() {
        let config = Config::default();
        let user = Session::signed_in("user", "user");
        assert_eq!(navigate(&user, &config, &PageRequest::Admin).1, View::Denied);

        let admin = Session::signed_in("admin", "admin");
        let (next, view) = navigate(&admin, &config, &PageRequest::Admin);
        assert_eq!(view, View::Admin);
        assert_eq!(resolve(&next, &config), View::Admin);
    }

    #[test]
    fn allowed_sheet_sticks() {
        let config = Config::default();
        let session = Session::signed_in("user", "user");
        let (next, view) = navigate(&session, &config, &PageRequest::parse("tph"));
        assert_eq!(view, View::Spreadsheet("tph".into()));
        assert_eq!(next.current_page, "tph");
    }

    #[test]
    fn unknown_sheet_is_not_found() {
        let config = Config::default();
        let admin = Session::signed_in("admin", "admin");
        let (next, view) = navigate(&admin, &config, &PageRequest::parse("perubahan"));
        assert_eq!(view, View::NotFound("perubahan".into()));
        assert_eq!(next.current_page, HOME_PAGE);
    }

    #[test]
    fn logged_out_stays_logged_out() {
        let config = Config::default();
        let guest = Session::default();
        assert_eq!(resolve(&guest, &config), View::LoggedOut);
        assert_eq!(
            navigate(&guest, &config, &PageRequest::Admin).1,
            View::LoggedOut
        );
    }
}
