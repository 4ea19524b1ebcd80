//! HTML rendering. A pure function of the stores' documents, the session and the routed view.

use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;
use serde_json::{Value, json};

use crate::access::visible_spreadsheets;
use crate::admin::{self, LINK_MANAGEMENT, PAGE_EDITING, USER_MANAGEMENT};
use crate::auth::Session;
use crate::config::{Config, FEATURE_FLAGS};
use crate::credentials::Credentials;
use crate::error::AccessDenied;
use crate::exporter::SpreadsheetExporter;
use crate::router::View;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Error,
    Success,
    Info,
}

/// One inline message shown above the page body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn error(text: impl ToString) -> Self {
        Notice {
            kind: NoticeKind::Error,
            text: text.to_string(),
        }
    }

    pub fn success(text: impl ToString) -> Self {
        Notice {
            kind: NoticeKind::Success,
            text: text.to_string(),
        }
    }

    pub fn info(text: impl ToString) -> Self {
        Notice {
            kind: NoticeKind::Info,
            text: text.to_string(),
        }
    }
}

/// Everything one page render depends on.
pub struct Screen<'a> {
    pub config: &'a Config,
    pub credentials: &'a Credentials,
    pub session: &'a Session,
    pub view: &'a View,
    pub notice: Option<Notice>,
    pub exporter: &'a SpreadsheetExporter,
}

/// `embed_spreadsheet` -> `Embed Spreadsheet`
fn flag_label(flag: &str) -> String {
    flag.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_template_string("layout", include_str!("./templates/layout.hbs"))?;
        registry.register_template_string("login", include_str!("./templates/login.hbs"))?;
        registry.register_template_string("home", include_str!("./templates/home.hbs"))?;
        registry.register_template_string("sheet", include_str!("./templates/sheet.hbs"))?;
        registry.register_template_string("admin", include_str!("./templates/admin.hbs"))?;
        Ok(Self { registry })
    }

    pub fn render(&self, screen: &Screen) -> Result<String, RenderError> {
        let notice = screen.notice.clone().or_else(|| match screen.view {
            View::Denied => Some(Notice::error(AccessDenied)),
            View::NotFound(id) => Some(Notice::error(format!("Halaman {id} tidak ditemukan."))),
            _ => None,
        });

        let (template, body_context) = match screen.view {
            View::LoggedOut => {
                return self.registry.render(
                    "login",
                    &json!({
                        "app_name": screen.config.app_name,
                        "app_logo": screen.config.app_logo,
                        "theme": screen.session.theme,
                        "notice": notice,
                    }),
                );
            }
            View::Home | View::Denied | View::NotFound(_) => ("home", self.home_context(screen)),
            View::Spreadsheet(id) => ("sheet", self.sheet_context(screen, id)),
            View::Admin => ("admin", self.admin_context(screen)),
        };

        let body = self.registry.render(template, &body_context)?;
        self.registry
            .render("layout", &self.layout_context(screen, notice, body))
    }

    fn layout_context(&self, screen: &Screen, notice: Option<Notice>, body: String) -> Value {
        let session = screen.session;
        let username = session.username.clone().unwrap_or_default();
        let display_name = screen
            .credentials
            .user(&username)
            .map(|user| user.name.clone())
            .unwrap_or_else(|| username.clone());
        let nav: Vec<Value> = visible_spreadsheets(screen.config, &session.role)
            .into_iter()
            .map(|(id, entry)| {
                json!({
                    "id": id,
                    "name": entry.name,
                    "active": session.current_page == id,
                })
            })
            .collect();

        json!({
            "app_name": screen.config.app_name,
            "app_logo": screen.config.app_logo,
            "theme": session.theme,
            "name": display_name,
            "role": session.role,
            "role_upper": session.role.to_uppercase(),
            "is_admin": session.is_admin(),
            "home_active": matches!(screen.view, View::Home | View::Denied | View::NotFound(_)),
            "admin_active": matches!(screen.view, View::Admin),
            "nav": nav,
            "notice": notice,
            "body": body,
        })
    }

    fn home_context(&self, screen: &Screen) -> Value {
        let session = screen.session;
        let username = session.username.clone().unwrap_or_default();
        let name = screen
            .credentials
            .user(&username)
            .map(|user| user.name.clone())
            .unwrap_or_else(|| username.clone());
        let role = screen.config.roles.get(&session.role);
        let access: Vec<&str> = role
            .map(|role| {
                role.access
                    .iter()
                    .filter_map(|id| screen.config.spreadsheets.get(id))
                    .map(|entry| entry.name.as_str())
                    .collect()
            })
            .unwrap_or_default();
        // Admins can open everything, whatever their access list says.
        let access: Vec<&str> = if session.is_admin() {
            screen
                .config
                .spreadsheets
                .values()
                .map(|entry| entry.name.as_str())
                .collect()
        } else {
            access
        };

        json!({
            "app_name": screen.config.app_name,
            "name": name,
            "username": username,
            "role": session.role,
            "role_description": role.map(|r| r.description.as_str()),
            "access": access,
        })
    }

    fn sheet_context(&self, screen: &Screen, id: &str) -> Value {
        let Some(entry) = screen.config.spreadsheets.get(id) else {
            return json!({ "name": id });
        };
        let embed = entry.embed && screen.config.feature("embed_spreadsheet");
        let preview_url = if embed {
            screen.exporter.preview_url(&entry.url).ok()
        } else {
            None
        };
        json!({
            "id": id,
            "name": entry.name,
            "url": entry.url,
            "embed": embed,
            "preview_url": preview_url,
            "download": entry.download && screen.config.feature("download_button"),
        })
    }

    fn admin_context(&self, screen: &Screen) -> Value {
        let config = screen.config;
        let features: Vec<Value> = FEATURE_FLAGS
            .iter()
            .map(|flag| flag.to_string())
            .chain(
                config
                    .features
                    .keys()
                    .filter(|flag| !FEATURE_FLAGS.contains(&flag.as_str()))
                    .cloned(),
            )
            .map(|flag| {
                json!({
                    "label": flag_label(&flag),
                    "on": config.feature(&flag),
                    "flag": flag,
                })
            })
            .collect();

        json!({
            "show_users": config.feature(USER_MANAGEMENT),
            "show_links": config.feature(LINK_MANAGEMENT),
            "show_page_editing": config.feature(PAGE_EDITING),
            "users": admin::list_users(screen.credentials),
            "roles": config.roles.keys().collect::<Vec<_>>(),
            "spreadsheets": admin::list_spreadsheets(config),
            "app_name": config.app_name,
            "app_logo": config.app_logo,
            "features": features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::DEFAULT_EXPORT_BASE;

    #[test]
    fn flag_labels() {
        assert_eq!(flag_label("embed_spreadsheet"), "Embed Spreadsheet");
        assert_eq!(flag_label("page_editing"), "Page Editing");
    }

    #[test]
    fn renders_every_view() {
        let renderer = Renderer::new().unwrap();
        let config = Config::default();
        let credentials = Credentials::with_default_accounts().unwrap();
        let exporter = SpreadsheetExporter::new(DEFAULT_EXPORT_BASE).unwrap();
        let admin = Session::signed_in("admin", "admin");

        let views = [
            View::LoggedOut,
            View::Home,
            View::Admin,
            View::Spreadsheet("bun".into()),
            View::Denied,
            View::NotFound("x".into()),
        ];
        for view in &views {
            let html = renderer
                .render(&Screen {
                    config: &config,
                    credentials: &credentials,
                    session: &admin,
                    view,
                    notice: None,
                    exporter: &exporter,
                })
                .unwrap();
            assert!(html.contains("<html"), "{view:?}");
        }
    }

    #[test]
    fn user_menu_hides_restricted_sheets() {
        let renderer = Renderer::new().unwrap();
        let config = Config::default();
        let credentials = Credentials::with_default_accounts().unwrap();
        let exporter = SpreadsheetExporter::new(DEFAULT_EXPORT_BASE).unwrap();
        let user = Session::signed_in("user", "user");
        let html = renderer
            .render(&Screen {
                config: &config,
                credentials: &credentials,
                session: &user,
                view: &View::Home,
                notice: None,
                exporter: &exporter,
            })
            .unwrap();
        assert!(html.contains("/page/bun"));
        assert!(!html.contains("/page/barang_jasa"));
        assert!(!html.contains("/page/admin"));
    }
}
