//! HTTP routing and handlers.
//!
//! Each handler resolves the caller's session from the cookie, applies at most
//! one operation, and renders the resulting state once.

use axum::{
    Form, Router,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::access::can_access;
use crate::admin::{self, SpreadsheetRow};
use crate::auth::{
    ADMIN_PAGE, Authenticator, HOME_PAGE, LoginAttempt, LoginStatus, Session, authenticate,
};
use crate::config::ConfigStore;
use crate::credentials::{CredentialStore, NewUser};
use crate::error::{AdminError, AuthFailure};
use crate::exporter::{SpreadsheetExporter, XLSX_MIME};
use crate::router::{PageRequest, View, navigate, resolve};
use crate::settings::Settings;
use crate::ui::{Notice, Renderer, Screen};

/// Shared by all requests. Sessions are per token inside `auth`.
pub struct AppState {
    pub config: ConfigStore,
    pub credentials: CredentialStore,
    pub auth: Authenticator,
    pub exporter: SpreadsheetExporter,
    pub renderer: Renderer,
}

impl AppState {
    /// Open both documents (creating defaults) and build the collaborators.
    pub fn open(settings: &Settings) -> Result<Self, Box<dyn std::error::Error>> {
        let config = ConfigStore::open(settings.config_path())?;
        let credentials = CredentialStore::open(settings.credentials_path())?;
        let accounts = credentials.current();
        for (username, role) in accounts.unknown_roles(&config.current()) {
            warn!(%username, %role, "account has a role missing from the config; it can open no spreadsheet");
        }
        Ok(AppState {
            config,
            credentials,
            auth: Authenticator::new(&accounts.cookie),
            exporter: SpreadsheetExporter::new(settings.export_base.clone())?,
            renderer: Renderer::new()?,
        })
    }
}

#[derive(Deserialize)]
struct DeleteUserForm {
    username: String,
}

/// Unchecked checkboxes are simply absent from the form.
#[derive(Deserialize)]
struct SpreadsheetForm {
    id: String,
    name: String,
    url: String,
    #[serde(default)]
    embed: Option<String>,
    #[serde(default)]
    download: Option<String>,
}

#[derive(Deserialize)]
struct AppNameForm {
    app_name: String,
}

pub fn router(state: Arc<AppState>, static_dir: &FsPath) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(index).post(login))
        .route("/logout", post(logout))
        .route("/page/:id", get(show_page))
        .route("/sheets/:id/download", get(download))
        .route("/theme", post(toggle_theme))
        .route("/admin/users", post(add_user))
        .route("/admin/users/delete", post(delete_user))
        .route("/admin/spreadsheets", post(edit_spreadsheet))
        .route("/admin/settings/name", post(set_app_name))
        .route("/admin/settings/features", post(set_features))
        .route("/admin/logo", post(upload_logo))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::open(&settings)?);
    info!(
        config = %state.config.path().display(),
        credentials = %state.credentials.path().display(),
        "documents loaded"
    );

    let app = router(state, &settings.static_dir);
    let listener = TcpListener::bind(&settings.bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Token and session behind the request's cookie, if it is still valid.
async fn current_session(state: &AppState, jar: &CookieJar) -> Option<(String, Session)> {
    let credentials = state.credentials.current();
    let token = jar.get(&credentials.cookie.name)?.value().to_string();
    let session = state.auth.session(&token, &credentials).await?;
    Some((token, session))
}

fn render(state: &AppState, session: &Session, view: &View, notice: Option<Notice>) -> Response {
    render_with_status(state, session, view, notice, StatusCode::OK)
}

fn render_with_status(
    state: &AppState,
    session: &Session,
    view: &View,
    notice: Option<Notice>,
    status: StatusCode,
) -> Response {
    let config = state.config.current();
    let credentials = state.credentials.current();
    let screen = Screen {
        config: &config,
        credentials: &credentials,
        session,
        view,
        notice,
        exporter: &state.exporter,
    };
    match state.renderer.render(&screen) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("render failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Gagal menampilkan halaman").into_response()
        }
    }
}

fn login_page(state: &AppState, status: LoginStatus) -> Response {
    let (notice, code) = match status {
        LoginStatus::Failure => (Notice::error(AuthFailure), StatusCode::UNAUTHORIZED),
        _ => (
            Notice::info("Masukkan username dan password Anda."),
            StatusCode::OK,
        ),
    };
    render_with_status(state, &Session::default(), &View::LoggedOut, Some(notice), code)
}

async fn index(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    match current_session(&state, &jar).await {
        Some((_, session)) => {
            let config = state.config.current();
            render(&state, &session, &resolve(&session, &config), None)
        }
        None => login_page(&state, authenticate(&state.credentials.current(), None).status),
    }
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(attempt): Form<LoginAttempt>,
) -> Response {
    let credentials = state.credentials.current();
    let (outcome, token) = state.auth.login(&credentials, Some(&attempt)).await;
    match token {
        Some(token) => {
            let cookie = Cookie::build((credentials.cookie.name.clone(), token))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .max_age(time::Duration::days(i64::from(credentials.cookie.expiry_days)));
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        None => login_page(&state, outcome.status),
    }
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let name = state.credentials.current().cookie.name;
    if let Some(cookie) = jar.get(&name) {
        state.auth.logout(cookie.value()).await;
    }
    let removal = Cookie::build((name, "")).path("/");
    (jar.remove(removal), Redirect::to("/")).into_response()
}

async fn show_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(page_id): Path<String>,
) -> Response {
    let Some((token, session)) = current_session(&state, &jar).await else {
        return Redirect::to("/").into_response();
    };
    let config = state.config.current();
    let (next, view) = navigate(&session, &config, &PageRequest::parse(&page_id));
    if view == View::Denied {
        warn!(username = ?session.username, role = %session.role, page = %page_id, "page denied");
    }
    state.auth.store(&token, next.clone()).await;
    render(&state, &next, &view, None)
}

/// `Content-Disposition` for `{name}.xlsx`, with an ASCII fallback for old clients.
fn attachment(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || " -_".contains(c) { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{fallback}.xlsx\"; filename*=UTF-8''{}.xlsx",
        urlencoding::encode(name)
    )
}

async fn download(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let Some((token, session)) = current_session(&state, &jar).await else {
        return Redirect::to("/").into_response();
    };
    let config = state.config.current();
    let entry = match config.spreadsheets.get(&id) {
        Some(entry)
            if can_access(&config, &session.role, &id)
                && entry.download
                && config.feature("download_button") =>
        {
            entry
        }
        _ => {
            warn!(username = ?session.username, %id, "download denied");
            let mut next = session.clone();
            next.current_page = HOME_PAGE.to_string();
            state.auth.store(&token, next.clone()).await;
            return render_with_status(&state, &next, &View::Denied, None, StatusCode::FORBIDDEN);
        }
    };

    match state.exporter.export(&entry.url).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, XLSX_MIME.to_string()),
                (header::CONTENT_DISPOSITION, attachment(&entry.name)),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => render_with_status(
            &state,
            &session,
            &View::Spreadsheet(id),
            Some(Notice::error(e)),
            StatusCode::BAD_GATEWAY,
        ),
    }
}

async fn toggle_theme(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some((token, mut session)) = current_session(&state, &jar).await {
        session.theme = session.theme.toggled();
        state.auth.store(&token, session).await;
    }
    Redirect::to("/").into_response()
}

/// Render the result of an admin operation on the admin page.
async fn admin_response<T>(
    state: &AppState,
    token: &str,
    session: Session,
    result: Result<T, AdminError>,
    success: &str,
) -> Response {
    match result {
        Ok(_) => {
            let mut next = session;
            next.current_page = ADMIN_PAGE.to_string();
            state.auth.store(token, next.clone()).await;
            render(state, &next, &View::Admin, Some(Notice::success(success)))
        }
        Err(AdminError::Denied(_)) => {
            warn!(username = ?session.username, role = %session.role, "admin action denied");
            let mut next = session;
            next.current_page = HOME_PAGE.to_string();
            state.auth.store(token, next.clone()).await;
            render_with_status(state, &next, &View::Denied, None, StatusCode::FORBIDDEN)
        }
        Err(e) => {
            warn!("admin action rejected: {e}");
            render_with_status(
                state,
                &session,
                &View::Admin,
                Some(Notice::error(e)),
                StatusCode::BAD_REQUEST,
            )
        }
    }
}

async fn add_user(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(new_user): Form<NewUser>,
) -> Response {
    let Some((token, session)) = current_session(&state, &jar).await else {
        return Redirect::to("/").into_response();
    };
    let config = state.config.current();
    let result = admin::add_user(&session, &config, &state.credentials, new_user);
    admin_response(&state, &token, session, result, "Pengguna berhasil ditambahkan.").await
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<DeleteUserForm>,
) -> Response {
    let Some((token, session)) = current_session(&state, &jar).await else {
        return Redirect::to("/").into_response();
    };
    let config = state.config.current();
    let result = admin::delete_user(&session, &config, &state.credentials, &form.username);
    admin_response(&state, &token, session, result, "Pengguna berhasil dihapus.").await
}

async fn edit_spreadsheet(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<SpreadsheetForm>,
) -> Response {
    let Some((token, session)) = current_session(&state, &jar).await else {
        return Redirect::to("/").into_response();
    };
    let edit = SpreadsheetRow {
        id: form.id,
        name: form.name,
        url: form.url,
        embed: form.embed.is_some(),
        download: form.download.is_some(),
    };
    let result = admin::edit_spreadsheet(&session, &state.config, edit);
    admin_response(&state, &token, session, result, "Spreadsheet berhasil diperbarui.").await
}

async fn set_app_name(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<AppNameForm>,
) -> Response {
    let Some((token, session)) = current_session(&state, &jar).await else {
        return Redirect::to("/").into_response();
    };
    let result = admin::set_app_name(&session, &state.config, &form.app_name);
    admin_response(&state, &token, session, result, "Nama aplikasi berhasil diperbarui.").await
}

async fn set_features(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let Some((token, session)) = current_session(&state, &jar).await else {
        return Redirect::to("/").into_response();
    };
    let enabled: BTreeSet<String> = form.into_keys().collect();
    let result = admin::set_features(&session, &state.config, &enabled);
    admin_response(&state, &token, session, result, "Fitur berhasil diperbarui.").await
}

async fn upload_logo(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Response {
    let Some((token, session)) = current_session(&state, &jar).await else {
        return Redirect::to("/").into_response();
    };

    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("logo") {
                    continue;
                }
                let filename = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => upload = Some((filename, bytes)),
                    Err(e) => {
                        warn!("logo upload interrupted: {e}");
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("malformed logo upload: {e}");
                break;
            }
        }
    }

    let (filename, bytes) = upload.unwrap_or_default();
    let result = admin::set_logo(&session, &state.config, &filename, &bytes);
    admin_response(&state, &token, session, result, "Logo berhasil disimpan.").await
}
