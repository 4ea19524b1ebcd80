/*!
# Rekap

A role-gated internal dashboard for the spreadsheet-backed reports of
Dinas Pertanian Lombok Barat.

## Overview

Staff sign in, see the reports their role allows, view them embedded and
download them as `.xlsx`. An administrator manages accounts, report links,
feature flags, the app name and the logo from an admin page.

## Architecture

### Persistence
- **config**: `config.json`, app name, logo, role table, spreadsheet registry, feature flags
- **credentials**: `credentials.yaml`, accounts with argon2 hashes and the cookie settings
- **saving**: whole-document read-modify-write behind a lock, atomic file replacement

### Logic
- **auth**: password checks, per-token sessions carried in a cookie
- **access**: role to spreadsheet permission checks
- **router**: which view a session sees for a requested page
- **admin**: the admin forms' operations
- **exporter**: one HTTP GET to download a linked Google spreadsheet

### Web
- **ui**: handlebars templates, a pure function of the state
- **app**: axum routes and handlers
- **settings**: command line / environment settings

Missing documents are created with defaults on first start; a malformed
document is a fatal startup error.
*/

pub mod access;
pub mod admin;
pub mod app;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod exporter;
pub mod router;
pub mod saving;
pub mod settings;
pub mod ui;

pub use access::*;
pub use config::{Config, ConfigStore};
pub use credentials::{CredentialStore, Credentials};
pub use error::*;
pub use exporter::{ExportResult, SpreadsheetExporter};
pub use router::{PageRequest, View};
