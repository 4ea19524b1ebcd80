//! Error taxonomy for the dashboard.
//!
//! Display strings are what the user sees inline, so they are written in the
//! interaction language. Load failures of the persisted documents are the only
//! fatal errors; everything else is shown in place and the page re-rendered.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reading or writing the persisted documents.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The config document exists but cannot be decoded.
    #[error("Gagal memuat konfigurasi {path}: {source}")]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The credentials document exists but cannot be decoded.
    #[error("Gagal memuat kredensial {path}: {source}")]
    CredentialsLoad {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Gagal mengakses file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Gagal menyandikan dokumen: {0}")]
    Encode(String),

    #[error("Gagal membuat hash password")]
    Hash,
}

/// Failed login. Deliberately carries no detail about which half was wrong.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Username atau password salah.")]
pub struct AuthFailure;

/// Authenticated, but the role does not allow the requested page or action.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Anda tidak memiliki akses ke halaman ini.")]
pub struct AccessDenied;

/// Validation errors from the user management forms.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Username sudah digunakan.")]
    DuplicateUser,

    #[error("Anda tidak dapat menghapus akun yang sedang digunakan.")]
    CannotDeleteSelf,

    #[error("Pengguna {0} tidak ditemukan.")]
    UnknownUser(String),

    #[error("Role {0} tidak dikenal.")]
    UnknownRole(String),

    #[error("{0} wajib diisi.")]
    MissingField(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures turning a spreadsheet link into a downloaded workbook.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Format URL tidak valid")]
    InvalidUrlFormat,

    #[error("Gagal mengunduh file: {0}")]
    Http(u16),

    #[error("Error: {0}")]
    Transport(String),
}

/// Everything an admin form submission can fail with.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Denied(#[from] AccessDenied),

    #[error(transparent)]
    User(#[from] UserError),

    #[error("Spreadsheet {0} tidak ditemukan.")]
    UnknownSpreadsheet(String),

    #[error("Tipe file logo tidak didukung. Gunakan PNG, JPG, JPEG, atau SVG.")]
    UnsupportedLogo,

    #[error("File logo kosong.")]
    EmptyLogo,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = Result<T, StoreError>;
