//! Application settings document (`config.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::saving::{self, Document};

pub const ADMIN_ROLE: &str = "admin";
pub const USER_ROLE: &str = "user";

/// Feature flag names known to the settings form.
pub const FEATURE_FLAGS: [&str; 6] = [
    "embed_spreadsheet",
    "inline_editing",
    "download_button",
    "user_management",
    "link_management",
    "page_editing",
];

/// A named permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub description: String,
    /// Resource ids this role may open, in menu order.
    pub access: Vec<String>,
}

/// One spreadsheet-backed report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetEntry {
    pub name: String,
    pub url: String,
    pub embed: bool,
    pub download: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub app_name: String,
    /// `data:{mime};base64,...` or empty when no logo was uploaded.
    #[serde(default)]
    pub app_logo: String,
    pub roles: BTreeMap<String, Role>,
    pub spreadsheets: BTreeMap<String, SpreadsheetEntry>,
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
}

fn sheet(name: &str, url: &str) -> SpreadsheetEntry {
    SpreadsheetEntry {
        name: name.to_string(),
        url: url.to_string(),
        embed: true,
        download: true,
    }
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            ADMIN_ROLE.to_string(),
            Role {
                description: "Admin dapat mengakses semua file, mengelola pengguna, mengelola link spreadsheet, serta mengedit halaman aplikasi.".to_string(),
                access: ids(&["barang_jasa", "psp", "tph", "nak", "bun", "analisa"]),
            },
        );
        roles.insert(
            USER_ROLE.to_string(),
            Role {
                description: "User hanya bisa mengakses BUN, TPH, PSP, NAK, dan Analisa.".to_string(),
                access: ids(&["bun", "tph", "psp", "nak", "analisa"]),
            },
        );

        let mut spreadsheets = BTreeMap::new();
        spreadsheets.insert(
            "barang_jasa".to_string(),
            sheet(
                "Barang dan Jasa",
                "https://docs.google.com/spreadsheets/d/1KQ-yiIRVO1ry5LrPxGLuHxVwI8Lf8w7d_-nZolL3caM/edit?usp=drive_link",
            ),
        );
        spreadsheets.insert(
            "psp".to_string(),
            sheet(
                "PSP",
                "https://docs.google.com/spreadsheets/d/1Fqn_g6FSy1Em3Lz90esuQLAetA0TQfhS/edit?usp=drive_link",
            ),
        );
        spreadsheets.insert(
            "tph".to_string(),
            sheet(
                "TPH",
                "https://docs.google.com/spreadsheets/d/1l7nKhV7LDzvETPOOdRMK25i5whVf5iUb/edit?usp=drive_link",
            ),
        );
        spreadsheets.insert(
            "nak".to_string(),
            sheet(
                "NAK",
                "https://docs.google.com/spreadsheets/d/19F-VlNJcGGDctCfG7Fg0jpN7bYcjunGX/edit?usp=drive_link",
            ),
        );
        spreadsheets.insert(
            "bun".to_string(),
            sheet(
                "BUN",
                "https://docs.google.com/spreadsheets/d/1ujyWx5hKlhpVH-_8_89whG9wgy2KVT6h/edit?usp=drive_link",
            ),
        );
        spreadsheets.insert(
            "analisa".to_string(),
            sheet(
                "Analisa",
                "https://docs.google.com/spreadsheets/d/1HrcReS9fHohnWzptsILGsaW01Mt55LSPaf44Lq8-A2Q/edit?usp=drive_link",
            ),
        );

        let features = FEATURE_FLAGS
            .iter()
            .map(|flag| (flag.to_string(), true))
            .collect();

        Config {
            app_name: "Rekap Barang dan Jasa Dinas Pertanian Lombok Barat".to_string(),
            app_logo: String::new(),
            roles,
            spreadsheets,
            features,
        }
    }
}

impl Config {
    /// A flag missing from the document counts as enabled.
    pub fn feature(&self, flag: &str) -> bool {
        self.features.get(flag).copied().unwrap_or(true)
    }

    /// `(role, resource)` pairs whose resource is not in the registry.
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        self.roles
            .iter()
            .flat_map(|(role_id, role)| {
                role.access
                    .iter()
                    .filter(|id| !self.spreadsheets.contains_key(id.as_str()))
                    .map(move |id| (role_id.clone(), id.clone()))
            })
            .collect()
    }
}

fn encode(config: &Config) -> StoreResult<Vec<u8>> {
    serde_json::to_vec_pretty(config).map_err(|e| StoreError::Encode(e.to_string()))
}

/// Owner of the config document.
pub struct ConfigStore {
    doc: Document<Config>,
}

impl ConfigStore {
    /// Load the document at `path` (creating the default) and keep it as the current state.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let config = Self::load(&path)?;
        for (role, resource) in config.dangling_references() {
            warn!(%role, %resource, "role grants access to an unknown spreadsheet; ignoring");
        }
        Ok(Self {
            doc: Document::new(path, config, encode),
        })
    }

    /// Read the document, writing the default first if it does not exist.
    pub fn load(path: &Path) -> StoreResult<Config> {
        match saving::read_optional(path)? {
            Some(text) => serde_json::from_str(&text).map_err(|source| StoreError::ConfigLoad {
                path: path.to_path_buf(),
                source,
            }),
            None => {
                let config = Config::default();
                saving::write_atomic(path, &encode(&config)?)?;
                info!(path = %path.display(), "created default config");
                Ok(config)
            }
        }
    }

    pub fn save(&self, config: &Config) -> StoreResult<()> {
        self.doc.save(config)
    }

    pub fn current(&self) -> Config {
        self.doc.snapshot()
    }

    pub fn path(&self) -> &Path {
        self.doc.path()
    }

    /// Apply `edit` and persist; returns the new config.
    pub fn update<F, E>(&self, edit: F) -> Result<Config, E>
    where
        F: FnOnce(&mut Config) -> Result<(), E>,
        E: From<StoreError>,
    {
        self.doc.update(edit)
    }
}
