use clap::Parser;
use std::path::PathBuf;

use crate::exporter::DEFAULT_EXPORT_BASE;

/// Server settings, from flags or `REKAP_*` environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "rekap", version, about = "Role-gated spreadsheet report dashboard")]
pub struct Settings {
    /// Address the web server listens on
    #[arg(long, env = "REKAP_BIND", default_value = "127.0.0.1:8501")]
    pub bind: String,

    /// Directory holding config.json and credentials.yaml
    #[arg(long, env = "REKAP_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Base URL of the spreadsheet export endpoint
    #[arg(long, env = "REKAP_EXPORT_BASE", default_value = DEFAULT_EXPORT_BASE)]
    pub export_base: String,

    /// Directory served under /static
    #[arg(long, env = "REKAP_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,
}

impl Settings {
    /// Settings rooted at `data_dir` with every other value at its default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Settings {
            bind: "127.0.0.1:8501".to_string(),
            data_dir: data_dir.into(),
            export_base: DEFAULT_EXPORT_BASE.to_string(),
            static_dir: PathBuf::from("static"),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("credentials.yaml")
    }
}
