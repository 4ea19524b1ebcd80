//! Download of a linked Google spreadsheet as an `.xlsx` workbook.
//!
//! This is the only outbound network call in the application. It is a single
//! GET with no retry and no timeout beyond the client default; failures are
//! returned to the caller to show inline and are never fatal.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::error::ExportError;

pub const DEFAULT_EXPORT_BASE: &str = "https://docs.google.com/spreadsheets";

/// Content type of the downloaded workbook.
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const SPREADSHEET_HOST: &str = "docs.google.com/spreadsheets";

lazy_static! {
    static ref SHEET_ID_REGEX: Regex = Regex::new(r"/d/([^/?#]+)/(?:edit|view)").unwrap();
}

/// Raw workbook bytes, or why they could not be fetched.
pub type ExportResult = Result<Vec<u8>, ExportError>;

/// Extract the spreadsheet id from a `.../d/{id}/edit...` or `.../d/{id}/view...` link.
///
/// # Examples
/// ```
/// use rekap::exporter::sheet_id;
///
/// let id = sheet_id("https://docs.google.com/spreadsheets/d/ABC123/edit?usp=drive_link").unwrap();
/// assert_eq!(id, "ABC123");
/// assert!(sheet_id("https://docs.google.com/spreadsheets/d/ABC123").is_err());
/// ```
pub fn sheet_id(url: &str) -> Result<&str, ExportError> {
    if !url.contains(SPREADSHEET_HOST) {
        return Err(ExportError::InvalidUrlFormat);
    }
    SHEET_ID_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(ExportError::InvalidUrlFormat)
}

#[derive(Clone)]
pub struct SpreadsheetExporter {
    client: reqwest::Client,
    base: String,
}

impl SpreadsheetExporter {
    /// `base` replaces `https://docs.google.com/spreadsheets` in the export endpoint.
    pub fn new(base: impl Into<String>) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ExportError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn export_url(&self, url: &str) -> Result<String, ExportError> {
        let id = sheet_id(url)?;
        Ok(format!("{}/d/{}/export?format=xlsx", self.base, id))
    }

    /// Read-only view for embedding in an iframe.
    pub fn preview_url(&self, url: &str) -> Result<String, ExportError> {
        let id = sheet_id(url)?;
        Ok(format!("{}/d/{}/preview", self.base, id))
    }

    /// Fetch the workbook behind `url`. An unrecognised link never touches the network.
    pub async fn export(&self, url: &str) -> ExportResult {
        let export_url = self.export_url(url)?;

        let response = match self.client.get(&export_url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(%export_url, "spreadsheet export failed: {e}");
                return Err(ExportError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(%export_url, status = status.as_u16(), "spreadsheet export rejected");
            return Err(ExportError::Http(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;
        info!(%export_url, size = bytes.len(), "spreadsheet exported");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_export_and_preview_urls() {
        let exporter = SpreadsheetExporter::new(DEFAULT_EXPORT_BASE).unwrap();
        let url = "https://docs.google.com/spreadsheets/d/ABC123/edit?usp=drive_link";
        assert_eq!(
            exporter.export_url(url).unwrap(),
            "https://docs.google.com/spreadsheets/d/ABC123/export?format=xlsx"
        );
        assert_eq!(
            exporter.preview_url(url).unwrap(),
            "https://docs.google.com/spreadsheets/d/ABC123/preview"
        );
    }

    #[test]
    fn accepts_view_links() {
        assert_eq!(
            sheet_id("https://docs.google.com/spreadsheets/d/XyZ-9_q/view#gid=0").unwrap(),
            "XyZ-9_q"
        );
    }

    #[test]
    fn rejects_other_shapes() {
        for url in [
            "https://docs.google.com/spreadsheets/d/ABC123/copy",
            "https://docs.google.com/spreadsheets/u/0/",
            "https://example.com/d/ABC123/edit",
            "",
        ] {
            assert!(
                matches!(sheet_id(url), Err(ExportError::InvalidUrlFormat)),
                "{url}"
            );
        }
    }
}
