//! Whole-document persistence shared by the config and credential stores.
//!
//! Each document lives in memory behind a lock. A mutation clones the current
//! value, edits the clone, writes it to disk and only then publishes it, all
//! while holding the write guard, so two admins can never interleave a write.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

/// Serializer for one document type.
pub type Encoder<T> = fn(&T) -> StoreResult<Vec<u8>>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a document, treating a missing file as `None`.
pub fn read_optional(path: &Path) -> StoreResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path)(e)),
    }
}

/// Replace `path` with `contents` via a sibling temp file and a rename.
///
/// A crash mid-write leaves either the old or the new document, never half of one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    tmp.write_all(contents).map_err(io_error(path))?;
    tmp.as_file().sync_all().map_err(io_error(path))?;
    tmp.persist(path).map_err(|e| io_error(path)(e.error))?;
    Ok(())
}

/// A persisted document and its in-memory current value.
pub struct Document<T> {
    path: PathBuf,
    current: RwLock<T>,
    encode: Encoder<T>,
}

impl<T: Clone> Document<T> {
    pub fn new(path: PathBuf, value: T, encode: Encoder<T>) -> Self {
        Self {
            path,
            current: RwLock::new(value),
            encode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone of the current value.
    pub fn snapshot(&self) -> T {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Overwrite the whole document.
    pub fn save(&self, value: &T) -> StoreResult<()> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        write_atomic(&self.path, &(self.encode)(value)?)?;
        *guard = value.clone();
        Ok(())
    }

    /// Read-modify-write under the exclusive guard.
    ///
    /// If `edit` or the write fails the in-memory value and the file are
    /// both left as they were.
    pub fn update<F, E>(&self, edit: F) -> Result<T, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        edit(&mut next)?;
        write_atomic(&self.path, &(self.encode)(&next)?)?;
        *guard = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_lines(value: &Vec<String>) -> StoreResult<Vec<u8>> {
        Ok(value.join("\n").into_bytes())
    }

    #[test]
    fn write_atomic_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/doc.txt");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn read_optional_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn failed_update_leaves_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let doc = Document::new(path.clone(), vec!["a".to_string()], encode_lines);
        doc.save(&doc.snapshot()).unwrap();

        let result: Result<_, StoreError> = doc.update(|lines| {
            lines.push("b".to_string());
            Err(StoreError::Hash)
        });
        assert!(result.is_err());
        assert_eq!(doc.snapshot(), vec!["a".to_string()]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a");

        let next: Result<_, StoreError> = doc.update(|lines| {
            lines.push("c".to_string());
            Ok(())
        });
        assert_eq!(next.unwrap().len(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nc");
    }
}
