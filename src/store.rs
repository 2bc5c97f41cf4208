//! Persisted journal document.
//!
//! The document is read once per run and written at most once. Writes go to
//! a temp file in the same directory and are renamed over the target, so a
//! reader never sees a half-written page. An exclusive lock on
//! `<document>.lock` keeps overlapping runs out of the read-modify-write.

use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::error::MergeError;

/// File-backed journal document.
#[derive(Debug, Clone)]
pub struct JournalStore {
    path: PathBuf,
}

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct JournalLock {
    file: File,
    path: PathBuf,
}

impl Drop for JournalLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

impl JournalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Take the exclusive run lock without blocking.
    pub fn lock(&self) -> Result<JournalLock, MergeError> {
        let path = self.lock_path();
        ensure_parent(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| MergeError::Io {
                path: path.clone(),
                source,
            })?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Locked {}", path.display());
                Ok(JournalLock { file, path })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(MergeError::Locked { path })
            }
            Err(source) => Err(MergeError::Io { path, source }),
        }
    }

    /// Current document text. A missing file reads as an empty document.
    pub fn read(&self) -> Result<String, MergeError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("{} does not exist yet, starting empty", self.path.display());
                Ok(String::new())
            }
            Err(source) => Err(MergeError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Replace the document in one step.
    pub fn write(&self, contents: &str) -> Result<(), MergeError> {
        write_atomic(&self.path, contents.as_bytes()).map_err(|source| MergeError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!("Wrote {} ({} bytes)", self.path.display(), contents.len());
        Ok(())
    }
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
///
/// An existing file keeps its permissions; a new one is world-readable
/// (`0644` on unix), as a published page should be.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let permissions = match fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => mode(0o644),
        Err(e) => return Err(e),
    };
    write_with(path, bytes, permissions)
}

/// [`write_atomic`] for secrets: owner read/write only (`0600` on unix),
/// whatever the previous file allowed.
pub fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    write_with(path, bytes, mode(0o600))
}

fn write_with(path: &Path, bytes: &[u8], permissions: Option<Permissions>) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn mode(bits: u32) -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(bits))
}

#[cfg(not(unix))]
fn mode(_bits: u32) -> Option<Permissions> {
    None
}

fn ensure_parent(path: &Path) -> Result<(), MergeError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| MergeError::Io {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_document_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::new(dir.path().join("journal.html"));
        assert_eq!(store.read().unwrap(), "");
    }

    #[test]
    fn test_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::new(dir.path().join("site").join("journal.html"));
        store.write("<p>one</p>").unwrap();
        store.write("<p>two</p>").unwrap();
        assert_eq!(store.read().unwrap(), "<p>two</p>");

        // Only the document remains; no temp files left behind.
        let entries: Vec<_> = fs::read_dir(dir.path().join("site")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mode_of = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;

        let secret = dir.path().join("tokens.json");
        fs::write(&secret, "{}").unwrap();
        fs::set_permissions(&secret, Permissions::from_mode(0o644)).unwrap();
        write_private(&secret, b"{\"access_token\":\"x\"}").unwrap();
        assert_eq!(mode_of(&secret), 0o600);

        let page = dir.path().join("journal.html");
        write_atomic(&page, b"<p>new</p>").unwrap();
        assert_eq!(mode_of(&page), 0o644);

        fs::set_permissions(&page, Permissions::from_mode(0o664)).unwrap();
        write_atomic(&page, b"<p>again</p>").unwrap();
        assert_eq!(mode_of(&page), 0o664);
    }

    #[test]
    fn test_lock_path_is_sibling() {
        let store = JournalStore::new("templates/action-journal.html");
        assert_eq!(store.lock_path(), PathBuf::from("templates/action-journal.html.lock"));
    }

    #[test]
    fn test_second_lock_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::new(dir.path().join("journal.html"));

        let first = store.lock().unwrap();
        assert!(matches!(store.lock(), Err(MergeError::Locked { .. })));
        drop(first);
        assert!(store.lock().is_ok());
    }
}
