//! JSON index of published entries, newest first.
//!
//! Built from the structured [`JournalEntry`] values produced at render time.
//! The HTML document stays the source of truth for dedup; the manifest is a
//! convenience for site tooling and may lag behind it after a failed write.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activity::ActivityId;
use crate::render::JournalEntry;
use crate::store::write_atomic;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalManifest {
    pub entries: Vec<JournalEntry>,
}

impl JournalManifest {
    /// Load from disk; a missing file is an empty manifest.
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_atomic(path, &json)
    }

    pub fn contains(&self, id: &ActivityId) -> bool {
        self.entries.iter().any(|e| &e.id == id)
    }

    /// Put `new_entries` in front, keeping their order and skipping ids
    /// already listed. Returns how many were added.
    pub fn prepend(&mut self, new_entries: impl IntoIterator<Item = JournalEntry>) -> usize {
        let mut seen: HashSet<ActivityId> = self.entries.iter().map(|e| e.id.clone()).collect();
        let mut front: Vec<JournalEntry> = new_entries
            .into_iter()
            .filter(|entry| seen.insert(entry.id.clone()))
            .collect();
        let added = front.len();
        front.append(&mut self.entries);
        self.entries = front;
        added
    }
}
