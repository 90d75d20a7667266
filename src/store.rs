use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::models::Document;

/// In-memory document store with a JSON disk snapshot.
///
/// Built once, offline, by the `index` subcommand; loaded read-only at
/// serve time and shared across sessions behind an `Arc`. Writes are
/// whole-document with a skip-on-duplicate policy.
pub struct DocumentStore {
    docs: RwLock<Vec<Document>>,
    snapshot_path: PathBuf,
}

impl DocumentStore {
    /// Open a store directory, loading the snapshot if one exists.
    pub fn open(store_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(store_dir)?;
        let snapshot_path = store_dir.join("documents.json");

        let docs = if snapshot_path.exists() {
            let data = std::fs::read_to_string(&snapshot_path)
                .context("Failed to read document snapshot")?;
            serde_json::from_str(&data).context("Failed to parse document snapshot")?
        } else {
            Vec::new()
        };

        Ok(Self {
            docs: RwLock::new(docs),
            snapshot_path,
        })
    }

    /// Write documents, skipping any whose id is already present.
    /// Returns the number actually written.
    pub fn write_documents(&self, documents: Vec<Document>) -> usize {
        let mut docs = self.docs.write();
        let existing: HashSet<String> = docs.iter().map(|d| d.id.clone()).collect();

        let mut written = 0;
        for doc in documents {
            if existing.contains(&doc.id) {
                tracing::debug!("Skipping duplicate document {}", doc.id);
                continue;
            }
            docs.push(doc);
            written += 1;
        }
        written
    }

    /// Persist the snapshot to disk.
    pub fn save_to_disk(&self) -> Result<()> {
        let docs = self.docs.read();
        let data = serde_json::to_string(&*docs)?;
        std::fs::write(&self.snapshot_path, data).context("Failed to write document snapshot")?;
        Ok(())
    }

    pub fn count_documents(&self) -> usize {
        self.docs.read().len()
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.docs.read().iter().find(|d| d.id == id).cloned()
    }

    /// Clone out the full document list (used at index-build time).
    pub fn all(&self) -> Vec<Document> {
        self.docs.read().clone()
    }

    /// Run `f` over every document without cloning the list.
    pub fn for_each<F: FnMut(&Document)>(&self, mut f: F) {
        for doc in self.docs.read().iter() {
            f(doc);
        }
    }
}
