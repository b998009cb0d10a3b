//! sled adapter: one tree per collection, JSON documents keyed by
//! big-endian u64.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use libstorebench_core::adapter::BackendAdapter;
use libstorebench_core::config::PredicateSpec;
use libstorebench_core::error::Result;

use crate::dataset::{self, Document};
use crate::error::{BackendError, Result as BackendResult};
use crate::{BATCH_SIZE, UPDATE_LIMIT};

pub struct SledBackend {
    name: String,
    path: PathBuf,
    db: Option<sled::Db>,
}

impl SledBackend {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            db: None,
        }
    }

    fn tree(&self, collection: &str) -> BackendResult<sled::Tree> {
        let db = self.db.as_ref().ok_or(BackendError::NotConnected)?;
        Ok(db.open_tree(collection)?)
    }

    fn bulk_insert(&self, source: &Path, collection: &str) -> BackendResult<u64> {
        let tree = self.tree(collection)?;
        tree.clear()?;

        let documents = dataset::read_documents(source)?;
        let mut inserted = 0u64;
        for chunk in documents.chunks(BATCH_SIZE) {
            let mut batch = sled::Batch::default();
            for doc in chunk {
                batch.insert(&inserted.to_be_bytes()[..], serde_json::to_vec(doc)?);
                inserted += 1;
            }
            tree.apply_batch(batch)?;
            if inserted % 50_000 == 0 {
                info!("  progress: {} documents inserted", inserted);
            }
        }
        tree.flush()?;
        info!("inserted {} documents into {}", inserted, collection);
        Ok(inserted)
    }

    fn count_matching(&self, collection: &str, predicate: &PredicateSpec) -> BackendResult<u64> {
        let tree = self.tree(collection)?;

        // read one document, then the representative filtered count
        if let Some((_, value)) = tree.first()? {
            let _doc: Document = serde_json::from_slice(&value)?;
        }

        let mut matched = 0u64;
        for item in tree.iter() {
            let (_, value) = item?;
            let doc: Document = serde_json::from_slice(&value)?;
            if dataset::matches_predicate(&doc, predicate) {
                matched += 1;
            }
        }
        debug!("found {} documents matching query in {}", matched, collection);
        Ok(matched)
    }

    fn flag_matching(&self, collection: &str, predicate: &PredicateSpec) -> BackendResult<u64> {
        let tree = self.tree(collection)?;
        let mut updated = 0u64;
        for item in tree.iter() {
            if updated >= UPDATE_LIMIT as u64 {
                break;
            }
            let (key, value) = item?;
            let mut doc: Document = serde_json::from_slice(&value)?;
            if dataset::matches_predicate(&doc, predicate) {
                dataset::flag_updated(&mut doc);
                tree.insert(key, serde_json::to_vec(&doc)?)?;
                updated += 1;
            }
        }
        debug!("updated {} documents in {}", updated, collection);
        Ok(updated)
    }

    fn delete_flagged(&self, collection: &str) -> BackendResult<u64> {
        let tree = self.tree(collection)?;

        let mut doomed = Vec::new();
        for item in tree.iter() {
            let (key, value) = item?;
            let doc: Document = serde_json::from_slice(&value)?;
            if dataset::is_flagged(&doc) {
                doomed.push(key);
            }
        }

        let mut deleted = 0u64;
        for key in doomed {
            if tree.remove(key)?.is_some() {
                deleted += 1;
            }
        }
        debug!("deleted {} documents from {}", deleted, collection);
        Ok(deleted)
    }

    fn export(&self, collection: &str, results_dir: &Path) -> BackendResult<PathBuf> {
        let tree = self.tree(collection)?;
        std::fs::create_dir_all(results_dir)?;
        let path = results_dir.join(format!(
            "export_{}_{}.json",
            collection,
            self.name.to_lowercase()
        ));

        let mut writer = BufWriter::new(File::create(&path)?);
        let mut exported = 0u64;
        for item in tree.iter() {
            let (_, value) = item?;
            let doc: Document = serde_json::from_slice(&value)?;
            serde_json::to_writer(&mut writer, &doc)?;
            writer.write_all(b"\n")?;
            exported += 1;
        }
        writer.flush()?;
        info!("exported {} documents to {}", exported, path.display());
        Ok(path)
    }
}

impl BackendAdapter for SledBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<()> {
        let db = sled::open(&self.path).map_err(BackendError::from)?;
        info!("connected to sled store at {}", self.path.display());
        self.db = Some(db);
        Ok(())
    }

    fn insert_data(&mut self, source: &Path, collection: &str) -> Result<u64> {
        Ok(self.bulk_insert(source, collection)?)
    }

    fn read_data(&mut self, collection: &str, predicate: &PredicateSpec) -> Result<()> {
        self.count_matching(collection, predicate)?;
        Ok(())
    }

    fn update_data(&mut self, collection: &str, predicate: &PredicateSpec) -> Result<u64> {
        Ok(self.flag_matching(collection, predicate)?)
    }

    fn delete_data(&mut self, collection: &str) -> Result<u64> {
        Ok(self.delete_flagged(collection)?)
    }

    fn export_data(&mut self, collection: &str, results_dir: &Path) -> Result<PathBuf> {
        Ok(self.export(collection, results_dir)?)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(db) = self.db.take() {
            db.flush().map_err(BackendError::from)?;
            info!("{} connection closed", self.name);
        }
        Ok(())
    }
}
