//! SQLite adapter (via rusqlite): one table per collection with the
//! document stored as JSON text plus an `updated` flag column.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::{debug, info};

use libstorebench_core::adapter::BackendAdapter;
use libstorebench_core::config::PredicateSpec;
use libstorebench_core::error::Result;

use crate::dataset::{self, Document};
use crate::error::{BackendError, Result as BackendResult};
use crate::{BATCH_SIZE, UPDATE_LIMIT};

pub struct SqliteBackend {
    name: String,
    path: PathBuf,
    conn: Option<Connection>,
}

impl SqliteBackend {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            conn: None,
        }
    }

    fn conn(&mut self) -> BackendResult<&mut Connection> {
        self.conn.as_mut().ok_or(BackendError::NotConnected)
    }

    fn bulk_insert(&mut self, source: &Path, collection: &str) -> BackendResult<u64> {
        let table = validate_collection(collection)?;
        let documents = dataset::read_documents(source)?;

        let conn = self.conn()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                id      INTEGER PRIMARY KEY,
                doc     TEXT    NOT NULL,
                updated INTEGER NOT NULL DEFAULT 0
            );
            DELETE FROM {t};",
            t = table
        ))?;

        let mut inserted = 0u64;
        for chunk in documents.chunks(BATCH_SIZE) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(&format!(
                    "INSERT INTO {} (id, doc) VALUES (?1, ?2)",
                    table
                ))?;
                for doc in chunk {
                    stmt.execute(params![inserted as i64, serde_json::to_string(doc)?])?;
                    inserted += 1;
                }
            }
            tx.commit()?;
            if inserted % 50_000 == 0 {
                info!("  progress: {} documents inserted", inserted);
            }
        }
        info!("inserted {} documents into {}", inserted, collection);
        Ok(inserted)
    }

    fn count_matching(&mut self, collection: &str, predicate: &PredicateSpec) -> BackendResult<u64> {
        let table = validate_collection(collection)?;
        let conn = self.conn()?;

        let mut stmt = conn.prepare_cached(&format!("SELECT doc FROM {}", table))?;
        let mut rows = stmt.query([])?;
        let mut matched = 0u64;
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            let doc: Document = serde_json::from_str(&text)?;
            if dataset::matches_predicate(&doc, predicate) {
                matched += 1;
            }
        }
        debug!("found {} documents matching query in {}", matched, collection);
        Ok(matched)
    }

    fn flag_matching(&mut self, collection: &str, predicate: &PredicateSpec) -> BackendResult<u64> {
        let table = validate_collection(collection)?;
        let conn = self.conn()?;

        let mut matches: Vec<(i64, String)> = Vec::new();
        {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT id, doc FROM {} WHERE updated = 0",
                table
            ))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                if matches.len() >= UPDATE_LIMIT {
                    break;
                }
                let id: i64 = row.get(0)?;
                let text: String = row.get(1)?;
                let mut doc: Document = serde_json::from_str(&text)?;
                if dataset::matches_predicate(&doc, predicate) {
                    dataset::flag_updated(&mut doc);
                    matches.push((id, serde_json::to_string(&doc)?));
                }
            }
        }

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "UPDATE {} SET doc = ?1, updated = 1 WHERE id = ?2",
                table
            ))?;
            for (id, doc) in &matches {
                stmt.execute(params![doc, id])?;
            }
        }
        tx.commit()?;
        debug!("updated {} documents in {}", matches.len(), collection);
        Ok(matches.len() as u64)
    }

    fn delete_flagged(&mut self, collection: &str) -> BackendResult<u64> {
        let table = validate_collection(collection)?;
        let conn = self.conn()?;
        let deleted = conn.execute(&format!("DELETE FROM {} WHERE updated = 1", table), [])?;
        debug!("deleted {} documents from {}", deleted, collection);
        Ok(deleted as u64)
    }

    fn export(&mut self, collection: &str, results_dir: &Path) -> BackendResult<PathBuf> {
        let table = validate_collection(collection)?;
        std::fs::create_dir_all(results_dir)?;
        let path = results_dir.join(format!(
            "export_{}_{}.json",
            collection,
            self.name.to_lowercase()
        ));

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!("SELECT doc FROM {} ORDER BY id", table))?;
        let mut rows = stmt.query([])?;

        let mut writer = BufWriter::new(File::create(&path)?);
        let mut exported = 0u64;
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            writer.write_all(text.as_bytes())?;
            writer.write_all(b"\n")?;
            exported += 1;
        }
        writer.flush()?;
        info!("exported {} documents to {}", exported, path.display());
        Ok(path)
    }
}

/// Collection names are spliced into SQL; restrict them to identifiers.
fn validate_collection(collection: &str) -> BackendResult<&str> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !collection.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(collection)
    } else {
        Err(BackendError::InvalidCollection(collection.to_string()))
    }
}

impl BackendAdapter for SqliteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(BackendError::from)?;
        }
        let conn = Connection::open(&self.path).map_err(BackendError::from)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(BackendError::from)?;
        info!("connected to SQLite database at {}", self.path.display());
        self.conn = Some(conn);
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
        if let Some(conn) = self.conn.take() {
            // consolidate the WAL before handing the file back
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
            conn.close()
                .map_err(|(_, e)| BackendError::Sqlite(e))?;
            info!("{} connection closed", self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libstorebench_core::config::NumericOp;
    use tempfile::tempdir;

    fn predicate() -> PredicateSpec {
        PredicateSpec {
            numeric_field: "Score".to_string(),
            numeric_op: NumericOp::Gt,
            threshold: 4.0,
            text_field: "Summary".to_string(),
            keywords: vec!["good".to_string()],
        }
    }

    fn write_dataset(dir: &Path) -> PathBuf {
        let path = dir.join("reviews.csv");
        std::fs::write(
            &path,
            "Score,Summary\n5,excellent\n3,pretty good really\n2,awful\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_full_crud_cycle() {
        let dir = tempdir().unwrap();
        let data = write_dataset(dir.path());

        let mut backend = SqliteBackend::new("sqlite", dir.path().join("bench.sqlite3"));
        backend.connect().unwrap();

        let inserted = backend.insert_data(&data, "reviews").unwrap();
        assert_eq!(inserted, 3);

        backend.read_data("reviews", &predicate()).unwrap();

        // Score 5 matches numerically, "pretty good really" by keyword
        let updated = backend.update_data("reviews", &predicate()).unwrap();
        assert_eq!(updated, 2);

        let deleted = backend.delete_data("reviews").unwrap();
        assert_eq!(deleted, 2);

        let export = backend
            .export_data("reviews", &dir.path().join("results"))
            .unwrap();
        let content = std::fs::read_to_string(&export).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("awful"));

        backend.close().unwrap();
    }

    #[test]
    fn test_update_is_idempotent_once_flagged() {
        let dir = tempdir().unwrap();
        let data = write_dataset(dir.path());

        let mut backend = SqliteBackend::new("sqlite", dir.path().join("bench.sqlite3"));
        backend.connect().unwrap();
        backend.insert_data(&data, "reviews").unwrap();

        assert_eq!(backend.update_data("reviews", &predicate()).unwrap(), 2);
        // already-flagged rows are not selected again
        assert_eq!(backend.update_data("reviews", &predicate()).unwrap(), 0);
        backend.close().unwrap();
    }

    #[test]
    fn test_collection_names_are_validated() {
        let dir = tempdir().unwrap();
        let mut backend = SqliteBackend::new("sqlite", dir.path().join("bench.sqlite3"));
        backend.connect().unwrap();
        assert!(backend.delete_data("users; DROP TABLE users").is_err());
        assert!(backend.delete_data("1table").is_err());
        backend.close().unwrap();
    }
}
