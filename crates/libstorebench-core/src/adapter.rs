//! The pluggable backend interface consumed by the orchestrator.

use std::path::{Path, PathBuf};

use crate::config::PredicateSpec;
use crate::error::Result;

/// Uniform seven-operation interface, implemented once per data store.
///
/// Any call may fail; the operation runner and orchestrator absorb
/// failures so one bad operation never aborts unrelated measurements.
pub trait BackendAdapter {
    /// Backend name, used for labels, file names and report columns.
    fn name(&self) -> &str;

    /// Establish the connection. Not timed or sampled.
    fn connect(&mut self) -> Result<()>;

    /// Bulk-load documents from `source` into `collection`, replacing
    /// any existing content. Returns the number of documents inserted.
    fn insert_data(&mut self, source: &Path, collection: &str) -> Result<u64>;

    /// Representative query work over `collection` using `predicate`.
    fn read_data(&mut self, collection: &str, predicate: &PredicateSpec) -> Result<()>;

    /// Flag documents matching `predicate`. Returns the number updated.
    fn update_data(&mut self, collection: &str, predicate: &PredicateSpec) -> Result<u64>;

    /// Remove the documents flagged by the update step. Returns the
    /// number deleted.
    fn delete_data(&mut self, collection: &str) -> Result<u64>;

    /// Export `collection` as JSON lines under `results_dir`, returning
    /// the destination path.
    fn export_data(&mut self, collection: &str, results_dir: &Path) -> Result<PathBuf>;

    /// Release the connection. Invoked exactly once per lifecycle,
    /// regardless of what failed earlier.
    fn close(&mut self) -> Result<()>;
}
