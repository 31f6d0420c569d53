//! Storage backends behind the record store.
//!
//! Both backends speak in raw documents and [`Patch`]es; decoding into typed
//! records and default handling live in [`crate::store`].

pub mod json_snapshot_store;
pub mod pg_document_store;

use std::fmt;

use async_trait::async_trait;
use models::{Collection, Document, Patch};

use crate::errors::StoreError;
use crate::query::ListQuery;

pub use json_snapshot_store::{JsonSnapshotStore, Snapshot};
pub use pg_document_store::PgDocumentStore;

/// Which backend serves the process. Fixed once selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendMode {
    Remote,
    File,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Remote => f.write_str("remote"),
            BackendMode::File => f.write_str("file"),
        }
    }
}

/// Per-document operations every backend provides.
///
/// Returned documents always carry `id` equal to the key they are stored under.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    fn mode(&self) -> BackendMode;

    /// Fetch the document for `id`, inserting `defaults` first if it does not exist.
    async fn get_or_create(&self, collection: Collection, id: &str, defaults: &Document) -> Result<Document, StoreError>;

    /// Apply `patch` to the document for `id` (starting from `defaults` when absent)
    /// and return the result.
    async fn merge_update(
        &self,
        collection: Collection,
        id: &str,
        defaults: &Document,
        patch: &Patch,
    ) -> Result<Document, StoreError>;

    /// Documents matching `query`. `defaults` is overlaid under each document
    /// before filtering and sorting so backfilled fields compare like stored ones.
    async fn list(&self, collection: Collection, query: &ListQuery, defaults: &Document) -> Result<Vec<Document>, StoreError>;
}
