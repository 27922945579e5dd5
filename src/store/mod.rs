//! Document store abstraction.
//!
//! The lifecycle core only talks to `DocumentStore`. Implementations provide the
//! actual storage backend (in-memory, JSON file, SQLite). Every write is
//! conditional: it must name the revision it was computed from, and a write
//! that claims an exclusive state (see `StateGraph::claims_exclusive_slot`)
//! must find no other document of its system code holding one. Backends
//! enforce both atomically, so a check done earlier by the lifecycle core can
//! never be invalidated between the check and the write.

pub mod file;
pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use file::FileDocumentStore;
pub use memory::InMemoryDocumentStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteDocumentStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::config::{SolutionReviewConfig, StoreBackend};
use crate::document::{DocumentId, ReviewDocument};
use crate::lifecycle::state::{DocumentState, StateGraph};

/// Comma-separated list of document ids for error messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentIds(pub Vec<DocumentId>);

impl fmt::Display for DocumentIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("unknown");
        }
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

/// Errors raised by document store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("revision mismatch for document {id}: expected {expected}, found {}", .found.map_or_else(|| "nothing".to_string(), |r| r.to_string()))]
    RevisionMismatch {
        id: DocumentId,
        expected: u64,
        found: Option<u64>,
    },

    #[error("system '{system_code}' already has a document in an exclusive state: {conflicting}")]
    ExclusivityConflict {
        system_code: String,
        conflicting: DocumentIds,
    },

    #[error("document {0} already exists")]
    DuplicateId(DocumentId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Storage operations the lifecycle core depends on
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get a document by id, returning None if not found
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<ReviewDocument>, StoreError>;

    /// All documents of a system code whose state is in `states`
    async fn find_all_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Vec<ReviewDocument>, StoreError>;

    /// Any one document of a system code whose state is in `states`
    async fn find_first_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Option<ReviewDocument>, StoreError>;

    /// Every document of a system code, oldest version first
    async fn find_all_by_system_code(&self, system_code: &str) -> Result<Vec<ReviewDocument>, StoreError>;

    /// Insert a new document. Fails if the id exists or the insert would break exclusivity.
    async fn insert(&self, doc: ReviewDocument) -> Result<ReviewDocument, StoreError>;

    /// Overwrite a document if its stored revision still equals `expected_revision`.
    /// Returns the stored copy with its revision bumped. Stepping back within
    /// the exclusive states (Unapprove, RemoveSubmission) never conflicts.
    async fn save(&self, doc: ReviewDocument, expected_revision: u64) -> Result<ReviewDocument, StoreError>;

    /// Save `predecessor` (conditional on `expected_revision`) and insert `successor`
    /// as one atomic write. Returns the stored successor.
    async fn supersede(
        &self,
        predecessor: ReviewDocument,
        expected_revision: u64,
        successor: ReviewDocument,
    ) -> Result<ReviewDocument, StoreError>;

    /// Delete a document if its stored revision still equals `expected_revision`
    async fn delete(&self, id: &DocumentId, expected_revision: u64) -> Result<(), StoreError>;
}

/// The write rules every non-SQL backend shares.
///
/// Callers must hold exclusive access to the table for the whole call; the
/// in-memory store uses a `RwLock`, the file store an OS file lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentTable {
    documents: BTreeMap<DocumentId, ReviewDocument>,
}

impl DocumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Loads records as-is, without any invariant checks.
    /// Used when importing data written by older tools.
    pub fn import(&mut self, docs: impl IntoIterator<Item = ReviewDocument>) {
        for doc in docs {
            self.documents.insert(doc.id().clone(), doc);
        }
    }

    pub fn get(&self, id: &DocumentId) -> Option<ReviewDocument> {
        self.documents.get(id).cloned()
    }

    pub fn find_all_in(&self, system_code: &str, states: &[DocumentState]) -> Vec<ReviewDocument> {
        let mut found: Vec<_> = self
            .documents
            .values()
            .filter(|d| d.system_code() == system_code && states.contains(&d.state()))
            .cloned()
            .collect();
        found.sort_by_key(|d| (d.version(), d.created_at()));
        found
    }

    pub fn history(&self, system_code: &str) -> Vec<ReviewDocument> {
        self.find_all_in(system_code, &DocumentState::ALL)
    }

    pub fn insert(&mut self, doc: ReviewDocument) -> Result<ReviewDocument, StoreError> {
        if self.documents.contains_key(doc.id()) {
            return Err(StoreError::DuplicateId(doc.id().clone()));
        }
        if doc.state().is_exclusive() {
            self.ensure_slot_free(doc.system_code(), &[doc.id()])?;
        }
        self.documents.insert(doc.id().clone(), doc.clone());
        Ok(doc)
    }

    pub fn save(&mut self, mut doc: ReviewDocument, expected_revision: u64) -> Result<ReviewDocument, StoreError> {
        self.ensure_revision(doc.id(), expected_revision)?;
        let stored = self.documents.get(doc.id()).map(ReviewDocument::state);
        if StateGraph::claims_exclusive_slot(stored, doc.state()) {
            self.ensure_slot_free(doc.system_code(), &[doc.id()])?;
        }
        doc.set_revision(expected_revision + 1);
        self.documents.insert(doc.id().clone(), doc.clone());
        Ok(doc)
    }

    pub fn supersede(
        &mut self,
        mut predecessor: ReviewDocument,
        expected_revision: u64,
        successor: ReviewDocument,
    ) -> Result<ReviewDocument, StoreError> {
        self.ensure_revision(predecessor.id(), expected_revision)?;
        if self.documents.contains_key(successor.id()) {
            return Err(StoreError::DuplicateId(successor.id().clone()));
        }
        let mut exempt = vec![successor.id()];
        if !predecessor.state().is_exclusive() {
            exempt.push(predecessor.id());
        }
        if successor.state().is_exclusive() {
            self.ensure_slot_free(successor.system_code(), &exempt)?;
        }
        predecessor.set_revision(expected_revision + 1);
        self.documents.insert(predecessor.id().clone(), predecessor);
        self.documents.insert(successor.id().clone(), successor.clone());
        Ok(successor)
    }

    pub fn delete(&mut self, id: &DocumentId, expected_revision: u64) -> Result<(), StoreError> {
        self.ensure_revision(id, expected_revision)?;
        self.documents.remove(id);
        Ok(())
    }

    fn ensure_revision(&self, id: &DocumentId, expected: u64) -> Result<(), StoreError> {
        let found = self.documents.get(id).map(ReviewDocument::revision);
        if found != Some(expected) {
            return Err(StoreError::RevisionMismatch {
                id: id.clone(),
                expected,
                found,
            });
        }
        Ok(())
    }

    fn ensure_slot_free(&self, system_code: &str, exempt: &[&DocumentId]) -> Result<(), StoreError> {
        let conflicting: Vec<DocumentId> = self
            .find_all_in(system_code, &DocumentState::EXCLUSIVE)
            .into_iter()
            .map(|d| d.id().clone())
            .filter(|id| !exempt.contains(&id))
            .collect();
        if !conflicting.is_empty() {
            return Err(StoreError::ExclusivityConflict {
                system_code: system_code.to_string(),
                conflicting: DocumentIds(conflicting),
            });
        }
        Ok(())
    }
}

/// Open the backend selected in configuration
pub async fn open_store(config: &SolutionReviewConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(InMemoryDocumentStore::new()),
        StoreBackend::File => Arc::new(FileDocumentStore::new(&config.store.file_path)?),
        #[cfg(feature = "database")]
        StoreBackend::Sqlite => {
            let db = config.database.as_ref().ok_or_else(|| {
                StoreError::Backend("sqlite backend selected but [database] is not configured".to_string())
            })?;
            Arc::new(SqliteDocumentStore::connect(&db.url, db.max_connections, db.auto_migrate).await?)
        }
        #[cfg(not(feature = "database"))]
        StoreBackend::Sqlite => {
            return Err(StoreError::Backend(
                "sqlite backend requires building with the `database` feature".to_string(),
            ))
        }
    };
    info!(backend = ?config.store.backend, "Document store opened");
    Ok(store)
}
