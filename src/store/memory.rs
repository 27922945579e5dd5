//! In-memory implementation of `DocumentStore`.
//!
//! All documents are held in a `DocumentTable` behind a `RwLock` and are lost
//! on restart. Each write takes the write lock for its whole check-and-apply
//! step, which is what makes revision and exclusivity checks atomic.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DocumentStore, DocumentTable, StoreError};
use crate::document::{DocumentId, ReviewDocument};
use crate::lifecycle::state::DocumentState;

pub struct InMemoryDocumentStore {
    table: RwLock<DocumentTable>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(DocumentTable::new()),
        }
    }

    /// A store pre-loaded with existing records, taken as-is.
    ///
    /// No invariant is checked, so this can reproduce data imported from
    /// systems that never enforced exclusivity.
    pub fn with_documents(docs: impl IntoIterator<Item = ReviewDocument>) -> Self {
        let mut table = DocumentTable::new();
        table.import(docs);
        Self {
            table: RwLock::new(table),
        }
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<ReviewDocument>, StoreError> {
        Ok(self.table.read().await.get(id))
    }

    async fn find_all_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Vec<ReviewDocument>, StoreError> {
        Ok(self.table.read().await.find_all_in(system_code, states))
    }

    async fn find_first_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Option<ReviewDocument>, StoreError> {
        Ok(self
            .table
            .read()
            .await
            .find_all_in(system_code, states)
            .into_iter()
            .next())
    }

    async fn find_all_by_system_code(&self, system_code: &str) -> Result<Vec<ReviewDocument>, StoreError> {
        Ok(self.table.read().await.history(system_code))
    }

    async fn insert(&self, doc: ReviewDocument) -> Result<ReviewDocument, StoreError> {
        self.table.write().await.insert(doc)
    }

    async fn save(&self, doc: ReviewDocument, expected_revision: u64) -> Result<ReviewDocument, StoreError> {
        self.table.write().await.save(doc, expected_revision)
    }

    async fn supersede(
        &self,
        predecessor: ReviewDocument,
        expected_revision: u64,
        successor: ReviewDocument,
    ) -> Result<ReviewDocument, StoreError> {
        self.table
            .write()
            .await
            .supersede(predecessor, expected_revision, successor)
    }

    async fn delete(&self, id: &DocumentId, expected_revision: u64) -> Result<(), StoreError> {
        self.table.write().await.delete(id, expected_revision)
    }
}
