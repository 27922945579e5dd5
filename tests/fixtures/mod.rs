// Shared fixtures for lifecycle integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

use solution_review::store::StoreError;
use solution_review::{
    DocumentDetails, DocumentId, DocumentState, DocumentStore, InMemoryDocumentStore, NewReview,
    Operation, ReviewDocument,
};

pub fn new_review(system_code: &str, author: &str) -> NewReview {
    NewReview {
        system_code: system_code.to_string(),
        details: DocumentDetails {
            title: format!("{system_code} solution review"),
            summary: None,
        },
        created_by: author.to_string(),
    }
}

/// A persisted-looking document in any state, for pre-loading stores with
/// records that were never created through the lifecycle.
pub fn imported_document(system_code: &str, state: DocumentState) -> ReviewDocument {
    let now = Utc::now();
    ReviewDocument::from_stored(solution_review::document::StoredDocument {
        id: DocumentId::generate(),
        system_code: system_code.to_string(),
        state,
        version: 1,
        revision: 0,
        details: DocumentDetails::titled("Imported review"),
        created_by: "importer".to_string(),
        created_at: now,
        last_modified_by: "importer".to_string(),
        last_modified_at: now,
    })
}

/// Path through the lifecycle from Draft to `target`
pub fn operations_to(target: DocumentState) -> Vec<Operation> {
    let path = [
        Operation::Submit,
        Operation::Approve,
        Operation::Activate,
        Operation::MarkOutdated,
    ];
    let steps = match target {
        DocumentState::Draft => 0,
        DocumentState::Submitted => 1,
        DocumentState::Approved => 2,
        DocumentState::Active => 3,
        DocumentState::Outdated => 4,
    };
    path[..steps].to_vec()
}

/// Counts reads and writes while delegating to an in-memory store
#[derive(Default)]
pub struct RecordingStore {
    pub inner: InMemoryDocumentStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RecordingStore {
    pub fn with_documents(docs: impl IntoIterator<Item = ReviewDocument>) -> Self {
        Self {
            inner: InMemoryDocumentStore::with_documents(docs),
            ..Default::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<ReviewDocument>, StoreError> {
        self.read();
        self.inner.find_by_id(id).await
    }

    async fn find_all_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Vec<ReviewDocument>, StoreError> {
        self.read();
        self.inner
            .find_all_by_system_code_and_states_in(system_code, states)
            .await
    }

    async fn find_first_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Option<ReviewDocument>, StoreError> {
        self.read();
        self.inner
            .find_first_by_system_code_and_states_in(system_code, states)
            .await
    }

    async fn find_all_by_system_code(&self, system_code: &str) -> Result<Vec<ReviewDocument>, StoreError> {
        self.read();
        self.inner.find_all_by_system_code(system_code).await
    }

    async fn insert(&self, doc: ReviewDocument) -> Result<ReviewDocument, StoreError> {
        self.write();
        self.inner.insert(doc).await
    }

    async fn save(&self, doc: ReviewDocument, expected_revision: u64) -> Result<ReviewDocument, StoreError> {
        self.write();
        self.inner.save(doc, expected_revision).await
    }

    async fn supersede(
        &self,
        predecessor: ReviewDocument,
        expected_revision: u64,
        successor: ReviewDocument,
    ) -> Result<ReviewDocument, StoreError> {
        self.write();
        self.inner
            .supersede(predecessor, expected_revision, successor)
            .await
    }

    async fn delete(&self, id: &DocumentId, expected_revision: u64) -> Result<(), StoreError> {
        self.write();
        self.inner.delete(id, expected_revision).await
    }
}

/// Which read the gate holds back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePoint {
    /// `find_by_id`, the load at the start of a transition
    Load,
    /// The exclusivity query made by the constraint check
    ConstraintQuery,
}

/// Holds the first `parties` calls at one read until all of them have arrived.
///
/// Every racer therefore sees the same snapshot before any of them writes,
/// which is exactly the interleaving a check-then-act design gets wrong.
pub struct GatedStore {
    inner: InMemoryDocumentStore,
    point: GatePoint,
    parties: usize,
    arrived: AtomicUsize,
    barrier: Arc<Barrier>,
}

impl GatedStore {
    pub fn new(inner: InMemoryDocumentStore, point: GatePoint, parties: usize) -> Self {
        Self {
            inner,
            point,
            parties,
            arrived: AtomicUsize::new(0),
            barrier: Arc::new(Barrier::new(parties)),
        }
    }

    pub fn inner(&self) -> &InMemoryDocumentStore {
        &self.inner
    }

    async fn gate(&self, point: GatePoint) {
        if point != self.point {
            return;
        }
        if self.arrived.fetch_add(1, Ordering::SeqCst) < self.parties {
            self.barrier.wait().await;
        }
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<ReviewDocument>, StoreError> {
        let found = self.inner.find_by_id(id).await;
        self.gate(GatePoint::Load).await;
        found
    }

    async fn find_all_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Vec<ReviewDocument>, StoreError> {
        let found = self
            .inner
            .find_all_by_system_code_and_states_in(system_code, states)
            .await;
        self.gate(GatePoint::ConstraintQuery).await;
        found
    }

    async fn find_first_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Option<ReviewDocument>, StoreError> {
        self.inner
            .find_first_by_system_code_and_states_in(system_code, states)
            .await
    }

    async fn find_all_by_system_code(&self, system_code: &str) -> Result<Vec<ReviewDocument>, StoreError> {
        self.inner.find_all_by_system_code(system_code).await
    }

    async fn insert(&self, doc: ReviewDocument) -> Result<ReviewDocument, StoreError> {
        self.inner.insert(doc).await
    }

    async fn save(&self, doc: ReviewDocument, expected_revision: u64) -> Result<ReviewDocument, StoreError> {
        self.inner.save(doc, expected_revision).await
    }

    async fn supersede(
        &self,
        predecessor: ReviewDocument,
        expected_revision: u64,
        successor: ReviewDocument,
    ) -> Result<ReviewDocument, StoreError> {
        self.inner
            .supersede(predecessor, expected_revision, successor)
            .await
    }

    async fn delete(&self, id: &DocumentId, expected_revision: u64) -> Result<(), StoreError> {
        self.inner.delete(id, expected_revision).await
    }
}
