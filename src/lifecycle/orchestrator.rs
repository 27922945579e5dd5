// Lifecycle orchestration - the single entry point for state changes
//
// Every call either persists exactly one document or touches nothing: all
// validation runs before the one conditional store write.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::command::{TransitionCommand, TransitionRequest};
use super::constraints::ExclusivityChecker;
use super::errors::LifecycleError;
use super::state::{DocumentState, Operation, StateGraph};
use crate::document::{DocumentDetails, DocumentId, ReviewDocument};
use crate::store::DocumentStore;
use crate::telemetry::create_lifecycle_span;

/// Result of a successful transition
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub operation: Operation,
    pub previous_state: DocumentState,
    pub new_state: DocumentState,
    pub document: ReviewDocument,
}

pub struct LifecycleOrchestrator {
    store: Arc<dyn DocumentStore>,
    checker: ExclusivityChecker,
}

impl LifecycleOrchestrator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let checker = ExclusivityChecker::new(Arc::clone(&store));
        Self { store, checker }
    }

    /// Parse a raw request and execute it. A bad operation name fails before
    /// the store is consulted.
    pub async fn execute_request(&self, request: &TransitionRequest) -> Result<TransitionOutcome, LifecycleError> {
        let command = request.parse().inspect_err(|e| {
            warn!(operation = %request.operation, "Rejected transition request: {}", e);
        })?;
        self.execute_transition(&command).await
    }

    pub async fn execute_transition(&self, command: &TransitionCommand) -> Result<TransitionOutcome, LifecycleError> {
        let span = create_lifecycle_span(
            command.operation().as_str(),
            Some(command.document_id().as_str()),
            None,
            command.acting_user(),
        );

        async {
            let result = self.apply(command).await;
            if let Err(e) = &result {
                warn!(kind = ?e.kind(), "Transition failed: {}", e);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn apply(&self, command: &TransitionCommand) -> Result<TransitionOutcome, LifecycleError> {
        let operation = command.operation();
        let mut doc = self.load(command.document_id()).await?;
        let previous_state = doc.state();

        let new_state = StateGraph::execute(previous_state, operation)?;

        if operation.rechecks_exclusivity() && new_state.is_exclusive() {
            self.checker
                .check_exclusive(doc.system_code(), Some(doc.id()))
                .await?;
        }

        let expected_revision = doc.revision();
        doc.apply_state(new_state, command.acting_user(), Utc::now());
        let document = self.store.save(doc, expected_revision).await?;

        info!(
            system.code = %document.system_code(),
            from = %previous_state,
            to = %new_state,
            comment = command.comment(),
            "Review document transitioned"
        );

        Ok(TransitionOutcome {
            operation,
            previous_state,
            new_state,
            document,
        })
    }

    pub async fn get(&self, id: &DocumentId) -> Result<ReviewDocument, LifecycleError> {
        self.load(id).await
    }

    pub async fn history(&self, system_code: &str) -> Result<Vec<ReviewDocument>, LifecycleError> {
        Ok(self.store.find_all_by_system_code(system_code).await?)
    }

    pub async fn available_operations(&self, id: &DocumentId) -> Result<Vec<Operation>, LifecycleError> {
        let doc = self.load(id).await?;
        Ok(StateGraph::available_operations(doc.state()))
    }

    /// Replace the title and summary of a draft
    pub async fn update_details(
        &self,
        id: &DocumentId,
        details: DocumentDetails,
        actor: &str,
    ) -> Result<ReviewDocument, LifecycleError> {
        let span = create_lifecycle_span("update_details", Some(id.as_str()), None, actor);
        async {
            let mut doc = self.load_editable(id).await?;
            let expected_revision = doc.revision();
            doc.replace_details(details, actor, Utc::now());
            let saved = self.store.save(doc, expected_revision).await?;
            info!("Review details updated");
            Ok::<_, LifecycleError>(saved)
        }
        .instrument(span)
        .await
    }

    /// Delete a draft. Documents past Draft are never deleted.
    pub async fn delete_draft(&self, id: &DocumentId, actor: &str) -> Result<(), LifecycleError> {
        let span = create_lifecycle_span("delete_draft", Some(id.as_str()), None, actor);
        async {
            let doc = self.load_editable(id).await?;
            self.store.delete(doc.id(), doc.revision()).await?;
            info!(system.code = %doc.system_code(), "Draft deleted");
            Ok::<_, LifecycleError>(())
        }
        .instrument(span)
        .await
    }

    async fn load(&self, id: &DocumentId) -> Result<ReviewDocument, LifecycleError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::document_not_found(id))
    }

    async fn load_editable(&self, id: &DocumentId) -> Result<ReviewDocument, LifecycleError> {
        let doc = self.load(id).await?;
        if !StateGraph::is_editable(doc.state()) {
            return Err(LifecycleError::NotEditable {
                document_id: id.clone(),
                state: doc.state(),
            });
        }
        Ok(doc)
    }
}
