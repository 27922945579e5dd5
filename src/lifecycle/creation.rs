// Creation of review documents, fresh or as the next version of an active one

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, Instrument};

use super::constraints::ExclusivityChecker;
use super::errors::LifecycleError;
use super::state::{DocumentState, Operation, StateGraph};
use crate::document::{NewReview, ReviewDocument};
use crate::store::DocumentStore;
use crate::telemetry::create_lifecycle_span;

pub struct CreationGuard {
    store: Arc<dyn DocumentStore>,
    checker: ExclusivityChecker,
}

impl CreationGuard {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let checker = ExclusivityChecker::new(Arc::clone(&store));
        Self { store, checker }
    }

    /// Create a version-1 draft for a system code that has no open document
    pub async fn create(&self, review: NewReview) -> Result<ReviewDocument, LifecycleError> {
        let span = create_lifecycle_span(
            "create",
            None,
            Some(&review.system_code),
            &review.created_by,
        );
        async {
            self.checker.check_can_create(&review.system_code).await?;
            let doc = self
                .store
                .insert(ReviewDocument::new_draft(review, Utc::now()))
                .await?;
            info!(document.id = %doc.id(), "Review document created");
            Ok::<_, LifecycleError>(doc)
        }
        .instrument(span)
        .await
    }

    /// Start the next version of the system's Active document.
    ///
    /// The Active predecessor is marked Outdated in the same store write that
    /// inserts the new draft, so the system never has two open documents.
    pub async fn create_from_existing(&self, system_code: &str, actor: &str) -> Result<ReviewDocument, LifecycleError> {
        let span = create_lifecycle_span("create_from_existing", None, Some(system_code), actor);
        async {
            let predecessor = self
                .store
                .find_first_by_system_code_and_states_in(system_code, &[DocumentState::Active])
                .await?
                .ok_or_else(|| LifecycleError::NotFound {
                    message: format!(
                        "no Active document exists for system '{system_code}' to create a new version from"
                    ),
                })?;

            self.checker
                .check_exclusive(system_code, Some(predecessor.id()))
                .await?;

            let now = Utc::now();
            let successor = ReviewDocument::successor_of(&predecessor, actor, now);
            let expected_revision = predecessor.revision();
            let mut retired = predecessor;
            let outdated = StateGraph::execute(retired.state(), Operation::MarkOutdated)?;
            retired.apply_state(outdated, actor, now);

            let doc = self
                .store
                .supersede(retired, expected_revision, successor)
                .await?;
            info!(
                document.id = %doc.id(),
                version = doc.version(),
                "New review version created"
            );
            Ok::<_, LifecycleError>(doc)
        }
        .instrument(span)
        .await
    }
}
