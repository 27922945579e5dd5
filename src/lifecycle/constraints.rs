// Exclusivity: at most one document per system code outside Outdated.
//
// This is the early, descriptive check. Stores repeat the same rule atomically
// on every write, so a conflict that appears after this check still surfaces
// as a ConstraintViolation instead of corrupting the data.

use std::sync::Arc;
use tracing::{debug, warn};

use super::errors::LifecycleError;
use super::state::DocumentState;
use crate::document::DocumentId;
use crate::store::{DocumentIds, DocumentStore};

#[derive(Clone)]
pub struct ExclusivityChecker {
    store: Arc<dyn DocumentStore>,
}

impl ExclusivityChecker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Fails if any document other than `exclude` holds an exclusive state
    pub async fn check_exclusive(
        &self,
        system_code: &str,
        exclude: Option<&DocumentId>,
    ) -> Result<(), LifecycleError> {
        let conflicting: Vec<DocumentId> = self
            .store
            .find_all_by_system_code_and_states_in(system_code, &DocumentState::EXCLUSIVE)
            .await?
            .into_iter()
            .map(|doc| doc.id().clone())
            .filter(|id| Some(id) != exclude)
            .collect();

        if conflicting.is_empty() {
            debug!(system.code = %system_code, "Exclusivity check passed");
            return Ok(());
        }

        warn!(
            system.code = %system_code,
            conflicts = conflicting.len(),
            "Exclusivity check failed"
        );
        Err(LifecycleError::ConstraintViolation {
            system_code: system_code.to_string(),
            conflicting: DocumentIds(conflicting),
        })
    }

    /// The creation-time variant: there is no document of our own to exclude yet
    pub async fn check_can_create(&self, system_code: &str) -> Result<(), LifecycleError> {
        self.check_exclusive(system_code, None).await
    }
}
