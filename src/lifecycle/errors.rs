use serde::Serialize;
use thiserror::Error;

use super::state::{DocumentState, TransitionError, UnknownOperation};
use crate::document::DocumentId;
use crate::store::{DocumentIds, StoreError};

/// Stable, machine-distinguishable failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidOperationName,
    NotFound,
    IllegalStateTransition,
    ConstraintViolation,
    ConcurrentModification,
    NotEditable,
    Store,
}

/// Everything the lifecycle core can fail with
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("unknown operation '{name}'; expected one of SUBMIT, REMOVE_SUBMISSION, APPROVE, UNAPPROVE, ACTIVATE, MARK_OUTDATED")]
    InvalidOperationName { name: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error(transparent)]
    IllegalStateTransition(#[from] TransitionError),

    #[error("constraint violated for system '{system_code}': only one document may be in Draft, Submitted, Approved or Active at a time, but a conflicting document already exists ({conflicting})")]
    ConstraintViolation {
        system_code: String,
        conflicting: DocumentIds,
    },

    #[error("document {document_id} was modified concurrently (expected revision {expected_revision}); reload and retry")]
    ConcurrentModification {
        document_id: DocumentId,
        expected_revision: u64,
    },

    #[error("document {document_id} is {state} and can no longer be edited; only Draft documents can")]
    NotEditable {
        document_id: DocumentId,
        state: DocumentState,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl LifecycleError {
    pub fn document_not_found(id: &DocumentId) -> Self {
        LifecycleError::NotFound {
            message: format!("document {id} not found"),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::InvalidOperationName { .. } => ErrorKind::InvalidOperationName,
            LifecycleError::NotFound { .. } => ErrorKind::NotFound,
            LifecycleError::IllegalStateTransition(_) => ErrorKind::IllegalStateTransition,
            LifecycleError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            LifecycleError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            LifecycleError::NotEditable { .. } => ErrorKind::NotEditable,
            LifecycleError::Store(_) => ErrorKind::Store,
        }
    }

    /// Only lost optimistic races are worth retrying after a reload
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ConcurrentModification
    }
}

impl From<UnknownOperation> for LifecycleError {
    fn from(err: UnknownOperation) -> Self {
        LifecycleError::InvalidOperationName { name: err.0 }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RevisionMismatch { id, expected, .. } => LifecycleError::ConcurrentModification {
                document_id: id,
                expected_revision: expected,
            },
            StoreError::ExclusivityConflict {
                system_code,
                conflicting,
            } => LifecycleError::ConstraintViolation {
                system_code,
                conflicting,
            },
            other => LifecycleError::Store(other),
        }
    }
}
