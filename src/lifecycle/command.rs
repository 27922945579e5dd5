// Transition commands.
//
// `TransitionRequest` is the wire shape callers send. It is parsed exactly once
// into a `TransitionCommand`; nothing past that boundary looks at operation
// strings again.

use serde::{Deserialize, Serialize};

use super::errors::LifecycleError;
use super::state::Operation;
use crate::document::DocumentId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub document_id: String,
    /// Case-insensitive operation name, e.g. `approve` or `MARK_OUTDATED`
    pub operation: String,
    pub acting_user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TransitionRequest {
    pub fn parse(&self) -> Result<TransitionCommand, LifecycleError> {
        TransitionCommand::new(
            self.document_id.as_str(),
            &self.operation,
            self.acting_user.clone(),
            self.comment.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCommand {
    document_id: DocumentId,
    operation: Operation,
    acting_user: String,
    comment: Option<String>,
}

impl TransitionCommand {
    /// Resolves `operation` by name; unknown names fail with `InvalidOperationName`
    pub fn new(
        document_id: impl Into<DocumentId>,
        operation: &str,
        acting_user: impl Into<String>,
        comment: Option<String>,
    ) -> Result<Self, LifecycleError> {
        let operation = operation.parse::<Operation>()?;
        Ok(Self::for_operation(document_id, operation, acting_user, comment))
    }

    pub fn for_operation(
        document_id: impl Into<DocumentId>,
        operation: Operation,
        acting_user: impl Into<String>,
        comment: Option<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            operation,
            acting_user: acting_user.into(),
            comment,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn acting_user(&self) -> &str {
        &self.acting_user
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}
