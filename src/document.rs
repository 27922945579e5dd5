// Review documents - the entity under lifecycle control

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::lifecycle::state::DocumentState;

/// Opaque document identifier, assigned at creation and never changed
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Editable content of a review. Only drafts may change it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDetails {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl DocumentDetails {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: None,
        }
    }
}

/// Input for creating a brand-new review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    pub system_code: String,
    pub details: DocumentDetails,
    pub created_by: String,
}

/// A Solution Review record.
///
/// `state` can only change through the lifecycle orchestrator, which validates
/// every step against the state graph. `revision` is the optimistic-lock counter
/// that stores compare on every write; `version` is the human-facing number that
/// increases each time a review is carried into a new draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDocument {
    id: DocumentId,
    system_code: String,
    state: DocumentState,
    version: u32,
    revision: u64,
    details: DocumentDetails,
    created_by: String,
    created_at: DateTime<Utc>,
    last_modified_by: String,
    last_modified_at: DateTime<Utc>,
}

/// Every persisted column of a document, used by stores to rebuild one
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub system_code: String,
    pub state: DocumentState,
    pub version: u32,
    pub revision: u64,
    pub details: DocumentDetails,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,
}

impl ReviewDocument {
    /// A fresh version-1 draft that has not been persisted yet
    pub fn new_draft(review: NewReview, now: DateTime<Utc>) -> Self {
        Self {
            id: DocumentId::generate(),
            system_code: review.system_code,
            state: DocumentState::Draft,
            version: 1,
            revision: 0,
            details: review.details,
            last_modified_by: review.created_by.clone(),
            created_by: review.created_by,
            created_at: now,
            last_modified_at: now,
        }
    }

    /// The next draft carried over from `predecessor`. The original author is kept.
    pub fn successor_of(predecessor: &ReviewDocument, actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: DocumentId::generate(),
            system_code: predecessor.system_code.clone(),
            state: DocumentState::Draft,
            version: predecessor.version + 1,
            revision: 0,
            details: predecessor.details.clone(),
            created_by: predecessor.created_by.clone(),
            created_at: now,
            last_modified_by: actor.to_string(),
            last_modified_at: now,
        }
    }

    /// Rebuilds a document exactly as a store persisted it
    pub fn from_stored(stored: StoredDocument) -> Self {
        Self {
            id: stored.id,
            system_code: stored.system_code,
            state: stored.state,
            version: stored.version,
            revision: stored.revision,
            details: stored.details,
            created_by: stored.created_by,
            created_at: stored.created_at,
            last_modified_by: stored.last_modified_by,
            last_modified_at: stored.last_modified_at,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn system_code(&self) -> &str {
        &self.system_code
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn details(&self) -> &DocumentDetails {
        &self.details
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified_by(&self) -> &str {
        &self.last_modified_by
    }

    pub fn last_modified_at(&self) -> DateTime<Utc> {
        self.last_modified_at
    }

    pub(crate) fn apply_state(&mut self, state: DocumentState, actor: &str, at: DateTime<Utc>) {
        self.state = state;
        self.touch(actor, at);
    }

    pub(crate) fn replace_details(&mut self, details: DocumentDetails, actor: &str, at: DateTime<Utc>) {
        self.details = details;
        self.touch(actor, at);
    }

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    fn touch(&mut self, actor: &str, at: DateTime<Utc>) {
        self.last_modified_by = actor.to_string();
        self.last_modified_at = at;
    }
}
