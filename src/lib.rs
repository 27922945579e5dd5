// Solution Review Library - architecture review lifecycle tracking
// This exposes the core components for testing and integration

pub mod config;
pub mod document;
pub mod lifecycle;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{config, SolutionReviewConfig, StoreBackend};
pub use document::{DocumentDetails, DocumentId, NewReview, ReviewDocument};
pub use lifecycle::{
    CreationGuard, DocumentState, ErrorKind, ExclusivityChecker, LifecycleError,
    LifecycleOrchestrator, Operation, StateGraph, TransitionCommand, TransitionError,
    TransitionOutcome, TransitionRequest,
};
pub use store::{DocumentStore, FileDocumentStore, InMemoryDocumentStore, StoreError};
pub use telemetry::{create_lifecycle_span, generate_correlation_id, init_telemetry};
