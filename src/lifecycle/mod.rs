// Review Lifecycle Module
//
// The state graph, transition commands, exclusivity constraint and the
// orchestrator that ties them to a document store.

pub mod command;
pub mod constraints;
pub mod creation;
pub mod errors;
pub mod orchestrator;
pub mod state;

pub use command::{TransitionCommand, TransitionRequest};
pub use constraints::ExclusivityChecker;
pub use creation::CreationGuard;
pub use errors::{ErrorKind, LifecycleError};
pub use orchestrator::{LifecycleOrchestrator, TransitionOutcome};
pub use state::{DocumentState, Operation, StateGraph, TransitionError};
