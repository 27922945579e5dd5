// Review lifecycle states and the transition graph between them.
//
// Everything in here is a pure function over two closed enums and a static
// table, so it can be shared freely across tasks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle state of a review document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentState {
    Draft,
    Submitted,
    Approved,
    Active,
    /// Terminal. Any number of outdated documents may share a system code.
    Outdated,
}

impl DocumentState {
    pub const ALL: [DocumentState; 5] = [
        DocumentState::Draft,
        DocumentState::Submitted,
        DocumentState::Approved,
        DocumentState::Active,
        DocumentState::Outdated,
    ];

    /// States of which at most one document per system code may hold one
    pub const EXCLUSIVE: [DocumentState; 4] = [
        DocumentState::Draft,
        DocumentState::Submitted,
        DocumentState::Approved,
        DocumentState::Active,
    ];

    /// Storage form, e.g. `SUBMITTED`
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentState::Draft => "DRAFT",
            DocumentState::Submitted => "SUBMITTED",
            DocumentState::Approved => "APPROVED",
            DocumentState::Active => "ACTIVE",
            DocumentState::Outdated => "OUTDATED",
        }
    }

    pub fn is_exclusive(self) -> bool {
        self != DocumentState::Outdated
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentState::Draft => "Draft",
            DocumentState::Submitted => "Submitted",
            DocumentState::Approved => "Approved",
            DocumentState::Active => "Active",
            DocumentState::Outdated => "Outdated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown document state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for DocumentState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// A named transition bound to one required source and one target state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Submit,
    RemoveSubmission,
    Approve,
    Unapprove,
    Activate,
    MarkOutdated,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Submit,
        Operation::RemoveSubmission,
        Operation::Approve,
        Operation::Unapprove,
        Operation::Activate,
        Operation::MarkOutdated,
    ];

    pub fn required_source(self) -> DocumentState {
        match self {
            Operation::Submit => DocumentState::Draft,
            Operation::RemoveSubmission => DocumentState::Submitted,
            Operation::Approve => DocumentState::Submitted,
            Operation::Unapprove => DocumentState::Approved,
            Operation::Activate => DocumentState::Approved,
            Operation::MarkOutdated => DocumentState::Active,
        }
    }

    pub fn target(self) -> DocumentState {
        match self {
            Operation::Submit => DocumentState::Submitted,
            Operation::RemoveSubmission => DocumentState::Draft,
            Operation::Approve => DocumentState::Approved,
            Operation::Unapprove => DocumentState::Submitted,
            Operation::Activate => DocumentState::Active,
            Operation::MarkOutdated => DocumentState::Outdated,
        }
    }

    /// Canonical command name, e.g. `REMOVE_SUBMISSION`
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Submit => "SUBMIT",
            Operation::RemoveSubmission => "REMOVE_SUBMISSION",
            Operation::Approve => "APPROVE",
            Operation::Unapprove => "UNAPPROVE",
            Operation::Activate => "ACTIVATE",
            Operation::MarkOutdated => "MARK_OUTDATED",
        }
    }

    pub fn human_name(self) -> &'static str {
        match self {
            Operation::Submit => "submit",
            Operation::RemoveSubmission => "remove submission",
            Operation::Approve => "approve",
            Operation::Unapprove => "unapprove",
            Operation::Activate => "activate",
            Operation::MarkOutdated => "mark outdated",
        }
    }

    /// Whether entering the target needs a fresh exclusivity check.
    ///
    /// Moving back into Draft or Submitted keeps the document inside the
    /// exclusive set it already occupied, and Outdated is exempt.
    pub fn rechecks_exclusivity(self) -> bool {
        matches!(self, Operation::Approve | Operation::Activate)
    }

    /// Case-insensitive lookup of the canonical name. Words may also be joined
    /// by one `-` or space, or not at all: `mark_outdated`, `Mark-Outdated`,
    /// `mark outdated` and `MarkOutdated` all resolve.
    pub fn parse(name: &str) -> Option<Operation> {
        let wanted = name.trim().to_lowercase();
        Operation::ALL.into_iter().find(|op| {
            let canonical = op.as_str().to_lowercase();
            wanted == canonical
                || ["-", " ", ""]
                    .into_iter()
                    .any(|sep| wanted == canonical.replace('_', sep))
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.human_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation '{0}'")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::parse(s).ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// Display helper for a set of states: `[Submitted, Draft]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSet(pub &'static [DocumentState]);

impl fmt::Display for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, state) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{state}")?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("document already in state {0}")]
    AlreadyInState(DocumentState),

    #[error("illegal transition from {from} to {to}; allowed targets from {from}: {allowed}")]
    IllegalTransition {
        from: DocumentState,
        to: DocumentState,
        allowed: StateSet,
    },

    #[error("cannot {operation}: document state is {current} but must be {required}")]
    OperationNotAllowed {
        operation: Operation,
        current: DocumentState,
        required: DocumentState,
    },
}

/// The single source of truth for which lifecycle moves are legal
#[derive(Debug, Clone, Copy, Default)]
pub struct StateGraph;

impl StateGraph {
    pub fn allowed_targets(from: DocumentState) -> &'static [DocumentState] {
        match from {
            DocumentState::Draft => &[DocumentState::Submitted],
            DocumentState::Submitted => &[DocumentState::Approved, DocumentState::Draft],
            DocumentState::Approved => &[DocumentState::Active, DocumentState::Submitted],
            DocumentState::Active => &[DocumentState::Outdated],
            DocumentState::Outdated => &[],
        }
    }

    pub fn can_transition(from: DocumentState, to: DocumentState) -> bool {
        from != to && Self::allowed_targets(from).contains(&to)
    }

    pub fn validate_transition(from: DocumentState, to: DocumentState) -> Result<(), TransitionError> {
        if from == to {
            return Err(TransitionError::AlreadyInState(from));
        }
        if !Self::can_transition(from, to) {
            return Err(TransitionError::IllegalTransition {
                from,
                to,
                allowed: StateSet(Self::allowed_targets(from)),
            });
        }
        Ok(())
    }

    pub fn can_execute(state: DocumentState, operation: Operation) -> bool {
        operation.required_source() == state
    }

    pub fn execute(state: DocumentState, operation: Operation) -> Result<DocumentState, TransitionError> {
        if !Self::can_execute(state, operation) {
            return Err(TransitionError::OperationNotAllowed {
                operation,
                current: state,
                required: operation.required_source(),
            });
        }
        Ok(operation.target())
    }

    pub fn available_operations(state: DocumentState) -> Vec<Operation> {
        Operation::ALL
            .into_iter()
            .filter(|op| op.required_source() == state)
            .collect()
    }

    pub fn is_terminal(state: DocumentState) -> bool {
        Self::allowed_targets(state).is_empty()
    }

    pub fn is_editable(state: DocumentState) -> bool {
        state == DocumentState::Draft
    }

    /// Active and Outdated only. Approved documents are not finalized.
    pub fn is_finalized(state: DocumentState) -> bool {
        matches!(state, DocumentState::Active | DocumentState::Outdated)
    }

    /// Whether a write moving a document from `stored` to `next` has to prove
    /// that no other document of its system holds an exclusive state.
    ///
    /// Entering the exclusive set always does. Moving within it only does for
    /// operations that recheck exclusivity (Approve, Activate); stepping back
    /// to Submitted or Draft, or rewriting a document in place, never does.
    pub fn claims_exclusive_slot(stored: Option<DocumentState>, next: DocumentState) -> bool {
        if !next.is_exclusive() {
            return false;
        }
        match stored {
            None => true,
            Some(prior) if !prior.is_exclusive() => true,
            Some(prior) => Operation::ALL.into_iter().any(|op| {
                op.required_source() == prior && op.target() == next && op.rechecks_exclusivity()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::sample::select;

    #[test]
    fn test_can_execute_matches_required_source_for_every_pair() {
        let mut checked = 0;
        for state in DocumentState::ALL {
            for op in Operation::ALL {
                assert_eq!(
                    StateGraph::can_execute(state, op),
                    op.required_source() == state,
                    "{state} / {op}"
                );
                checked += 1;
            }
        }
        assert_eq!(checked, 30);
    }

    #[test]
    fn test_operations_agree_with_transition_table() {
        for op in Operation::ALL {
            assert!(
                StateGraph::can_transition(op.required_source(), op.target()),
                "{op} is not backed by the transition table"
            );
        }
    }

    #[test]
    fn test_no_self_transition() {
        for state in DocumentState::ALL {
            assert!(!StateGraph::can_transition(state, state));
            assert_eq!(
                StateGraph::validate_transition(state, state),
                Err(TransitionError::AlreadyInState(state))
            );
        }
    }

    #[test]
    fn test_outdated_is_the_only_terminal_state() {
        assert!(StateGraph::available_operations(DocumentState::Outdated).is_empty());
        let terminal: Vec<_> = DocumentState::ALL
            .into_iter()
            .filter(|s| StateGraph::is_terminal(*s))
            .collect();
        assert_eq!(terminal, vec![DocumentState::Outdated]);
    }

    #[test]
    fn test_illegal_transition_message_lists_allowed_targets() {
        let err = StateGraph::validate_transition(DocumentState::Submitted, DocumentState::Active)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "illegal transition from Submitted to Active; allowed targets from Submitted: [Approved, Draft]"
        );
    }

    #[test]
    fn test_execute_rejection_message() {
        let err = StateGraph::execute(DocumentState::Draft, Operation::Approve).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot approve: document state is Draft but must be Submitted"
        );
    }

    #[test]
    fn test_available_operations() {
        assert_eq!(
            StateGraph::available_operations(DocumentState::Submitted),
            vec![Operation::RemoveSubmission, Operation::Approve]
        );
        assert_eq!(
            StateGraph::available_operations(DocumentState::Approved),
            vec![Operation::Unapprove, Operation::Activate]
        );
    }

    #[test]
    fn test_editable_and_finalized_predicates() {
        assert!(StateGraph::is_editable(DocumentState::Draft));
        assert!(!StateGraph::is_editable(DocumentState::Submitted));

        assert!(!StateGraph::is_finalized(DocumentState::Approved));
        assert!(StateGraph::is_finalized(DocumentState::Active));
        assert!(StateGraph::is_finalized(DocumentState::Outdated));
    }

    #[test]
    fn test_operation_parse_is_case_insensitive() {
        assert_eq!(Operation::parse("submit"), Some(Operation::Submit));
        assert_eq!(Operation::parse("SUBMIT"), Some(Operation::Submit));
        assert_eq!(Operation::parse("Mark_Outdated"), Some(Operation::MarkOutdated));
        assert_eq!(Operation::parse("removeSubmission"), Some(Operation::RemoveSubmission));
        assert_eq!(Operation::parse("FROB"), None);
        assert_eq!(Operation::parse("__"), None);
        assert_eq!(Operation::parse("mark outdated"), Some(Operation::MarkOutdated));
        assert_eq!(Operation::parse(" Remove-Submission "), Some(Operation::RemoveSubmission));
        assert!("frob".parse::<Operation>().is_err());
    }

    #[test]
    fn test_operation_parse_rejects_scattered_separators() {
        assert_eq!(Operation::parse("r e-m_ove submission"), None);
        assert_eq!(Operation::parse("sub_mit"), None);
        assert_eq!(Operation::parse("mark__outdated"), None);
        assert_eq!(Operation::parse("mark_outdated-"), None);
        assert_eq!(Operation::parse(""), None);
    }

    #[test]
    fn test_only_entering_or_approving_claims_the_exclusive_slot() {
        use DocumentState::*;

        assert!(StateGraph::claims_exclusive_slot(None, Draft));
        assert!(StateGraph::claims_exclusive_slot(Some(Outdated), Draft));
        assert!(StateGraph::claims_exclusive_slot(Some(Submitted), Approved));
        assert!(StateGraph::claims_exclusive_slot(Some(Approved), Active));

        assert!(!StateGraph::claims_exclusive_slot(Some(Draft), Submitted));
        assert!(!StateGraph::claims_exclusive_slot(Some(Submitted), Draft));
        assert!(!StateGraph::claims_exclusive_slot(Some(Approved), Submitted));
        assert!(!StateGraph::claims_exclusive_slot(Some(Draft), Draft));
        assert!(!StateGraph::claims_exclusive_slot(Some(Active), Outdated));
        assert!(!StateGraph::claims_exclusive_slot(None, Outdated));
    }

    #[test]
    fn test_slot_rule_agrees_with_operation_rechecks() {
        for op in Operation::ALL {
            assert_eq!(
                StateGraph::claims_exclusive_slot(Some(op.required_source()), op.target()),
                op.rechecks_exclusivity(),
                "{op}"
            );
        }
    }

    #[test]
    fn test_state_round_trips_through_storage_name() {
        for state in DocumentState::ALL {
            assert_eq!(state.as_str().parse::<DocumentState>(), Ok(state));
        }
        assert!("archived".parse::<DocumentState>().is_err());
    }

    proptest! {
        #[test]
        fn prop_execute_lands_on_allowed_target(
            state in select(DocumentState::ALL.to_vec()),
            op in select(Operation::ALL.to_vec()),
        ) {
            match StateGraph::execute(state, op) {
                Ok(next) => {
                    prop_assert!(StateGraph::validate_transition(state, next).is_ok());
                    prop_assert_eq!(next, op.target());
                }
                Err(TransitionError::OperationNotAllowed { current, required, .. }) => {
                    prop_assert_eq!(current, state);
                    prop_assert_ne!(required, state);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }

        #[test]
        fn prop_exclusive_set_is_everything_but_outdated(state in select(DocumentState::ALL.to_vec())) {
            prop_assert_eq!(state.is_exclusive(), DocumentState::EXCLUSIVE.contains(&state));
        }
    }
}
