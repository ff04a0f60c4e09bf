use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Operation lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Constructed but not yet admitted to a queue
    Created,
    /// Admitted to a queue, waiting for a slot or a retry timer
    Pending,
    /// Conditions satisfied, body running
    Executing,
    /// Body (or a failing condition) produced a result
    Finished,
    /// Abandoned before or during execution
    Cancelled,
}

impl OperationState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }

    /// Check if this operation still counts as outstanding in its queue
    pub fn is_outstanding(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `target` is a legal transition
    pub fn can_transition_to(&self, target: OperationState) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Pending)
                | (Self::Created, Self::Cancelled)
                | (Self::Pending, Self::Executing)
                | (Self::Pending, Self::Finished)
                | (Self::Pending, Self::Cancelled)
                | (Self::Executing, Self::Finished)
                | (Self::Executing, Self::Cancelled)
        )
    }
}

impl Default for OperationState {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Pending => write!(f, "pending"),
            Self::Executing => write!(f, "executing"),
            Self::Finished => write!(f, "finished"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Kind tag used for logging and exclusive admission.
///
/// Two operations are "the same kind" when their tags are equal. Generic
/// operations derive their tag from the concrete type parameterization, so
/// exclusivity is keyed on the parameterization and never on argument values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKind(Cow<'static, str>);

impl OperationKind {
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn owned(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Kind derived from a Rust type name
    pub fn of<T: ?Sized>() -> Self {
        Self::new(std::any::type_name::<T>())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final result delivered to an operation's handle
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome<T> {
    Succeeded(T),
    Failed(PipelineError),
    /// No result: the operation was cancelled or never admitted
    Cancelled,
}

impl<T> OperationOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Collapse into a `Result`, mapping cancellation to [`PipelineError::Cancelled`]
    pub fn into_result(self) -> Result<T, PipelineError> {
        match self {
            Self::Succeeded(value) => Ok(value),
            Self::Failed(err) => Err(err),
            Self::Cancelled => Err(PipelineError::Cancelled),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationOutcome<U> {
        match self {
            Self::Succeeded(value) => OperationOutcome::Succeeded(f(value)),
            Self::Failed(err) => OperationOutcome::Failed(err),
            Self::Cancelled => OperationOutcome::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_refuse_transitions() {
        for terminal in [OperationState::Finished, OperationState::Cancelled] {
            for target in [
                OperationState::Created,
                OperationState::Pending,
                OperationState::Executing,
                OperationState::Finished,
                OperationState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_condition_failure_path_is_legal() {
        assert!(OperationState::Pending.can_transition_to(OperationState::Finished));
        assert!(!OperationState::Created.can_transition_to(OperationState::Executing));
    }

    #[test]
    fn test_kind_of_generic_type_includes_parameter() {
        struct Wrapper<T>(T);
        let a = OperationKind::of::<Wrapper<u8>>();
        let b = OperationKind::of::<Wrapper<u16>>();
        assert_ne!(a, b);
        assert_eq!(a, OperationKind::of::<Wrapper<u8>>());
    }

    #[test]
    fn test_outcome_into_result() {
        let ok: OperationOutcome<u8> = OperationOutcome::Succeeded(1);
        assert_eq!(ok.into_result(), Ok(1));
        let cancelled: OperationOutcome<u8> = OperationOutcome::Cancelled;
        assert_eq!(cancelled.into_result(), Err(PipelineError::Cancelled));
    }
}
