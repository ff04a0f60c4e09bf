//! Preconditions evaluated before an operation body runs.
//!
//! Conditions are evaluated in insertion order and the first failure
//! short-circuits the rest. A failing condition finishes the operation with
//! [`PipelineError::ConditionFailed`]; the body is never invoked.

use super::core::OperationDescriptor;
use crate::error::PipelineError;
use crate::installation::{DepersonalizationStatus, DepersonalizationStatusSource, RegistrationHealth};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionResult {
    Satisfied,
    Failed(PipelineError),
}

#[async_trait]
pub trait Condition: Send + Sync {
    /// Name used in diagnostics and in `ConditionFailed` errors
    fn name(&self) -> &str;

    /// Reserved for dependency scheduling; not consulted by the queue
    fn is_mutually_exclusive(&self) -> bool {
        false
    }

    /// Must be side-effect free
    async fn evaluate(&self, operation: &OperationDescriptor) -> ConditionResult;
}

/// Satisfied only while the installation has a healthy push registration
pub struct HealthyRegistrationCondition {
    registration: Arc<dyn RegistrationHealth>,
}

impl HealthyRegistrationCondition {
    pub const NAME: &'static str = "healthy_registration";

    pub fn new(registration: Arc<dyn RegistrationHealth>) -> Self {
        Self { registration }
    }
}

#[async_trait]
impl Condition for HealthyRegistrationCondition {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, _operation: &OperationDescriptor) -> ConditionResult {
        if self.registration.is_healthy() {
            ConditionResult::Satisfied
        } else {
            ConditionResult::Failed(PipelineError::condition_failed(
                Self::NAME,
                "registration is not healthy",
            ))
        }
    }
}

/// Fails while a depersonalization is waiting to be completed
pub struct NotPendingDepersonalizationCondition {
    status: Arc<dyn DepersonalizationStatusSource>,
}

impl NotPendingDepersonalizationCondition {
    pub const NAME: &'static str = "not_pending_depersonalization";

    pub fn new(status: Arc<dyn DepersonalizationStatusSource>) -> Self {
        Self { status }
    }
}

#[async_trait]
impl Condition for NotPendingDepersonalizationCondition {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, _operation: &OperationDescriptor) -> ConditionResult {
        match self.status.depersonalization_status() {
            DepersonalizationStatus::Pending => ConditionResult::Failed(
                PipelineError::condition_failed(Self::NAME, "depersonalization is pending"),
            ),
            _ => ConditionResult::Satisfied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installation::InstallationState;
    use crate::operation::OperationKind;
    use uuid::Uuid;

    fn descriptor() -> OperationDescriptor {
        OperationDescriptor {
            id: Uuid::new_v4(),
            kind: OperationKind::new("test"),
        }
    }

    #[tokio::test]
    async fn test_healthy_registration() {
        let installation = Arc::new(InstallationState::new());
        let condition = HealthyRegistrationCondition::new(installation.clone());

        match condition.evaluate(&descriptor()).await {
            ConditionResult::Failed(PipelineError::ConditionFailed { condition, .. }) => {
                assert_eq!(condition, HealthyRegistrationCondition::NAME)
            }
            other => panic!("expected condition failure, got {other:?}"),
        }

        installation.set_push_registration_id(Some("reg-1".to_string()));
        assert_eq!(
            condition.evaluate(&descriptor()).await,
            ConditionResult::Satisfied
        );
    }

    #[tokio::test]
    async fn test_pending_depersonalization() {
        let installation = Arc::new(InstallationState::new());
        let condition = NotPendingDepersonalizationCondition::new(installation.clone());
        assert_eq!(
            condition.evaluate(&descriptor()).await,
            ConditionResult::Satisfied
        );

        installation.set_depersonalization_status(DepersonalizationStatus::Pending);
        assert!(matches!(
            condition.evaluate(&descriptor()).await,
            ConditionResult::Failed(_)
        ));
        assert!(!condition.is_mutually_exclusive());
    }
}
