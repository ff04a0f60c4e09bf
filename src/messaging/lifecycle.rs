//! # Service Lifecycle
//!
//! `Stopped → Starting → Running → Suspending → Stopped`. Only a `Running`
//! service admits new operations. Transitions are driven by [`ServiceEvent`]s;
//! the host reports app and installation changes as [`LifecycleEvent`]s.

use crate::error::{PipelineError, Result};
use crate::installation::DepersonalizationStatus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Suspending,
}

impl ServiceState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Suspending => write!(f, "suspending"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEvent {
    Start,
    Started,
    Suspend,
    Suspended,
}

/// Notifications from the host application and installation
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    AppWillEnterForeground,
    AppDidEnterBackground,
    RegistrationHealthChanged { healthy: bool },
    DepersonalizationStatusChanged(DepersonalizationStatus),
    BaseUrlChanged { base_url: String },
}

#[derive(Debug)]
pub struct ServiceStateMachine {
    state: Mutex<ServiceState>,
}

impl ServiceStateMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::Stopped),
        }
    }

    pub fn current_state(&self) -> ServiceState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.current_state().is_running()
    }

    /// Apply `event`, returning the new state
    pub fn transition(&self, event: ServiceEvent) -> Result<ServiceState> {
        let mut state = self.state.lock();
        let target = Self::determine_target_state(*state, event)?;
        debug!(from = %*state, to = %target, event = ?event, "Service state transition");
        *state = target;
        Ok(target)
    }

    fn determine_target_state(current: ServiceState, event: ServiceEvent) -> Result<ServiceState> {
        let target = match (current, event) {
            (ServiceState::Stopped, ServiceEvent::Start) => ServiceState::Starting,
            (ServiceState::Starting, ServiceEvent::Started) => ServiceState::Running,

            (ServiceState::Running, ServiceEvent::Suspend) => ServiceState::Suspending,
            (ServiceState::Starting, ServiceEvent::Suspend) => ServiceState::Suspending,
            (ServiceState::Suspending, ServiceEvent::Suspended) => ServiceState::Stopped,

            (from, _) => {
                return Err(PipelineError::InvalidTransition {
                    from: from.to_string(),
                    event: format!("{event:?}"),
                })
            }
        };
        Ok(target)
    }
}

impl Default for ServiceStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let machine = ServiceStateMachine::new();
        assert_eq!(machine.transition(ServiceEvent::Start).unwrap(), ServiceState::Starting);
        assert!(!machine.is_running());
        assert_eq!(machine.transition(ServiceEvent::Started).unwrap(), ServiceState::Running);
        assert!(machine.is_running());
        assert_eq!(
            machine.transition(ServiceEvent::Suspend).unwrap(),
            ServiceState::Suspending
        );
        assert_eq!(
            machine.transition(ServiceEvent::Suspended).unwrap(),
            ServiceState::Stopped
        );
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let machine = ServiceStateMachine::new();
        let err = machine.transition(ServiceEvent::Suspend).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        assert_eq!(machine.current_state(), ServiceState::Stopped);
    }
}
