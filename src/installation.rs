//! Installation collaborators consulted by conditions and the message handler.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Health of the installation's push registration
pub trait RegistrationHealth: Send + Sync {
    fn is_healthy(&self) -> bool;

    fn push_registration_id(&self) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepersonalizationStatus {
    #[default]
    Undefined,
    Pending,
    Success,
}

pub trait DepersonalizationStatusSource: Send + Sync {
    fn depersonalization_status(&self) -> DepersonalizationStatus;
}

/// In-memory installation state, updated by the host application
#[derive(Debug)]
pub struct InstallationState {
    push_registration_id: RwLock<Option<String>>,
    registration_enabled: RwLock<bool>,
    depersonalization_status: RwLock<DepersonalizationStatus>,
}

impl InstallationState {
    pub fn new() -> Self {
        Self {
            push_registration_id: RwLock::new(None),
            registration_enabled: RwLock::new(true),
            depersonalization_status: RwLock::new(DepersonalizationStatus::Undefined),
        }
    }

    /// Installation with a registered, healthy push registration
    pub fn registered(push_registration_id: impl Into<String>) -> Self {
        let state = Self::new();
        state.set_push_registration_id(Some(push_registration_id.into()));
        state
    }

    pub fn set_push_registration_id(&self, id: Option<String>) {
        *self.push_registration_id.write() = id;
    }

    pub fn set_registration_enabled(&self, enabled: bool) {
        *self.registration_enabled.write() = enabled;
    }

    pub fn set_depersonalization_status(&self, status: DepersonalizationStatus) {
        *self.depersonalization_status.write() = status;
    }
}

impl Default for InstallationState {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationHealth for InstallationState {
    fn is_healthy(&self) -> bool {
        *self.registration_enabled.read() && self.push_registration_id.read().is_some()
    }

    fn push_registration_id(&self) -> Option<String> {
        self.push_registration_id.read().clone()
    }
}

impl DepersonalizationStatusSource for InstallationState {
    fn depersonalization_status(&self) -> DepersonalizationStatus {
        *self.depersonalization_status.read()
    }
}
