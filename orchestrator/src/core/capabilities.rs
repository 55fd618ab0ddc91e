//! Capability registry: which actions may be dispatched.
//!
//! Built once from configuration and shared read-only with the planner and
//! the capability gate. Mutation is an administrative operation performed
//! before a run (CLI `capabilities`), never by the pipeline itself.

use std::collections::BTreeMap;

use crate::core::types::Action;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityRegistry {
    flags: BTreeMap<Action, bool>,
}

impl CapabilityRegistry {
    /// Registry with every action enabled.
    pub fn all_enabled() -> Self {
        Self::from_flags(Action::ALL.into_iter().map(|action| (action, true)))
    }

    pub fn from_flags(flags: impl IntoIterator<Item = (Action, bool)>) -> Self {
        Self {
            flags: flags.into_iter().collect(),
        }
    }

    /// Absent entries count as disabled.
    pub fn is_enabled(&self, action: Action) -> bool {
        self.flags.get(&action).copied().unwrap_or(false)
    }

    pub fn enable(&mut self, action: Action) {
        self.flags.insert(action, true);
    }

    pub fn disable(&mut self, action: Action) {
        self.flags.insert(action, false);
    }

    /// Enabled actions in vocabulary order.
    pub fn list_enabled(&self) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|action| self.is_enabled(*action))
            .collect()
    }
}
