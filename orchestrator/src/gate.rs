//! Per-step capability check.

use std::sync::Arc;

use tracing::warn;

use crate::core::capabilities::CapabilityRegistry;
use crate::core::types::Action;
use crate::error::CapabilityDenied;

#[derive(Debug, Clone)]
pub struct CapabilityGate {
    registry: Arc<CapabilityRegistry>,
}

impl CapabilityGate {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// Called immediately before a step is dispatched.
    pub fn check(&self, action: Action) -> Result<(), CapabilityDenied> {
        if self.registry.is_enabled(action) {
            return Ok(());
        }
        warn!(%action, "capability denied");
        Err(CapabilityDenied { action })
    }
}
