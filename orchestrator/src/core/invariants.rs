//! Semantic plan invariants not expressible via JSON Schema.

use std::collections::BTreeMap;

use crate::core::types::{Action, Step};

/// Check plan invariants:
/// - At least one step
/// - No action appears twice (context entries are keyed by action, so a
///   repeated action would overwrite an earlier result)
///
/// Returns a list of stable error messages in step order.
pub fn validate_plan_invariants(steps: &[Step]) -> Vec<String> {
    let mut errors = Vec::new();
    if steps.is_empty() {
        errors.push("plan must contain at least one step".to_string());
        return errors;
    }

    let mut first_seen: BTreeMap<Action, usize> = BTreeMap::new();
    for (index, step) in steps.iter().enumerate() {
        let position = index + 1;
        if let Some(first) = first_seen.get(&step.action) {
            errors.push(format!(
                "duplicate action '{}' at steps {} and {}",
                step.action, first, position
            ));
            continue;
        }
        first_seen.insert(step.action, position);
    }

    errors
}
