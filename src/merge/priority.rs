//! Priority merge: the layer with the smallest priority value wins.

use crate::view::{LayerResult, ViewResult};

use super::{empty_group, MergeStrategy};

/// Default merge strategy.
///
/// Returns the result with the numerically smallest captured priority.
/// Ties keep the earliest result in group order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityMerge;

impl MergeStrategy for PriorityMerge {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn merge(&self, group: &[LayerResult]) -> ViewResult<LayerResult> {
        let (first, rest) = group.split_first().ok_or_else(|| empty_group(self))?;

        let mut best = first;
        for candidate in rest {
            // Strict comparison keeps the first of equal priorities
            if candidate.priority() < best.priority() {
                best = candidate;
            }
        }

        Ok(best.clone())
    }
}
