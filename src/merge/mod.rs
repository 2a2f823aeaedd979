//! # Merge Strategies
//!
//! A merge strategy resolves the versions of one feature returned by
//! several layers into the single version the view exposes.
//!
//! Strategies are stateless. They receive a borrowed group, never mutate it
//! and never perform I/O, so the orchestrator can call them once per group
//! without synchronization. Which strategy a view uses is decided when the
//! view is configured (see [`MergePolicy`]).

mod latest;
mod priority;

pub use latest::LatestModifiedMerge;
pub use priority::PriorityMerge;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::view::{FeatureGroups, LayerResult, MergedFeatures, ViewError, ViewResult};

/// Resolves one feature group into one result
pub trait MergeStrategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Pick the winning result of a non-empty group.
    ///
    /// Fails with `EmptyInput` when the group is empty.
    fn merge(&self, group: &[LayerResult]) -> ViewResult<LayerResult>;

    /// Merge a group that may be absent.
    ///
    /// Fails with `NullInput` when no group is supplied.
    fn merge_optional(&self, group: Option<&[LayerResult]>) -> ViewResult<LayerResult> {
        match group {
            Some(group) => self.merge(group),
            None => Err(ViewError::null_input(format!(
                "{} merge invoked without a group",
                self.name()
            ))),
        }
    }
}

/// Merge policy selected in view configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Lowest priority value wins
    #[default]
    Priority,
    /// Most recently modified version wins
    LatestModified,
}

impl MergePolicy {
    /// Instantiate the strategy for this policy
    pub fn strategy(&self) -> Arc<dyn MergeStrategy> {
        match self {
            Self::Priority => Arc::new(PriorityMerge),
            Self::LatestModified => Arc::new(LatestModifiedMerge),
        }
    }
}

/// Merge every group once, keyed by feature id
pub fn merge_groups(
    strategy: &dyn MergeStrategy,
    groups: &FeatureGroups,
) -> ViewResult<MergedFeatures> {
    groups
        .iter()
        .map(|(id, group)| strategy.merge(group).map(|winner| (id.clone(), winner)))
        .collect()
}

fn empty_group(strategy: &dyn MergeStrategy) -> ViewError {
    ViewError::empty_input(format!("{} merge invoked on an empty group", strategy.name()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_selects_strategy() {
        assert_eq!(MergePolicy::Priority.strategy().name(), "priority");
        assert_eq!(MergePolicy::LatestModified.strategy().name(), "latest_modified");
        assert_eq!(MergePolicy::default(), MergePolicy::Priority);
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: MergePolicy = serde_json::from_str("\"latest_modified\"").unwrap();
        assert_eq!(policy, MergePolicy::LatestModified);
    }

    #[test]
    fn test_merge_groups_one_winner_per_feature() {
        use super::test_support::{result, source_of};

        let mut groups = FeatureGroups::new();
        groups.insert("f1".to_string(), vec![result("f1", "b", 1), result("f1", "a", 0)]);
        groups.insert("f2".to_string(), vec![result("f2", "b", 1)]);

        let merged = merge_groups(&PriorityMerge, &groups).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(source_of(&merged["f1"]), "a");
        assert_eq!(source_of(&merged["f2"]), "b");
    }

    #[test]
    fn test_merge_groups_propagates_empty_group() {
        let mut groups = FeatureGroups::new();
        groups.insert("f1".to_string(), Vec::new());
        assert!(matches!(
            merge_groups(&PriorityMerge, &groups),
            Err(ViewError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_merge_optional_none_is_null_input() {
        for policy in [MergePolicy::Priority, MergePolicy::LatestModified] {
            let err = policy.strategy().merge_optional(None).unwrap_err();
            assert!(matches!(err, ViewError::NullInput(_)));
        }
    }
}
