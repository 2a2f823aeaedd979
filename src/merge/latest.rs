//! Latest-modified merge.

use crate::view::{LayerResult, ViewResult};

use super::{empty_group, MergeStrategy};

/// Most recently modified version wins.
///
/// Rows carrying `updated_at` beat rows without one. Equal or missing
/// timestamps fall back to priority, then to group order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestModifiedMerge;

fn preferred(candidate: &LayerResult, best: &LayerResult) -> bool {
    match (candidate.feature().updated_at, best.feature().updated_at) {
        (Some(c), Some(b)) if c != b => c > b,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        _ => candidate.priority() < best.priority(),
    }
}

impl MergeStrategy for LatestModifiedMerge {
    fn name(&self) -> &'static str {
        "latest_modified"
    }

    fn merge(&self, group: &[LayerResult]) -> ViewResult<LayerResult> {
        let (first, rest) = group.split_first().ok_or_else(|| empty_group(self))?;

        let best = rest.iter().fold(first, |best, candidate| {
            if preferred(candidate, best) {
                candidate
            } else {
                best
            }
        });

        Ok(best.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::test_support::source_of;
    use crate::view::{FeatureRow, ViewError, ViewLayer};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn stamped(collection: &str, priority: i32, minute: Option<u32>) -> LayerResult {
        let mut row = FeatureRow::new("f1").with_property("source", serde_json::json!(collection));
        if let Some(m) = minute {
            row = row.with_updated_at(Utc.with_ymd_and_hms(2024, 5, 1, 12, m, 0).unwrap());
        }
        LayerResult::new(row, Arc::new(ViewLayer::new("test", collection, priority)))
    }

    #[test]
    fn test_newest_wins_over_priority() {
        let group = vec![stamped("base", 0, Some(1)), stamped("delta", 1, Some(30))];
        let merged = LatestModifiedMerge.merge(&group).unwrap();
        assert_eq!(source_of(&merged), "delta");
    }

    #[test]
    fn test_timestamped_beats_untimestamped() {
        let group = vec![stamped("base", 0, None), stamped("delta", 9, Some(0))];
        assert_eq!(source_of(&LatestModifiedMerge.merge(&group).unwrap()), "delta");
    }

    #[test]
    fn test_equal_timestamps_fall_back_to_priority_then_order() {
        let group = vec![
            stamped("b", 2, Some(5)),
            stamped("a", 1, Some(5)),
            stamped("c", 1, Some(5)),
        ];
        assert_eq!(source_of(&LatestModifiedMerge.merge(&group).unwrap()), "a");

        let untimed = vec![stamped("x", 4, None), stamped("y", 4, None)];
        assert_eq!(source_of(&LatestModifiedMerge.merge(&untimed).unwrap()), "x");
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(matches!(
            LatestModifiedMerge.merge(&[]),
            Err(ViewError::EmptyInput(_))
        ));
    }
}
