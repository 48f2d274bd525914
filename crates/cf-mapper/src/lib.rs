pub mod apply;
pub mod builtin;
pub mod templates;
pub mod transforms;

pub use apply::{apply_mapping, set_analysis};
pub use builtin::resolve_mapping;
pub use templates::detect_template;

use std::collections::HashSet;

/// Sample up to `sample_size` items and collect each one's top-level field
/// set, for fingerprint scoring (spec §4.4: "first 64 items, configurable").
pub fn sample_field_sets(items: &[serde_json::Value], sample_size: usize) -> Vec<HashSet<&str>> {
    items
        .iter()
        .take(sample_size)
        .filter_map(|item| item.as_object())
        .map(|obj| obj.keys().map(String::as_str).collect())
        .collect()
}

pub const DEFAULT_SAMPLE_SIZE: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sample_field_sets_respects_sample_size() {
        let items: Vec<_> = (0..100).map(|i| json!({"id": i})).collect();
        let sets = sample_field_sets(&items, 10);
        assert_eq!(sets.len(), 10);
    }

    #[test]
    fn detects_issue_tracker_from_sampled_items() {
        let items: Vec<_> = (0..5)
            .map(|i| json!({"id": i, "title": "t", "status": "open", "assignee": "a"}))
            .collect();
        let sets = sample_field_sets(&items, DEFAULT_SAMPLE_SIZE);
        assert_eq!(detect_template(&sets), cf_core::StructureTemplate::IssueTracker);
    }
}
