use cf_core::{FieldRule, RawMapping, StructureTemplate, Transform};

fn first_present<'a>(obj: &serde_json::Map<String, serde_json::Value>, candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|c| obj.contains_key(*c))
}

/// Resolve a concrete [`RawMapping`] for a detected template by inspecting
/// which of the template's candidate field names are actually present on a
/// representative sample item (spec §4.4's three built-in templates).
pub fn resolve_mapping(template: StructureTemplate, sample: &serde_json::Value) -> RawMapping {
    let obj = sample.as_object().cloned().unwrap_or_default();

    match template {
        StructureTemplate::IssueTracker => {
            let id_field = first_present(&obj, &["id", "key"]).unwrap_or("id").to_string();
            let title_field = first_present(&obj, &["summary", "title"]).unwrap_or("title").to_string();
            let mut fields = vec![FieldRule {
                source_field: title_field.clone(),
                dest_field: "title_clean".into(),
                transform: Some(Transform::CleanText),
                required: false,
            }];
            if obj.contains_key("status") {
                fields.push(FieldRule {
                    source_field: "status".into(),
                    dest_field: "status".into(),
                    transform: Some(Transform::Identity),
                    required: false,
                });
            }
            if obj.contains_key("assignee") {
                fields.push(FieldRule {
                    source_field: "assignee".into(),
                    dest_field: "assignee".into(),
                    transform: Some(Transform::Identity),
                    required: false,
                });
            }
            RawMapping { name: "issue_tracker".into(), id_field, title_field, fields }
        }
        StructureTemplate::WikiPage => {
            let id_field = first_present(&obj, &["id"]).unwrap_or("id").to_string();
            let title_field = "title".to_string();
            let body_field = first_present(&obj, &["body", "content"]).unwrap_or("body").to_string();
            RawMapping {
                name: "wiki_page".into(),
                id_field,
                title_field,
                fields: vec![FieldRule {
                    source_field: body_field,
                    dest_field: "body_clean".into(),
                    transform: Some(Transform::CleanText),
                    required: true,
                }],
            }
        }
        StructureTemplate::Generic => {
            let id_field = first_present(&obj, &["id", "key", "uuid"]).unwrap_or("id").to_string();
            let title_field = first_present(&obj, &["title", "name", "summary"]).unwrap_or("title").to_string();
            RawMapping {
                name: "generic".into(),
                id_field,
                title_field,
                fields: vec![],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::convert::TryFrom;

    #[test]
    fn issue_tracker_mapping_uses_key_when_id_absent() {
        let sample = json!({"key": "PROJ-1", "summary": "Bug", "status": "open"});
        let mapping = resolve_mapping(StructureTemplate::IssueTracker, &sample);
        assert_eq!(mapping.id_field, "key");
        assert_eq!(mapping.title_field, "summary");
        assert!(cf_core::CompiledMapping::try_from(mapping).is_ok());
    }

    #[test]
    fn generic_mapping_falls_back_to_defaults() {
        let sample = json!({"something": 1});
        let mapping = resolve_mapping(StructureTemplate::Generic, &sample);
        assert_eq!(mapping.id_field, "id");
        assert_eq!(mapping.title_field, "title");
    }
}
