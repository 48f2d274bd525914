use crate::transforms;
use cf_core::{CfError, CfResult, CompiledMapping, ErrorKind, ItemAnalysis, NormalisedItem};
use std::collections::HashMap;

/// Apply a [`CompiledMapping`] to one raw JSON item, producing exactly one
/// [`NormalisedItem`] or a typed error — never a partially-populated item
/// (spec §4.4).
pub fn apply_mapping(mapping: &CompiledMapping, source: &str, raw: &serde_json::Value) -> CfResult<NormalisedItem> {
    let obj = raw.as_object().ok_or_else(|| {
        CfError::new(ErrorKind::MissingRequiredField, "mapping input item is not a JSON object")
    })?;

    let id = obj
        .get(&mapping.raw.id_field)
        .and_then(|v| v.as_str().map(str::to_string).or_else(|| Some(v.to_string())))
        .ok_or_else(|| {
            CfError::new(
                ErrorKind::MissingRequiredField,
                format!("item is missing id field '{}'", mapping.raw.id_field),
            )
        })?;

    let title = obj
        .get(&mapping.raw.title_field)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let mut content = HashMap::new();
    for rule in &mapping.raw.fields {
        let Some(raw_value) = obj.get(&rule.source_field) else {
            if rule.required {
                return Err(CfError::new(
                    ErrorKind::MissingRequiredField,
                    format!("item is missing required field '{}'", rule.source_field),
                ));
            }
            continue;
        };

        let value = match &rule.transform {
            Some(transform) => transforms::apply(transform, raw_value)?,
            None => raw_value.clone(),
        };
        content.insert(rule.dest_field.clone(), value);
    }

    Ok(NormalisedItem {
        id,
        source: source.to_string(),
        title,
        content,
        metadata: HashMap::new(),
        analysis: None,
        relationships: None,
    })
}

/// Attach enrichment produced by the LLM gateway, overwriting any prior
/// analysis wholesale so re-running enrichment stays idempotent.
pub fn set_analysis(item: &mut NormalisedItem, analysis: ItemAnalysis) {
    item.analysis = Some(analysis);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::{FieldRule, RawMapping, Transform};
    use serde_json::json;
    use std::convert::TryFrom;

    fn mapping() -> CompiledMapping {
        let raw = RawMapping {
            name: "issues".into(),
            id_field: "id".into(),
            title_field: "title".into(),
            fields: vec![FieldRule {
                source_field: "body".into(),
                dest_field: "clean_body".into(),
                transform: Some(Transform::CleanText),
                required: true,
            }],
        };
        CompiledMapping::try_from(raw).unwrap()
    }

    #[test]
    fn applies_mapping_successfully() {
        let item = json!({"id": "PROJ-1", "title": "Bug", "body": "  broken   thing  "});
        let normalised = apply_mapping(&mapping(), "tracker", &item).unwrap();
        assert_eq!(normalised.id, "PROJ-1");
        assert_eq!(normalised.title, "Bug");
        assert_eq!(normalised.content["clean_body"], json!("broken thing"));
        assert!(!normalised.has_analysis());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let item = json!({"id": "PROJ-1", "title": "Bug"});
        let err = apply_mapping(&mapping(), "tracker", &item).unwrap_err();
        assert_eq!(err.kind(), cf_core::ErrorKind::MissingRequiredField);
    }

    #[test]
    fn missing_id_field_is_an_error() {
        let item = json!({"title": "Bug", "body": "x"});
        let err = apply_mapping(&mapping(), "tracker", &item).unwrap_err();
        assert_eq!(err.kind(), cf_core::ErrorKind::MissingRequiredField);
    }
}
