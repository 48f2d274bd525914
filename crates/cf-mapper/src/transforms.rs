use cf_core::{CfError, ErrorKind, Transform};
use serde_json::Value;

/// Run one [`Transform`] over a source field's raw JSON value, producing the
/// destination field's JSON value. Transforms never panic on unexpected input
/// shapes — a non-string source for a text transform coerces via `to_string`.
pub fn apply(transform: &Transform, value: &Value) -> Result<Value, CfError> {
    match transform {
        Transform::Identity => Ok(value.clone()),
        Transform::CleanText => Ok(Value::String(clean_text(&as_text(value)))),
        Transform::ExtractKeywords { max } => {
            Ok(Value::Array(extract_keywords(&as_text(value), *max).into_iter().map(Value::String).collect()))
        }
        Transform::ExtractIds { pattern } => {
            let re = regex::Regex::new(pattern).map_err(|e| {
                CfError::with_source(ErrorKind::TransformFailed, "invalid extract_ids pattern", e)
            })?;
            let ids: Vec<Value> = re.find_iter(&as_text(value)).map(|m| Value::String(m.as_str().to_string())).collect();
            Ok(Value::Array(ids))
        }
        Transform::ExtractUrls => {
            Ok(Value::Array(extract_urls(&as_text(value)).into_iter().map(Value::String).collect()))
        }
        Transform::ToIsoDate { source_format } => {
            let text = as_text(value);
            let parsed = chrono::NaiveDateTime::parse_from_str(&text, source_format)
                .map(|dt| dt.and_utc())
                .or_else(|_| {
                    chrono::NaiveDate::parse_from_str(&text, source_format)
                        .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc())
                })
                .map_err(|e| {
                    CfError::with_source(
                        ErrorKind::TransformFailed,
                        format!("'{text}' does not match format '{source_format}'"),
                        e,
                    )
                })?;
            Ok(Value::String(parsed.to_rfc3339()))
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "to", "of", "in", "on",
        "for", "with", "this", "that", "it", "as", "be", "by", "at",
    ];
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let lower = word.to_lowercase();
        if lower.len() < 3 || STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        if seen.insert(lower.clone()) {
            out.push(lower);
            if out.len() >= max {
                break;
            }
        }
    }
    out
}

fn extract_urls(text: &str) -> Vec<String> {
    static URL_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = URL_RE.get_or_init(|| regex::Regex::new(r"https?://[^\s<>\)\]]+").unwrap());
    re.find_iter(text).map(|m| m.as_str().trim_end_matches(['.', ',']).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_text_collapses_whitespace() {
        let out = apply(&Transform::CleanText, &json!("  hello   world  \n")).unwrap();
        assert_eq!(out, json!("hello world"));
    }

    #[test]
    fn extract_keywords_dedupes_and_caps() {
        let out = apply(&Transform::ExtractKeywords { max: 2 }, &json!("the cat sat on the cat mat")).unwrap();
        assert_eq!(out, json!(["cat", "sat"]));
    }

    #[test]
    fn extract_ids_applies_pattern() {
        let out = apply(&Transform::ExtractIds { pattern: r"PROJ-\d+".into() }, &json!("see PROJ-42 and PROJ-7")).unwrap();
        assert_eq!(out, json!(["PROJ-42", "PROJ-7"]));
    }

    #[test]
    fn extract_urls_finds_links() {
        let out = apply(&Transform::ExtractUrls, &json!("visit https://example.com/a, then https://x.io.")).unwrap();
        assert_eq!(out, json!(["https://example.com/a", "https://x.io"]));
    }

    #[test]
    fn to_iso_date_parses_known_format() {
        let out = apply(&Transform::ToIsoDate { source_format: "%Y-%m-%d".into() }, &json!("2026-01-15")).unwrap();
        assert_eq!(out, json!("2026-01-15T00:00:00+00:00"));
    }

    #[test]
    fn to_iso_date_errors_on_mismatched_format() {
        let result = apply(&Transform::ToIsoDate { source_format: "%Y-%m-%d".into() }, &json!("not a date"));
        assert!(result.is_err());
    }
}
