use cf_llm::LlmGateway;
use serde::{Deserialize, Serialize};

/// A schema-constrained description of one embedded image (spec §4.8).
///
/// REDESIGN FLAG fix vs. the teacher's providers, which baked a failure
/// string into the description text (`format!("[Ollama error: {e}]")`):
/// on any gateway failure this returns [`ImageDescription::empty`] instead
/// of propagating or faking a description, so a caller can tell "no
/// description" apart from "the model described an error message".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescription {
    pub summary: String,
    #[serde(rename = "type")]
    pub image_type: String,
    pub entities: Vec<String>,
}

impl ImageDescription {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_empty() && self.image_type.is_empty() && self.entities.is_empty()
    }
}

const SCHEMA_INSTRUCTION: &str = r#"Describe the attached image as a JSON object with exactly
these fields: "summary" (one or two sentences), "type" (one of "photo", "diagram", "chart",
"table", "screenshot", "illustration", "other"), and "entities" (an array of notable named
things visible in the image, possibly empty)."#;

/// Describe one embedded image, given optional surrounding page text for context.
pub async fn describe_image(
    gateway: &LlmGateway,
    image_bytes: &[u8],
    mime: &str,
    surrounding_text: &str,
) -> ImageDescription {
    let prompt = if surrounding_text.trim().is_empty() {
        SCHEMA_INSTRUCTION.to_string()
    } else {
        format!("{SCHEMA_INSTRUCTION}\n\nSurrounding page text for context:\n{surrounding_text}")
    };

    match gateway.describe_image(&prompt, image_bytes, mime).await {
        Ok(text) => parse_description(&text).unwrap_or_else(|| {
            tracing::warn!("vision response was not schema-valid JSON, returning empty description");
            ImageDescription::empty()
        }),
        Err(e) => {
            tracing::warn!(error = %e, "vision gateway call failed, returning empty description");
            ImageDescription::empty()
        }
    }
}

fn parse_description(text: &str) -> Option<ImageDescription> {
    let trimmed = text.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```");
    serde_json::from_str(trimmed.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_llm::{GatewayConfig, GatewayMode};

    #[tokio::test]
    async fn disabled_gateway_yields_empty_description_not_an_error_string() {
        let gateway = LlmGateway::new(GatewayConfig::new("claude", "m").with_mode(GatewayMode::Disabled));
        let desc = describe_image(&gateway, b"not a real png", "image/png", "").await;
        assert!(desc.is_empty());
    }

    #[test]
    fn parses_fenced_json_response() {
        let text = "```json\n{\"summary\":\"a cat\",\"type\":\"photo\",\"entities\":[\"cat\"]}\n```";
        let parsed = parse_description(text).unwrap();
        assert_eq!(parsed.summary, "a cat");
        assert_eq!(parsed.entities, vec!["cat".to_string()]);
    }

    #[test]
    fn malformed_response_parses_to_none() {
        assert!(parse_description("not json").is_none());
    }
}
