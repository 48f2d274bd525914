pub mod reader;
pub mod repair;

pub use reader::ArrayItems;
pub use repair::RepairNote;

use cf_core::{CfError, CfResult, ErrorKind};
use cf_llm::LlmGateway;

const LLM_REPAIR_MAX_BYTES: usize = 64 * 1024;

/// Which of the three strategies (spec §4.3) ultimately produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseStrategy {
    Strict,
    Repair,
    LlmAssisted,
}

/// The result of reading one JSON document, including anything that needed fixing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParseOutcome {
    pub value: serde_json::Value,
    pub strategy_used: ParseStrategy,
    pub repairs: Vec<RepairNote>,
}

/// Parse whole-document bytes with the strict strategy: `StreamDeserializer`-style
/// item-by-item iteration when the root is an array, plain `from_slice` otherwise.
pub fn parse_strict(bytes: &[u8]) -> CfResult<serde_json::Value> {
    let trimmed_start = bytes.iter().position(|b| !(*b as char).is_whitespace());
    match trimmed_start.map(|i| bytes[i]) {
        Some(b'[') => {
            let items: CfResult<Vec<_>> = ArrayItems::new(bytes)?.collect();
            Ok(serde_json::Value::Array(items?))
        }
        _ => serde_json::from_slice(bytes).map_err(CfError::from),
    }
}

/// Read a JSON document using the full fallback ladder: strict parse, then
/// textual repair + re-parse, then (only for inputs under 64 KiB) a bounded
/// LLM-assisted repair turn. `llm` may be `None` to skip the last rung
/// entirely (e.g. when the gateway is disabled).
pub async fn read_json(bytes: &[u8], llm: Option<&LlmGateway>) -> CfResult<ParseOutcome> {
    if let Ok(value) = parse_strict(bytes) {
        return Ok(ParseOutcome {
            value,
            strategy_used: ParseStrategy::Strict,
            repairs: Vec::new(),
        });
    }

    let text = std::str::from_utf8(bytes).map_err(|e| {
        CfError::with_source(ErrorKind::MalformedBeyondRepair, "input is not valid UTF-8", e)
    })?;
    let (repaired, notes) = repair::apply_repairs(text);
    if let Ok(value) = parse_strict(repaired.as_bytes()) {
        tracing::info!(repairs = notes.len(), "recovered JSON via textual repair");
        return Ok(ParseOutcome {
            value,
            strategy_used: ParseStrategy::Repair,
            repairs: notes,
        });
    }

    let Some(gateway) = llm else {
        return Err(CfError::new(
            ErrorKind::MalformedBeyondRepair,
            "textual repair failed and no LLM gateway was provided",
        ));
    };
    if bytes.len() > LLM_REPAIR_MAX_BYTES {
        return Err(CfError::new(
            ErrorKind::MalformedBeyondRepair,
            format!(
                "input ({} bytes) exceeds the {} byte bound for LLM-assisted repair",
                bytes.len(),
                LLM_REPAIR_MAX_BYTES
            ),
        ));
    }
    let value = gateway
        .generate_structured(
            "Repair the following text into a single valid JSON value. \
             Preserve every field and value exactly; fix only syntax.",
            &repaired,
        )
        .await?;
    tracing::warn!("recovered JSON via LLM-assisted repair");
    Ok(ParseOutcome {
        value,
        strategy_used: ParseStrategy::LlmAssisted,
        repairs: notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn well_formed_object_parses_strict() {
        let outcome = read_json(br#"{"a":1}"#, None).await.unwrap();
        assert_eq!(outcome.strategy_used, ParseStrategy::Strict);
        assert!(outcome.repairs.is_empty());
    }

    #[tokio::test]
    async fn trailing_comma_is_recovered_via_repair() {
        let outcome = read_json(br#"{"a":1,"b":2,}"#, None).await.unwrap();
        assert_eq!(outcome.strategy_used, ParseStrategy::Repair);
        assert_eq!(outcome.repairs.len(), 1);
    }

    #[tokio::test]
    async fn unrecoverable_input_without_gateway_errors() {
        let err = read_json(b"not json at all {{{", None).await.unwrap_err();
        assert_eq!(err.kind(), cf_core::ErrorKind::MalformedBeyondRepair);
    }

    #[tokio::test]
    async fn strict_array_parses_via_stream_items() {
        let outcome = read_json(br#"[{"a":1},{"a":2}]"#, None).await.unwrap();
        assert_eq!(outcome.strategy_used, ParseStrategy::Strict);
        assert_eq!(outcome.value.as_array().unwrap().len(), 2);
    }
}
