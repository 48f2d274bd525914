use cf_core::{CfResult, CompiledMapping, ItemAnalysis, Match, NormalisedItem, RelationshipLink, Relationships};
use cf_llm::LlmGateway;
use cf_match::MatchConfig;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const DEFAULT_MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct SourceInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_concurrency: usize,
    pub enrich: bool,
    pub match_config: MatchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            enrich: true,
            match_config: MatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SourceReport {
    pub name: String,
    pub item_count: usize,
    pub parse_failures: usize,
    pub enrich_successes: usize,
    pub enrich_failures: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineOutcome {
    pub items_by_source: HashMap<String, Vec<NormalisedItem>>,
    pub matches: Vec<Match>,
    pub reports: Vec<SourceReport>,
    pub duration_ms: u64,
}

/// Run one source's items through C4 (mapping) and optionally C5+C6
/// (enrichment + scrubbing before the enrichment prompt), bounded by a
/// shared semaphore across sources — grounded on the teacher's
/// `Semaphore`+`JoinSet` concurrency pattern in `processor.rs`.
async fn process_source(
    input: SourceInput,
    gateway: Option<Arc<LlmGateway>>,
    enrich: bool,
    semaphore: Arc<Semaphore>,
) -> (Vec<NormalisedItem>, SourceReport) {
    let mut report = SourceReport {
        name: input.name.clone(),
        ..Default::default()
    };

    let parsed = match cf_json::read_json(&input.bytes, gateway.as_deref()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(source = %input.name, error = %e, "source failed to parse");
            report.parse_failures = 1;
            return (Vec::new(), report);
        }
    };

    let raw_items: Vec<serde_json::Value> = match parsed.value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    if raw_items.is_empty() {
        return (Vec::new(), report);
    }

    let field_sets = cf_mapper::sample_field_sets(&raw_items, cf_mapper::DEFAULT_SAMPLE_SIZE);
    let template = cf_mapper::detect_template(&field_sets);
    let raw_mapping = cf_mapper::resolve_mapping(template, &raw_items[0]);
    let mapping = match CompiledMapping::try_from(raw_mapping) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(source = %input.name, error = %e, "resolved mapping failed validation");
            report.parse_failures = raw_items.len();
            return (Vec::new(), report);
        }
    };

    let mut items = Vec::with_capacity(raw_items.len());
    for raw in &raw_items {
        match cf_mapper::apply_mapping(&mapping, &input.name, raw) {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::debug!(source = %input.name, error = %e, "item failed mapping");
                report.parse_failures += 1;
            }
        }
    }
    report.item_count = items.len();

    if enrich {
        if let Some(gateway) = gateway {
            let mut joins = JoinSet::new();
            for (idx, item) in items.iter().enumerate() {
                let sem = semaphore.clone();
                let gateway = gateway.clone();
                let text = item_enrichment_text(item);
                joins.spawn(async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore never closes");
                    (idx, enrich_item(&gateway, &text).await)
                });
            }
            let mut outcomes = Vec::with_capacity(items.len());
            while let Some(joined) = joins.join_next().await {
                if let Ok(pair) = joined {
                    outcomes.push(pair);
                }
            }
            for (idx, outcome) in outcomes {
                match outcome {
                    Some(analysis) => {
                        cf_mapper::set_analysis(&mut items[idx], analysis);
                        report.enrich_successes += 1;
                    }
                    None => report.enrich_failures += 1,
                }
            }
        }
    }

    (items, report)
}

fn item_enrichment_text(item: &NormalisedItem) -> String {
    let scrubbed = cf_scrub::scrub(&serde_json::json!(item.content)).value;
    format!("{}\n\n{}", item.title, scrubbed)
}

async fn enrich_item(gateway: &LlmGateway, text: &str) -> Option<ItemAnalysis> {
    let instruction = r#"Summarize this record as a JSON object with fields "summary" (one
sentence), "keywords" (array of up to 8 strings), "extracted_ids" (array of any id-like tokens
mentioned), "extracted_urls" (array of any URLs mentioned), "entities" (an object with
"people", "organizations", and "technical" arrays of named entities mentioned), and
"sentiment" (one of "positive", "neutral", "negative")."#;
    let value = gateway.generate_structured(instruction, text).await.ok()?;
    serde_json::from_value(value).ok()
}

/// Run the full unified pipeline: C3 (parse) -> C4 (map) -> C6+C5 (scrub,
/// enrich) per source, then C9 (match) across every pair of sources.
pub async fn run_pipeline(
    sources: Vec<SourceInput>,
    gateway: Option<Arc<LlmGateway>>,
    config: PipelineConfig,
) -> CfResult<PipelineOutcome> {
    let started = std::time::Instant::now();
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

    let mut joins = JoinSet::new();
    for source in sources {
        let gateway = gateway.clone();
        let semaphore = semaphore.clone();
        let enrich = config.enrich;
        joins.spawn(process_source(source, gateway, enrich, semaphore));
    }

    let mut items_by_source = HashMap::new();
    let mut reports = Vec::new();
    while let Some(joined) = joins.join_next().await {
        if let Ok((items, report)) = joined {
            items_by_source.insert(report.name.clone(), items);
            reports.push(report);
        }
    }

    let names: Vec<String> = items_by_source.keys().cloned().collect();
    let mut matches = Vec::new();
    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            let left_name = &names[i];
            let right_name = &names[j];
            let left = &items_by_source[left_name];
            let right = &items_by_source[right_name];
            matches.extend(cf_match::find_matches(left_name, left, right_name, right, &config.match_config));
        }
    }

    write_back_relationships(&mut items_by_source, &matches);

    Ok(PipelineOutcome {
        items_by_source,
        matches,
        reports,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

/// Write every accepted match back onto both endpoints' `relationships`
/// (spec §4.9: "writes back the relationships list on both endpoints") — the
/// left endpoint gains an outbound link, the right endpoint gains the
/// matching inbound link.
fn write_back_relationships(items_by_source: &mut HashMap<String, Vec<NormalisedItem>>, matches: &[Match]) {
    for m in matches {
        if let Some(item) = find_item_mut(items_by_source, &m.left.source, &m.left.id) {
            item.relationships.get_or_insert_with(Relationships::default).outbound.push(RelationshipLink {
                target_source: m.right.source.clone(),
                target_id: m.right.id.clone(),
                score: m.score,
                evidence: m.evidence.clone(),
            });
        }
        if let Some(item) = find_item_mut(items_by_source, &m.right.source, &m.right.id) {
            item.relationships.get_or_insert_with(Relationships::default).inbound.push(RelationshipLink {
                target_source: m.left.source.clone(),
                target_id: m.left.id.clone(),
                score: m.score,
                evidence: m.evidence.clone(),
            });
        }
    }
}

fn find_item_mut<'a>(
    items_by_source: &'a mut HashMap<String, Vec<NormalisedItem>>,
    source: &str,
    id: &str,
) -> Option<&'a mut NormalisedItem> {
    items_by_source.get_mut(source)?.iter_mut().find(|i| i.id == id)
}

/// Render the per-run `result/report.md` artefact (spec §4.10).
pub fn render_report(outcome: &PipelineOutcome) -> String {
    let mut md = String::from("# Pipeline Report\n\n");
    md.push_str(&format!("Duration: {} ms\n\n", outcome.duration_ms));
    md.push_str("| Source | Items | Parse failures | Enriched | Enrich failures |\n");
    md.push_str("|---|---|---|---|---|\n");
    for r in &outcome.reports {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            r.name, r.item_count, r.parse_failures, r.enrich_successes, r.enrich_failures
        ));
    }
    md.push_str(&format!("\nMatches found: {}\n", outcome.matches.len()));
    md
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, json: &str) -> SourceInput {
        SourceInput { name: name.to_string(), bytes: json.as_bytes().to_vec() }
    }

    #[tokio::test]
    async fn pipeline_maps_items_without_a_gateway() {
        let sources = vec![source(
            "tracker",
            r#"[{"id":"A-1","title":"Login bug","body":"cannot log in"}]"#,
        )];
        let outcome = run_pipeline(sources, None, PipelineConfig { enrich: false, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(outcome.reports[0].item_count, 1);
        assert!(outcome.matches.is_empty());
    }

    #[tokio::test]
    async fn pipeline_matches_items_across_two_sources() {
        let sources = vec![
            source("tracker", r#"[{"id":"A-1","title":"Login bug","body":"investigate login"}]"#),
            source("wiki", r#"[{"id":"W-1","title":"Runbook","body":"see A-1 for details"}]"#),
        ];
        let outcome = run_pipeline(sources, None, PipelineConfig { enrich: false, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(outcome.reports.len(), 2);
        assert!(!outcome.matches.is_empty());
    }

    #[tokio::test]
    async fn matches_are_written_back_onto_both_endpoints() {
        let sources = vec![
            source("tracker", r#"[{"id":"A-1","title":"Login bug","body":"investigate login"}]"#),
            source("wiki", r#"[{"id":"W-1","title":"Runbook","body":"see A-1 for details"}]"#),
        ];
        let outcome = run_pipeline(sources, None, PipelineConfig { enrich: false, ..Default::default() })
            .await
            .unwrap();
        assert!(!outcome.matches.is_empty());

        let tracker_item = &outcome.items_by_source["tracker"][0];
        let outbound = tracker_item.relationships.as_ref().expect("left endpoint should gain a relationship");
        assert!(outbound.outbound.iter().any(|l| l.target_source == "wiki" && l.target_id == "W-1"));

        let wiki_item = &outcome.items_by_source["wiki"][0];
        let inbound = wiki_item.relationships.as_ref().expect("right endpoint should gain a relationship");
        assert!(inbound.inbound.iter().any(|l| l.target_source == "tracker" && l.target_id == "A-1"));
    }

    #[tokio::test]
    async fn malformed_source_reports_parse_failure_without_aborting_others() {
        let sources = vec![
            source("broken", "not json {{{"),
            source("tracker", r#"[{"id":"A-1","title":"ok","body":"fine"}]"#),
        ];
        let outcome = run_pipeline(sources, None, PipelineConfig { enrich: false, ..Default::default() })
            .await
            .unwrap();
        let broken = outcome.reports.iter().find(|r| r.name == "broken").unwrap();
        assert_eq!(broken.parse_failures, 1);
        let tracker = outcome.reports.iter().find(|r| r.name == "tracker").unwrap();
        assert_eq!(tracker.item_count, 1);
    }

    #[test]
    fn report_renders_a_markdown_table() {
        let outcome = PipelineOutcome {
            items_by_source: HashMap::new(),
            matches: vec![],
            reports: vec![SourceReport { name: "a".into(), item_count: 3, ..Default::default() }],
            duration_ms: 42,
        };
        let md = render_report(&outcome);
        assert!(md.contains("| a | 3 | 0 | 0 | 0 |"));
    }
}
