use aho_corasick::AhoCorasick;
use cf_core::{Match, MatchEndpoint, NormalisedItem};
use std::collections::{HashMap, HashSet};

/// Weighted components of the C9 match score (spec §4.9): verbatim id-mention,
/// cross-referenced URLs/ids, title token-set similarity, and co-occurring
/// named entities pulled out by enrichment (C5).
#[derive(Debug, Clone, Copy)]
pub struct MatchWeights {
    pub id_mention: f64,
    pub url_cross_reference: f64,
    pub title_similarity: f64,
    pub entity_overlap: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            id_mention: 0.6,
            url_cross_reference: 0.2,
            title_similarity: 0.15,
            entity_overlap: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub weights: MatchWeights,
    pub min_score: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            weights: MatchWeights::default(),
            min_score: 0.5,
        }
    }
}

fn item_text(item: &NormalisedItem) -> String {
    let mut text = item.title.clone();
    for v in item.content.values() {
        match v {
            serde_json::Value::String(s) => {
                text.push(' ');
                text.push_str(s);
            }
            serde_json::Value::Array(arr) => {
                for entry in arr {
                    if let Some(s) = entry.as_str() {
                        text.push(' ');
                        text.push_str(s);
                    }
                }
            }
            _ => {}
        }
    }
    text
}

fn title_tokens(title: &str) -> HashSet<String> {
    title.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// An item's cross-referenceable tokens: every URL and id-like token C5
/// extracted during enrichment. Empty if the item was never enriched.
fn reference_tokens(item: &NormalisedItem) -> HashSet<String> {
    match &item.analysis {
        Some(analysis) => analysis
            .extracted_urls
            .iter()
            .chain(analysis.extracted_ids.iter())
            .cloned()
            .collect(),
        None => HashSet::new(),
    }
}

/// An item's co-occurring named entities across all three kinds C5 extracts,
/// lowercased so "Acme Corp" and "acme corp" count as the same entity.
fn entity_tokens(item: &NormalisedItem) -> HashSet<String> {
    match &item.analysis {
        Some(analysis) => analysis
            .entities
            .people
            .iter()
            .chain(analysis.entities.organizations.iter())
            .chain(analysis.entities.technical.iter())
            .map(|e| e.to_lowercase())
            .collect(),
        None => HashSet::new(),
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Build candidate (left_idx, right_idx) pairs: items whose id appears
/// verbatim in the other side's content, found via one multi-pattern scan
/// per direction instead of a quadratic substring search per pair.
fn id_mention_candidates(
    left: &[NormalisedItem],
    right: &[NormalisedItem],
) -> HashSet<(usize, usize)> {
    let mut candidates = HashSet::new();

    let left_ids: Vec<&str> = left.iter().map(|i| i.id.as_str()).collect();
    if let Ok(ac) = AhoCorasick::new(&left_ids) {
        for (right_idx, item) in right.iter().enumerate() {
            let text = item_text(item);
            for m in ac.find_iter(&text) {
                candidates.insert((m.pattern().as_usize(), right_idx));
            }
        }
    }

    let right_ids: Vec<&str> = right.iter().map(|i| i.id.as_str()).collect();
    if let Ok(ac) = AhoCorasick::new(&right_ids) {
        for (left_idx, item) in left.iter().enumerate() {
            let text = item_text(item);
            for m in ac.find_iter(&text) {
                candidates.insert((left_idx, m.pattern().as_usize()));
            }
        }
    }

    candidates
}

/// Bucket items by title token, then union every pair of items sharing a
/// bucket as additional candidates (keeps the comparison space near the
/// O(|A|+|B|) inverted-index cost instead of O(|A|*|B|)).
fn title_candidates(left: &[NormalisedItem], right: &[NormalisedItem]) -> HashSet<(usize, usize)> {
    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, item) in right.iter().enumerate() {
        for token in title_tokens(&item.title) {
            buckets.entry(token).or_default().push(idx);
        }
    }

    let mut candidates = HashSet::new();
    for (left_idx, item) in left.iter().enumerate() {
        for token in title_tokens(&item.title) {
            if let Some(right_idxs) = buckets.get(&token) {
                for &right_idx in right_idxs {
                    candidates.insert((left_idx, right_idx));
                }
            }
        }
    }
    candidates
}

/// Bucket items by extracted URL/id reference, so two items that cross-link
/// the same URL become a candidate pair even without a title or id overlap.
fn reference_candidates(left: &[NormalisedItem], right: &[NormalisedItem]) -> HashSet<(usize, usize)> {
    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, item) in right.iter().enumerate() {
        for token in reference_tokens(item) {
            buckets.entry(token).or_default().push(idx);
        }
    }

    let mut candidates = HashSet::new();
    for (left_idx, item) in left.iter().enumerate() {
        for token in reference_tokens(item) {
            if let Some(right_idxs) = buckets.get(&token) {
                for &right_idx in right_idxs {
                    candidates.insert((left_idx, right_idx));
                }
            }
        }
    }
    candidates
}

/// Score and filter candidate cross-source matches (spec §4.9).
///
/// Returns an empty `Vec` immediately if either side is empty — matching
/// against nothing is a no-op, not an error.
pub fn find_matches(
    left_source: &str,
    left: &[NormalisedItem],
    right_source: &str,
    right: &[NormalisedItem],
    config: &MatchConfig,
) -> Vec<Match> {
    if left.is_empty() || right.is_empty() {
        return Vec::new();
    }

    let id_mention_pairs = id_mention_candidates(left, right);

    let mut candidates = id_mention_pairs.clone();
    candidates.extend(title_candidates(left, right));
    candidates.extend(reference_candidates(left, right));

    let mut matches = Vec::new();
    for (left_idx, right_idx) in candidates {
        let l = &left[left_idx];
        let r = &right[right_idx];

        let id_component = if id_mention_pairs.contains(&(left_idx, right_idx)) { 1.0 } else { 0.0 };
        let url_component = jaccard(&reference_tokens(l), &reference_tokens(r));
        let title_component = jaccard(&title_tokens(&l.title), &title_tokens(&r.title));
        let entity_component = jaccard(&entity_tokens(l), &entity_tokens(r));

        let score = config.weights.id_mention * id_component
            + config.weights.url_cross_reference * url_component
            + config.weights.title_similarity * title_component
            + config.weights.entity_overlap * entity_component;

        if score < config.min_score {
            continue;
        }

        let mut evidence = Vec::new();
        if id_component > 0.0 {
            evidence.push(format!("id '{}' mentioned verbatim", l.id));
        }
        if url_component > 0.0 {
            evidence.push(format!("url/id cross-reference overlap {url_component:.2}"));
        }
        if title_component > 0.0 {
            evidence.push(format!("title token overlap {title_component:.2}"));
        }
        if entity_component > 0.0 {
            evidence.push(format!("co-occurring entities overlap {entity_component:.2}"));
        }

        matches.push(Match {
            left: MatchEndpoint { source: left_source.to_string(), id: l.id.clone() },
            right: MatchEndpoint { source: right_source.to_string(), id: r.id.clone() },
            score,
            evidence,
        });
    }

    // Deterministic order: highest score first, ties broken by (left id, right id).
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.left.id.cmp(&b.left.id))
            .then_with(|| a.right.id.cmp(&b.right.id))
    });
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn item(id: &str, title: &str) -> NormalisedItem {
        NormalisedItem {
            id: id.to_string(),
            source: "test".into(),
            title: title.to_string(),
            content: HashMap::new(),
            metadata: HashMap::new(),
            analysis: None,
            relationships: None,
        }
    }

    #[test]
    fn empty_side_produces_no_matches() {
        let left = vec![item("A-1", "Login bug")];
        assert!(find_matches("a", &left, "b", &[], &MatchConfig::default()).is_empty());
        assert!(find_matches("a", &[], "b", &left, &MatchConfig::default()).is_empty());
    }

    #[test]
    fn id_mentioned_in_content_scores_above_threshold() {
        let mut right_item = item("WIKI-9", "Notes");
        right_item.content.insert("body".into(), serde_json::json!("fixed in A-1 yesterday"));
        let left = vec![item("A-1", "Login bug")];
        let matches = find_matches("tracker", &left, "wiki", &[right_item], &MatchConfig::default());
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score >= 0.6);
    }

    #[test]
    fn unrelated_items_produce_no_match() {
        let left = vec![item("A-1", "Totally unrelated subject matter")];
        let right = vec![item("B-1", "Something else entirely different")];
        let matches = find_matches("a", &left, "b", &right, &MatchConfig::default());
        assert!(matches.is_empty());
    }

    #[test]
    fn matches_are_sorted_by_descending_score() {
        let mut strong = item("X-1", "Authentication login flow bug");
        strong.content.insert("body".into(), serde_json::json!("see A-1"));
        let left = vec![item("A-1", "Authentication login flow bug")];
        let right = vec![strong, item("X-2", "unrelated")];
        let matches = find_matches("a", &left, "b", &right, &MatchConfig::default());
        assert!(matches.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn shared_extracted_url_contributes_the_cross_reference_component() {
        use cf_core::ItemAnalysis;

        let mut left_item = item("A-1", "Runbook");
        left_item.analysis = Some(ItemAnalysis {
            summary: String::new(),
            keywords: vec![],
            extracted_ids: vec![],
            extracted_urls: vec!["https://wiki.example/page/42".into()],
            entities: Default::default(),
            sentiment: Default::default(),
        });
        let mut right_item = item("W-1", "Incident notes");
        right_item.analysis = Some(ItemAnalysis {
            summary: String::new(),
            keywords: vec![],
            extracted_ids: vec![],
            extracted_urls: vec!["https://wiki.example/page/42".into()],
            entities: Default::default(),
            sentiment: Default::default(),
        });

        let matches = find_matches("a", &[left_item], "b", &[right_item], &MatchConfig {
            weights: MatchWeights::default(),
            min_score: 0.1,
        });
        assert_eq!(matches.len(), 1);
        assert!(matches[0].evidence.iter().any(|e| e.contains("cross-reference")));
    }
}
