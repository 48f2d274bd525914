use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single normalised record produced by the mapping engine (spec §3 `NormalisedItem`).
///
/// `analysis` is populated by the enrichment stage (LLM gateway + scrub) and is
/// either entirely present or entirely absent — see [`NormalisedItem::has_analysis`].
/// Partial analysis is a bug in the producing stage, never a valid state here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalisedItem {
    pub id: String,
    pub source: String,
    pub title: String,
    pub content: HashMap<String, serde_json::Value>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub analysis: Option<ItemAnalysis>,
    /// `None` until the matching engine (C9) finds at least one link for this
    /// item; absent rather than an empty `{inbound: [], outbound: []}` so a
    /// never-matched item serializes as `null` per spec §3.
    #[serde(default)]
    pub relationships: Option<Relationships>,
}

impl NormalisedItem {
    pub fn has_analysis(&self) -> bool {
        self.analysis.is_some()
    }
}

/// LLM-derived enrichment attached to an item: summary, keywords, extracted
/// ids/urls/entities, sentiment (spec §3, wire fields `llm_summary` /
/// `llm_keywords` / `llm_entities` / `llm_sentiment`).
///
/// Written wholesale or not at all — re-running enrichment overwrites the whole
/// struct rather than merging fields, so repeated runs stay idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAnalysis {
    pub summary: String,
    pub keywords: Vec<String>,
    pub extracted_ids: Vec<String>,
    pub extracted_urls: Vec<String>,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub sentiment: Sentiment,
}

/// Named entities the enrichment pass pulled out of an item, grouped by kind
/// (spec §3 `llm_entities{people,organizations,technical}`). Consulted by the
/// matching engine (C9) for the entity-co-occurrence scoring component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub technical: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

/// The two directions of cross-source links discovered by the matching
/// engine (C9), written back onto both endpoints (spec §3, §4.9 "writes back
/// the relationships list on both endpoints").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relationships {
    #[serde(default)]
    pub inbound: Vec<RelationshipLink>,
    #[serde(default)]
    pub outbound: Vec<RelationshipLink>,
}

/// One endpoint of a bidirectional link: the other item, a score, and the
/// evidence that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipLink {
    pub target_source: String,
    pub target_id: String,
    pub score: f64,
    pub evidence: Vec<String>,
}
