use serde::{Deserialize, Serialize};

/// An endpoint of a candidate match: which source collection and which item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEndpoint {
    pub source: String,
    pub id: String,
}

/// A scored cross-source match between two items (spec §4.9 `Match`).
///
/// `score` is a weighted sum over id-mention (0.6), URL cross-references (0.2),
/// title token-set similarity (0.15), and co-occurring named entities (0.05);
/// see `cf-match`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub left: MatchEndpoint,
    pub right: MatchEndpoint,
    pub score: f64,
    pub evidence: Vec<String>,
}

impl Match {
    /// Invariant: scores are always in `[0.0, 1.0]` and endpoints are never
    /// equal to each other (an item never matches itself).
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.score) && self.left != self.right
    }
}
