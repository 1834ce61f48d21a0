//! Noise Scorer
//!
//! Estimates how unlikely a candidate is to be a real organization name.
//! The score only orders the review worklist; nothing is discarded on it.

use crate::embedding::{cosine_similarity, Embedder, Embedding};
use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ORG_SUFFIX: Regex = Regex::new(
        r"(?i)\b(Inc\.?|Corp\.?|Corporation|Ltd\.?|LLC|PLC|AG|NV|SA|GmbH|S\.p\.A|Co\.?|Company|Group|Holdings?|Partners?|Capital|Ventures?|Bank|Trust|Software|Technolog(?:y|ies)|Pharma(?:ceuticals)?|Systems?|Services?|Industr(?:y|ies)|Foundation|Laborator(?:y|ies)|University|College|Institute|School|Hospital|Center|Centre|Ministry|Agency)\b"
    )
    .expect("organization suffix pattern");
    static ref TIME_QTY: Regex = Regex::new(
        r"(?i)\b(year|month|week|day|decade|centur(?:y|ies)|quarter|q[1-4]|ago|last|next|few|couple|several|dozen|half|around|approximately)s?\b"
    )
    .expect("time/quantity pattern");
    static ref FIN_REPORT: Regex = Regex::new(
        r"(?i)\b(results?|earnings?|revenues?|turnover|profits?|loss(?:es)?|guidance|forecast|financial statements?|balance sheets?|cash flows?|income statements?)\b"
    )
    .expect("financial report pattern");
}

/// Stock phrases whose neighbourhood in embedding space is mostly noise.
pub const NOISE_CONCEPTS: [&str; 8] = [
    "financial report results",
    "fiscal year quarter",
    "forward looking statements",
    "January February March",
    "global market growth",
    "conference call webcast",
    "operating expenses",
    "agreement partnership",
];

const TIME_QTY_WEIGHT: i32 = 30;
const FIN_REPORT_WEIGHT: i32 = 30;
const SHORT_WEIGHT: i32 = 10;
const LOWERCASE_WEIGHT: i32 = 10;
const LOWERCASE_RATIO: f64 = 0.30;

/// (threshold, increment); every threshold crossed adds its increment.
const SEMANTIC_STEPS: [(f32, i32); 3] = [(0.4, 20), (0.6, 40), (0.8, 100)];

/// Fraction of whitespace tokens starting with a lowercase letter.
fn lowercase_ratio(text: &str) -> f64 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let lower = tokens
        .iter()
        .filter(|t| t.chars().next().map_or(false, char::is_lowercase))
        .count();
    lower as f64 / tokens.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicScore {
    pub score: i32,
    /// Whether the semantic stage applies to this candidate.
    pub semantic: bool,
}

/// Lexical part of the score. An organizational suffix short-circuits to 0.
pub fn heuristic_score(text: &str) -> HeuristicScore {
    if ORG_SUFFIX.is_match(text) {
        return HeuristicScore {
            score: 0,
            semantic: false,
        };
    }

    let token_count = text.split_whitespace().count();
    let mut score = 0;
    if TIME_QTY.is_match(text) {
        score += TIME_QTY_WEIGHT;
    }
    if FIN_REPORT.is_match(text) {
        score += FIN_REPORT_WEIGHT;
    }
    if token_count <= 2 {
        score += SHORT_WEIGHT;
    }
    if lowercase_ratio(text) > LOWERCASE_RATIO {
        score += LOWERCASE_WEIGHT;
    }

    HeuristicScore {
        score,
        semantic: score > 0 || token_count > 2,
    }
}

pub struct NoiseScorer {
    concept_vectors: Vec<Embedding>,
}

impl NoiseScorer {
    /// Scorer without the semantic stage.
    pub fn heuristic_only() -> Self {
        Self {
            concept_vectors: Vec::new(),
        }
    }

    /// Precompute the noise-concept embeddings once per run.
    pub async fn new(embedder: &dyn Embedder) -> Result<Self> {
        let concepts: Vec<String> = NOISE_CONCEPTS.iter().map(|c| c.to_string()).collect();
        let concept_vectors = embedder.embed_batch(&concepts).await?;
        Ok(Self { concept_vectors })
    }

    pub fn is_semantic(&self) -> bool {
        !self.concept_vectors.is_empty()
    }

    /// Full score for `text`. `embedding` is the candidate's own vector; the
    /// semantic stage is skipped when it is absent.
    pub fn score(&self, text: &str, embedding: Option<&[f32]>) -> i32 {
        let heuristic = heuristic_score(text);
        let mut score = heuristic.score;
        if !heuristic.semantic {
            return score;
        }

        if let Some(vector) = embedding {
            let max_similarity = self
                .concept_vectors
                .iter()
                .map(|concept| cosine_similarity(vector, concept))
                .fold(f32::NEG_INFINITY, f32::max);
            for (threshold, increment) in SEMANTIC_STEPS {
                if max_similarity > threshold {
                    score += increment;
                }
            }
        }
        score
    }
}
