use crate::db::{CanonicalCompany, RegistrySnapshot};
use crate::embedding::{best_match, Embedding};
use std::fmt;
use strsim::jaro_winkler;

/// Normalized InDel similarity (0-100) of two strings, by characters.
///
/// `100 * (1 - indel / (len_a + len_b))` where the InDel distance counts only
/// insertions and deletions. Two empty strings score 0.
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 0.0;
    }

    // Longest common subsequence, two-row DP.
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[b.len()];

    let indel = total - 2 * lcs;
    100.0 * (1.0 - indel as f64 / total as f64)
}

fn sort_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Token-sort ratio: whitespace tokens sorted and re-joined, then [`indel_ratio`].
/// Case-sensitive; no other preprocessing.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    indel_ratio(&sort_tokens(a), &sort_tokens(b))
}

/// How an advisory match was found, with its confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchTag {
    /// Token-sort ratio, 0-100.
    Fuzzy(f64),
    /// Embedding cosine similarity.
    Ai(f32),
}

impl fmt::Display for MatchTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchTag::Fuzzy(score) => write!(f, "Fuzzy({:.0})", score),
            MatchTag::Ai(similarity) => write!(f, "AI({:.2})", similarity),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub name: String,
    pub id: i64,
    pub tag: MatchTag,
}

/// Proposes an existing canonical for an unknown alias.
pub struct AdvisoryMatcher {
    canonicals: Vec<CanonicalCompany>,
    /// Parallel to `canonicals`; empty when the semantic pass is disabled.
    canonical_vectors: Vec<Embedding>,
    pub fuzzy_threshold: f64,
    pub semantic_threshold: f32,
}

impl AdvisoryMatcher {
    pub const DEFAULT_FUZZY_THRESHOLD: f64 = 90.0;
    pub const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.82;

    /// `canonical_vectors` must be in the snapshot's canonical order, or empty.
    pub fn new(snapshot: &RegistrySnapshot, canonical_vectors: Vec<Embedding>) -> Self {
        let canonicals = snapshot.canonicals().to_vec();
        let canonical_vectors = if canonical_vectors.len() == canonicals.len() {
            canonical_vectors
        } else {
            Vec::new()
        };
        Self {
            canonicals,
            canonical_vectors,
            fuzzy_threshold: Self::DEFAULT_FUZZY_THRESHOLD,
            semantic_threshold: Self::DEFAULT_SEMANTIC_THRESHOLD,
        }
    }

    pub fn with_thresholds(mut self, fuzzy_threshold: f64, semantic_threshold: f32) -> Self {
        self.fuzzy_threshold = fuzzy_threshold;
        self.semantic_threshold = semantic_threshold;
        self
    }

    pub fn is_semantic(&self) -> bool {
        !self.canonical_vectors.is_empty()
    }

    /// Best lexical match; the first canonical wins ties.
    fn best_fuzzy(&self, alias: &str) -> Option<(&CanonicalCompany, f64)> {
        let mut best: Option<(&CanonicalCompany, f64)> = None;
        for company in &self.canonicals {
            let score = token_sort_ratio(alias, &company.name);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((company, score)),
            }
        }
        best
    }

    /// Lexical pass first, semantic pass only if it fails.
    pub fn suggest(&self, alias: &str, alias_vector: Option<&[f32]>) -> Option<Advisory> {
        if let Some((company, score)) = self.best_fuzzy(alias) {
            if score >= self.fuzzy_threshold {
                return Some(Advisory {
                    name: company.name.clone(),
                    id: company.id,
                    tag: MatchTag::Fuzzy(score),
                });
            }
        }

        let vector = alias_vector?;
        let (idx, similarity) = best_match(vector, &self.canonical_vectors)?;
        if similarity >= self.semantic_threshold {
            let company = &self.canonicals[idx];
            return Some(Advisory {
                name: company.name.clone(),
                id: company.id,
                tag: MatchTag::Ai(similarity),
            });
        }
        None
    }
}

/// Fuzzy matcher for spotting near-duplicate canonical names
pub struct FuzzyMatcher {
    /// Similarity threshold (0.0-1.0) for considering two strings as matches
    pub similarity_threshold: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.95,
        }
    }
}

impl FuzzyMatcher {
    /// Lowercase, drop punctuation, collapse whitespace.
    pub fn normalize_string(&self, s: &str) -> String {
        let cleaned: String = s
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();
        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Jaro-Winkler similarity of the normalized strings, 0.0-1.0.
    pub fn similarity(&self, s1: &str, s2: &str) -> f64 {
        jaro_winkler(&self.normalize_string(s1), &self.normalize_string(s2))
    }

    pub fn is_match(&self, s1: &str, s2: &str) -> bool {
        self.similarity(s1, s2) >= self.similarity_threshold
    }

    /// First existing name that `name` is suspiciously close to, if any.
    pub fn near_duplicate<'a>(&self, name: &str, existing: &'a [CanonicalCompany]) -> Option<&'a CanonicalCompany> {
        existing.iter().find(|c| self.is_match(name, &c.name))
    }
}
