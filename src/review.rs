//! Review Buffer (`result_mapping_todo.csv`)
//!
//! One row per distinct unresolved alias. The reviewer (or the LLM autofill)
//! fills `canonical_decision`; the standardizer fills `result_status` and
//! `process_id`. Rows are never removed once written.

use crate::classifier::{classify, Classification, ClassificationStats};
use crate::config::Config;
use crate::dataset::{create_csv_writer, open_csv_reader, Dataset};
use crate::db::{CaseKey, RegistrySnapshot};
use crate::embedding::{embed_in_batches, Embedder, Embedding};
use crate::error::Result;
use crate::fuzzy_matcher::AdvisoryMatcher;
use crate::noise::NoiseScorer;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

pub const REVIEW_COLUMNS: [&str; 8] = [
    "sentence",
    "alias",
    "noise_score",
    "advisory_name",
    "advisory_id",
    "canonical_decision",
    "result_status",
    "process_id",
];

/// Parsed `canonical_decision` cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoAction,
    Ban,
    LinkToId(i64),
    LinkToName(String),
}

impl Decision {
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim();
        if text.is_empty() {
            return Decision::NoAction;
        }
        if text == "0" {
            return Decision::Ban;
        }
        if text.bytes().all(|b| b.is_ascii_digit()) {
            // Larger than any rowid, so it can never name a canonical.
            return Decision::LinkToId(text.parse().unwrap_or(i64::MAX));
        }
        Decision::LinkToName(text.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultStatus {
    #[default]
    Pending,
    NoInput,
    Banned,
    BadId,
    Exists,
    Added,
    DbError,
}

impl ResultStatus {
    pub const ALL: [ResultStatus; 7] = [
        ResultStatus::Pending,
        ResultStatus::NoInput,
        ResultStatus::Banned,
        ResultStatus::BadId,
        ResultStatus::Exists,
        ResultStatus::Added,
        ResultStatus::DbError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "",
            ResultStatus::NoInput => "No input",
            ResultStatus::Banned => "Banned",
            ResultStatus::BadId => "Bad ID",
            ResultStatus::Exists => "Exists",
            ResultStatus::Added => "Added",
            ResultStatus::DbError => "DB Error",
        }
    }

    /// Unrecognised labels read back as `Pending`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(label))
            .unwrap_or_default()
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResultStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(ResultStatus::from_label(&label))
    }
}

fn lenient_i32<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i32, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse().unwrap_or(0))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReviewRow {
    pub sentence: String,
    pub alias: String,
    #[serde(deserialize_with = "lenient_i32")]
    pub noise_score: i32,
    pub advisory_name: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub advisory_id: Option<i64>,
    pub canonical_decision: String,
    pub result_status: ResultStatus,
    pub process_id: String,
}

impl ReviewRow {
    pub fn decision(&self) -> Decision {
        Decision::parse(&self.canonical_decision)
    }

    fn to_record(&self) -> [String; 8] {
        let sentence = if self.sentence.starts_with('=') {
            format!("'{}", self.sentence)
        } else {
            self.sentence.clone()
        };
        [
            sentence,
            self.alias.clone(),
            self.noise_score.to_string(),
            self.advisory_name.clone(),
            self.advisory_id.map(|id| id.to_string()).unwrap_or_default(),
            self.canonical_decision.clone(),
            self.result_status.to_string(),
            self.process_id.clone(),
        ]
    }
}

/// Noise bucket; lower sorts first.
fn priority_bucket(noise_score: i32) -> u8 {
    match noise_score {
        s if s >= 50 => 0,
        s if s >= 10 => 1,
        _ => 2,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewStats {
    pub classification: ClassificationStats,
    /// Sentences with fewer than two companies.
    pub skipped_rows: usize,
    /// Repeat mentions of an alias already queued.
    pub duplicates: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewBuffer {
    pub rows: Vec<ReviewRow>,
}

impl ReviewBuffer {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = open_csv_reader(path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        debug!("Loaded {} review rows from {}", rows.len(), path.display());
        Ok(Self { rows })
    }

    /// Header is always written, even with no rows.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = create_csv_writer(path.as_ref())?;
        writer.write_record(REVIEW_COLUMNS)?;
        for row in &self.rows {
            writer.write_record(row.to_record())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn pending_decisions(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.decision() == Decision::NoAction)
            .count()
    }

    /// Queue every unknown alias of the classified dataset for review.
    ///
    /// With an embedder, canonical names, unknown aliases and the noise
    /// concepts are embedded once up front; if the embedding service fails
    /// the buffer is still built with fuzzy advice and lexical noise scores.
    pub async fn build(
        dataset: &Dataset,
        snapshot: &RegistrySnapshot,
        embedder: Option<&dyn Embedder>,
        config: &Config,
    ) -> Result<(Self, ReviewStats)> {
        let mut stats = ReviewStats::default();
        let mut seen: HashSet<CaseKey> = HashSet::new();
        let mut candidates: Vec<(String, String)> = Vec::new();

        for record in &dataset.records {
            let companies = record.companies();
            if companies.len() < 2 {
                stats.skipped_rows += 1;
                continue;
            }
            for company in companies {
                let classification = classify(&company, snapshot);
                stats.classification.record(&classification);
                if classification != Classification::Unknown {
                    continue;
                }
                if seen.insert(CaseKey::new(&company)) {
                    candidates.push((record.sentence.clone(), company));
                } else {
                    stats.duplicates += 1;
                }
            }
        }

        let aliases: Vec<String> = candidates.iter().map(|(_, alias)| alias.clone()).collect();
        let (matcher, scorer, alias_vectors) =
            match Self::embed_all(embedder, snapshot, &aliases, config).await {
                Ok(prepared) => prepared,
                Err(e) => {
                    warn!("Embedding service failed, continuing without semantic matching: {}", e);
                    (AdvisoryMatcher::new(snapshot, Vec::new()), NoiseScorer::heuristic_only(), Vec::new())
                }
            };
        let matcher = matcher.with_thresholds(config.fuzzy_threshold, config.semantic_threshold);

        let mut rows = Vec::with_capacity(candidates.len());
        for (idx, (sentence, alias)) in candidates.into_iter().enumerate() {
            let vector = alias_vectors.get(idx).map(Vec::as_slice);
            let noise_score = scorer.score(&alias, vector);
            let advisory = matcher.suggest(&alias, vector);
            if let Some(advisory) = &advisory {
                debug!("Advisory for {:?}: {} [{}] {}", alias, advisory.name, advisory.id, advisory.tag);
            }
            rows.push(ReviewRow {
                sentence,
                alias,
                noise_score,
                advisory_name: advisory.as_ref().map(|a| a.name.clone()).unwrap_or_default(),
                advisory_id: advisory.map(|a| a.id),
                ..Default::default()
            });
        }

        // Stable: equal keys keep dataset order.
        rows.sort_by(|a, b| {
            priority_bucket(a.noise_score)
                .cmp(&priority_bucket(b.noise_score))
                .then_with(|| a.sentence.cmp(&b.sentence))
        });

        info!(
            "Review buffer: {} aliases queued ({} ban hits, {} canonical hits, {} alias hits, {} rows with fewer than two companies)",
            rows.len(),
            stats.classification.banned,
            stats.classification.canonical,
            stats.classification.alias,
            stats.skipped_rows
        );
        Ok((Self { rows }, stats))
    }

    async fn embed_all(
        embedder: Option<&dyn Embedder>,
        snapshot: &RegistrySnapshot,
        aliases: &[String],
        config: &Config,
    ) -> Result<(AdvisoryMatcher, NoiseScorer, Vec<Embedding>)> {
        let Some(embedder) = embedder else {
            return Ok((
                AdvisoryMatcher::new(snapshot, Vec::new()),
                NoiseScorer::heuristic_only(),
                Vec::new(),
            ));
        };
        let canonical_vectors =
            embed_in_batches(embedder, &snapshot.canonical_names(), config.embed_batch_size).await?;
        let alias_vectors = embed_in_batches(embedder, aliases, config.embed_batch_size).await?;
        let scorer = NoiseScorer::new(embedder).await?;
        Ok((
            AdvisoryMatcher::new(snapshot, canonical_vectors),
            scorer,
            alias_vectors,
        ))
    }
}
