//! Step drivers
//!
//! `classify` turns the extractor's raw sentence file into the classified
//! dataset and the review worklist. `run` chains classify, autofill and
//! standardize according to the configured AI level.

use crate::autofill::autofill_file;
use crate::classifier::ClassificationStats;
use crate::config::{AiLevel, Config};
use crate::dataset::Dataset;
use crate::db::Registry;
use crate::embedding::Embedder;
use crate::error::{CorplinkError, Result};
use crate::llm::AdvisoryService;
use crate::review::{ReviewBuffer, ReviewStats};
use crate::standardize::{propagate, standardize, StandardizeReport};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifyReport {
    pub records_read: usize,
    /// Records dropped for a `Hit_Count` below 1.
    pub records_dropped: usize,
    pub changed_cells: usize,
    pub classification: ClassificationStats,
    pub review: ReviewStats,
    pub review_rows: usize,
}

/// Classify the raw file against the registry at `config.registry_path()`.
pub async fn classify(config: &Config, embedder: Option<&dyn Embedder>) -> Result<ClassifyReport> {
    let raw_path = config.raw_path();
    if !raw_path.exists() {
        return Err(CorplinkError::MissingInput(raw_path));
    }
    let registry = Registry::open(config.registry_path())?;
    classify_with(&registry, config, embedder).await
}

pub async fn classify_with(
    registry: &Registry,
    config: &Config,
    embedder: Option<&dyn Embedder>,
) -> Result<ClassifyReport> {
    let mut dataset = Dataset::load(config.raw_path())?;
    let snapshot = registry.load_snapshot()?;
    registry.export_canonicals(config.canonical_list_path())?;

    let mut report = ClassifyReport {
        records_read: dataset.records.len(),
        ..Default::default()
    };
    dataset.records.retain(|record| record.hit_count >= 1);
    report.records_dropped = report.records_read - dataset.records.len();

    let (changed, stats) = propagate(&mut dataset, &snapshot);
    report.changed_cells = changed;
    report.classification = stats;
    dataset.save(config.dataset_path())?;
    info!(
        "Classified {} records ({} dropped without hits): {} banned, {} canonical, {} alias, {} unknown mentions",
        dataset.records.len(),
        report.records_dropped,
        report.classification.banned,
        report.classification.canonical,
        report.classification.alias,
        report.classification.unknown
    );

    let (buffer, review_stats) = ReviewBuffer::build(&dataset, &snapshot, embedder, config).await?;
    buffer.save(config.review_path())?;
    report.review = review_stats;
    report.review_rows = buffer.rows.len();
    info!(
        "Wrote {} review rows to {}",
        buffer.rows.len(),
        config.review_path().display()
    );
    Ok(report)
}

/// Classify, then autofill and standardize as far as `config.ai_level` allows.
pub async fn run(
    config: &Config,
    embedder: Option<&dyn Embedder>,
    service: Option<&dyn AdvisoryService>,
) -> Result<Option<StandardizeReport>> {
    classify(config, embedder).await?;

    if config.ai_level == AiLevel::Manual {
        info!("Fill canonical_decision in {} and run standardize", config.review_path().display());
        return Ok(None);
    }

    match service {
        Some(service) => {
            autofill_file(config, service).await?;
        }
        None => {
            warn!("No advisory service configured; skipping autofill");
            return Ok(None);
        }
    }

    if config.ai_level == AiLevel::Auto {
        return standardize(config).map(Some);
    }
    Ok(None)
}
