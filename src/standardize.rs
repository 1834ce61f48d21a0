//! Standardizer/Committer
//!
//! Applies reviewed decisions to the registry one row at a time, then
//! re-normalizes the whole dataset against the updated registry.
//!
//! The committer works on a copy of the registry snapshot and updates it
//! after every successful write, so later rows see earlier rows' effects
//! within the same pass.

use crate::classifier::{normalize_companies, ClassificationStats};
use crate::config::Config;
use crate::dataset::Dataset;
use crate::db::{CanonicalCompany, Registry, RegistrySnapshot};
use crate::error::{CorplinkError, Result};
use crate::fuzzy_matcher::FuzzyMatcher;
use crate::review::{Decision, ResultStatus, ReviewBuffer, ReviewRow};
use chrono::Local;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Batch stamp: local date `YYYYMMDD` followed by 8 random digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn generate() -> Self {
        let suffix: u32 = rand::thread_rng().gen_range(0..100_000_000);
        Self(format!("{}{:08}", Local::now().format("%Y%m%d"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProcessId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardizeReport {
    pub process_id: String,
    pub statuses: HashMap<ResultStatus, usize>,
    pub canonicals_created: usize,
    /// Dataset cells rewritten by propagation.
    pub changed_cells: usize,
}

impl StandardizeReport {
    pub fn count(&self, status: ResultStatus) -> usize {
        self.statuses.get(&status).copied().unwrap_or(0)
    }

    fn record(&mut self, status: ResultStatus) {
        *self.statuses.entry(status).or_insert(0) += 1;
    }
}

impl fmt::Display for StandardizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process {}:", self.process_id)?;
        for status in ResultStatus::ALL.iter().filter(|s| **s != ResultStatus::Pending) {
            write!(f, " {}={}", status, self.count(*status))?;
        }
        write!(
            f,
            ", {} new canonicals, {} dataset cells changed",
            self.canonicals_created, self.changed_cells
        )
    }
}

/// Re-normalize every record against `snapshot`. Returns the number of
/// changed cells.
pub fn propagate(dataset: &mut Dataset, snapshot: &RegistrySnapshot) -> (usize, ClassificationStats) {
    let mut stats = ClassificationStats::default();
    let mut changed = 0;
    let slot_count = dataset.slot_count;
    for record in &mut dataset.records {
        let normalized = normalize_companies(&record.companies(), snapshot, &mut stats);
        changed += record.repack(&normalized, slot_count);
    }
    (changed, stats)
}

pub struct Standardizer<'a> {
    registry: &'a Registry,
    snapshot: RegistrySnapshot,
    process_id: ProcessId,
    near_duplicates: FuzzyMatcher,
    report: StandardizeReport,
}

impl<'a> Standardizer<'a> {
    pub fn new(registry: &'a Registry) -> Result<Self> {
        Self::with_process_id(registry, ProcessId::generate())
    }

    pub fn with_process_id(registry: &'a Registry, process_id: ProcessId) -> Result<Self> {
        let snapshot = registry.load_snapshot()?;
        let report = StandardizeReport {
            process_id: process_id.to_string(),
            ..Default::default()
        };
        Ok(Self {
            registry,
            snapshot,
            process_id,
            near_duplicates: FuzzyMatcher::default(),
            report,
        })
    }

    pub fn process_id(&self) -> &ProcessId {
        &self.process_id
    }

    /// Apply every row's decision, in file order.
    pub fn commit(&mut self, buffer: &mut ReviewBuffer) {
        for row in &mut buffer.rows {
            let status = self.commit_row(row);
            row.result_status = status;
            self.report.record(status);
        }
    }

    fn stamp(&self, row: &mut ReviewRow) {
        row.process_id = self.process_id.to_string();
    }

    /// Apply one decision. Database failures become `DbError`; nothing here
    /// aborts the batch.
    pub fn commit_row(&mut self, row: &mut ReviewRow) -> ResultStatus {
        let alias = row.alias.trim().to_string();
        self.apply(&alias, row).unwrap_or_else(|e| {
            warn!("Failed to commit {:?}: {}", alias, e);
            ResultStatus::DbError
        })
    }

    fn apply(&mut self, alias: &str, row: &mut ReviewRow) -> Result<ResultStatus> {
        if alias.is_empty() {
            return Ok(ResultStatus::NoInput);
        }
        let (canonical_id, created) = match row.decision() {
            Decision::NoAction => return Ok(ResultStatus::NoInput),
            Decision::Ban => return self.ban(alias, row),
            Decision::LinkToId(id) => match self.snapshot.canonical_by_id(id) {
                Some(company) => (company.id, false),
                None => return Ok(ResultStatus::BadId),
            },
            Decision::LinkToName(name) => self.resolve_or_create(&name)?,
        };
        if let Some(company) = self.snapshot.canonical_by_id(canonical_id) {
            if self.snapshot.is_banned(&company.name) {
                warn!(
                    "{:?} links to banned canonical {:?}; propagation will drop it",
                    alias, company.name
                );
            }
        }

        let status = self.link(alias, canonical_id, row)?;
        // a row that created its canonical is stamped even when the alias already resolved
        if created {
            self.stamp(row);
        }
        Ok(status)
    }

    fn ban(&mut self, alias: &str, row: &mut ReviewRow) -> Result<ResultStatus> {
        if !self.snapshot.is_banned(alias) {
            self.registry.ban(alias, self.process_id.as_str())?;
            self.snapshot.insert_ban(alias);
        }
        self.stamp(row);
        Ok(ResultStatus::Banned)
    }

    /// Id of the canonical named `name` (ignoring case), creating it if
    /// needed. The flag is true when this call inserted it.
    fn resolve_or_create(&mut self, name: &str) -> Result<(i64, bool)> {
        if let Some(company) = self.snapshot.canonical_by_name(name) {
            return Ok((company.id, false));
        }

        if let Some(similar) = self
            .near_duplicates
            .near_duplicate(name, self.snapshot.canonicals())
        {
            warn!(
                "New canonical {:?} looks like existing {:?} (id {})",
                name, similar.name, similar.id
            );
        }

        let (id, created) = match self.registry.create_canonical(name, self.process_id.as_str()) {
            Ok(id) => {
                self.report.canonicals_created += 1;
                (id, true)
            }
            Err(CorplinkError::DuplicateName(_)) => {
                // Stored since the snapshot was taken; reuse it.
                let id = self
                    .registry
                    .find_canonical(name)?
                    .ok_or_else(|| CorplinkError::DuplicateName(name.to_string()))?;
                (id, false)
            }
            Err(e) => return Err(e),
        };

        self.snapshot.insert_canonical(CanonicalCompany {
            id,
            name: name.trim().to_string(),
            process_id: self.process_id.to_string(),
        });
        Ok((id, created))
    }

    fn link(&mut self, alias: &str, canonical_id: i64, row: &mut ReviewRow) -> Result<ResultStatus> {
        if self.snapshot.resolves(alias) {
            return Ok(ResultStatus::Exists);
        }
        if !self
            .registry
            .link_alias(alias, canonical_id, self.process_id.as_str())?
        {
            return Ok(ResultStatus::Exists);
        }
        self.snapshot.insert_alias(alias, canonical_id);
        self.stamp(row);
        Ok(ResultStatus::Added)
    }

    pub fn into_report(self) -> StandardizeReport {
        self.report
    }
}

/// Commit the review file, rewrite it, then propagate into the dataset file.
///
/// Both files are read before the registry is touched; a missing file aborts
/// the step with no mutation.
pub fn run_standardize(
    registry: &Registry,
    review_path: &Path,
    dataset_path: &Path,
) -> Result<StandardizeReport> {
    let mut buffer = ReviewBuffer::load(review_path)?;
    let mut dataset = Dataset::load(dataset_path)?;

    let mut standardizer = Standardizer::new(registry)?;
    info!(
        "Standardizing {} review rows as process {}",
        buffer.rows.len(),
        standardizer.process_id()
    );
    standardizer.commit(&mut buffer);
    buffer.save(review_path)?;
    let mut report = standardizer.into_report();

    let snapshot = registry.load_snapshot()?;
    let (changed, _) = propagate(&mut dataset, &snapshot);
    dataset.save(dataset_path)?;
    report.changed_cells = changed;

    info!("Standardize complete, {}", report);
    Ok(report)
}

pub fn standardize(config: &Config) -> Result<StandardizeReport> {
    let review_path = config.review_path();
    let dataset_path = config.dataset_path();
    for path in [&review_path, &dataset_path] {
        if !path.exists() {
            return Err(CorplinkError::MissingInput(path.clone()));
        }
    }
    let registry = Registry::open(config.registry_path())?;
    run_standardize(&registry, &review_path, &dataset_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SentenceRecord;

    fn row(alias: &str, decision: &str) -> ReviewRow {
        ReviewRow {
            alias: alias.to_string(),
            canonical_decision: decision.to_string(),
            ..Default::default()
        }
    }

    fn commit(registry: &Registry, rows: Vec<ReviewRow>) -> (ReviewBuffer, StandardizeReport) {
        let mut buffer = ReviewBuffer { rows };
        let mut standardizer = Standardizer::with_process_id(registry, "2026101800000001".into()).unwrap();
        standardizer.commit(&mut buffer);
        (buffer, standardizer.into_report())
    }

    fn statuses(buffer: &ReviewBuffer) -> Vec<ResultStatus> {
        buffer.rows.iter().map(|r| r.result_status).collect()
    }

    #[test]
    fn test_process_id_format() {
        let pid = ProcessId::generate();
        assert_eq!(pid.as_str().len(), 16);
        assert!(pid.as_str().bytes().all(|b| b.is_ascii_digit()));
        assert!(pid.as_str().starts_with(&Local::now().format("%Y").to_string()));
    }

    #[test]
    fn test_decision_outcomes() {
        let registry = Registry::open_in_memory().unwrap();
        let sony = registry.create_canonical("Sony", "seed").unwrap();

        let (buffer, report) = commit(
            &registry,
            vec![
                row("Panasonic", ""),
                row("Reuters", "0"),
                row("Sony Corp", &sony.to_string()),
                row("Foo", "999"),
                row("Honda Motor", "Honda"),
                row("SONY", "Sony"),
            ],
        );

        assert_eq!(
            statuses(&buffer),
            vec![
                ResultStatus::NoInput,
                ResultStatus::Banned,
                ResultStatus::Added,
                ResultStatus::BadId,
                ResultStatus::Added,
                ResultStatus::Exists,
            ]
        );
        assert!(registry.is_banned("reuters").unwrap());
        assert_eq!(registry.resolve_alias("sony corp").unwrap().unwrap().id, sony);
        assert!(registry.find_canonical("honda").unwrap().is_some());
        assert_eq!(report.canonicals_created, 1);
        assert_eq!(report.count(ResultStatus::Added), 2);

        assert_eq!(buffer.rows[0].process_id, "");
        assert_eq!(buffer.rows[1].process_id, "2026101800000001");
        assert_eq!(buffer.rows[3].process_id, "");
    }

    #[test]
    fn test_case_variants_share_one_canonical() {
        let registry = Registry::open_in_memory().unwrap();
        let (buffer, report) = commit(
            &registry,
            vec![row("Acme Inc", "Acme"), row("ACME Incorporated", "ACME")],
        );

        assert_eq!(statuses(&buffer), vec![ResultStatus::Added, ResultStatus::Added]);
        assert_eq!(report.canonicals_created, 1);
        let snapshot = registry.load_snapshot().unwrap();
        assert_eq!(snapshot.canonical_count(), 1);
        assert_eq!(snapshot.resolve_alias("acme incorporated").unwrap().name, "Acme");
    }

    #[test]
    fn test_second_pass_adds_nothing() {
        let registry = Registry::open_in_memory().unwrap();
        let rows = vec![
            row("Reuters", "0"),
            row("Acme Inc", "Acme"),
            row("Foo", "12345"),
            row("Bar", " "),
        ];
        commit(&registry, rows.clone());
        let before = registry.load_snapshot().unwrap();

        let (buffer, report) = commit(&registry, rows);
        let after = registry.load_snapshot().unwrap();

        assert_eq!(before.canonical_count(), after.canonical_count());
        assert_eq!(before.alias_count(), after.alias_count());
        assert_eq!(before.ban_count(), after.ban_count());
        assert_eq!(
            statuses(&buffer),
            vec![
                ResultStatus::Banned,
                ResultStatus::Exists,
                ResultStatus::BadId,
                ResultStatus::NoInput,
            ]
        );
        assert_eq!(report.canonicals_created, 0);
    }

    #[test]
    fn test_alias_already_mapped_elsewhere_is_kept() {
        let registry = Registry::open_in_memory().unwrap();
        let (buffer, _) = commit(
            &registry,
            vec![row("Google LLC", "Alphabet"), row("google llc", "Google")],
        );
        assert_eq!(statuses(&buffer), vec![ResultStatus::Added, ResultStatus::Exists]);
        assert_eq!(
            registry.resolve_alias("Google LLC").unwrap().unwrap().name,
            "Alphabet"
        );
    }

    #[test]
    fn test_banned_name_used_as_canonical_is_still_dropped() {
        let registry = Registry::open_in_memory().unwrap();
        let (buffer, _) = commit(
            &registry,
            vec![row("Reuters", "0"), row("Thomson Reuters", "Reuters")],
        );
        assert_eq!(statuses(&buffer), vec![ResultStatus::Banned, ResultStatus::Added]);

        let mut dataset = Dataset::new(3);
        dataset.records.push(SentenceRecord {
            company_slots: vec!["Thomson Reuters".into(), "Sony".into(), "".into()],
            ..Default::default()
        });
        let snapshot = registry.load_snapshot().unwrap();
        propagate(&mut dataset, &snapshot);
        assert_eq!(dataset.records[0].company_slots, vec!["Sony", "", ""]);
    }

    /// Second connection on the same database file, for writes the
    /// standardizer's snapshot does not know about.
    fn side_connection(path: &Path) -> rusqlite::Connection {
        rusqlite::Connection::open(path).unwrap()
    }

    #[test]
    fn test_canonical_stored_after_snapshot_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let registry = Registry::open(&path).unwrap();
        let mut standardizer = Standardizer::with_process_id(&registry, "2026101800000001".into()).unwrap();

        let acme = Registry::open(&path).unwrap().create_canonical("Acme", "other").unwrap();

        let mut buffer = ReviewBuffer {
            rows: vec![row("ACME Corp", "ACME")],
        };
        standardizer.commit(&mut buffer);
        let report = standardizer.into_report();

        assert_eq!(statuses(&buffer), vec![ResultStatus::Added]);
        assert_eq!(report.canonicals_created, 0);
        assert_eq!(registry.resolve_alias("acme corp").unwrap().unwrap().id, acme);
        assert_eq!(registry.load_snapshot().unwrap().canonical_count(), 1);
    }

    #[test]
    fn test_db_error_on_one_row_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let registry = Registry::open(&path).unwrap();
        let mut standardizer = Standardizer::with_process_id(&registry, "2026101800000001".into()).unwrap();
        side_connection(&path).execute_batch("DROP TABLE ban_list").unwrap();

        let mut buffer = ReviewBuffer {
            rows: vec![row("Reuters", "0"), row("Sony Corp", "Sony")],
        };
        standardizer.commit(&mut buffer);
        let report = standardizer.into_report();

        assert_eq!(statuses(&buffer), vec![ResultStatus::DbError, ResultStatus::Added]);
        assert_eq!(buffer.rows[0].process_id, "");
        assert_eq!(buffer.rows[1].process_id, "2026101800000001");
        assert_eq!(report.count(ResultStatus::DbError), 1);
        assert!(registry.find_canonical("sony").unwrap().is_some());
    }

    #[test]
    fn test_failed_link_leaves_row_unstamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let registry = Registry::open(&path).unwrap();
        let mut standardizer = Standardizer::with_process_id(&registry, "2026101800000001".into()).unwrap();
        side_connection(&path).execute_batch("DROP TABLE company_alias").unwrap();

        let mut buffer = ReviewBuffer {
            rows: vec![row("Sony Corp", "Sony")],
        };
        standardizer.commit(&mut buffer);
        let report = standardizer.into_report();

        assert_eq!(statuses(&buffer), vec![ResultStatus::DbError]);
        assert_eq!(buffer.rows[0].process_id, "");
        assert_eq!(report.canonicals_created, 1);
    }

    #[test]
    fn test_propagate_drops_bans_and_maps_aliases() {
        let mut snapshot = RegistrySnapshot::new();
        snapshot.insert_canonical(CanonicalCompany {
            id: 1,
            name: "Apple Inc.".into(),
            process_id: String::new(),
        });
        snapshot.insert_alias("iPhone", 1);
        snapshot.insert_ban("Reuters");

        let mut dataset = Dataset::new(4);
        dataset.records.push(SentenceRecord {
            company_slots: vec!["Reuters".into(), "iphone".into(), "apple".into(), "Sony".into()],
            ..Default::default()
        });

        let (changed, stats) = propagate(&mut dataset, &snapshot);
        assert_eq!(dataset.records[0].company_slots, vec!["Apple Inc.", "Sony", "", ""]);
        assert_eq!(changed, 4);
        assert_eq!(stats.banned, 1);
        assert_eq!(stats.alias, 1);

        // already normalized: nothing changes
        let (changed, _) = propagate(&mut dataset, &snapshot);
        assert_eq!(changed, 0);
    }
}
