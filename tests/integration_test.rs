use async_trait::async_trait;
use corplink::autofill::autofill_file;
use corplink::config::Config;
use corplink::dataset::Dataset;
use corplink::db::Registry;
use corplink::error::CorplinkError;
use corplink::llm::{AdvisoryRequest, AdvisoryService, AdvisoryVerdict};
use corplink::pipeline;
use corplink::review::{ResultStatus, ReviewBuffer, ReviewRow};
use corplink::standardize::standardize;
use std::collections::HashMap;
use tempfile::TempDir;

const RAW: &str = "\
Tier_1,Tier_2,Filename,Date,Title,Publisher,Sentence,Hit_Count,Matched_Keywords,company_1,company_2,company_3
AI,Health,a.txt,2025-01-01,Pact,Nikkei,Toyota Motors and Reuters announced a pact.,1,AI,Toyota Motors,Reuters,
AI,Health,b.txt,2025-01-02,Deal,Nikkei,Acme Corp and ACME Holdings merged with Sony.,2,AI,Acme Corp,ACME Holdings,Sony
AI,Health,c.txt,2025-01-03,Solo,Nikkei,Only Honda here.,1,AI,Honda,,
";

/// Temp data dir with the raw sentence file in place.
fn setup() -> Result<(TempDir, Config), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        semantic: false,
        ..Default::default()
    };
    std::fs::write(config.raw_path(), RAW)?;
    Ok((dir, config))
}

fn row_for<'a>(buffer: &'a ReviewBuffer, alias: &str) -> &'a ReviewRow {
    buffer
        .rows
        .iter()
        .find(|r| r.alias == alias)
        .unwrap_or_else(|| panic!("no review row for {}", alias))
}

fn decide(config: &Config, decisions: &[(&str, &str)]) {
    let mut buffer = ReviewBuffer::load(config.review_path()).unwrap();
    for row in &mut buffer.rows {
        if let Some((_, decision)) = decisions.iter().find(|(alias, _)| *alias == row.alias) {
            row.canonical_decision = decision.to_string();
        }
    }
    buffer.save(config.review_path()).unwrap();
}

#[tokio::test]
async fn test_classify_queues_only_multi_company_sentences() {
    let (_dir, config) = setup().unwrap();
    let report = pipeline::classify(&config, None).await.unwrap();

    assert_eq!(report.records_read, 3);
    assert_eq!(report.review.skipped_rows, 1);

    let buffer = ReviewBuffer::load(config.review_path()).unwrap();
    let mut aliases: Vec<&str> = buffer.rows.iter().map(|r| r.alias.as_str()).collect();
    aliases.sort();
    assert_eq!(aliases, vec!["ACME Holdings", "Acme Corp", "Reuters", "Sony", "Toyota Motors"]);
    // organization suffixes score 0 and sort last
    assert_eq!(buffer.rows[3].noise_score, 0);
    assert_eq!(buffer.rows[4].noise_score, 0);
}

#[tokio::test]
async fn test_review_commit_and_propagation() {
    let (_dir, config) = setup().unwrap();
    pipeline::classify(&config, None).await.unwrap();
    decide(
        &config,
        &[
            ("Reuters", "0"),
            ("Toyota Motors", "Toyota"),
            ("Acme Corp", "Acme"),
            ("ACME Holdings", "ACME"),
        ],
    );

    let report = standardize(&config).unwrap();
    assert_eq!(report.count(ResultStatus::Added), 3);
    assert_eq!(report.count(ResultStatus::Banned), 1);
    assert_eq!(report.count(ResultStatus::NoInput), 1);
    assert_eq!(report.canonicals_created, 2);

    let buffer = ReviewBuffer::load(config.review_path()).unwrap();
    assert_eq!(row_for(&buffer, "Reuters").result_status, ResultStatus::Banned);
    assert_eq!(row_for(&buffer, "Reuters").process_id, report.process_id);
    assert_eq!(row_for(&buffer, "Sony").result_status, ResultStatus::NoInput);
    assert_eq!(row_for(&buffer, "Sony").process_id, "");

    let registry = Registry::open(config.registry_path()).unwrap();
    let snapshot = registry.load_snapshot().unwrap();
    // "ACME Holdings" sorts ahead of "Acme Corp", so its decision names the canonical
    assert_eq!(snapshot.canonical_names(), vec!["Toyota", "ACME"]);
    assert_eq!(snapshot.resolve_alias("acme corp").unwrap().name, "ACME");

    let dataset = Dataset::load(config.dataset_path()).unwrap();
    let slots: Vec<Vec<String>> = dataset.records.iter().map(|r| r.companies()).collect();
    assert_eq!(
        slots,
        vec![
            vec!["Toyota".to_string()],
            vec!["ACME".to_string(), "Sony".to_string()],
            vec!["Honda".to_string()],
        ]
    );
    assert!(dataset
        .records
        .iter()
        .all(|r| r.company_slots.iter().all(|s| !s.eq_ignore_ascii_case("reuters"))));
    assert_eq!(dataset.slot_count, 3);
}

#[tokio::test]
async fn test_standardize_twice_is_idempotent() {
    let (_dir, config) = setup().unwrap();
    pipeline::classify(&config, None).await.unwrap();
    decide(
        &config,
        &[("Reuters", "0"), ("Toyota Motors", "Toyota"), ("Sony", "42")],
    );

    standardize(&config).unwrap();
    let registry = Registry::open(config.registry_path()).unwrap();
    let before = registry.load_snapshot().unwrap();
    let dataset_before = Dataset::load(config.dataset_path()).unwrap();

    let report = standardize(&config).unwrap();
    let after = registry.load_snapshot().unwrap();

    assert_eq!(report.count(ResultStatus::Added), 0);
    assert_eq!(report.canonicals_created, 0);
    assert_eq!(report.count(ResultStatus::Exists), 1);
    assert_eq!(report.count(ResultStatus::BadId), 1);
    assert_eq!(report.changed_cells, 0);
    assert_eq!(before.canonical_count(), after.canonical_count());
    assert_eq!(before.alias_count(), after.alias_count());
    assert_eq!(before.ban_count(), after.ban_count());
    assert_eq!(Dataset::load(config.dataset_path()).unwrap(), dataset_before);
}

#[tokio::test]
async fn test_link_by_id_from_canonical_list() {
    let (_dir, config) = setup().unwrap();
    let registry = Registry::open(config.registry_path()).unwrap();
    let toyota = registry.create_canonical("Toyota", "seed").unwrap();
    drop(registry);

    pipeline::classify(&config, None).await.unwrap();
    let list = std::fs::read_to_string(config.canonical_list_path()).unwrap();
    assert!(list.contains(&format!("{},Toyota", toyota)));

    let id = toyota.to_string();
    decide(&config, &[("Toyota Motors", id.as_str())]);
    let report = standardize(&config).unwrap();
    assert_eq!(report.count(ResultStatus::Added), 1);
    assert_eq!(report.canonicals_created, 0);

    let dataset = Dataset::load(config.dataset_path()).unwrap();
    assert_eq!(dataset.records[0].companies(), vec!["Reuters", "Toyota"]);
}

#[tokio::test]
async fn test_missing_review_file_aborts_without_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let err = standardize(&config).unwrap_err();
    assert!(matches!(err, CorplinkError::MissingInput(_)));
    assert!(!config.registry_path().exists());
}

struct TableService(HashMap<String, AdvisoryVerdict>);

#[async_trait]
impl AdvisoryService for TableService {
    async fn review_batch(
        &self,
        batch: &[AdvisoryRequest],
    ) -> corplink::Result<HashMap<String, AdvisoryVerdict>> {
        Ok(batch
            .iter()
            .filter_map(|r| self.0.get(&r.alias).map(|v| (r.alias.clone(), v.clone())))
            .collect())
    }
}

#[tokio::test]
async fn test_autofill_then_standardize() {
    let (_dir, config) = setup().unwrap();
    pipeline::classify(&config, None).await.unwrap();

    let service = TableService(HashMap::from([
        (
            "Reuters".to_string(),
            AdvisoryVerdict {
                is_entity: false,
                clean_name: String::new(),
                matches_advisory: false,
            },
        ),
        (
            "Acme Corp".to_string(),
            AdvisoryVerdict {
                is_entity: true,
                clean_name: "Acme".into(),
                matches_advisory: false,
            },
        ),
    ]));
    let updated = autofill_file(&config, &service).await.unwrap();
    assert_eq!(updated, 2);

    let buffer = ReviewBuffer::load(config.review_path()).unwrap();
    assert_eq!(row_for(&buffer, "Reuters").canonical_decision, "0");
    assert_eq!(row_for(&buffer, "Acme Corp").canonical_decision, "Acme");
    assert_eq!(row_for(&buffer, "Sony").canonical_decision, "");

    let report = standardize(&config).unwrap();
    assert_eq!(report.count(ResultStatus::Banned), 1);
    assert_eq!(report.count(ResultStatus::Added), 1);
    assert_eq!(report.count(ResultStatus::NoInput), 3);
}
