//! LLM autofill of review decisions
//!
//! Only rows with an empty decision are sent. A failed or malformed batch
//! leaves its rows undecided and the run moves on.

use crate::config::Config;
use crate::error::Result;
use crate::llm::{AdvisoryRequest, AdvisoryService, AdvisoryVerdict};
use crate::review::{Decision, ReviewBuffer, ReviewRow};
use tracing::{info, warn};

/// Decision text for a row given the model's verdict.
pub fn decision_for(row: &ReviewRow, verdict: &AdvisoryVerdict) -> String {
    if !verdict.is_entity {
        return "0".to_string();
    }
    if let Some(id) = row.advisory_id {
        if !row.advisory_name.is_empty() && verdict.matches_advisory {
            return id.to_string();
        }
    }
    let clean = verdict.clean_name.trim();
    if clean.is_empty() {
        row.alias.clone()
    } else {
        clean.to_string()
    }
}

/// Fill empty decisions in `buffer`. Returns the number of rows updated.
pub async fn autofill(
    buffer: &mut ReviewBuffer,
    service: &dyn AdvisoryService,
    batch_size: usize,
) -> usize {
    let pending: Vec<usize> = buffer
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.decision() == Decision::NoAction)
        .map(|(idx, _)| idx)
        .collect();
    if pending.is_empty() {
        info!("No undecided review rows");
        return 0;
    }

    let mut updated = 0;
    for chunk in pending.chunks(batch_size.max(1)) {
        let requests: Vec<AdvisoryRequest> = chunk
            .iter()
            .map(|&idx| AdvisoryRequest {
                alias: buffer.rows[idx].alias.clone(),
                advisory_name: buffer.rows[idx].advisory_name.clone(),
            })
            .collect();

        let verdicts = match service.review_batch(&requests).await {
            Ok(verdicts) => verdicts,
            Err(e) => {
                warn!("Advisory batch of {} rows failed: {}", chunk.len(), e);
                continue;
            }
        };

        for &idx in chunk {
            let row = &mut buffer.rows[idx];
            if let Some(verdict) = verdicts.get(&row.alias) {
                row.canonical_decision = decision_for(row, verdict);
                updated += 1;
            }
        }
    }

    info!("Autofilled {} of {} undecided rows", updated, pending.len());
    updated
}

/// Autofill the review file in place.
pub async fn autofill_file(config: &Config, service: &dyn AdvisoryService) -> Result<usize> {
    let path = config.review_path();
    let mut buffer = ReviewBuffer::load(&path)?;
    let updated = autofill(&mut buffer, service, config.advisory_batch_size).await;
    buffer.save(&path)?;
    info!("{} review rows still undecided", buffer.pending_decisions());
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CorplinkError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn row(alias: &str, advisory: Option<(&str, i64)>, decision: &str) -> ReviewRow {
        ReviewRow {
            alias: alias.to_string(),
            advisory_name: advisory.map(|(n, _)| n.to_string()).unwrap_or_default(),
            advisory_id: advisory.map(|(_, id)| id),
            canonical_decision: decision.to_string(),
            ..Default::default()
        }
    }

    fn verdict(is_entity: bool, clean_name: &str, matches_advisory: bool) -> AdvisoryVerdict {
        AdvisoryVerdict {
            is_entity,
            clean_name: clean_name.to_string(),
            matches_advisory,
        }
    }

    /// Answers from a fixed table and records batch sizes; fails on "boom".
    struct FakeService {
        answers: HashMap<String, AdvisoryVerdict>,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl AdvisoryService for FakeService {
        async fn review_batch(&self, batch: &[AdvisoryRequest]) -> Result<HashMap<String, AdvisoryVerdict>> {
            self.batches.lock().unwrap().push(batch.len());
            if batch.iter().any(|r| r.alias == "boom") {
                return Err(CorplinkError::Llm("service unavailable".into()));
            }
            Ok(batch
                .iter()
                .filter_map(|r| self.answers.get(&r.alias).map(|v| (r.alias.clone(), v.clone())))
                .collect())
        }
    }

    #[test]
    fn test_decision_for() {
        assert_eq!(decision_for(&row("CEO", None, ""), &verdict(false, "", false)), "0");
        assert_eq!(
            decision_for(&row("Toyota Motors", Some(("Toyota Motor", 7)), ""), &verdict(true, "Toyota", true)),
            "7"
        );
        assert_eq!(
            decision_for(&row("Toyota Motors", Some(("Toyota Motor", 7)), ""), &verdict(true, "Toyota", false)),
            "Toyota"
        );
        assert_eq!(decision_for(&row("iPhone", None, ""), &verdict(true, "Apple", true)), "Apple");
        assert_eq!(decision_for(&row("Sony", None, ""), &verdict(true, "  ", false)), "Sony");
    }

    #[tokio::test]
    async fn test_autofill_fills_only_undecided_rows() {
        let mut buffer = ReviewBuffer {
            rows: vec![
                row("iPhone", None, ""),
                row("CEO", None, ""),
                row("Sony", None, "Sony Group"),
                row("Unknown Co", None, ""),
            ],
        };
        let service = FakeService {
            answers: HashMap::from([
                ("iPhone".to_string(), verdict(true, "Apple", false)),
                ("CEO".to_string(), verdict(false, "", false)),
                ("Sony".to_string(), verdict(false, "", false)),
            ]),
            batches: Mutex::new(Vec::new()),
        };

        let updated = autofill(&mut buffer, &service, 2).await;
        assert_eq!(updated, 2);
        assert_eq!(buffer.rows[0].canonical_decision, "Apple");
        assert_eq!(buffer.rows[1].canonical_decision, "0");
        assert_eq!(buffer.rows[2].canonical_decision, "Sony Group");
        assert_eq!(buffer.rows[3].canonical_decision, "");
        assert_eq!(*service.batches.lock().unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_failed_batch_is_skipped() {
        let mut buffer = ReviewBuffer {
            rows: vec![row("boom", None, ""), row("iPhone", None, "")],
        };
        let service = FakeService {
            answers: HashMap::from([("iPhone".to_string(), verdict(true, "Apple", false))]),
            batches: Mutex::new(Vec::new()),
        };

        let updated = autofill(&mut buffer, &service, 1).await;
        assert_eq!(updated, 1);
        assert_eq!(buffer.rows[0].canonical_decision, "");
        assert_eq!(buffer.rows[1].canonical_decision, "Apple");
    }
}
