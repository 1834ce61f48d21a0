//! Candidate classification and slot normalization against a registry snapshot.

use crate::db::RegistrySnapshot;
use crate::merge::containment_merge;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Banned,
    /// Stored canonical casing.
    KnownCanonical(String),
    /// Canonical name the alias maps to.
    KnownAlias(String),
    Unknown,
}

/// Classify a raw candidate. Ban set first, then canonicals, then aliases;
/// exact, case-insensitive matches only. A name that resolves to a banned
/// canonical is itself banned.
pub fn classify(candidate: &str, snapshot: &RegistrySnapshot) -> Classification {
    if snapshot.is_banned(candidate) {
        return Classification::Banned;
    }
    let found = snapshot
        .canonical_by_name(candidate)
        .map(|c| Classification::KnownCanonical(c.name.clone()))
        .or_else(|| {
            snapshot
                .resolve_alias(candidate)
                .map(|c| Classification::KnownAlias(c.name.clone()))
        });
    match found {
        Some(Classification::KnownCanonical(name)) | Some(Classification::KnownAlias(name))
            if snapshot.is_banned(&name) =>
        {
            Classification::Banned
        }
        Some(classification) => classification,
        None => Classification::Unknown,
    }
}

/// Tally of classification outcomes over a set of candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationStats {
    pub banned: usize,
    pub canonical: usize,
    pub alias: usize,
    pub unknown: usize,
}

impl ClassificationStats {
    pub fn record(&mut self, classification: &Classification) {
        match classification {
            Classification::Banned => self.banned += 1,
            Classification::KnownCanonical(_) => self.canonical += 1,
            Classification::KnownAlias(_) => self.alias += 1,
            Classification::Unknown => self.unknown += 1,
        }
    }
}

/// Drop banned names, map aliases to canonicals, fix canonical casing, then
/// collapse near-duplicates with the containment merge.
pub fn normalize_companies(
    names: &[String],
    snapshot: &RegistrySnapshot,
    stats: &mut ClassificationStats,
) -> Vec<String> {
    let mapped: Vec<String> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .filter_map(|name| {
            let classification = classify(name, snapshot);
            stats.record(&classification);
            match classification {
                Classification::Banned => None,
                Classification::KnownCanonical(canonical) | Classification::KnownAlias(canonical) => {
                    Some(canonical)
                }
                Classification::Unknown => Some(name.to_string()),
            }
        })
        .collect();
    containment_merge(&mapped)
}
