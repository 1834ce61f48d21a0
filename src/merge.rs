//! Containment merge for near-duplicate company mentions.

use itertools::Itertools;
use std::cmp::Reverse;

/// Lowercased ASCII alphanumerics only; "Apple, Inc." -> "appleinc".
pub fn merge_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Collapse names whose merge keys contain one another.
///
/// Candidates are visited longest first (ties keep input order) and a name is
/// kept only if its key neither contains nor is contained in a kept key, so
/// "Apple", "Apple Inc" and "Apple Inc." collapse to "Apple Inc.". Names with
/// an empty key (no ASCII letters or digits) only collapse with identical text.
pub fn containment_merge(names: &[String]) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    let mut kept_keys: Vec<String> = Vec::new();

    for name in names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .sorted_by_key(|n| Reverse(n.chars().count()))
    {
        let key = merge_key(name);
        let duplicate = if key.is_empty() {
            kept.iter().any(|k| k == name)
        } else {
            kept_keys
                .iter()
                .filter(|k| !k.is_empty())
                .any(|k| k.contains(key.as_str()) || key.contains(k.as_str()))
        };
        if duplicate {
            continue;
        }
        kept.push(name.to_string());
        kept_keys.push(key);
    }

    kept
}
