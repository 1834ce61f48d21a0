//! In-memory view of the registry, keyed case-insensitively.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Case-normalized lookup key shared by every registry index.
///
/// Two names that differ only in case map to the same key. The input
/// text is not kept; callers hold on to it separately when they need it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseKey(String);

impl CaseKey {
    pub fn new(text: &str) -> Self {
        Self(text.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCompany {
    pub id: i64,
    pub name: String,
    pub process_id: String,
}

/// A consistent copy of the three registry sets, loaded once per pass.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    banned: HashSet<CaseKey>,
    /// Canonicals in id order; fuzzy tie-breaks depend on this order.
    canonicals: Vec<CanonicalCompany>,
    canonical_by_key: HashMap<CaseKey, usize>,
    canonical_by_id: HashMap<i64, usize>,
    /// alias key -> canonical id
    aliases: HashMap<CaseKey, i64>,
}

impl RegistrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ban(&mut self, text: &str) {
        self.banned.insert(CaseKey::new(text));
    }

    /// Adds a canonical. Returns false when the name or id is already present.
    pub fn insert_canonical(&mut self, company: CanonicalCompany) -> bool {
        let key = CaseKey::new(&company.name);
        if self.canonical_by_key.contains_key(&key) || self.canonical_by_id.contains_key(&company.id) {
            return false;
        }
        let idx = self.canonicals.len();
        self.canonical_by_key.insert(key, idx);
        self.canonical_by_id.insert(company.id, idx);
        self.canonicals.push(company);
        true
    }

    /// Maps an alias to a canonical id. The first mapping for a key wins.
    pub fn insert_alias(&mut self, alias: &str, canonical_id: i64) -> bool {
        let key = CaseKey::new(alias);
        if self.aliases.contains_key(&key) {
            return false;
        }
        self.aliases.insert(key, canonical_id);
        true
    }

    pub fn is_banned(&self, text: &str) -> bool {
        self.banned.contains(&CaseKey::new(text))
    }

    pub fn canonical_by_name(&self, name: &str) -> Option<&CanonicalCompany> {
        self.canonical_by_key
            .get(&CaseKey::new(name))
            .map(|&idx| &self.canonicals[idx])
    }

    pub fn canonical_by_id(&self, id: i64) -> Option<&CanonicalCompany> {
        self.canonical_by_id.get(&id).map(|&idx| &self.canonicals[idx])
    }

    /// Canonical the alias maps to, if any. Canonical names themselves are
    /// not aliases; use [`RegistrySnapshot::resolves`] to check both.
    pub fn resolve_alias(&self, alias: &str) -> Option<&CanonicalCompany> {
        self.aliases
            .get(&CaseKey::new(alias))
            .and_then(|id| self.canonical_by_id(*id))
    }

    /// True when the text is already known, either as an alias or as a canonical name.
    pub fn resolves(&self, text: &str) -> bool {
        let key = CaseKey::new(text);
        self.aliases.contains_key(&key) || self.canonical_by_key.contains_key(&key)
    }

    pub fn canonicals(&self) -> &[CanonicalCompany] {
        &self.canonicals
    }

    pub fn canonical_names(&self) -> Vec<String> {
        self.canonicals.iter().map(|c| c.name.clone()).collect()
    }

    pub fn ban_count(&self) -> usize {
        self.banned.len()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn canonical_count(&self) -> usize {
        self.canonicals.len()
    }
}
