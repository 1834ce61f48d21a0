//! Database module for the company registry
//!
//! `registry` owns the SQLite store and its mutators; `snapshot` is the
//! read-only, case-insensitive view used by classification passes.

pub mod registry;
pub mod snapshot;

pub use registry::Registry;
pub use snapshot::{CanonicalCompany, CaseKey, RegistrySnapshot};
