//! Registry Store - canonical companies, aliases and ban entries
//!
//! Backed by SQLite. Every mutator is a single insert-if-absent statement, so
//! each one commits on its own and can be replayed safely after a crash.
//! Lookups go through `COLLATE NOCASE` columns, matching [`CaseKey`] semantics
//! for ASCII names.
//!
//! [`CaseKey`]: crate::db::snapshot::CaseKey

use crate::dataset::create_csv_writer;
use crate::db::snapshot::{CanonicalCompany, RegistrySnapshot};
use crate::error::{CorplinkError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS company_canonical (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    canonical_name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    process_id TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS company_alias (
    alias TEXT PRIMARY KEY COLLATE NOCASE,
    canonical_id INTEGER NOT NULL REFERENCES company_canonical(id),
    process_id TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS ban_list (
    alias TEXT PRIMARY KEY COLLATE NOCASE,
    process_id TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_alias_canonical ON company_alias(canonical_id);
"#;

pub struct Registry {
    conn: Connection,
}

impl Registry {
    /// Open (or create) the registry database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!("Opened registry at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn is_banned(&self, text: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM ban_list WHERE alias = ?1",
                params![text.trim()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn resolve_alias(&self, text: &str) -> Result<Option<CanonicalCompany>> {
        let company = self
            .conn
            .query_row(
                r#"
                SELECT c.id, c.canonical_name, c.process_id
                FROM company_alias a
                JOIN company_canonical c ON a.canonical_id = c.id
                WHERE a.alias = ?1
                "#,
                params![text.trim()],
                |row| {
                    Ok(CanonicalCompany {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        process_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(company)
    }

    pub fn find_canonical(&self, name: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM company_canonical WHERE canonical_name = ?1",
                params![name.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Read all three sets inside one read transaction.
    pub fn load_snapshot(&self) -> Result<RegistrySnapshot> {
        let tx = self.conn.unchecked_transaction()?;
        let mut snapshot = RegistrySnapshot::new();

        {
            let mut stmt =
                tx.prepare("SELECT id, canonical_name, process_id FROM company_canonical ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(CanonicalCompany {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    process_id: row.get(2)?,
                })
            })?;
            for company in rows {
                snapshot.insert_canonical(company?);
            }

            let mut stmt = tx.prepare("SELECT alias, canonical_id FROM company_alias ORDER BY rowid")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (alias, canonical_id) = row?;
                snapshot.insert_alias(&alias, canonical_id);
            }

            let mut stmt = tx.prepare("SELECT alias FROM ban_list")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for alias in rows {
                snapshot.insert_ban(&alias?);
            }
        }

        tx.commit()?;
        debug!(
            "Loaded registry snapshot: {} canonicals, {} aliases, {} bans",
            snapshot.canonical_count(),
            snapshot.alias_count(),
            snapshot.ban_count()
        );
        Ok(snapshot)
    }

    /// Ban a name. Returns false when it was already banned.
    pub fn ban(&self, text: &str, process_id: &str) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO ban_list (alias, process_id) VALUES (?1, ?2)",
            params![text.trim(), process_id],
        )?;
        Ok(inserted > 0)
    }

    /// Insert a new canonical company.
    ///
    /// Fails with [`CorplinkError::DuplicateName`] when a canonical with the
    /// same name (ignoring case) already exists; the caller is expected to
    /// re-query with [`Registry::find_canonical`] and reuse that id.
    pub fn create_canonical(&self, name: &str, process_id: &str) -> Result<i64> {
        let name = name.trim();
        match self.conn.execute(
            "INSERT INTO company_canonical (canonical_name, process_id) VALUES (?1, ?2)",
            params![name, process_id],
        ) {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(CorplinkError::DuplicateName(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Map an alias to a canonical. Returns false when the alias was already mapped.
    pub fn link_alias(&self, text: &str, canonical_id: i64, process_id: &str) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO company_alias (alias, canonical_id, process_id) VALUES (?1, ?2, ?3)",
            params![text.trim(), canonical_id, process_id],
        )?;
        Ok(inserted > 0)
    }

    /// Write `id, canonical_name` for every canonical so reviewers can look up ids.
    pub fn export_canonicals(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let snapshot = self.load_snapshot()?;
        let mut writer = create_csv_writer(path)?;
        writer.write_record(["id", "canonical_name"])?;
        for company in snapshot.canonicals() {
            writer.write_record([company.id.to_string(), company.name.clone()])?;
        }
        writer.flush()?;
        info!(
            "Wrote {} ({} canonicals)",
            path.display(),
            snapshot.canonical_count()
        );
        Ok(snapshot.canonical_count())
    }
}
