//! File-based schema migrations.
//!
//! Every `*.sql` file in the migrations directory is one migration, identified
//! by its filename. Files are applied in lexical filename order, so names need
//! a zero-padded sequence prefix (`001_create_thoughts.sql`). Applied
//! filenames are recorded in the `migrations` table and never run again.
//!
//! A migration and its bookkeeping row are committed in the same transaction,
//! so a file that fails halfway leaves neither schema changes nor a record
//! behind. Files must not contain their own `BEGIN`/`COMMIT`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rusqlite::{OptionalExtension, TransactionBehavior};
use serde::Serialize;
use thought_common::{Error, Result};
use tracing::{debug, info, warn};

use crate::gateway::StorageGateway;

const MIGRATIONS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT UNIQUE NOT NULL,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
)";

/// A migration file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub filename: String,
    pub path: PathBuf,
}

/// A row of the `migrations` bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub filename: String,
    pub applied_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Filenames applied by this run, in application order.
    pub applied: Vec<String>,
    /// Discovered files that were already recorded.
    pub already_applied: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

pub struct MigrationRunner {
    gateway: StorageGateway,
    migrations_dir: PathBuf,
}

impl MigrationRunner {
    pub fn new(gateway: StorageGateway, migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            gateway,
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Apply every pending migration in filename order.
    ///
    /// Safe to call on every start. The first failure stops the run and is
    /// returned as [`Error::Migration`]; callers must not serve traffic after
    /// an error.
    pub fn migrate(&self) -> Result<MigrationReport> {
        self.ensure_bookkeeping()?;

        let applied: HashSet<String> = self
            .applied()?
            .into_iter()
            .map(|m| m.filename)
            .collect();
        let candidates = discover(&self.migrations_dir)?;

        let mut report = MigrationReport::default();
        for file in candidates {
            if applied.contains(&file.filename) {
                report.already_applied += 1;
                continue;
            }

            let sql = std::fs::read_to_string(&file.path).map_err(|e| Error::Migration {
                filename: file.filename.clone(),
                reason: format!("failed to read file: {e}"),
            })?;

            info!("running migration: {}", file.filename);
            if self.apply_one(&file.filename, &sql)? {
                info!("migration {} applied", file.filename);
                report.applied.push(file.filename);
            } else {
                report.already_applied += 1;
            }
        }

        info!(
            applied = report.applied.len(),
            already_applied = report.already_applied,
            "database migrations complete"
        );
        Ok(report)
    }

    /// Recorded migrations in the order they were applied.
    pub fn applied(&self) -> Result<Vec<AppliedMigration>> {
        self.ensure_bookkeeping()?;
        self.gateway.query_map(
            "SELECT filename, COALESCE(applied_at, '') FROM migrations ORDER BY id",
            [],
            |row| {
                Ok(AppliedMigration {
                    filename: row.get(0)?,
                    applied_at: row.get(1)?,
                })
            },
        )
    }

    /// Discovered filenames that have not been applied yet, in order.
    pub fn pending(&self) -> Result<Vec<String>> {
        let applied: HashSet<String> = self
            .applied()?
            .into_iter()
            .map(|m| m.filename)
            .collect();

        Ok(discover(&self.migrations_dir)?
            .into_iter()
            .map(|f| f.filename)
            .filter(|name| !applied.contains(name))
            .collect())
    }

    fn ensure_bookkeeping(&self) -> Result<()> {
        self.gateway.run(MIGRATIONS_TABLE_SQL, []).map(|_| ())
    }

    /// Run one file and record it. Returns `false` when another process
    /// recorded it first.
    fn apply_one(&self, filename: &str, sql: &str) -> Result<bool> {
        let failed = |e: rusqlite::Error| Error::Migration {
            filename: filename.to_string(),
            reason: e.to_string(),
        };

        self.gateway.with_connection(|conn| {
            // IMMEDIATE takes the write lock up front, so a concurrent runner
            // blocks here and then sees our bookkeeping row.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(failed)?;

            let recorded = tx
                .query_row(
                    "SELECT 1 FROM migrations WHERE filename = ?1",
                    [filename],
                    |_| Ok(()),
                )
                .optional()
                .map_err(failed)?
                .is_some();
            if recorded {
                debug!("migration {filename} was applied concurrently, skipping");
                return Ok(false);
            }

            tx.execute_batch(sql).map_err(failed)?;
            tx.execute("INSERT INTO migrations (filename) VALUES (?1)", [filename])
                .map_err(failed)?;
            tx.commit().map_err(failed)?;
            Ok(true)
        })
    }
}

/// List `*.sql` files in `dir`, sorted by filename.
///
/// A missing directory means there is nothing to apply.
pub fn discover(dir: &Path) -> Result<Vec<MigrationFile>> {
    if !dir.exists() {
        info!("no migrations directory found at {}", dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("skipping migration with non UTF-8 name: {}", path.display());
            continue;
        };

        files.push(MigrationFile {
            filename: filename.to_string(),
            path: path.clone(),
        });
    }

    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}
