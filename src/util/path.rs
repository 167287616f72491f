//! Naming scheme of the produced backup files.
//!
//! ```text
//! {root}/{YYYY}/mysql_backups/{db}_{YYYYMMDD}_{HHMM}.sql[.gz]
//! {root}/{YYYY}/backup-{sanitized-path}_{YYYY-MM-DD}_{HHMM}.tar.gz
//! ```

use std::fs;
use std::io;
use std::path::{is_separator, Path, PathBuf};

use chrono::{Datelike, NaiveDateTime};
use derive_more::{Display, Error};

/// Subdirectory of the year directory holding the database dumps.
pub const MYSQL_CATEGORY: &str = "mysql_backups";

/// Kind of a backup unit, deciding its naming scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// A database dump, gzip compressed if `compress` is set.
    Database { compress: bool },
    /// A tarball of a file system path.
    Path,
}

/// Computed location of a single backup file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDestination {
    root: PathBuf,
    year: i32,
    category: Option<&'static str>,
    filename: String,
}

impl BackupDestination {
    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn category(&self) -> Option<&'static str> {
        self.category
    }

    /// Directory the file is placed in.
    pub fn directory(&self) -> PathBuf {
        let year_dir = year_directory(&self.root, self.year);
        match self.category {
            Some(category) => year_dir.join(category),
            None => year_dir,
        }
    }

    /// Full path of the file.
    pub fn path(&self) -> PathBuf {
        self.directory().join(&self.filename)
    }

    /// Creates the year (and category) directory if absent.
    ///
    /// Idempotent. Never called on dry runs.
    pub fn prepare(&self) -> Result<(), DirectoryError> {
        let directory = self.directory();
        fs::create_dir_all(&directory).map_err(|source| DirectoryError {
            path: directory,
            source,
        })
    }
}

/// The year or category directory can't be created.
#[derive(Debug, Display, Error)]
#[display("Unable to create backup directory {}: {source}", path.display())]
pub struct DirectoryError {
    pub path: PathBuf,
    pub source: io::Error,
}

/// Invalid input to [resolve].
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[display("Backup root path is empty")]
    EmptyRoot,
    #[display("Backup unit identifier is empty: {_0:?}")]
    EmptyIdentifier(#[error(ignore)] String),
}

/// `{root}/{YYYY}`
pub fn year_directory(root: &Path, year: i32) -> PathBuf {
    root.join(format!("{year:04}"))
}

/// Drops a single leading separator and replaces every other one with a hyphen.
///
/// `/etc/important-configs` becomes `etc-important-configs`, `/srv/www/`
/// becomes `srv-www-`.
pub fn sanitize(identifier: &str) -> String {
    identifier
        .strip_prefix(is_separator)
        .unwrap_or(identifier)
        .replace(is_separator, "-")
}

/// Computes where the backup of `identifier` taken at `timestamp` goes.
///
/// Pure: the same inputs always yield the same destination. Nothing is
/// created, see [BackupDestination::prepare].
pub fn resolve(
    root: &Path,
    kind: UnitKind,
    identifier: &str,
    timestamp: NaiveDateTime,
) -> Result<BackupDestination, ResolveError> {
    if root.as_os_str().is_empty() {
        return Err(ResolveError::EmptyRoot);
    }

    let (category, filename) = match kind {
        UnitKind::Database { compress } => {
            if identifier.is_empty() {
                return Err(ResolveError::EmptyIdentifier(identifier.to_string()));
            }
            let extension = if compress { "sql.gz" } else { "sql" };
            let filename = format!(
                "{identifier}_{}.{extension}",
                timestamp.format("%Y%m%d_%H%M")
            );
            (Some(MYSQL_CATEGORY), filename)
        }
        UnitKind::Path => {
            let sanitized = sanitize(identifier);
            if sanitized.is_empty() {
                return Err(ResolveError::EmptyIdentifier(identifier.to_string()));
            }
            let filename = format!(
                "backup-{sanitized}_{}.tar.gz",
                timestamp.format("%Y-%m-%d_%H%M")
            );
            (None, filename)
        }
    };

    Ok(BackupDestination {
        root: root.to_path_buf(),
        year: timestamp.year(),
        category,
        filename,
    })
}
