//! Backend modules for performing individual backup tasks.
//!
//! Currently the following backends are implemented:
//!
//! - [MysqlBackup]: Optionally compressed dumps of MySQL databases.
//! - [FileBackup]: Gzipped tarballs of file system paths.

pub mod files;
pub mod mysql;

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;

pub use files::FileBackup;
pub use mysql::MysqlBackup;

use crate::report::OperationOutcome;
use crate::tool::{ToolInvoker, ToolLaunchError, ToolResult};
use crate::util::path::{BackupDestination, DirectoryError};

/// Parameters shared by every unit of one run.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    /// Directory all backups are written below.
    pub root: &'a Path,
    /// Captured once when the run started.
    pub timestamp: NaiveDateTime,
    pub dry_run: bool,
}

/// Generic backup backend.
pub trait Backup {
    /// Backs up every unit managed by the implementation, in configured order.
    ///
    /// A failing unit never stops the remaining ones, it is reported as a
    /// failed [OperationOutcome] instead.
    ///
    /// # Dry Run
    ///
    /// On a dry run (`run.dry_run`) no files are altered and no tool is
    /// launched. This does include folders.
    fn backup(&self, invoker: &dyn ToolInvoker, run: &RunContext<'_>) -> Vec<OperationOutcome>;
}

/// Creates the destination directory and warns about a file about to be overwritten.
fn prepare_destination(
    target: &str,
    destination: &BackupDestination,
) -> Result<(), DirectoryError> {
    destination.prepare()?;

    let path = destination.path();
    if path.exists() {
        log::warn!(target: target, "Overwriting existing backup {}", path.display());
    }
    Ok(())
}

/// Turns the result of the tool into the unit's outcome.
///
/// The partial output of a failed run is removed.
fn settle(
    target: &str,
    unit: &str,
    destination: &BackupDestination,
    result: Result<ToolResult, ToolLaunchError>,
) -> OperationOutcome {
    let path = destination.path();
    let error = match result {
        Ok(result) if result.simulated => {
            log::info!(target: target, "DRYRUN: would create {}", path.display());
            return OperationOutcome::skipped_dry_run(unit, path);
        }
        Ok(result) if result.success() => {
            log::info!(target: target, "Created {}", path.display());
            return OperationOutcome::succeeded(unit, path);
        }
        Ok(result) => result.failure_detail(),
        Err(e) => e.to_string(),
    };

    log::error!(target: target, "Backup of {unit} failed: {error}");
    if path.exists() {
        match fs::remove_file(&path) {
            Ok(()) => log::debug!(target: target, "Removed partial backup {}", path.display()),
            Err(e) => log::warn!(target: target, "Removing partial backup {} failed: {e}", path.display()),
        }
    }

    OperationOutcome::failed(unit, Some(path), error)
}
