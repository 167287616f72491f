//! Drives a complete backup run.

use std::fs;

use chrono::{Datelike, Local, NaiveDateTime};
use derive_more::{Display, Error, From};

use crate::backends::{Backup, FileBackup, MysqlBackup, RunContext};
use crate::config::{BackupConfig, ConfigError};
use crate::report::BackupReport;
use crate::tool::ToolInvoker;
use crate::util::path::{year_directory, DirectoryError};

const TARGET: &str = "orchestrator";

#[derive(Debug, Display, Error, From)]
/// Errors aborting a run before any unit is attempted.
pub enum BackupError {
    /// The configuration can't be used.
    #[display("Invalid configuration: {_0}")]
    Config(ConfigError),
    /// The backup root can't be created.
    #[display("Backup root is unusable: {_0}")]
    Directory(DirectoryError),
}

/// Runs all backends of a configuration one unit after another.
pub struct Orchestrator<I> {
    invoker: I,
}

impl<I: ToolInvoker> Orchestrator<I> {
    pub fn new(invoker: I) -> Self {
        Self { invoker }
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Backs up everything in `config`, timestamped with the current local time.
    pub fn execute(&self, config: &BackupConfig, dry_run: bool) -> Result<BackupReport, BackupError> {
        self.execute_at(config, dry_run, Local::now().naive_local())
    }

    /// Backs up everything in `config`, every unit named after `timestamp`.
    ///
    /// Databases are dumped first, then the file sources are archived.
    /// Failing units are part of the returned [BackupReport], only an
    /// unusable backup root aborts the run.
    pub fn execute_at(
        &self,
        config: &BackupConfig,
        dry_run: bool,
        timestamp: NaiveDateTime,
    ) -> Result<BackupReport, BackupError> {
        let root = config.backup_root();
        let year_dir = year_directory(root, timestamp.year());
        if dry_run {
            log::warn!(target: TARGET, "DRYRUN: no backups will be created below {}", year_dir.display());
        } else {
            log::debug!(target: TARGET, "Ensuring backup directory {}", year_dir.display());
            fs::create_dir_all(&year_dir).map_err(|source| DirectoryError {
                path: year_dir.clone(),
                source,
            })?;
        }

        let run = RunContext {
            root,
            timestamp,
            dry_run,
        };
        log::info!(
            target: TARGET,
            "Backing up {} database(s) and {} path(s) at {}",
            config.databases().len(),
            config.file_sources().len(),
            timestamp.format("%Y-%m-%d %H:%M")
        );

        let mut report = BackupReport::default();
        if let Some(mysql) = &config.mysql {
            report.extend(MysqlBackup::new(mysql, &config.tools).backup(&self.invoker, &run));
        }
        report.extend(
            FileBackup::new(config.file_sources(), &config.tools).backup(&self.invoker, &run),
        );

        Ok(report)
    }
}
