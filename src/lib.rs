//! Library to back up MySQL databases and file system paths.
//!
//! A run is described by a [BackupConfig](config::BackupConfig) and executed by
//! the [Orchestrator](orchestrator::Orchestrator). Every database is dumped
//! and every path archived into a year partitioned directory tree:
//!
//! ```text
//! {root}/{YYYY}/mysql_backups/{db}_{YYYYMMDD}_{HHMM}.sql[.gz]
//! {root}/{YYYY}/backup-{sanitized-path}_{YYYY-MM-DD}_{HHMM}.tar.gz
//! ```
//!
//! The individual backup modules are located in the [`backends`] module.

#![forbid(unsafe_code)]

pub mod backends;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod report;
pub mod tool;
pub mod util;
