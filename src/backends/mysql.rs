//! Implements dumps of MySQL databases using [MysqlBackup].

use std::path::PathBuf;

use super::{prepare_destination, settle, Backup, RunContext};
use crate::config::{MysqlConfig, ToolsConfig};
use crate::report::OperationOutcome;
use crate::tool::{Invocation, Output, ToolInvoker};
use crate::util::path::{self, BackupDestination, UnitKind};

const TARGET: &str = "backend::mysql";

/// The [MysqlBackup] backend dumps every configured database with `mysqldump`.
///
/// Dumps land in `{root}/{YYYY}/mysql_backups/`. With compression enabled the
/// dump is piped through gzip before it hits the disk.
pub struct MysqlBackup<'a> {
    config: &'a MysqlConfig,
    mysqldump: &'a str,
}

impl<'a> MysqlBackup<'a> {
    pub fn new(config: &'a MysqlConfig, tools: &'a ToolsConfig) -> Self {
        Self {
            config,
            mysqldump: &tools.mysqldump,
        }
    }

    /// Invocation dumping `database` into `dump_file`.
    pub fn dump_invocation(&self, database: &str, dump_file: PathBuf) -> Invocation {
        let MysqlConfig {
            host,
            port,
            username,
            password,
            compress,
            ..
        } = self.config;

        let mut invocation = Invocation::new(self.mysqldump)
            .arg(format!("--host={host}"))
            .arg(format!("--port={port}"));
        if let Some(username) = username {
            invocation = invocation.arg(format!("--user={username}"));
        }
        if let Some(password) = password {
            invocation = invocation.env("MYSQL_PWD", password);
        }

        let output = if *compress {
            Output::GzipFile(dump_file)
        } else {
            Output::File(dump_file)
        };

        invocation
            .arg("--single-transaction") // consistent snapshot for InnoDB
            .arg("--quick") // don't buffer whole tables in memory
            .arg("--lock-tables=false")
            .arg(database)
            .stdout(output)
    }

    fn dump(
        &self,
        invoker: &dyn ToolInvoker,
        run: &RunContext<'_>,
        database: &str,
    ) -> OperationOutcome {
        let kind = UnitKind::Database {
            compress: self.config.compress,
        };
        let destination: BackupDestination =
            match path::resolve(run.root, kind, database, run.timestamp) {
                Ok(destination) => destination,
                Err(e) => {
                    log::error!(target: TARGET, "Backup of {database} failed: {e}");
                    return OperationOutcome::failed(database, None, e.to_string());
                }
            };
        let dump_file = destination.path();

        if !run.dry_run {
            if let Err(e) = prepare_destination(TARGET, &destination) {
                log::error!(target: TARGET, "Backup of {database} failed: {e}");
                return OperationOutcome::failed(database, Some(dump_file), e.to_string());
            }
        }

        log::info!(target: TARGET, "Dumping database {database}");
        let invocation = self.dump_invocation(database, dump_file);
        let result = invoker.invoke(&invocation, run.dry_run);

        settle(TARGET, database, &destination, result)
    }
}

impl Backup for MysqlBackup<'_> {
    fn backup(&self, invoker: &dyn ToolInvoker, run: &RunContext<'_>) -> Vec<OperationOutcome> {
        let databases = &self.config.databases;
        if databases.is_empty() {
            log::debug!(target: TARGET, "No databases configured, skipping");
            return Vec::new();
        }
        log::trace!(
            target: TARGET,
            "Connecting to {}:{} as {}",
            self.config.host,
            self.config.port,
            self.config.username.as_deref().unwrap_or("<default user>")
        );

        let outcomes: Vec<_> = databases
            .iter()
            .map(|database| self.dump(invoker, run, database))
            .collect();

        log::info!(
            target: TARGET,
            "Finished {} database dump(s)",
            outcomes.len()
        );
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::report::OutcomeStatus;
    use crate::tool::stub::RecordingInvoker;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap()
    }

    fn mysql(databases: &[&str], compress: bool) -> MysqlConfig {
        MysqlConfig {
            username: Some("backup".to_string()),
            password: Some("secret".to_string()),
            compress,
            databases: databases.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn builds_dump_invocation() {
        let config = mysql(&["shop"], true);
        let tools = ToolsConfig::default();
        let backend = MysqlBackup::new(&config, &tools);

        let invocation = backend.dump_invocation("shop", "/b/shop.sql.gz".into());

        assert_eq!(invocation.program(), "mysqldump");
        assert_eq!(
            invocation.args(),
            [
                "--host=localhost",
                "--port=3306",
                "--user=backup",
                "--single-transaction",
                "--quick",
                "--lock-tables=false",
                "shop",
            ]
        );
        assert_eq!(
            invocation.envs(),
            [("MYSQL_PWD".to_string(), "secret".to_string())]
        );
        assert_eq!(
            invocation.output(),
            &Output::GzipFile("/b/shop.sql.gz".into())
        );
    }

    #[test]
    fn compression_toggles_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolsConfig::default();
        let run = RunContext {
            root: dir.path(),
            timestamp: timestamp(),
            dry_run: false,
        };
        let invoker = RecordingInvoker::default();

        let compressed = mysql(&["shop"], true);
        let outcomes = MysqlBackup::new(&compressed, &tools).backup(&invoker, &run);
        assert!(outcomes[0]
            .destination()
            .unwrap()
            .ends_with("2024/mysql_backups/shop_20241231_2359.sql.gz"));

        let plain = mysql(&["shop"], false);
        let outcomes = MysqlBackup::new(&plain, &tools).backup(&invoker, &run);
        let destination = outcomes[0].destination().unwrap();
        assert!(destination.ends_with("2024/mysql_backups/shop_20241231_2359.sql"));
        assert_eq!(
            invoker.calls.borrow()[1].output(),
            &Output::File(destination.to_path_buf())
        );
    }

    #[test]
    fn failing_database_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        let config = mysql(&["broken", "shop"], true);
        let tools = ToolsConfig::default();
        let run = RunContext {
            root: dir.path(),
            timestamp: timestamp(),
            dry_run: false,
        };
        let invoker = RecordingInvoker::failing_on(&["broken"]);

        let outcomes = MysqlBackup::new(&config, &tools).backup(&invoker, &run);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].unit(), "broken");
        assert_eq!(outcomes[0].status(), OutcomeStatus::Failed);
        assert!(outcomes[0].error().unwrap().contains("Access denied"));
        assert_eq!(outcomes[1].unit(), "shop");
        assert_eq!(outcomes[1].status(), OutcomeStatus::Succeeded);
    }

    #[test]
    fn partial_dump_is_removed_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = mysql(&["broken"], true);
        let tools = ToolsConfig::default();
        let run = RunContext {
            root: dir.path(),
            timestamp: timestamp(),
            dry_run: false,
        };
        let invoker = RecordingInvoker {
            partial_output: true,
            ..RecordingInvoker::failing_on(&["broken"])
        };

        let outcomes = MysqlBackup::new(&config, &tools).backup(&invoker, &run);

        assert_eq!(outcomes[0].status(), OutcomeStatus::Failed);
        let dump_file = outcomes[0].destination().unwrap();
        assert!(dump_file.ends_with("2024/mysql_backups/broken_20241231_2359.sql.gz"));
        assert_eq!(
            invoker.calls.borrow()[0].output(),
            &Output::GzipFile(dump_file.to_path_buf())
        );
        assert!(!dump_file.exists());
        assert!(dir.path().join("2024/mysql_backups").is_dir());
    }

    #[test]
    fn missing_mysqldump_fails_unit() {
        let dir = tempfile::tempdir().unwrap();
        let config = mysql(&["shop", "wiki"], true);
        let tools = ToolsConfig::default();
        let run = RunContext {
            root: dir.path(),
            timestamp: timestamp(),
            dry_run: false,
        };
        let invoker = RecordingInvoker {
            missing_program: Some("mysqldump".to_string()),
            ..Default::default()
        };

        let outcomes = MysqlBackup::new(&config, &tools).backup(&invoker, &run);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|outcome| outcome.status() == OutcomeStatus::Failed));
        assert!(outcomes[0].error().unwrap().contains("Failed to launch mysqldump"));
    }

    #[test]
    fn dry_run_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = mysql(&["shop", "wiki"], true);
        let tools = ToolsConfig::default();
        let run = RunContext {
            root: dir.path(),
            timestamp: timestamp(),
            dry_run: true,
        };
        let invoker = RecordingInvoker::default();

        let outcomes = MysqlBackup::new(&config, &tools).backup(&invoker, &run);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|outcome| outcome.status() == OutcomeStatus::SkippedDryRun));
        assert!(invoker.calls.borrow().is_empty());
        assert!(!dir.path().join("2024").exists());
    }

    #[test]
    fn empty_database_list_is_skipped() {
        let config = mysql(&[], true);
        let tools = ToolsConfig::default();
        let run = RunContext {
            root: Path::new("/nonexistent"),
            timestamp: timestamp(),
            dry_run: false,
        };

        let outcomes =
            MysqlBackup::new(&config, &tools).backup(&RecordingInvoker::default(), &run);

        assert!(outcomes.is_empty());
    }
}
