use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use yap_backs_lib::cli::Cli;
use yap_backs_lib::config::BackupConfig;
use yap_backs_lib::orchestrator::{BackupError, Orchestrator};
use yap_backs_lib::report::{BackupReport, EXIT_FATAL};
use yap_backs_lib::tool::SystemInvoker;

fn run(cli: &Cli) -> Result<BackupReport, BackupError> {
    let config = BackupConfig::load(&cli.config)?;

    if cli.dry_run {
        log::warn!("Running in dry-run mode, no backups will be created");
    }

    let invoker = SystemInvoker::with_timeout(config.tools.timeout());
    Orchestrator::new(invoker).execute(&config, cli.dry_run)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init logger, RUST_LOG and --verbose override the info default
    let mut env_logger = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    if let Err(e) = env_logger.try_init() {
        eprintln!("Initializing the logger failed: {e}");
    }

    let report = match run(&cli) {
        Ok(report) => report,
        Err(e) => {
            log::error!("Backup aborted: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    report.log_summary();
    if cli.json {
        match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => log::error!("Serializing the report failed: {e}"),
        }
    }

    if cli.dry_run {
        log::info!("Dry run completed, no backups were created");
    }
    ExitCode::from(report.exit_status())
}
