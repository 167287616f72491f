use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (YAML, or TOML if it ends in `.toml`).
    #[arg(long, short = 'c', env = "YAP_BACKS_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Simulative backup run. Nothing is executed or written.
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Print the final report as JSON to stdout.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["yap_backs"]).unwrap();

        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert!(!cli.dry_run);
        assert!(!cli.json);
        assert_eq!(cli.verbose, None);
    }

    #[test]
    fn short_flags() {
        let cli = Cli::try_parse_from(["yap_backs", "-c", "/etc/yap.yaml", "-n", "--verbose", "debug"])
            .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/yap.yaml"));
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, Some(LevelFilter::Debug));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
