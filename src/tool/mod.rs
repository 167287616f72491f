//! Launching of the external tools (`mysqldump`, `tar`) a backup delegates to.
//!
//! Every backend describes the process it needs as an [Invocation] and hands
//! it to a [ToolInvoker]. The invoker either runs the process ([SystemInvoker])
//! or, on a dry run, only reports what would have been run.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};

mod system;

pub use system::SystemInvoker;

/// Where the standard output of an [Invocation] goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Collected into [ToolResult::stdout].
    Capture,
    /// Written verbatim to the file, which is created or truncated.
    File(PathBuf),
    /// Gzip compressed and written to the file, which is created or truncated.
    GzipFile(PathBuf),
}

impl Output {
    /// Destination file the output is written to, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            Output::Capture => None,
            Output::File(path) | Output::GzipFile(path) => Some(path),
        }
    }
}

/// A single external process to launch.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    stdout: Output,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            stdout: Output::Capture,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets an environment variable of the process.
    ///
    /// Values are never part of the [Display] output, so this is the place
    /// for secrets.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn stdout(mut self, output: Output) -> Self {
        self.stdout = output;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn output(&self) -> &Output {
        &self.stdout
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, _) in &self.envs {
            write!(f, "{key}=*** ")?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        match &self.stdout {
            Output::Capture => Ok(()),
            Output::File(path) => write!(f, " > {}", path.display()),
            Output::GzipFile(path) => write!(f, " | gzip > {}", path.display()),
        }
    }
}

/// Result of a process that was started.
///
/// A non-zero exit is a regular result and not an error, see [ToolResult::success].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolResult {
    /// Exit code of the process. [None] if it was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output. Empty if the output went to a file.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Nothing was executed, see [ToolInvoker::invoke].
    pub simulated: bool,
    /// The process was killed after exceeding the configured timeout.
    pub timed_out: bool,
}

impl ToolResult {
    /// Synthetic result of a dry run.
    pub fn simulated() -> Self {
        Self {
            exit_code: Some(0),
            simulated: true,
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Human readable reason of a failed result.
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        let cause = if self.timed_out {
            "timed out and was killed".to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exited with status {code}"),
                None => "was terminated by a signal".to_string(),
            }
        };

        if stderr.is_empty() {
            cause
        } else {
            format!("{cause}: {stderr}")
        }
    }
}

/// The process could not be run at all.
#[derive(Debug, Display, Error)]
pub enum ToolLaunchError {
    /// Executable missing or not startable.
    #[display("Failed to launch {program}: {source}")]
    Spawn { program: String, source: io::Error },
    /// Output file could not be created or written.
    #[display("Failed to write output of {program} to {}: {source}", path.display())]
    Output {
        program: String,
        path: PathBuf,
        source: io::Error,
    },
    /// Waiting for the process failed.
    #[display("Failed to wait for {program}: {source}")]
    Wait { program: String, source: io::Error },
}

/// Runs [Invocation]s.
pub trait ToolInvoker {
    /// Launches the process and blocks until it exited.
    fn run(&self, invocation: &Invocation) -> Result<ToolResult, ToolLaunchError>;

    /// Runs the [Invocation] unless `dry_run` is set.
    ///
    /// # Dry Run
    ///
    /// On a dry run no process is launched and neither the file system nor
    /// the network is touched. The returned [ToolResult] is
    /// [simulated](ToolResult::simulated).
    fn invoke(&self, invocation: &Invocation, dry_run: bool) -> Result<ToolResult, ToolLaunchError> {
        if dry_run {
            log::info!(target: "tool", "DRYRUN: {invocation}");
            return Ok(ToolResult::simulated());
        }

        log::debug!(target: "tool", "Running: {invocation}");
        self.run(invocation)
    }
}

impl<T: ToolInvoker + ?Sized> ToolInvoker for &T {
    fn run(&self, invocation: &Invocation) -> Result<ToolResult, ToolLaunchError> {
        (**self).run(invocation)
    }
}
