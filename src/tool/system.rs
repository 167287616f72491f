use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use flate2::Compression;

use super::{Invocation, Output, ToolInvoker, ToolLaunchError, ToolResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs [Invocation]s as real child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemInvoker {
    timeout: Option<Duration>,
}

impl SystemInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill processes still running after `timeout`. [None] waits forever.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Waits for the child, killing it once the timeout expired.
    ///
    /// Returns [None] if the child was killed.
    fn wait(&self, child: &mut Child) -> io::Result<Option<ExitStatus>> {
        let Some(timeout) = self.timeout else {
            return child.wait().map(Some);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                log::warn!(target: "tool", "Killing process {} after {timeout:?}", child.id());
                // may race with the child exiting by itself
                let _ = child.kill();
                child.wait()?;
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Receiver of the child's stdout.
enum Sink {
    Capture(Vec<u8>),
    File(File),
    Gzip(GzEncoder<File>),
}

impl Sink {
    fn open(output: &Output) -> io::Result<Self> {
        Ok(match output {
            Output::Capture => Sink::Capture(Vec::new()),
            Output::File(path) => Sink::File(File::create(path)?),
            Output::GzipFile(path) => {
                Sink::Gzip(GzEncoder::new(File::create(path)?, Compression::default()))
            }
        })
    }

    /// Drains `reader` into the sink and returns captured bytes.
    fn drain(self, reader: impl Read) -> io::Result<Vec<u8>> {
        let mut reader = BufReader::new(reader);
        match self {
            Sink::Capture(mut buf) => {
                reader.read_to_end(&mut buf)?;
                Ok(buf)
            }
            Sink::File(mut file) => {
                io::copy(&mut reader, &mut file)?;
                file.flush()?;
                file.sync_all()?;
                Ok(Vec::new())
            }
            Sink::Gzip(mut encoder) => {
                io::copy(&mut reader, &mut encoder)?;
                let file = encoder.finish()?;
                file.sync_all()?;
                Ok(Vec::new())
            }
        }
    }
}

fn join<T>(handle: JoinHandle<io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("output reader thread panicked")))
}

impl ToolInvoker for SystemInvoker {
    fn run(&self, invocation: &Invocation) -> Result<ToolResult, ToolLaunchError> {
        let program = invocation.program().to_string();
        let output_error = |source: io::Error| ToolLaunchError::Output {
            program: program.clone(),
            path: invocation.output().file().unwrap_or(Path::new("-")).to_path_buf(),
            source,
        };

        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args())
            .envs(invocation.envs().iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // open the destination first, a failure here must not leave a running process behind
        let sink = Sink::open(invocation.output()).map_err(output_error)?;
        if let Some(path) = invocation.output().file() {
            log::trace!(target: "tool", "Writing output of {program} to {}", path.display());
        }

        let mut child = command.spawn().map_err(|source| ToolLaunchError::Spawn {
            program: program.clone(),
            source,
        })?;
        log::trace!(target: "tool", "Started {program} (pid {})", child.id());

        // both streams are drained concurrently, otherwise a full stderr pipe blocks the child
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || match stdout {
            Some(stdout) => sink.drain(stdout),
            None => Ok(Vec::new()),
        });
        let stderr_reader = thread::spawn(move || -> io::Result<Vec<u8>> {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut buf)?;
            }
            Ok(buf)
        });

        let status = self.wait(&mut child).map_err(|source| ToolLaunchError::Wait {
            program: program.clone(),
            source,
        })?;

        let stdout = join(stdout_reader).map_err(output_error)?;
        let stderr = join(stderr_reader).unwrap_or_default();

        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        if !stderr.trim().is_empty() {
            log::debug!(target: "tool", "{program}: {}", stderr.trim_end());
        }

        Ok(ToolResult {
            exit_code: status.and_then(|status| status.code()),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr,
            simulated: false,
            timed_out: status.is_none(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn captures_streams_and_exit_code() {
        let invocation = Invocation::new("sh")
            .arg("-c")
            .arg("echo out; echo err >&2; exit 3");

        let result = SystemInvoker::new().run(&invocation).unwrap();

        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(!result.success());
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let invocation = Invocation::new("yap-backs-no-such-tool");

        let err = SystemInvoker::new().run(&invocation).unwrap_err();

        assert!(matches!(err, ToolLaunchError::Spawn { .. }));
    }

    #[test]
    fn compresses_stdout_into_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dump.sql.gz");
        let invocation = Invocation::new("sh")
            .arg("-c")
            .arg("echo 'CREATE TABLE t (id INT);'")
            .stdout(Output::GzipFile(dest.clone()));

        let result = SystemInvoker::new().run(&invocation).unwrap();
        assert!(result.success());
        assert!(result.stdout.is_empty());

        let mut decoded = String::new();
        GzDecoder::new(File::open(&dest).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "CREATE TABLE t (id INT);\n");
    }

    #[test]
    fn passes_environment() {
        let invocation = Invocation::new("sh")
            .arg("-c")
            .arg("printf %s \"$MYSQL_PWD\"")
            .env("MYSQL_PWD", "secret");

        let result = SystemInvoker::new().run(&invocation).unwrap();

        assert_eq!(result.stdout, "secret");
    }

    #[test]
    fn kills_process_after_timeout() {
        let invocation = Invocation::new("sleep").arg("5");

        let started = Instant::now();
        let result = SystemInvoker::with_timeout(Some(Duration::from_millis(200)))
            .run(&invocation)
            .unwrap();

        assert!(result.timed_out);
        assert!(!result.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
