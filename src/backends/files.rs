//! Implements archiving of file system paths using [FileBackup].

use std::path::{Path, PathBuf};

use super::{prepare_destination, settle, Backup, RunContext};
use crate::config::ToolsConfig;
use crate::report::OperationOutcome;
use crate::tool::{Invocation, ToolInvoker};
use crate::util::path::{self, UnitKind};

const TARGET: &str = "backend::files";

/// The [FileBackup] backend packs every configured path into a gzipped tarball.
///
/// Tarballs land directly in the year directory, named after the sanitized
/// source path. Inside the archive the source keeps only its last path
/// component, e.g. `/etc/nginx` is stored as `nginx/`.
pub struct FileBackup<'a> {
    sources: &'a [PathBuf],
    tar: &'a str,
}

impl<'a> FileBackup<'a> {
    pub fn new(sources: &'a [PathBuf], tools: &'a ToolsConfig) -> Self {
        Self {
            sources,
            tar: &tools.tar,
        }
    }

    /// Invocation archiving `source` into `tarball`.
    ///
    /// [None] if `source` has no final component to archive (`/`, `..`).
    pub fn archive_invocation(&self, source: &Path, tarball: &Path) -> Option<Invocation> {
        let name = source.file_name()?;
        let parent = source.parent()?;

        let invocation = Invocation::new(self.tar)
            .arg("-czf")
            .arg(tarball.to_string_lossy())
            .arg("-C")
            .arg(parent.to_string_lossy())
            .arg(name.to_string_lossy());
        Some(invocation)
    }

    fn archive(
        &self,
        invoker: &dyn ToolInvoker,
        run: &RunContext<'_>,
        source: &Path,
    ) -> OperationOutcome {
        let unit = source.to_string_lossy();
        let destination = match path::resolve(run.root, UnitKind::Path, &unit, run.timestamp) {
            Ok(destination) => destination,
            Err(e) => {
                log::error!(target: TARGET, "Backup of {unit} failed: {e}");
                return OperationOutcome::failed(unit, None, e.to_string());
            }
        };
        let tarball = destination.path();

        // checked on dry runs too, it is read-only
        if !source.exists() {
            log::error!(target: TARGET, "Source {unit} does not exist");
            return OperationOutcome::failed(
                unit,
                Some(tarball),
                format!("Source path does not exist: {}", source.display()),
            );
        }

        let Some(invocation) = self.archive_invocation(source, &tarball) else {
            log::error!(target: TARGET, "Source {unit} can't be archived");
            return OperationOutcome::failed(
                unit,
                Some(tarball),
                format!("Source path has no name to archive: {}", source.display()),
            );
        };

        if !run.dry_run {
            if let Err(e) = prepare_destination(TARGET, &destination) {
                log::error!(target: TARGET, "Backup of {unit} failed: {e}");
                return OperationOutcome::failed(unit, Some(tarball), e.to_string());
            }
        }

        log::info!(target: TARGET, "Archiving {unit}");
        let result = invoker.invoke(&invocation, run.dry_run);

        settle(TARGET, &unit, &destination, result)
    }
}

impl Backup for FileBackup<'_> {
    fn backup(&self, invoker: &dyn ToolInvoker, run: &RunContext<'_>) -> Vec<OperationOutcome> {
        if self.sources.is_empty() {
            log::debug!(target: TARGET, "No file sources configured, skipping");
            return Vec::new();
        }

        let outcomes: Vec<_> = self
            .sources
            .iter()
            .map(|source| self.archive(invoker, run, source))
            .collect();

        log::info!(target: TARGET, "Finished {} archive(s)", outcomes.len());
        outcomes
    }
}
