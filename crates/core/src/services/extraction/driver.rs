use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::{HarnessConfig, HarnessLayout, ToolsConfig};
use crate::model::{NormalizeError, PackageRef};
use crate::services::bridge_file::{write_bridge_file, BridgeFileError};
use crate::services::extraction::artifact::{
    validate_artifact_file, BridgeArtifact, StrippedReason, Validation,
};
use crate::services::extraction::state::{transition, Action, Event, ExtractionState};
use crate::services::process::{ToolError, ToolInvocation, ToolRunner};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Package '{0}' has no version; extraction needs name:version")]
    UnversionedPackage(String),
    #[error("Install of {package} failed: {source}")]
    Install {
        package: String,
        #[source]
        source: ToolError,
    },
    #[error("Analysis of {package} failed: {source}")]
    Analyze {
        package: String,
        #[source]
        source: ToolError,
    },
    #[error("No installed module for {package} at {path}")]
    MissingInstall { package: String, path: PathBuf },
    #[error("Analyzer produced no usable artifact for {package} at {path}")]
    MissingArtifact { package: String, path: PathBuf },
    #[error("Bridges of {package} look stripped: {reason}")]
    StrippedArtifact { package: String, reason: StrippedReason },
    #[error("Cannot canonicalize bridges of {package}: {source}")]
    MalformedSymbol {
        package: String,
        #[source]
        source: NormalizeError,
    },
    #[error("{step} of {package} exceeded the {timeout:?} timeout")]
    Timeout { package: String, step: &'static str, timeout: Duration },
    #[error("Failed to write bridges of {package}: {source}")]
    BridgeFile {
        package: String,
        #[source]
        source: BridgeFileError,
    },
    #[error("I/O error while preparing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Extraction of {0} stopped in an unexpected state")]
    Aborted(String),
}

/// Successful extraction summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub bridges: usize,
    /// Whether a from-source rebuild was needed.
    pub rebuilt: bool,
    pub bridge_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ExtractOutcome {
    Extracted(ExtractReport),
    /// A canonical bridge file already existed and no rebuild was forced.
    Skipped,
}

/// Executor for the extraction state machine.
///
/// Performs the action chosen by [`transition`], turns its result into an
/// [`Event`], and repeats until a terminal state.
pub struct Extractor<'a> {
    layout: &'a HarnessLayout,
    tools: &'a ToolsConfig,
    runner: &'a dyn ToolRunner,
    timeout: Option<Duration>,
}

impl<'a> Extractor<'a> {
    pub fn new(
        config: &'a HarnessConfig,
        layout: &'a HarnessLayout,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self { layout, tools: &config.tools, runner, timeout: config.tool_timeout() }
    }

    /// Extract and persist the canonical bridge set of `pkg`.
    pub fn extract(
        &self,
        pkg: &PackageRef,
        force_rebuild: bool,
    ) -> Result<ExtractOutcome, ExtractError> {
        if pkg.version.is_none() {
            return Err(ExtractError::UnversionedPackage(pkg.raw_id()));
        }
        let bridge_file = self.layout.a_bridge_file(pkg);
        if bridge_file.exists() && !force_rebuild {
            tracing::info!(
                package = %pkg,
                path = %bridge_file.display(),
                "bridges already exist, skipping (use --always to recreate)"
            );
            return Ok(ExtractOutcome::Skipped);
        }

        tracing::info!(package = %pkg, "processing package");
        let mut state = ExtractionState::NotInstalled;
        let mut event = Event::Start;
        let mut last_error: Option<ExtractError> = None;
        let mut emitted: Option<usize> = None;
        let mut rebuilt = false;

        loop {
            let step = transition(state, event);
            tracing::debug!(package = %pkg, from = ?state, ?event, to = ?step.next, "transition");
            state = step.next;
            let Some(action) = step.action else { break };

            // Reuse earlier installs/artifacts only on the first pass.
            let reuse = !force_rebuild && !state.is_rebuild();
            event = match action {
                Action::Install { from_source } => match self.install(pkg, from_source, reuse) {
                    Ok(()) => Event::InstallSucceeded,
                    Err(e) => {
                        last_error = Some(e);
                        Event::InstallFailed
                    }
                },
                Action::PurgeAndRebuild => {
                    tracing::warn!(package = %pkg, "reinstalling from source");
                    rebuilt = true;
                    match self.purge_artifacts(pkg).and_then(|()| self.install(pkg, true, false)) {
                        Ok(()) => Event::InstallSucceeded,
                        Err(e) => {
                            last_error = Some(e);
                            Event::InstallFailed
                        }
                    }
                }
                Action::Analyze => match self.analyze(pkg, reuse) {
                    Ok(()) => Event::AnalyzeSucceeded,
                    Err(e) => {
                        tracing::warn!(package = %pkg, error = %e, "bridge generation failed");
                        last_error = Some(e);
                        Event::AnalyzeFailed
                    }
                },
                Action::Validate => match self.validate(pkg) {
                    Ok(()) => Event::ValidationPassed,
                    Err(e) => {
                        tracing::warn!(package = %pkg, error = %e, "artifact failed validation");
                        last_error = Some(e);
                        Event::ValidationFailed
                    }
                },
                Action::Emit => match self.emit(pkg) {
                    Ok(n) => {
                        emitted = Some(n);
                        Event::Emitted
                    }
                    Err(e) => {
                        last_error = Some(e);
                        Event::EmitFailed
                    }
                },
            };
        }

        match (state, emitted) {
            (ExtractionState::Done, Some(bridges)) => {
                tracing::info!(package = %pkg, bridges, rebuilt, "bridges written");
                Ok(ExtractOutcome::Extracted(ExtractReport { bridges, rebuilt, bridge_file }))
            }
            _ => {
                let err = last_error.unwrap_or_else(|| ExtractError::Aborted(pkg.raw_id()));
                tracing::error!(package = %pkg, error = %err, "extraction failed");
                self.release_failed(pkg, force_rebuild);
                Err(err)
            }
        }
    }

    fn install(
        &self,
        pkg: &PackageRef,
        from_source: bool,
        reuse: bool,
    ) -> Result<(), ExtractError> {
        let dir = self.layout.package_install_dir(pkg);
        if reuse && dir.is_dir() {
            tracing::info!(package = %pkg, path = %dir.display(), "reusing existing install");
            return Ok(());
        }
        if dir.exists() {
            remove_dir(&dir)?;
        }
        fs::create_dir_all(&dir)
            .map_err(|source| ExtractError::Io { path: dir.clone(), source })?;

        let mut invocation =
            ToolInvocation::from_command(&self.tools.package_manager).arg("install");
        if from_source {
            invocation = invocation.arg("--build-from-source");
        }
        let invocation = invocation
            .arg("--prefix")
            .arg(dir.display().to_string())
            .arg(pkg.install_spec())
            .timeout(self.timeout);
        tracing::info!(package = %pkg, from_source, command = %invocation, "installing");

        let result = match self.runner.run(&invocation) {
            Ok(output) if output.success() => return Ok(()),
            Ok(output) => {
                tracing::info!(
                    package = %pkg,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "install output"
                );
                Err(ExtractError::Install {
                    package: pkg.raw_id(),
                    source: ToolError::non_zero(&invocation.program, output),
                })
            }
            Err(ToolError::TimeoutExceeded { timeout, .. }) => {
                Err(ExtractError::Timeout { package: pkg.raw_id(), step: "install", timeout })
            }
            Err(source) => Err(ExtractError::Install { package: pkg.raw_id(), source }),
        };
        // Never leave a half-installed tree behind for the next run to reuse.
        if dir.exists() {
            remove_dir(&dir)?;
        }
        result
    }

    fn analyze(&self, pkg: &PackageRef, reuse: bool) -> Result<(), ExtractError> {
        let artifact = self.layout.package_artifact_path(pkg);
        if reuse && artifact.is_file() {
            tracing::info!(
                package = %pkg,
                path = %artifact.display(),
                "reusing existing artifact"
            );
            return Ok(());
        }
        let module_dir = self.layout.package_module_dir(pkg);
        if !self.layout.package_install_dir(pkg).is_dir() {
            return Err(ExtractError::MissingInstall { package: pkg.raw_id(), path: module_dir });
        }
        let artifact_dir = self.layout.package_artifact_dir(pkg);
        fs::create_dir_all(&artifact_dir)
            .map_err(|source| ExtractError::Io { path: artifact_dir.clone(), source })?;

        let invocation = ToolInvocation::from_command(&self.tools.analyzer)
            .arg("-r")
            .arg(module_dir.display().to_string())
            .arg("-o")
            .arg(artifact.display().to_string())
            .timeout(self.timeout);
        tracing::info!(package = %pkg, command = %invocation, "generating bridges");

        match self.runner.run(&invocation) {
            Ok(output) if output.success() => {
                tracing::debug!(
                    package = %pkg,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "analyzer output"
                );
                Ok(())
            }
            Ok(output) => {
                tracing::warn!(
                    package = %pkg,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "analyzer output"
                );
                Err(ExtractError::Analyze {
                    package: pkg.raw_id(),
                    source: ToolError::non_zero(&invocation.program, output),
                })
            }
            Err(ToolError::TimeoutExceeded { timeout, .. }) => {
                Err(ExtractError::Timeout { package: pkg.raw_id(), step: "analyze", timeout })
            }
            Err(source) => Err(ExtractError::Analyze { package: pkg.raw_id(), source }),
        }
    }

    fn validate(&self, pkg: &PackageRef) -> Result<(), ExtractError> {
        let path = self.layout.package_artifact_path(pkg);
        tracing::info!(package = %pkg, "checking bridges, ensuring not failed/stripped");
        match validate_artifact_file(&path) {
            Validation::Valid => Ok(()),
            Validation::Stripped(reason) => {
                Err(ExtractError::StrippedArtifact { package: pkg.raw_id(), reason })
            }
            Validation::Missing => {
                Err(ExtractError::MissingArtifact { package: pkg.raw_id(), path })
            }
        }
    }

    /// Canonicalize the validated artifact and write the bridge file.
    fn emit(&self, pkg: &PackageRef) -> Result<usize, ExtractError> {
        let path = self.layout.package_artifact_path(pkg);
        let artifact = BridgeArtifact::load(&path)
            .ok_or_else(|| ExtractError::MissingArtifact { package: pkg.raw_id(), path })?;
        let bridges = artifact
            .canonical_bridges()
            .map_err(|source| ExtractError::MalformedSymbol { package: pkg.raw_id(), source })?;
        write_bridge_file(&self.layout.a_bridge_file(pkg), &bridges)
            .map_err(|source| ExtractError::BridgeFile { package: pkg.raw_id(), source })?;
        Ok(bridges.len())
    }

    /// Drop the install sandbox of a failed package and, on a forced run, the
    /// bridge file left over from an earlier extraction.
    fn release_failed(&self, pkg: &PackageRef, force_rebuild: bool) {
        let install = self.layout.package_install_dir(pkg);
        if install.exists() {
            if let Err(e) = remove_dir(&install) {
                tracing::warn!(package = %pkg, error = %e, "could not remove install dir");
            }
        }
        let stale = self.layout.a_bridge_file(pkg);
        if force_rebuild && stale.exists() {
            match fs::remove_file(&stale) {
                Ok(()) => tracing::warn!(
                    package = %pkg,
                    path = %stale.display(),
                    "removed bridges of an earlier run"
                ),
                Err(e) => tracing::warn!(
                    package = %pkg,
                    path = %stale.display(),
                    error = %e,
                    "could not remove bridges of an earlier run"
                ),
            }
        }
    }

    fn purge_artifacts(&self, pkg: &PackageRef) -> Result<(), ExtractError> {
        let dir = self.layout.package_artifact_dir(pkg);
        if dir.exists() {
            remove_dir(&dir)?;
        }
        Ok(())
    }
}

fn remove_dir(path: &Path) -> Result<(), ExtractError> {
    fs::remove_dir_all(path)
        .map_err(|source| ExtractError::Io { path: path.to_path_buf(), source })
}
