//! Boot sequence driver: preflight, artifact reset, build, handoff.
//!
//! Phases run strictly in order. Reset never fails the sequence; a failed
//! build makes the handoff unreachable.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::artifacts::{ArtifactSet, ResetReport};
use crate::config::BootConfig;
use crate::error::{BootError, Result};
use crate::handoff::{launcher_for, LaunchRequest, Launcher};
use crate::obs;
use crate::process::resolve_program;
use crate::runner::{BuildOutcome, BuildStep, CommandBuild};

/// File timestamps come from the kernel's coarse clock and can trail
/// `SystemTime::now()` slightly.
const MTIME_SLACK: Duration = Duration::from_secs(1);

/// Everything that happened before the handoff.
#[derive(Debug, Clone)]
pub struct PrepareReport {
    pub boot_id: String,

    pub started_at: DateTime<Utc>,

    pub reset: ResetReport,

    pub build: BuildOutcome,

    /// Artifacts that predate this run's build step.
    pub stale: Vec<PathBuf>,
}

/// The orchestrator.
pub struct BootSequence {
    config: BootConfig,
    build: Arc<dyn BuildStep>,
    launcher: Arc<dyn Launcher>,
    boot_id: String,
}

impl BootSequence {
    pub fn new(config: BootConfig, build: Arc<dyn BuildStep>, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            config,
            build,
            launcher,
            boot_id: Uuid::new_v4().to_string(),
        }
    }

    /// Wire the real toolchain and the configured launcher.
    pub fn from_config(config: BootConfig) -> Self {
        let build = Arc::new(CommandBuild::new(config.build.clone()));
        let launcher = launcher_for(config.handoff);
        Self::new(config, build, launcher)
    }

    pub fn boot_id(&self) -> &str {
        &self.boot_id
    }

    pub fn artifacts(&self) -> ArtifactSet {
        ArtifactSet::new(
            self.config.work_dir.clone(),
            self.config.artifact_patterns.clone(),
        )
    }

    /// Check the working directory and report on the persisted directory.
    ///
    /// The working directory must exist and accept writes. The persisted
    /// state directory belongs to the server, so problems there are only
    /// logged.
    pub fn preflight(&self) -> Result<()> {
        let work_dir = &self.config.work_dir;
        match std::fs::metadata(work_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(BootError::WorkDir {
                    path: work_dir.clone(),
                    reason: "not a directory".to_string(),
                })
            }
            Err(e) => {
                return Err(BootError::WorkDir {
                    path: work_dir.clone(),
                    reason: e.to_string(),
                })
            }
        }

        probe_writable(work_dir).map_err(|e| BootError::WorkDir {
            path: work_dir.clone(),
            reason: format!("not writable: {e}"),
        })?;

        let state = self.config.state_path();
        if state.is_dir() {
            if let Err(e) = probe_writable(&state) {
                obs::emit_state_dir_unwritable(&state.display().to_string(), &e.to_string());
            }
        } else {
            debug!(path = %state.display(), "Persisted state directory not present");
        }

        Ok(())
    }

    /// Artifact reset phase. Never fails.
    pub fn reset(&self) -> ResetReport {
        obs::emit_phase_started("reset");
        let start = Instant::now();

        let report = self.artifacts().reset();

        obs::emit_reset_summary(report.removed.len(), report.failures.len());
        obs::emit_phase_finished("reset", start.elapsed().as_millis() as u64, true);
        report
    }

    /// Build phase. Any failure is returned as an error.
    pub async fn build(&self) -> Result<BuildOutcome> {
        obs::emit_phase_started("build");
        let start = Instant::now();

        let outcome = match self.build.build(&self.config.work_dir).await {
            Ok(outcome) => outcome,
            Err(e) => {
                obs::emit_phase_finished("build", start.elapsed().as_millis() as u64, false);
                return Err(e);
            }
        };
        obs::emit_phase_finished("build", outcome.duration_ms, outcome.passed());

        if !outcome.passed() {
            return Err(BootError::BuildFailed {
                stage: self.build.name().to_string(),
                exit_code: outcome.exit_code,
            });
        }

        Ok(outcome)
    }

    /// Run every phase up to, but not including, the handoff.
    pub async fn prepare(&self) -> Result<PrepareReport> {
        let started_at = Utc::now();

        self.preflight()?;
        let reset = self.reset();

        let build_started = SystemTime::now();
        let build = self.build().await?;

        let cutoff = build_started.checked_sub(MTIME_SLACK).unwrap_or(build_started);
        let stale = self.artifacts().stale_since(cutoff);
        if !stale.is_empty() {
            obs::emit_stale_artifacts(stale.len());
        }

        Ok(PrepareReport {
            boot_id: self.boot_id.clone(),
            started_at,
            reset,
            build,
            stale,
        })
    }

    /// The launch request for `args`.
    pub fn launch_request(&self, args: Vec<OsString>) -> LaunchRequest {
        LaunchRequest {
            program: resolve_program(&self.config.work_dir, &self.config.target),
            args,
            work_dir: self.config.work_dir.clone(),
        }
    }

    /// Run the whole sequence and hand off to the target.
    ///
    /// With an exec launcher this only returns on failure. With a
    /// supervising launcher it returns the target's exit code.
    pub async fn run(&self, args: Vec<OsString>) -> Result<i32> {
        self.run_phases(args)
            .instrument(obs::boot_span(&self.boot_id))
            .await
    }

    async fn run_phases(&self, args: Vec<OsString>) -> Result<i32> {
        obs::emit_boot_started(
            &self.boot_id,
            &self.config.work_dir.display().to_string(),
            args.len(),
        );

        let result = self.prepare_and_launch(args).await;
        if let Err(e) = &result {
            obs::emit_boot_failed(e.phase(), e.exit_code(), e);
        }
        result
    }

    async fn prepare_and_launch(&self, args: Vec<OsString>) -> Result<i32> {
        let report = self.prepare().await?;

        let request = self.launch_request(args);
        let prepare_ms = (Utc::now() - report.started_at).num_milliseconds().max(0) as u64;
        obs::emit_handoff(
            &request.program.display().to_string(),
            self.launcher.mode().as_str(),
            prepare_ms,
        );

        Ok(self.launcher.launch(request).await?)
    }
}

/// Create and remove a probe file in `dir`.
fn probe_writable(dir: &Path) -> std::io::Result<()> {
    let probe = dir.join(format!(".mlat-boot-probe-{}", Uuid::new_v4()));
    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)?;
    std::fs::remove_file(&probe)
}
