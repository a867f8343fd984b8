//! Build step execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{BootError, Result};
use crate::process::{resolve_program, status_code};
use crate::stage::BuildStage;

/// Result of a build execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Stage name.
    pub stage_name: String,

    /// Exit code (0 = success, 128 + signo for signal deaths).
    pub exit_code: i32,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl BuildOutcome {
    /// Whether this build passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Something that rebuilds native extensions in a working directory.
///
/// `Ok` with a failed outcome means the toolchain ran and reported failure;
/// `Err` means it could not be run at all.
#[async_trait]
pub trait BuildStep: Send + Sync {
    /// Stage name used in logs and errors.
    fn name(&self) -> &str;

    async fn build(&self, work_dir: &Path) -> Result<BuildOutcome>;
}

/// Runs an external toolchain command.
///
/// Stdout and stderr are inherited so compiler output lands in the
/// container log.
#[derive(Debug, Clone)]
pub struct CommandBuild {
    stage: BuildStage,
}

impl CommandBuild {
    pub fn new(stage: BuildStage) -> Self {
        Self { stage }
    }
}

#[async_trait]
impl BuildStep for CommandBuild {
    fn name(&self) -> &str {
        &self.stage.name
    }

    async fn build(&self, work_dir: &Path) -> Result<BuildOutcome> {
        let start = Instant::now();

        let (exe, args) = self
            .stage
            .split_command()
            .ok_or_else(|| BootError::EmptyBuildCommand(self.stage.name.clone()))?;
        let program = resolve_program(work_dir, Path::new(exe));

        debug!(stage = %self.stage.name, command = ?self.stage.command, "Spawning build");

        let mut child = Command::new(&program)
            .args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BootError::BuildSpawn {
                stage: self.stage.name.clone(),
                source,
            })?;

        let waited = if self.stage.timeout_secs > 0 {
            let limit = Duration::from_secs(self.stage.timeout_secs);
            let result = tokio::time::timeout(limit, child.wait()).await;
            match result {
                Ok(waited) => waited,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(stage = %self.stage.name, error = %e, "Failed to kill timed out build");
                    }
                    return Err(BootError::BuildTimeout {
                        stage: self.stage.name.clone(),
                        timeout_secs: self.stage.timeout_secs,
                    });
                }
            }
        } else {
            child.wait().await
        };

        let status = waited.map_err(|source| BootError::BuildSpawn {
            stage: self.stage.name.clone(),
            source,
        })?;

        Ok(BuildOutcome {
            stage_name: self.stage.name.clone(),
            exit_code: status_code(status),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(name: &str, script: &str, timeout_secs: u64) -> CommandBuild {
        CommandBuild::new(BuildStage::custom(
            name.to_string(),
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout_secs,
        ))
    }

    #[test]
    fn test_build_outcome_passed() {
        let outcome = BuildOutcome {
            stage_name: "build_ext".to_string(),
            exit_code: 0,
            duration_ms: 100,
        };
        assert!(outcome.passed());

        let failed = BuildOutcome {
            exit_code: 1,
            ..outcome.clone()
        };
        assert!(!failed.passed());

        let killed = BuildOutcome {
            exit_code: 128 + 9,
            ..outcome
        };
        assert!(!killed.passed());
    }

    #[tokio::test]
    async fn test_build_runs_in_work_dir() {
        let dir = tempdir().unwrap();
        let build = sh("touch", "touch built.so", 60);

        let outcome = build.build(dir.path()).await.expect("build failed to run");
        assert!(outcome.passed());
        assert!(dir.path().join("built.so").exists());
    }

    #[tokio::test]
    async fn test_build_failure_exit_code() {
        let dir = tempdir().unwrap();
        let build = sh("fail", "exit 7", 60);

        let outcome = build.build(dir.path()).await.expect("build failed to run");
        assert!(!outcome.passed());
        assert_eq!(outcome.exit_code, 7);
    }

    #[tokio::test]
    async fn test_missing_toolchain_is_spawn_error() {
        let dir = tempdir().unwrap();
        let build = CommandBuild::new(BuildStage::custom(
            "missing".to_string(),
            vec!["definitely-not-a-real-toolchain-3f1c".to_string()],
            0,
        ));

        let err = build.build(dir.path()).await.unwrap_err();
        assert!(matches!(err, BootError::BuildSpawn { .. }));
        assert_eq!(err.exit_code(), 127);
    }

    #[tokio::test]
    async fn test_empty_command() {
        let dir = tempdir().unwrap();
        let build = CommandBuild::new(BuildStage::custom("empty".to_string(), vec![], 0));

        let err = build.build(dir.path()).await.unwrap_err();
        assert!(matches!(err, BootError::EmptyBuildCommand(_)));
    }

    #[tokio::test]
    async fn test_build_timeout() {
        let dir = tempdir().unwrap();
        let build = sh("slow", "sleep 30", 1);

        let err = build.build(dir.path()).await.unwrap_err();
        assert!(matches!(err, BootError::BuildTimeout { timeout_secs: 1, .. }));
        assert_eq!(err.exit_code(), 124);
    }
}
