//! Boot configuration.
//!
//! The orchestrator's own argv is forwarded untouched to the server, so all
//! settings come from `MLAT_BOOT_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::artifacts::check_pattern;
use crate::error::ConfigError;
use crate::stage::BuildStage;

pub const ENV_WORK_DIR: &str = "MLAT_BOOT_WORK_DIR";
pub const ENV_ARTIFACTS: &str = "MLAT_BOOT_ARTIFACTS";
pub const ENV_BUILD_COMMAND: &str = "MLAT_BOOT_BUILD_COMMAND";
pub const ENV_BUILD_TIMEOUT: &str = "MLAT_BOOT_BUILD_TIMEOUT";
pub const ENV_TARGET: &str = "MLAT_BOOT_TARGET";
pub const ENV_STATE_DIR: &str = "MLAT_BOOT_STATE_DIR";
pub const ENV_HANDOFF: &str = "MLAT_BOOT_HANDOFF";
pub const ENV_LOG_FORMAT: &str = "MLAT_BOOT_LOG_FORMAT";

pub const DEFAULT_WORK_DIR: &str = "/app";
pub const DEFAULT_TARGET: &str = "./mlat-server";
pub const DEFAULT_STATE_DIR: &str = "workdir";

/// Generated by `setup.py build_ext --inplace` for mlat-server.
pub const DEFAULT_ARTIFACTS: &[&str] = &["build", "modes_cython/*.c", "modes_cython/*.so", "*.so"];

/// How control is transferred to the target server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HandoffMode {
    /// Replace the orchestrator's process image.
    #[default]
    Exec,

    /// Spawn the target, forward signals, propagate its exit code.
    Supervise,
}

impl HandoffMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffMode::Exec => "exec",
            HandoffMode::Supervise => "supervise",
        }
    }
}

impl FromStr for HandoffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exec" => Ok(HandoffMode::Exec),
            "supervise" | "supervised" => Ok(HandoffMode::Supervise),
            other => Err(format!("expected exec or supervise, got {other}")),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected text or json, got {other}")),
        }
    }
}

/// Effective boot configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BootConfig {
    /// Root that every relative path resolves against.
    pub work_dir: PathBuf,

    /// Glob patterns, relative to `work_dir`, naming build output.
    pub artifact_patterns: Vec<String>,

    /// Build stage run after the reset.
    pub build: BuildStage,

    /// Server executable.
    pub target: PathBuf,

    /// Persisted state directory, relative to `work_dir` unless absolute.
    pub state_dir: PathBuf,

    pub handoff: HandoffMode,

    pub log_format: LogFormat,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            artifact_patterns: DEFAULT_ARTIFACTS.iter().map(|p| p.to_string()).collect(),
            build: BuildStage::setuptools_inplace(),
            target: PathBuf::from(DEFAULT_TARGET),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            handoff: HandoffMode::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl BootConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_WORK_DIR) {
            if dir.trim().is_empty() {
                return Err(ConfigError::Empty(ENV_WORK_DIR));
            }
            config.work_dir = PathBuf::from(dir);
        }

        if let Some(patterns) = lookup(ENV_ARTIFACTS) {
            config.artifact_patterns = parse_patterns(&patterns)?;
        }

        if let Some(command) = lookup(ENV_BUILD_COMMAND) {
            let command: Vec<String> = command.split_whitespace().map(String::from).collect();
            if command.is_empty() {
                return Err(ConfigError::Empty(ENV_BUILD_COMMAND));
            }
            config.build.command = command;
        }

        if let Some(timeout) = lookup(ENV_BUILD_TIMEOUT) {
            config.build.timeout_secs =
                timeout
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::InvalidValue {
                        var: ENV_BUILD_TIMEOUT,
                        value: timeout.clone(),
                        reason: e.to_string(),
                    })?;
        }

        if let Some(target) = lookup(ENV_TARGET) {
            if target.trim().is_empty() {
                return Err(ConfigError::Empty(ENV_TARGET));
            }
            config.target = PathBuf::from(target);
        }

        if let Some(state_dir) = lookup(ENV_STATE_DIR) {
            config.state_dir = PathBuf::from(state_dir);
        }

        if let Some(mode) = lookup(ENV_HANDOFF) {
            config.handoff = mode.parse().map_err(|reason| ConfigError::InvalidValue {
                var: ENV_HANDOFF,
                value: mode.clone(),
                reason,
            })?;
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.log_format = format.parse().map_err(|reason| ConfigError::InvalidValue {
                var: ENV_LOG_FORMAT,
                value: format.clone(),
                reason,
            })?;
        }

        Ok(config)
    }

    /// Persisted state directory resolved against the working directory.
    pub fn state_path(&self) -> PathBuf {
        self.work_dir.join(&self.state_dir)
    }
}

/// Split a comma-separated pattern list, dropping blank entries.
///
/// Patterns that could reach outside the working directory are rejected.
fn parse_patterns(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            check_pattern(p)
                .map(|()| p.to_string())
                .map_err(|reason| ConfigError::InvalidValue {
                    var: ENV_ARTIFACTS,
                    value: p.to_string(),
                    reason: reason.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = BootConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BootConfig::default());
        assert_eq!(config.work_dir, PathBuf::from("/app"));
        assert_eq!(config.target, PathBuf::from("./mlat-server"));
        assert_eq!(
            config.build.command,
            vec!["python3", "setup.py", "build_ext", "--inplace"]
        );
        assert_eq!(config.handoff, HandoffMode::Exec);
        assert_eq!(config.state_path(), PathBuf::from("/app/workdir"));
    }

    #[test]
    fn test_overrides() {
        let config = BootConfig::from_lookup(lookup(&[
            (ENV_WORK_DIR, "/srv/mlat"),
            (ENV_ARTIFACTS, " build , ,ext/*.so"),
            (ENV_BUILD_COMMAND, "make   -j4 ext"),
            (ENV_BUILD_TIMEOUT, "600"),
            (ENV_TARGET, "/usr/bin/mlat-server"),
            (ENV_HANDOFF, "Supervise"),
            (ENV_LOG_FORMAT, "json"),
        ]))
        .unwrap();

        assert_eq!(config.work_dir, PathBuf::from("/srv/mlat"));
        assert_eq!(config.artifact_patterns, vec!["build", "ext/*.so"]);
        assert_eq!(config.build.command, vec!["make", "-j4", "ext"]);
        assert_eq!(config.build.timeout_secs, 600);
        assert_eq!(config.target, PathBuf::from("/usr/bin/mlat-server"));
        assert_eq!(config.handoff, HandoffMode::Supervise);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_empty_artifact_list_is_allowed() {
        let config = BootConfig::from_lookup(lookup(&[(ENV_ARTIFACTS, "")])).unwrap();
        assert!(config.artifact_patterns.is_empty());
    }

    #[test]
    fn test_absolute_artifact_pattern_rejected() {
        let err = BootConfig::from_lookup(lookup(&[(ENV_ARTIFACTS, "build,/build")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var: ENV_ARTIFACTS, ref value, .. } if value == "/build"
        ));
    }

    #[test]
    fn test_parent_dir_artifact_pattern_rejected() {
        let err = BootConfig::from_lookup(lookup(&[(ENV_ARTIFACTS, "../*.so")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var: ENV_ARTIFACTS, .. }
        ));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = BootConfig::from_lookup(lookup(&[(ENV_BUILD_TIMEOUT, "soon")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: ENV_BUILD_TIMEOUT,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_handoff_mode() {
        let err = BootConfig::from_lookup(lookup(&[(ENV_HANDOFF, "fork")])).unwrap_err();
        assert!(err.to_string().contains("MLAT_BOOT_HANDOFF"));
    }

    #[test]
    fn test_blank_build_command_rejected() {
        let err = BootConfig::from_lookup(lookup(&[(ENV_BUILD_COMMAND, "   ")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty(ENV_BUILD_COMMAND));
    }

    #[test]
    fn test_blank_target_rejected() {
        let err = BootConfig::from_lookup(lookup(&[(ENV_TARGET, "")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty(ENV_TARGET));
    }
}
