//! Error taxonomy for the boot sequence.
//!
//! Cleanup failures never show up here: the reset phase records them in its
//! report and carries on. Everything in [`BootError`] is fatal and maps to a
//! process exit status through [`BootError::exit_code`].

use std::path::PathBuf;

use thiserror::Error;

/// Exit status used when the build toolchain exceeds its timeout.
pub const EXIT_TIMEOUT: i32 = 124;

/// Exit status used when a program exists but cannot be executed.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Exit status used when a program cannot be found.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit status used for invalid configuration.
pub const EXIT_CONFIG: i32 = 2;

/// Invalid configuration values read from the environment.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set to an unparseable value.
    #[error("{var}: invalid value {value:?}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// A variable that must not be blank was blank.
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Failures launching the target server.
#[derive(Error, Debug)]
pub enum HandoffError {
    /// The target executable does not exist.
    #[error("target {0} not found")]
    NotFound(PathBuf),

    /// The target exists but cannot be executed.
    #[error("target {0} is not executable")]
    NotExecutable(PathBuf),

    /// Any other exec/spawn failure.
    #[error("failed to launch {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Supervision of a spawned target failed.
    #[error("failed to supervise target: {0}")]
    Supervise(String),
}

impl HandoffError {
    /// Classify an I/O error raised while exec'ing or spawning `path`.
    pub fn from_io(path: PathBuf, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => HandoffError::NotFound(path),
            std::io::ErrorKind::PermissionDenied => HandoffError::NotExecutable(path),
            _ => HandoffError::Launch { path, source: err },
        }
    }

    /// Exit status for this failure (shell conventions).
    pub fn exit_code(&self) -> i32 {
        match self {
            HandoffError::NotFound(_) => EXIT_NOT_FOUND,
            HandoffError::NotExecutable(_) => EXIT_NOT_EXECUTABLE,
            HandoffError::Launch { .. } | HandoffError::Supervise(_) => 1,
        }
    }
}

/// Fatal boot sequence errors.
#[derive(Error, Debug)]
pub enum BootError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("working directory {path}: {reason}")]
    WorkDir { path: PathBuf, reason: String },

    /// The toolchain ran and reported failure.
    #[error("build {stage} exited with code {exit_code}")]
    BuildFailed { stage: String, exit_code: i32 },

    /// The toolchain could not be started or waited on.
    #[error("build {stage} could not be run: {source}")]
    BuildSpawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build {stage} timed out after {timeout_secs}s")]
    BuildTimeout { stage: String, timeout_secs: u64 },

    #[error("build stage {0} has an empty command")]
    EmptyBuildCommand(String),

    #[error("handoff failed: {0}")]
    Handoff(#[from] HandoffError),
}

impl BootError {
    /// Process exit status for this failure.
    ///
    /// A failed build propagates the toolchain's own status so the container
    /// exit code points at the phase that broke.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootError::Config(_) => EXIT_CONFIG,
            BootError::WorkDir { .. } => 1,
            BootError::BuildFailed { exit_code, .. } => {
                if *exit_code == 0 {
                    1
                } else {
                    *exit_code
                }
            }
            BootError::BuildSpawn { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => EXIT_NOT_FOUND,
                std::io::ErrorKind::PermissionDenied => EXIT_NOT_EXECUTABLE,
                _ => 1,
            },
            BootError::BuildTimeout { .. } => EXIT_TIMEOUT,
            BootError::EmptyBuildCommand(_) => EXIT_CONFIG,
            BootError::Handoff(err) => err.exit_code(),
        }
    }

    /// Name of the phase that produced this error.
    pub fn phase(&self) -> &'static str {
        match self {
            BootError::Config(_) | BootError::WorkDir { .. } => "preflight",
            BootError::BuildFailed { .. }
            | BootError::BuildSpawn { .. }
            | BootError::BuildTimeout { .. }
            | BootError::EmptyBuildCommand(_) => "build",
            BootError::Handoff(_) => "handoff",
        }
    }
}

/// Result type for boot operations.
pub type Result<T> = std::result::Result<T, BootError>;
