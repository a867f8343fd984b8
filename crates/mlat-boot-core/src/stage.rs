//! Build stage definitions.

use serde::{Deserialize, Serialize};

/// Configuration for the native extension build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildStage {
    /// Human-readable stage name.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Timeout in seconds; 0 waits indefinitely.
    pub timeout_secs: u64,
}

impl BuildStage {
    /// The default mlat-server build: `python3 setup.py build_ext --inplace`.
    pub fn setuptools_inplace() -> Self {
        Self {
            name: "build_ext".to_string(),
            command: ["python3", "setup.py", "build_ext", "--inplace"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: 0,
        }
    }

    /// Create a custom build stage.
    pub fn custom(name: String, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            command,
            timeout_secs,
        }
    }

    /// Executable and arguments, or `None` for an empty command.
    pub fn split_command(&self) -> Option<(&str, &[String])> {
        self.command
            .split_first()
            .map(|(exe, args)| (exe.as_str(), args))
    }
}
