//! mlat-boot core: the container entrypoint for mlat-server.
//!
//! On every container start the boot sequence
//!
//! 1. checks the working directory,
//! 2. deletes the previous native build output ([`artifacts`]),
//! 3. rebuilds the extensions in place ([`runner`]); a failure stops here,
//! 4. hands control to the server with the entrypoint's arguments untouched
//!    ([`handoff`]).
//!
//! ## Limitations
//!
//! The working directory and its artifacts are assumed to belong to one
//! container at a time. Two instances sharing a mutable working directory
//! will delete and rebuild each other's extensions; nothing here locks
//! against that.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod handoff;
pub mod obs;
pub mod process;
pub mod runner;
pub mod sequence;
pub mod stage;
pub mod telemetry;

pub use artifacts::{reset_artifacts, ArtifactSet, ResetFailure, ResetReport};
pub use config::{BootConfig, HandoffMode, LogFormat};
pub use error::{BootError, ConfigError, HandoffError, Result};
pub use handoff::{launcher_for, ExecLauncher, LaunchRequest, Launcher, SupervisedLauncher};
pub use runner::{BuildOutcome, BuildStep, CommandBuild};
pub use sequence::{BootSequence, PrepareReport};
pub use stage::BuildStage;
pub use telemetry::init_tracing;
