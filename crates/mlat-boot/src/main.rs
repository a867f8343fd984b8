//! mlat-boot - container entrypoint for mlat-server
//!
//! ```text
//! mlat-boot [SERVER ARGS...]
//! ```
//!
//! Deletes stale native build output, rebuilds the extensions in place and
//! then execs the server with every argument passed through untouched. The
//! entrypoint has no flags of its own; see `MLAT_BOOT_*` environment
//! variables in `mlat_boot_core::config`.

use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::{Context, Result};
use mlat_boot_core::error::EXIT_CONFIG;
use mlat_boot_core::{init_tracing, BootConfig, BootSequence};
use tracing::{debug, error, Level};

fn main() -> ExitCode {
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();

    let config = match BootConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(Default::default(), Level::INFO);
            error!(event = "boot.failed", phase = "preflight", error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_CONFIG as u8);
        }
    };
    init_tracing(config.log_format, Level::INFO);

    match run(config, args) {
        Ok(code) => exit_code(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "mlat-boot aborted");
            ExitCode::FAILURE
        }
    }
}

/// Drive the boot sequence on a single-threaded runtime.
///
/// Returns the process exit status: the failing phase's code, or the
/// target's own status in supervised mode.
fn run(config: BootConfig, args: Vec<OsString>) -> Result<i32> {
    if let Ok(effective) = serde_json::to_string(&config) {
        debug!(config = %effective, "Effective configuration");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let sequence = BootSequence::from_config(config);
    let code = runtime.block_on(async {
        match sequence.run(args).await {
            Ok(code) => code,
            Err(e) => e.exit_code(),
        }
    });

    Ok(code)
}

/// Clamp an i32 status into the 0..=255 range a process can report.
fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
