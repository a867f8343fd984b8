//! Handoff: transfer control to the target server.
//!
//! [`ExecLauncher`] replaces the orchestrator's process image so the server
//! inherits its pid (pid 1 in a container) and receives lifecycle signals
//! directly. [`SupervisedLauncher`] keeps the orchestrator resident instead:
//! it spawns the server, forwards termination signals and exits with the
//! server's status, which looks the same from outside.
//!
//! Arguments are forwarded as `OsString`s, untouched.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::HandoffMode;
use crate::error::HandoffError;
use crate::process::status_code;

/// What to launch and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Resolved target executable.
    pub program: PathBuf,

    /// Arguments forwarded verbatim.
    pub args: Vec<OsString>,

    pub work_dir: PathBuf,
}

/// Hands control to the target server.
#[async_trait]
pub trait Launcher: Send + Sync {
    fn mode(&self) -> HandoffMode;

    /// Launch the target.
    ///
    /// A process-replacing launcher only returns on failure. A supervising
    /// launcher returns the target's exit code once it terminates.
    async fn launch(&self, request: LaunchRequest) -> Result<i32, HandoffError>;
}

/// Build the launcher for a configured mode.
pub fn launcher_for(mode: HandoffMode) -> Arc<dyn Launcher> {
    match mode {
        HandoffMode::Exec => Arc::new(ExecLauncher),
        HandoffMode::Supervise => Arc::new(SupervisedLauncher::default()),
    }
}

/// Replaces the current process image with the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecLauncher;

#[async_trait]
impl Launcher for ExecLauncher {
    fn mode(&self) -> HandoffMode {
        HandoffMode::Exec
    }

    #[cfg(unix)]
    async fn launch(&self, request: LaunchRequest) -> Result<i32, HandoffError> {
        use std::os::unix::process::CommandExt;

        debug!(program = %request.program.display(), "exec");
        let err = std::process::Command::new(&request.program)
            .args(&request.args)
            .current_dir(&request.work_dir)
            .exec();
        Err(HandoffError::from_io(request.program, err))
    }

    // No image replacement primitive: supervise instead.
    #[cfg(not(unix))]
    async fn launch(&self, request: LaunchRequest) -> Result<i32, HandoffError> {
        SupervisedLauncher::default().launch(request).await
    }
}

/// Spawns the target and stays resident as a signal-forwarding parent.
#[derive(Debug, Clone)]
pub struct SupervisedLauncher {
    #[cfg(unix)]
    forwarded: Vec<nix::sys::signal::Signal>,
}

impl Default for SupervisedLauncher {
    fn default() -> Self {
        Self {
            #[cfg(unix)]
            forwarded: signals::DEFAULT_FORWARDED.to_vec(),
        }
    }
}

#[async_trait]
impl Launcher for SupervisedLauncher {
    fn mode(&self) -> HandoffMode {
        HandoffMode::Supervise
    }

    async fn launch(&self, request: LaunchRequest) -> Result<i32, HandoffError> {
        // Handlers go in before the spawn so no signal is lost in between.
        #[cfg(unix)]
        let forwarder = signals::Forwarder::install(&self.forwarded)
            .map_err(|e| HandoffError::Supervise(format!("installing signal handlers: {e}")))?;

        let child = tokio::process::Command::new(&request.program)
            .args(&request.args)
            .current_dir(&request.work_dir)
            .spawn()
            .map_err(|e| HandoffError::from_io(request.program.clone(), e))?;

        #[cfg(unix)]
        let code = supervise(child, forwarder).await?;
        #[cfg(not(unix))]
        let code = wait(child).await?;

        Ok(code)
    }
}

async fn wait(mut child: tokio::process::Child) -> Result<i32, HandoffError> {
    let status = child
        .wait()
        .await
        .map_err(|e| HandoffError::Supervise(e.to_string()))?;
    Ok(status_code(status))
}

#[cfg(unix)]
async fn supervise(
    mut child: tokio::process::Child,
    mut forwarder: signals::Forwarder,
) -> Result<i32, HandoffError> {
    let Some(pid) = child.id() else {
        return wait(child).await;
    };
    debug!(pid = pid, "Supervising target");

    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| HandoffError::Supervise(e.to_string()))?;
                return Ok(status_code(status));
            }
            Some(signal) = forwarder.recv() => {
                signals::forward(pid, signal);
            }
        }
    }
}

#[cfg(unix)]
mod signals {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use tokio::signal::unix::{signal, SignalKind};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tracing::{debug, info};

    pub const DEFAULT_FORWARDED: &[Signal] = &[
        Signal::SIGTERM,
        Signal::SIGINT,
        Signal::SIGHUP,
        Signal::SIGQUIT,
        Signal::SIGUSR1,
        Signal::SIGUSR2,
    ];

    /// Listens for a set of signals and funnels them into one channel.
    pub struct Forwarder {
        rx: mpsc::UnboundedReceiver<Signal>,
        tasks: Vec<JoinHandle<()>>,
    }

    impl Forwarder {
        pub fn install(forwarded: &[Signal]) -> std::io::Result<Self> {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut tasks = Vec::with_capacity(forwarded.len());

            for &sig in forwarded {
                let mut stream = signal(SignalKind::from_raw(sig as i32))?;
                let tx = tx.clone();
                tasks.push(tokio::spawn(async move {
                    while stream.recv().await.is_some() {
                        if tx.send(sig).is_err() {
                            break;
                        }
                    }
                }));
            }

            Ok(Self { rx, tasks })
        }

        pub async fn recv(&mut self) -> Option<Signal> {
            self.rx.recv().await
        }
    }

    impl Drop for Forwarder {
        fn drop(&mut self) {
            for task in &self.tasks {
                task.abort();
            }
        }
    }

    pub fn forward(pid: u32, sig: Signal) {
        info!(event = "boot.signal_forwarded", signal = %sig, pid = pid);
        if let Err(e) = kill(Pid::from_raw(pid as i32), sig) {
            // ESRCH: the target is already gone; wait() will report it.
            debug!(signal = %sig, error = %e, "Signal not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launcher_for_mode() {
        assert_eq!(launcher_for(HandoffMode::Exec).mode(), HandoffMode::Exec);
        assert_eq!(
            launcher_for(HandoffMode::Supervise).mode(),
            HandoffMode::Supervise
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervised_propagates_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let request = LaunchRequest {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "exit 5".into()],
            work_dir: dir.path().to_path_buf(),
        };

        let code = SupervisedLauncher::default().launch(request).await.unwrap();
        assert_eq!(code, 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervised_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let request = LaunchRequest {
            program: dir.path().join("mlat-server"),
            args: vec![],
            work_dir: dir.path().to_path_buf(),
        };

        let err = SupervisedLauncher::default()
            .launch(request)
            .await
            .unwrap_err();
        assert!(matches!(err, HandoffError::NotFound(_)));
        assert_eq!(err.exit_code(), 127);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervised_non_executable_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mlat-server");
        std::fs::write(&target, b"#!/bin/sh\nexit 0\n").unwrap();

        let request = LaunchRequest {
            program: target,
            args: vec![],
            work_dir: dir.path().to_path_buf(),
        };

        let err = SupervisedLauncher::default()
            .launch(request)
            .await
            .unwrap_err();
        assert!(matches!(err, HandoffError::NotExecutable(_)));
        assert_eq!(err.exit_code(), 126);
    }
}
