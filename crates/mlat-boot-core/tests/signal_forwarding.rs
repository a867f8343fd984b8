//! Supervised handoff forwards termination signals to the server.
//!
//! Kept in its own test binary: it signals the test process itself.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use mlat_boot_core::{LaunchRequest, Launcher, SupervisedLauncher};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

const TRAPPING_SERVER: &str = r#"#!/bin/sh
trap 'echo term > got_term; exit 42' TERM
touch ready
while :; do sleep 0.05; done
"#;

#[tokio::test]
async fn test_sigterm_reaches_supervised_server() {
    let dir = tempfile::tempdir().unwrap();
    let server = dir.path().join("mlat-server");
    std::fs::write(&server, TRAPPING_SERVER).unwrap();
    std::fs::set_permissions(&server, std::fs::Permissions::from_mode(0o755)).unwrap();

    let request = LaunchRequest {
        program: server,
        args: vec![],
        work_dir: dir.path().to_path_buf(),
    };
    let handle = tokio::spawn(async move { SupervisedLauncher::default().launch(request).await });

    // The launcher installs its handlers before spawning, so once the
    // server is up a SIGTERM to this process is caught and forwarded.
    let ready = dir.path().join("ready");
    let mut waited = Duration::ZERO;
    while !ready.exists() {
        assert!(waited < Duration::from_secs(10), "server never became ready");
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }

    kill(Pid::this(), Signal::SIGTERM).unwrap();

    let code = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("server did not exit after SIGTERM")
        .expect("launcher task panicked")
        .expect("launch failed");

    assert_eq!(code, 42);
    assert!(dir.path().join("got_term").exists());
}
