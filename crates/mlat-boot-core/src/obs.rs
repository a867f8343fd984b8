//! Structured lifecycle events for the boot sequence.
//!
//! Every event carries an `event` field (`boot.started`, `boot.phase_finished`,
//! ...) so log pipelines can filter on it. With `MLAT_BOOT_LOG_FORMAT=json`
//! these become one JSON object per line.

use tracing::{error, info, warn};

/// Span tagging everything logged during one boot with its id.
pub fn boot_span(boot_id: &str) -> tracing::Span {
    tracing::info_span!("mlat_boot", boot_id = %boot_id)
}

pub fn emit_boot_started(boot_id: &str, work_dir: &str, arg_count: usize) {
    info!(
        event = "boot.started",
        boot_id = %boot_id,
        work_dir = %work_dir,
        arg_count = arg_count,
    );
}

pub fn emit_phase_started(phase: &str) {
    info!(event = "boot.phase_started", phase = %phase);
}

pub fn emit_phase_finished(phase: &str, duration_ms: u64, success: bool) {
    info!(
        event = "boot.phase_finished",
        phase = %phase,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Summary of the reset phase. Failures are suppressed, so this is the only
/// place a masked permission problem becomes visible.
pub fn emit_reset_summary(removed: usize, failures: usize) {
    if failures > 0 {
        warn!(
            event = "boot.reset_summary",
            removed = removed,
            failures = failures,
            "Artifact reset finished with suppressed failures"
        );
    } else {
        info!(event = "boot.reset_summary", removed = removed, failures = 0);
    }
}

pub fn emit_stale_artifacts(count: usize) {
    warn!(
        event = "boot.stale_artifacts",
        count = count,
        "Artifacts older than this build survived the reset"
    );
}

pub fn emit_state_dir_unwritable(path: &str, reason: &str) {
    warn!(
        event = "boot.state_dir_unwritable",
        path = %path,
        reason = %reason,
        "Persisted state directory is not writable; the server may fail to save state"
    );
}

pub fn emit_handoff(target: &str, mode: &str, prepare_ms: u64) {
    info!(
        event = "boot.handoff",
        target = %target,
        mode = %mode,
        prepare_ms = prepare_ms,
    );
}

pub fn emit_boot_failed(phase: &str, exit_code: i32, err: &dyn std::fmt::Display) {
    error!(
        event = "boot.failed",
        phase = %phase,
        exit_code = exit_code,
        error = %err,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_events_carry_boot_id() {
        let _span = boot_span("test-boot-id").entered();
        emit_phase_started("reset");
        emit_reset_summary(2, 1);

        assert!(logs_contain("boot_id=test-boot-id"));
        assert!(logs_contain("boot.reset_summary"));
        assert!(logs_contain("failures=1"));
        assert!(logs_contain("suppressed failures"));
    }

    #[traced_test]
    #[test]
    fn test_clean_reset_summary() {
        emit_reset_summary(3, 0);

        assert!(logs_contain("removed=3"));
        assert!(!logs_contain("suppressed failures"));
    }
}
