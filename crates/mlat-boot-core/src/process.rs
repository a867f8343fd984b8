//! Small helpers shared by the build runner and the launchers.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Resolve a program path against the working directory.
///
/// Bare names (`python3`) are left for `PATH` lookup. Relative paths with a
/// directory component (`./mlat-server`, `bin/server`) are joined onto
/// `work_dir`, since the child's working directory does not affect how the
/// parent locates the executable.
pub fn resolve_program(work_dir: &Path, program: &Path) -> PathBuf {
    let has_dir = program
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty());

    if program.is_absolute() || !has_dir {
        program.to_path_buf()
    } else {
        work_dir.join(program)
    }
}

/// Map an exit status onto a shell-style exit code.
///
/// Signal deaths become `128 + signo`.
pub fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_uses_path_lookup() {
        let resolved = resolve_program(Path::new("/app"), Path::new("python3"));
        assert_eq!(resolved, PathBuf::from("python3"));
    }

    #[test]
    fn test_relative_path_joins_work_dir() {
        let resolved = resolve_program(Path::new("/app"), Path::new("./mlat-server"));
        assert_eq!(resolved, PathBuf::from("/app/./mlat-server"));

        let resolved = resolve_program(Path::new("/app"), Path::new("bin/server"));
        assert_eq!(resolved, PathBuf::from("/app/bin/server"));
    }

    #[test]
    fn test_absolute_path_unchanged() {
        let resolved = resolve_program(Path::new("/app"), Path::new("/usr/bin/env"));
        assert_eq!(resolved, PathBuf::from("/usr/bin/env"));
    }

    #[cfg(unix)]
    #[test]
    fn test_status_code_for_signal() {
        use std::os::unix::process::ExitStatusExt;
        // SIGKILL raw wait status
        assert_eq!(status_code(ExitStatus::from_raw(9)), 137);
        // exit(3)
        assert_eq!(status_code(ExitStatus::from_raw(3 << 8)), 3);
    }
}
