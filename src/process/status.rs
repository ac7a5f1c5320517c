use std::process::ExitStatus;

/// Exit code reported for a stage whose program could not be executed.
pub const EXEC_FAILURE_CODE: i32 = 127;

/// What became of one stage once the orchestrator is done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Exited(ExitStatus),
    /// Detached; carries the pid handed to the job registry.
    Background(Option<u32>),
    ExecFailed,
}

impl From<ExitStatus> for StageStatus {
    fn from(value: ExitStatus) -> Self {
        Self::Exited(value)
    }
}

impl StageStatus {
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(status) => status.code(),
            Self::Background(_) => None,
            Self::ExecFailed => Some(EXEC_FAILURE_CODE),
        }
    }

    pub fn success(&self) -> bool {
        match self {
            Self::Exited(status) => status.success(),
            Self::Background(_) => true,
            Self::ExecFailed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;

    use super::*;

    #[test]
    fn exit_codes() {
        let ok = StageStatus::from(ExitStatus::from_raw(0));
        assert!(ok.success());
        assert_eq!(ok.code(), Some(0));

        // wait status encoding: exit code lives in the second byte
        let failed = StageStatus::from(ExitStatus::from_raw(3 << 8));
        assert!(!failed.success());
        assert_eq!(failed.code(), Some(3));
    }

    #[test]
    fn exec_failure_looks_like_command_not_found() {
        assert_eq!(StageStatus::ExecFailed.code(), Some(127));
        assert!(!StageStatus::ExecFailed.success());
    }

    #[test]
    fn background_has_no_code() {
        let status = StageStatus::Background(Some(42));
        assert!(status.success());
        assert_eq!(status.code(), None);
    }
}
