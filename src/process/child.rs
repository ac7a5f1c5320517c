use std::{io, process::ExitStatus};

use tokio::process::Child;

/// A launched stage, kept so it can be waited on or reaped later.
#[derive(Debug)]
pub struct StageChild {
    program: String,
    pid: Option<u32>,
    child: Child,
}

impl StageChild {
    pub fn new(program: impl Into<String>, child: Child) -> Self {
        Self {
            program: program.into(),
            pid: child.id(),
            child,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Pid at launch time. Stays available after the process is reaped.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Non-blocking; `Ok(None)` while the process is still running.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }
}
