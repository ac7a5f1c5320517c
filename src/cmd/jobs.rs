use std::{fmt, process::ExitStatus};

use crate::process::child::StageChild;

/// A detached stage that has terminated and been reaped.
#[derive(Debug)]
pub struct Finished {
    pub pid: Option<u32>,
    pub program: String,
    /// `None` when the process could not be queried.
    pub status: Option<ExitStatus>,
}

impl fmt::Display for Finished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "[{pid}] done {}", self.program)?,
            None => write!(f, "[?] done {}", self.program)?,
        }
        match self.status.and_then(|status| status.code()) {
            Some(0) | None => Ok(()),
            Some(code) => write!(f, " (exit {code})"),
        }
    }
}

/// Processes the orchestrator launched but does not wait on.
#[derive(Debug, Default)]
pub struct Jobs {
    running: Vec<StageChild>,
}

impl Jobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adopt(&mut self, child: StageChild) {
        debug!(pid = ?child.pid(), program = child.program(), "tracking detached stage");
        self.running.push(child);
    }

    /// Collects every detached process that has exited, without blocking.
    pub fn reap(&mut self) -> Vec<Finished> {
        let mut finished = Vec::new();

        self.running.retain_mut(|child| {
            let status = match child.try_wait() {
                Ok(None) => return true,
                Ok(Some(status)) => Some(status),
                Err(err) => {
                    warn!(pid = ?child.pid(), "failed to poll detached stage: {err}");
                    None
                }
            };

            info!(pid = ?child.pid(), program = child.program(), ?status, "reaped");
            finished.push(Finished {
                pid: child.pid(),
                program: child.program().to_owned(),
                status,
            });
            false
        });

        finished
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}
