use std::{
    fs::{File, OpenOptions},
    io,
    os::{fd::OwnedFd, unix::fs::OpenOptionsExt},
    path::Path,
    process::Stdio,
};

use nix::{errno::Errno, fcntl::OFlag, unistd::pipe2};
use thiserror::Error;

use self::{child::StageChild, search::SearchPath};

pub mod child;
pub mod search;
pub mod status;

/// Where a stage's standard input or output is attached.
///
/// Owning the descriptor means every path that drops a binding, error paths
/// included, also closes it.
#[derive(Debug)]
pub enum Binding {
    Inherit,
    Fd(OwnedFd),
}

impl Binding {
    /// Both ends are close-on-exec; only the copy installed on a child's
    /// standard descriptor survives the exec.
    pub fn pipe() -> nix::Result<(Binding, Binding)> {
        let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
        Ok((Self::Fd(read), Self::Fd(write)))
    }

    pub fn open_input(path: impl AsRef<Path>) -> io::Result<Binding> {
        File::open(path).map(Into::into)
    }

    pub fn create_output(path: impl AsRef<Path>) -> io::Result<Binding> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o666)
            .open(path)
            .map(Into::into)
    }

    pub fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }
}

impl From<File> for Binding {
    fn from(value: File) -> Self {
        Self::Fd(value.into())
    }
}

impl From<OwnedFd> for Binding {
    fn from(value: OwnedFd) -> Self {
        Self::Fd(value)
    }
}

impl From<Binding> for Stdio {
    fn from(value: Binding) -> Self {
        match value {
            Binding::Inherit => Stdio::inherit(),
            Binding::Fd(fd) => Stdio::from(fd),
        }
    }
}

#[derive(Debug, Error)]
pub enum SpawnError {
    /// The program itself could not be run. Only the stage is affected.
    #[error("{program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },
    /// Process creation failed outright.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

pub struct SpawnRequest<'a> {
    pub argv: &'a [String],
    pub stdin: Binding,
    pub stdout: Binding,
    pub search_path: &'a SearchPath,
}

/// Starts one pipeline stage as an OS process.
pub trait Spawner {
    fn spawn(&self, request: SpawnRequest<'_>) -> Result<StageChild, SpawnError>;
}

/// Spawns real processes with a cleared environment that only carries `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSpawner;

impl Spawner for OsSpawner {
    fn spawn(&self, request: SpawnRequest<'_>) -> Result<StageChild, SpawnError> {
        let Some((program, args)) = request.argv.split_first() else {
            return Err(SpawnError::Exec {
                program: String::new(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let Some(resolved) = request.search_path.resolve(program) else {
            return Err(SpawnError::Exec {
                program: program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "command not found"),
            });
        };

        let mut cmd = tokio::process::Command::new(&resolved);
        cmd.arg0(program)
            .args(args)
            .env_clear()
            .env("PATH", request.search_path.to_env())
            .stdin(request.stdin)
            .stdout(request.stdout)
            .stderr(Stdio::inherit());

        trace!(?cmd, "spawning stage");

        match cmd.spawn() {
            Ok(child) => Ok(StageChild::new(program.clone(), child)),
            Err(source) if is_exec_failure(&source) => Err(SpawnError::Exec {
                program: program.clone(),
                source,
            }),
            Err(source) => Err(SpawnError::Spawn {
                program: program.clone(),
                source,
            }),
        }
    }
}

fn is_exec_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) || err.raw_os_error() == Some(Errno::ENOEXEC as i32)
}
