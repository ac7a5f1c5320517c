use std::io::{self, Write};

use thiserror::Error;

use super::{
    jobs::Jobs,
    pipeline::{Command, Pipeline},
};
use crate::process::{
    child::StageChild, search::SearchPath, status::StageStatus, Binding, SpawnError,
    SpawnRequest, Spawner,
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("could not open file [{path}]: {source}")]
    FileNotFound {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("could not read or create file [{path}]: {source}")]
    FileAccess {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to create pipe: {0}")]
    Pipe(#[from] nix::Error),
    #[error(transparent)]
    SpawnFailure(SpawnError),
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    /// Process creation itself is failing, which usually means the system is
    /// out of processes or descriptors.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::Pipe(_) | Self::SpawnFailure(_))
    }
}

/// Outcome of a pipeline whose foreground stages have all terminated.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// One entry per stage, in pipeline order.
    pub statuses: Vec<StageStatus>,
    /// Stages whose program could not be executed.
    pub exec_failures: Vec<SpawnError>,
}

impl RunSummary {
    pub fn last_status(&self) -> Option<StageStatus> {
        self.statuses.last().copied()
    }
}

/// File overrides for one stage, opened before anything is launched.
struct Redirects {
    stdin: Option<Binding>,
    stdout: Option<Binding>,
}

impl Redirects {
    /// Opens every input file of the pipeline before creating any output
    /// file, so a missing input anywhere leaves every output untouched.
    fn open_all(pipeline: &Pipeline) -> Result<Vec<Self>, RunError> {
        let inputs = pipeline
            .iter()
            .map(open_input)
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = pipeline
            .iter()
            .map(create_output)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(inputs
            .into_iter()
            .zip(outputs)
            .map(|(stdin, stdout)| Self { stdin, stdout })
            .collect())
    }
}

fn open_input(cmd: &Command) -> Result<Option<Binding>, RunError> {
    cmd.input_file
        .as_ref()
        .map(|path| {
            Binding::open_input(path).map_err(|source| RunError::FileNotFound {
                path: path.clone(),
                source,
            })
        })
        .transpose()
}

fn create_output(cmd: &Command) -> Result<Option<Binding>, RunError> {
    cmd.output_file
        .as_ref()
        .map(|path| {
            Binding::create_output(path).map_err(|source| RunError::FileAccess {
                path: path.clone(),
                source,
            })
        })
        .transpose()
}

enum Slot {
    Done(StageStatus),
    Waiting(StageChild),
}

/// Hands every launched, unwaited stage to the job registry so it still
/// gets reaped after the run is abandoned.
fn abandon(slots: impl IntoIterator<Item = Slot>, jobs: &mut Jobs) {
    for slot in slots {
        if let Slot::Waiting(child) = slot {
            jobs.adopt(child);
        }
    }
}

/// Launches every stage of `pipeline`, wiring each foreground stage's stdout
/// into the next stage's stdin, then waits for the foreground stages in order.
///
/// Background stages write to the terminal, break the chain, and are handed
/// to `jobs` instead of being waited on. A stage whose program cannot be
/// executed is reported on `diagnostics` as soon as its launch fails.
pub async fn run<S, W>(
    pipeline: &Pipeline,
    spawner: &S,
    search_path: &SearchPath,
    jobs: &mut Jobs,
    diagnostics: &mut W,
) -> Result<RunSummary, RunError>
where
    S: Spawner + ?Sized,
    W: Write + ?Sized,
{
    debug!(%pipeline, "running pipeline");

    let redirects = Redirects::open_all(pipeline)?;

    let count = pipeline.len();
    let mut summary = RunSummary::default();
    let mut slots = Vec::with_capacity(count);
    let mut upstream = Binding::Inherit;

    for (i, (cmd, redirects)) in pipeline.iter().zip(redirects).enumerate() {
        let last = i + 1 == count;

        let (stdout, next_upstream) = if cmd.background || last {
            (Binding::Inherit, Binding::Inherit)
        } else {
            match Binding::pipe() {
                Ok((read, write)) => (write, read),
                Err(err) => {
                    abandon(slots, jobs);
                    return Err(err.into());
                }
            }
        };

        // an override drops the binding it replaces, closing it here
        let stdin = redirects.stdin.unwrap_or(upstream);
        let stdout = redirects.stdout.unwrap_or(stdout);
        upstream = next_upstream;

        trace!(
            stage = i,
            program = cmd.program(),
            piped_in = !stdin.is_inherit(),
            piped_out = !stdout.is_inherit(),
            background = cmd.background,
            "launching stage"
        );

        let spawned = spawner.spawn(SpawnRequest {
            argv: &cmd.argv,
            stdin,
            stdout,
            search_path,
        });

        match spawned {
            Ok(child) if cmd.background => {
                slots.push(Slot::Done(StageStatus::Background(child.pid())));
                jobs.adopt(child);
            }
            Ok(child) => slots.push(Slot::Waiting(child)),
            Err(err @ SpawnError::Exec { .. }) => {
                warn!(stage = i, "{err}");
                if let Err(report) = writeln!(diagnostics, "pipesh: {err}") {
                    debug!(stage = i, "could not report exec failure: {report}");
                }
                slots.push(Slot::Done(StageStatus::ExecFailed));
                summary.exec_failures.push(err);
            }
            Err(err @ SpawnError::Spawn { .. }) => {
                error!(stage = i, "{err}");
                abandon(slots, jobs);
                return Err(RunError::SpawnFailure(err));
            }
        }
    }

    let mut slots = slots.into_iter();
    while let Some(slot) = slots.next() {
        let status = match slot {
            Slot::Done(status) => status,
            Slot::Waiting(mut child) => match child.wait().await {
                Ok(status) => {
                    trace!(pid = ?child.pid(), program = child.program(), %status, "stage exited");
                    status.into()
                }
                Err(source) => {
                    let program = child.program().to_owned();
                    jobs.adopt(child);
                    abandon(slots, jobs);
                    return Err(RunError::Wait { program, source });
                }
            },
        };
        summary.statuses.push(status);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, fs, path::Path, time::Duration};

    use super::*;
    use crate::{parse::parse_line, process::OsSpawner};

    fn line(text: &str) -> Pipeline {
        parse_line(text).unwrap()
    }

    async fn run_line(text: &str, jobs: &mut Jobs) -> Result<RunSummary, RunError> {
        run(
            &line(text),
            &OsSpawner,
            &SearchPath::default(),
            jobs,
            &mut io::sink(),
        )
        .await
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[tokio::test]
    async fn pipe_feeds_next_stage() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut jobs = Jobs::new();

        let summary = run_line(&format!("echo hi | wc -l > {}", path_str(&out)), &mut jobs)
            .await
            .unwrap();

        assert_eq!(summary.statuses.len(), 2);
        assert!(summary.statuses.iter().all(StageStatus::success));
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "1");
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn input_and_output_redirects() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, "one\ntwo\n").unwrap();
        fs::write(&output, "stale contents that must disappear\n").unwrap();

        let text = format!("cat < {} > {}", path_str(&input), path_str(&output));
        run_line(&text, &mut Jobs::new()).await.unwrap();

        assert_eq!(fs::read_to_string(&output).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn pipe_preserves_every_byte() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        // larger than a pipe buffer, so the writer has to wait for the reader
        let data: String = (0..20_000).map(|n| format!("line {n}\n")).collect();
        fs::write(&input, &data).unwrap();

        let text = format!(
            "cat < {} | cat | cat > {}",
            path_str(&input),
            path_str(&output)
        );
        run_line(&text, &mut Jobs::new()).await.unwrap();

        assert_eq!(fs::read_to_string(&output).unwrap(), data);
    }

    #[tokio::test]
    async fn missing_input_aborts_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let output = dir.path().join("out.txt");

        let text = format!("cat < {} > {}", path_str(&missing), path_str(&output));
        let err = run_line(&text, &mut Jobs::new()).await.unwrap_err();

        assert!(matches!(err, RunError::FileNotFound { .. }));
        assert!(!err.is_resource_exhaustion());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn missing_input_in_a_later_stage_keeps_earlier_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.txt");
        let missing = dir.path().join("missing.txt");
        fs::write(&keep, "previous contents\n").unwrap();

        let text = format!("echo x > {} & cat < {}", path_str(&keep), path_str(&missing));
        let mut jobs = Jobs::new();
        let err = run_line(&text, &mut jobs).await.unwrap_err();

        assert!(matches!(err, RunError::FileNotFound { .. }));
        assert!(jobs.is_empty());
        assert_eq!(fs::read_to_string(&keep).unwrap(), "previous contents\n");
    }

    #[tokio::test]
    async fn uncreatable_output_is_file_access() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("no-such-dir").join("out.txt");

        let text = format!("echo hi > {}", path_str(&output));
        let err = run_line(&text, &mut Jobs::new()).await.unwrap_err();

        assert!(matches!(err, RunError::FileAccess { .. }));
    }

    #[tokio::test]
    async fn background_stage_is_not_waited_on() {
        let mut jobs = Jobs::new();

        let summary = tokio::time::timeout(Duration::from_secs(2), run_line("sleep 3 &", &mut jobs))
            .await
            .expect("background stage blocked the run")
            .unwrap();

        assert!(matches!(
            summary.last_status(),
            Some(StageStatus::Background(Some(_)))
        ));
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn background_stage_does_not_feed_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let side = dir.path().join("side.txt");
        let out = dir.path().join("out.txt");
        let mut jobs = Jobs::new();

        let text = format!(
            "echo a > {} & echo b | wc -l > {}",
            path_str(&side),
            path_str(&out)
        );
        let summary = run_line(&text, &mut jobs).await.unwrap();

        assert!(matches!(summary.statuses[0], StageStatus::Background(_)));
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "1");

        for _ in 0..100 {
            if !jobs.reap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(fs::read_to_string(&side).unwrap(), "a\n");
    }

    #[tokio::test]
    async fn exec_failure_is_confined_to_its_stage() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        let text = format!(
            "echo hi | no-such-program-anywhere | wc -c > {}",
            path_str(&out)
        );
        let summary = run_line(&text, &mut Jobs::new()).await.unwrap();

        assert_eq!(summary.statuses.len(), 3);
        assert_eq!(summary.statuses[1], StageStatus::ExecFailed);
        assert_eq!(summary.exec_failures.len(), 1);
        // the downstream stage saw EOF straight away
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "0");
    }

    #[tokio::test]
    async fn exec_failure_is_reported_before_the_pipeline_finishes() {
        let mut diagnostics = Vec::new();
        let mut jobs = Jobs::new();

        let pipeline = line("no-such-program-anywhere | sleep 2");
        let search_path = SearchPath::default();
        let pending = run(
            &pipeline,
            &OsSpawner,
            &search_path,
            &mut jobs,
            &mut diagnostics,
        );
        // the run is cut short while `sleep` is still being waited on
        let outcome = tokio::time::timeout(Duration::from_millis(500), pending).await;

        assert!(outcome.is_err());
        assert_eq!(
            String::from_utf8(diagnostics).unwrap(),
            "pipesh: no-such-program-anywhere: command not found\n"
        );
    }

    #[tokio::test]
    async fn exit_codes_are_reported_per_stage() {
        let summary = run_line("false | true", &mut Jobs::new()).await.unwrap();

        let codes: Vec<_> = summary.statuses.iter().map(StageStatus::code).collect();
        assert_eq!(codes, vec![Some(1), Some(0)]);
    }

    /// Succeeds for the first `allowed` stages, then fails like a process
    /// table that is full.
    struct ExhaustedSpawner {
        allowed: Cell<usize>,
    }

    impl Spawner for ExhaustedSpawner {
        fn spawn(&self, request: SpawnRequest<'_>) -> Result<StageChild, SpawnError> {
            match self.allowed.get() {
                0 => Err(SpawnError::Spawn {
                    program: request.argv[0].clone(),
                    source: io::Error::from_raw_os_error(nix::libc::EAGAIN),
                }),
                n => {
                    self.allowed.set(n - 1);
                    OsSpawner.spawn(request)
                }
            }
        }
    }

    #[tokio::test]
    async fn spawn_failure_aborts_and_keeps_launched_stages_reapable() {
        let spawner = ExhaustedSpawner {
            allowed: Cell::new(1),
        };
        let mut jobs = Jobs::new();

        let err = run(
            &line("true | cat"),
            &spawner,
            &SearchPath::default(),
            &mut jobs,
            &mut io::sink(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunError::SpawnFailure(_)));
        assert!(err.is_resource_exhaustion());
        assert_eq!(jobs.len(), 1);
    }
}
