use std::io::{self, Write};

use thiserror::Error;

use crate::{
    builtins::{BuiltinCommand, BuiltinCommands, Flow},
    cmd::{
        execute::{run, RunError},
        jobs::{Finished, Jobs},
    },
    config::Config,
    parse::{
        parse,
        token::{read_line, tokenize, Token},
        CommandParseError,
    },
    process::OsSpawner,
};

#[derive(Debug, Error)]
pub enum LineFailure {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Run(#[from] RunError),
}

/// Everything that survives from one input line to the next.
pub struct State {
    pub config: Config,
    pub jobs: Jobs,
}

impl State {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            jobs: Jobs::new(),
        }
    }

    pub fn render<W: Write>(&self, stdout: &mut W) -> io::Result<()> {
        write!(stdout, "{}", self.config.prompt)?;
        stdout.flush()
    }

    /// Reaps finished background stages and reports each on `out`.
    pub fn notify<W: Write>(&mut self, out: &mut W) -> io::Result<Vec<Finished>> {
        let finished = self.jobs.reap();
        for job in &finished {
            writeln!(out, "{job}")?;
        }
        Ok(finished)
    }

    /// Handles one raw input line. Failures are reported on `stderr` and never
    /// end the session; only the `exit` builtin does.
    pub async fn execute<W: Write>(&mut self, raw: &[u8], stderr: &mut W) -> io::Result<Flow> {
        match self.try_execute(raw, stderr).await {
            Ok(flow) => Ok(flow),
            Err(err) => {
                match &err {
                    LineFailure::Run(run_err) if run_err.is_resource_exhaustion() => error!("{err}"),
                    _ => debug!("rejected line: {err}"),
                }
                writeln!(stderr, "pipesh: {err}")?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn try_execute<W: Write>(&mut self, raw: &[u8], stderr: &mut W) -> Result<Flow, LineFailure> {
        let line = read_line(raw, self.config.max_line_len).map_err(CommandParseError::from)?;
        let tokens = tokenize(line).map_err(CommandParseError::from)?;

        let Some(first) = tokens.first() else {
            return Ok(Flow::Continue);
        };

        if let Token::Word(name) = first {
            if let Some(builtin) = BuiltinCommands::from_name(name) {
                let args: Vec<&str> = tokens[1..].iter().map(Token::as_str).collect();
                return Ok(builtin.execute(&args).await);
            }
        }

        let pipeline = parse(tokens).map_err(CommandParseError::from)?;
        trace!(?pipeline, "parsed pipeline");

        let summary = run(
            &pipeline,
            &OsSpawner,
            &self.config.search_path,
            &mut self.jobs,
            stderr,
        )
        .await?;
        trace!(statuses = ?summary.statuses, "pipeline finished");

        Ok(Flow::Continue)
    }
}
