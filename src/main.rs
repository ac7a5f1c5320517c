use std::io;

use color_eyre::{eyre::eyre, Result};
use pipesh::{
    builtins::Flow,
    config::Config,
    input::{InputMessage, LineReader},
    state::State,
};
use tracing_subscriber::prelude::*;

#[macro_use]
extern crate tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    std::fs::create_dir_all(&config.log_dir)?;
    let (writer, _guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        &config.log_dir,
        "pipesh.log",
    ));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_error::ErrorLayer::default())
        .init();

    color_eyre::install()?;

    trace!(?config, "starting");

    let mut input = LineReader::stdin();
    let mut state = State::new(config);

    loop {
        state.notify(&mut io::stderr())?;
        state.render(&mut io::stdout())?;

        match input.next_line().await {
            InputMessage::Line(line) => {
                if state.execute(&line, &mut io::stderr()).await? == Flow::Exit {
                    break;
                }
            }
            InputMessage::Eof => {
                println!();
                break;
            }
            InputMessage::Error(err) => {
                error!("failed to read input: {err}");
                return Err(eyre!("failed to read input: {err}"));
            }
        }
    }

    state.notify(&mut io::stderr())?;
    if !state.jobs.is_empty() {
        debug!(remaining = state.jobs.len(), "leaving background stages running");
    }

    Ok(())
}
