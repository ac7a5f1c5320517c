#[macro_use]
extern crate tracing;

pub mod builtins;
pub mod cmd;
pub mod config;
pub mod input;
pub mod parse;
pub mod prelude;
pub mod process;
pub mod state;

pub use cmd::{
    execute::{run, RunError, RunSummary},
    jobs::Jobs,
    pipeline::{Command, Pipeline},
};
pub use parse::{parse, parse_line, CommandParseError, ParseError};
pub use process::{search::SearchPath, OsSpawner, Spawner};
