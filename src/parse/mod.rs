use thiserror::Error;

use crate::cmd::pipeline::{Command, Pipeline};

use self::token::{tokenize, LexerError, LineError, Token};

pub mod token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ambiguity {
    #[error("input redirect after a pipe")]
    InputAfterPipe,
    #[error("output redirect before a pipe")]
    OutputBeforePipe,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("ambiguous redirect: {0}")]
    AmbiguousRedirect(Ambiguity),
    #[error("empty command before {0}")]
    EmptyCommand(&'static str),
    #[error("missing file name after `{0}`")]
    MissingRedirectTarget(&'static str),
}

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error(transparent)]
    Line(#[from] LineError),
    #[error("failed to tokenize command: {0}")]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ScanningArgs,
    ExpectInFile,
    ExpectOutFile,
}

struct Parser {
    state: State,
    commands: Vec<Command>,
    current: Option<Command>,
    /// Sticky for the rest of the line once a `|` is consumed.
    seen_pipe: bool,
    stage_has_out_redirect: bool,
}

impl Parser {
    fn new() -> Self {
        Self {
            state: State::ScanningArgs,
            commands: Vec::new(),
            current: None,
            seen_pipe: false,
            stage_has_out_redirect: false,
        }
    }

    fn stage(&mut self) -> &mut Command {
        if self.current.is_none() {
            self.stage_has_out_redirect = false;
        }
        self.current.get_or_insert_with(Command::default)
    }

    fn feed(&mut self, token: Token<'_>) -> Result<(), ParseError> {
        match (self.state, token) {
            (State::ExpectInFile, Token::Word(path)) => {
                self.stage().input_file = Some(path.to_owned());
                self.state = State::ScanningArgs;
            }
            (State::ExpectOutFile, Token::Word(path)) => {
                self.stage().output_file = Some(path.to_owned());
                self.stage_has_out_redirect = true;
                self.state = State::ScanningArgs;
            }
            (State::ExpectInFile, _) => return Err(ParseError::MissingRedirectTarget("<")),
            (State::ExpectOutFile, _) => return Err(ParseError::MissingRedirectTarget(">")),
            (State::ScanningArgs, Token::Word(word)) => {
                self.stage().argv.push(word.to_owned());
            }
            (State::ScanningArgs, Token::Read) => {
                if self.seen_pipe {
                    return Err(ParseError::AmbiguousRedirect(Ambiguity::InputAfterPipe));
                }
                self.state = State::ExpectInFile;
            }
            (State::ScanningArgs, Token::Write) => {
                self.state = State::ExpectOutFile;
            }
            (State::ScanningArgs, Token::Pipe) => {
                if self.stage_has_out_redirect {
                    return Err(ParseError::AmbiguousRedirect(Ambiguity::OutputBeforePipe));
                }
                self.finish("`|`", false)?;
                self.seen_pipe = true;
            }
            (State::ScanningArgs, Token::Background) => {
                self.finish("`&`", true)?;
            }
        }

        Ok(())
    }

    fn finish(&mut self, boundary: &'static str, background: bool) -> Result<(), ParseError> {
        match self.current.take() {
            Some(mut cmd) if !cmd.argv.is_empty() => {
                cmd.background = background;
                self.commands.push(cmd);
                self.stage_has_out_redirect = false;
                Ok(())
            }
            _ => Err(ParseError::EmptyCommand(boundary)),
        }
    }

    fn end(mut self) -> Result<Pipeline, ParseError> {
        match self.state {
            State::ExpectInFile => return Err(ParseError::MissingRedirectTarget("<")),
            State::ExpectOutFile => return Err(ParseError::MissingRedirectTarget(">")),
            State::ScanningArgs => {}
        }

        if self.current.is_some() {
            self.finish("end of line", false)?;
        } else {
            // nothing at all, or a `|` with no stage after it
            let dangling = self.commands.last().map_or(true, |last| !last.background);
            if dangling {
                return Err(ParseError::EmptyCommand("end of line"));
            }
        }

        Ok(Pipeline::from(self.commands))
    }
}

/// Compiles a token sequence into a pipeline, rejecting redirect and pipe
/// combinations that leave a stage with two sources or two sinks.
pub fn parse<'a, I, T>(tokens: I) -> Result<Pipeline, ParseError>
where
    I: IntoIterator<Item = T>,
    T: Into<Token<'a>>,
{
    let mut parser = Parser::new();
    for token in tokens {
        parser.feed(token.into())?;
    }
    parser.end()
}

pub fn parse_line(line: &str) -> Result<Pipeline, CommandParseError> {
    let tokens = tokenize(line)?;
    Ok(parse(tokens)?)
}
