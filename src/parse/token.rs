use std::fmt;

use logos::Logos;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Default, Error)]
pub enum LexerError {
    #[default]
    #[error("unrecognised input")]
    UnknownToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("input too long (limit is {limit} bytes)")]
    TooLong { limit: usize },
    #[error("input is not valid UTF-8")]
    InvalidUtf8,
}

/// One whitespace-delimited token. Operators are only recognised when they
/// stand alone, so `a|b` lexes as a single word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Logos)]
#[logos(skip r"[ \t\r\f]+", error = LexerError)]
pub enum Token<'a> {
    #[token("|")]
    Pipe,
    #[token("&")]
    Background,
    #[token("<")]
    Read,
    #[token(">")]
    Write,

    #[regex(r"[^ \t\r\f\n]+")]
    Word(&'a str),
}

impl<'a> Token<'a> {
    pub fn as_str(&self) -> &'a str {
        match self {
            Self::Pipe => "|",
            Self::Background => "&",
            Self::Read => "<",
            Self::Write => ">",
            Self::Word(word) => word,
        }
    }
}

impl<'a> From<&'a str> for Token<'a> {
    fn from(value: &'a str) -> Self {
        match value {
            "|" => Self::Pipe,
            "&" => Self::Background,
            "<" => Self::Read,
            ">" => Self::Write,
            word => Self::Word(word),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn tokenize(line: &str) -> Result<Vec<Token<'_>>, LexerError> {
    Token::lexer(line).collect()
}

/// Strips the line terminator from a raw line as read from the terminal.
///
/// A missing terminator is only legitimate for the last line before EOF, so it
/// is accepted as-is rather than eating the final character.
pub fn read_line(raw: &[u8], max_len: usize) -> Result<&str, LineError> {
    let line = match raw.strip_suffix(b"\n") {
        Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
        None => raw,
    };

    if line.len() > max_len {
        return Err(LineError::TooLong { limit: max_len });
    }

    std::str::from_utf8(line).map_err(|_| LineError::InvalidUtf8)
}
