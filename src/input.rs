use std::io::BufRead;

use crate::prelude::*;

#[derive(Debug, PartialEq, Eq)]
pub enum InputMessage {
    /// Raw line bytes, terminator included when one was read. Decoding is
    /// left to the line handler so a bad line only rejects itself.
    Line(Vec<u8>),
    Eof,
    Error(String),
}

pub type InputReceiver = Receiver<InputMessage>;
pub type InputSender = Sender<InputMessage>;

/// Reads lines on a blocking thread, one per request.
///
/// Nothing is read ahead of a request, so a foreground stage that reads the
/// terminal is never racing the prompt for input.
pub struct LineReader {
    requests: Sender<()>,
    lines: InputReceiver,
}

impl LineReader {
    pub fn spawn<F, R>(open: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: BufRead + 'static,
    {
        let (requests, mut pending) = unbounded_channel::<()>();
        let (sender, lines): (InputSender, InputReceiver) = unbounded_channel();

        tokio::task::spawn_blocking(move || {
            let mut reader = open();

            while pending.blocking_recv().is_some() {
                let mut line = Vec::new();
                let msg = match reader.read_until(b'\n', &mut line) {
                    Ok(0) => InputMessage::Eof,
                    Ok(_) => InputMessage::Line(line),
                    Err(err) => InputMessage::Error(err.to_string()),
                };

                let last = !matches!(msg, InputMessage::Line(_));
                if sender.send(msg).is_err() || last {
                    break;
                }
            }

            trace!("input thread finished");
        });

        Self { requests, lines }
    }

    pub fn stdin() -> Self {
        Self::spawn(|| std::io::stdin().lock())
    }

    pub async fn next_line(&mut self) -> InputMessage {
        if self.requests.send(()).is_err() {
            return InputMessage::Eof;
        }
        self.lines.recv().await.unwrap_or(InputMessage::Eof)
    }
}
