//! Line-oriented build log destinations.

use std::error::Error;
use std::io::{self, Write};

/// Append-only, line-oriented text destination with an error side channel.
///
/// Sinks are handed to the log relay thread, so they must be `Send`.
pub trait LogSink: Send {
    /// Append one line (without trailing newline).
    fn line(&mut self, line: &str) -> io::Result<()>;

    /// Report an internal error.
    fn error(&mut self, message: &str) -> io::Result<()> {
        self.line(&error_line(message))
    }
}

impl<S: LogSink + ?Sized> LogSink for &mut S {
    fn line(&mut self, line: &str) -> io::Result<()> {
        (**self).line(line)
    }

    fn error(&mut self, message: &str) -> io::Result<()> {
        (**self).error(message)
    }
}

/// Sink writing lines to any [`Write`], flushing after each line.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{line}")?;
        self.writer.flush()
    }
}

/// Render `message` the way the error channel prints it.
pub fn error_line(message: &str) -> String {
    format!("ERROR: {message}")
}

/// Lines describing `err` and its source chain, one cause per line.
pub fn cause_lines(err: &(dyn Error + 'static)) -> Vec<String> {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("Caused by: {cause}"));
        source = cause.source();
    }
    lines
}

/// Report `message` on the error channel followed by the cause chain of `err`.
pub fn report_error<S: LogSink + ?Sized>(
    sink: &mut S,
    message: &str,
    err: &(dyn Error + 'static),
) -> io::Result<()> {
    sink.error(message)?;
    for line in cause_lines(err) {
        sink.line(&line)?;
    }
    Ok(())
}
