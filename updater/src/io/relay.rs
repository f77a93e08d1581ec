//! Line relay: drains a byte source into a [`LogSink`] on its own thread.
//!
//! The checkout thread only ever writes into the in-memory pipe, so a slow
//! sink delays the relay, never the checkout.

use std::io::{self, BufRead};
use std::thread::{self, Scope, ScopedJoinHandle};

use tracing::{debug, error, warn};

use crate::io::sink::{LogSink, report_error};

/// Name of the relay thread.
pub const RELAY_THREAD_NAME: &str = "svn log copier";

/// Copy `source` to `sink` one line at a time until end-of-stream or a read failure.
///
/// Read failures are reported on the sink's error channel and end the loop.
/// Sink failures are logged once; remaining input is still drained so the
/// writer never sees a hung-up pipe. Returns the number of delivered lines.
pub fn relay_lines<R: BufRead, S: LogSink + ?Sized>(mut source: R, sink: &mut S) -> usize {
    let mut line = Vec::new();
    let mut delivered = 0usize;
    let mut sink_failed = false;

    loop {
        line.clear();
        match source.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if sink_failed {
                    continue;
                }
                let text = String::from_utf8_lossy(trim_newline(&line));
                match sink.line(&text) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        warn!(err = %e, "log sink rejected line, discarding further output");
                        sink_failed = true;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(err = %e, "failed to read log output");
                if let Err(sink_err) = report_error(sink, "failed to relay log output", &e) {
                    warn!(err = %sink_err, "failed to report relay error");
                }
                break;
            }
        }
    }

    drop(source);
    debug!(delivered, "log relay finished");
    delivered
}

/// Start [`relay_lines`] on a named thread inside `scope`.
pub fn spawn_relay<'scope, 'env, R, S>(
    scope: &'scope Scope<'scope, 'env>,
    source: R,
    sink: &'env mut S,
) -> io::Result<ScopedJoinHandle<'scope, usize>>
where
    R: BufRead + Send + 'scope,
    S: LogSink + ?Sized,
{
    thread::Builder::new()
        .name(RELAY_THREAD_NAME.to_string())
        .spawn_scoped(scope, move || relay_lines(source, sink))
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
