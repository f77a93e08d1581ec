//! Bridge from client notifications to the build log and the externals list.

use std::error::Error;
use std::io::Write;

use tracing::{debug, warn};

use crate::core::externals::{parse_definition, resolve_url};
use crate::core::path::join_relative;
use crate::core::types::External;
use crate::error::ClientError;
use crate::io::client::{CancelToken, ExternalsDefinition, ProgressEvent, UpdateEventHandler};
use crate::io::sink::{cause_lines, error_line};

/// Collects externals and writes progress lines for one checkout.
///
/// Paths in progress lines and externals are prefixed with the location's
/// local directory so they read relative to the workspace root.
pub struct UpdateEventCollector<W: Write> {
    out: W,
    module_dir: String,
    externals: Vec<External>,
    cancel: CancelToken,
    write_failed: bool,
}

impl<W: Write> UpdateEventCollector<W> {
    pub fn new(out: W, module_dir: impl Into<String>, cancel: CancelToken) -> Self {
        Self {
            out,
            module_dir: module_dir.into(),
            externals: Vec::new(),
            cancel,
            write_failed: false,
        }
    }

    /// Externals collected so far, in discovery order.
    pub fn externals(&self) -> &[External] {
        &self.externals
    }

    /// Write one line to the log output.
    pub fn println(&mut self, line: &str) {
        if self.write_failed {
            return;
        }
        if let Err(e) = writeln!(self.out, "{line}") {
            warn!(err = %e, "log output closed, dropping further progress lines");
            self.write_failed = true;
        }
    }

    /// Write `message` as an error line followed by the cause chain of `err`.
    pub fn report_error(&mut self, message: &str, err: &(dyn Error + 'static)) {
        self.error(message);
        for line in cause_lines(err) {
            self.println(&line);
        }
    }

    pub fn error(&mut self, message: &str) {
        self.println(&error_line(message));
    }

    /// Give back the output and the collected externals.
    pub fn into_parts(self) -> (W, Vec<External>) {
        (self.out, self.externals)
    }

    fn workspace_path(&self, path: &str) -> String {
        join_relative(&[&self.module_dir, path])
    }
}

impl<W: Write> UpdateEventHandler for UpdateEventCollector<W> {
    fn on_progress(&mut self, event: &ProgressEvent) {
        let line = match event {
            ProgressEvent::Path { action, path } => {
                format!("{:<5}{}", action.code(), self.workspace_path(path))
            }
            ProgressEvent::ExternalFetch { path } => {
                format!("Fetching external item into '{}'", self.workspace_path(path))
            }
            ProgressEvent::Completed {
                revision,
                external: false,
            } => format!("At revision {revision}"),
            ProgressEvent::Completed {
                revision,
                external: true,
            } => format!("External at revision {revision}"),
            ProgressEvent::Notice(text) => text.clone(),
        };
        self.println(&line);
    }

    fn on_externals_discovered(&mut self, definition: &ExternalsDefinition) {
        let owner = self.workspace_path(&definition.owner);
        let parsed = parse_definition(&definition.definition);

        for bad in &parsed.malformed {
            warn!(owner = %owner, line = %bad.line, reason = %bad.reason, "malformed externals entry");
            self.println(&format!(
                "WARNING: skipping malformed svn:externals entry on '{owner}': {} ({})",
                bad.line, bad.reason
            ));
        }

        for entry in parsed.entries {
            let external = External {
                local_path: join_relative(&[&owner, &entry.target]),
                remote: resolve_url(
                    &entry.url,
                    definition.owner_url.as_deref(),
                    definition.repository_root.as_deref(),
                ),
                pinned_revision: entry.pinned_revision(),
            };
            debug!(path = %external.local_path, remote = %external.remote, "discovered external");
            self.externals.push(external);
        }
    }

    fn check_cancelled(&self) -> Result<(), ClientError> {
        self.cancel.check()
    }
}
