//! Orchestration for a single fresh checkout of one location.
//!
//! The task cleans the local directory, starts the log relay, runs the
//! checkout with an [`UpdateEventCollector`] wired in, classifies failures and
//! always closes the pipe and joins the relay before returning.

use std::path::{Path, PathBuf};
use std::thread;

use tracing::{debug, info, instrument, warn};

use crate::collector::UpdateEventCollector;
use crate::core::types::{CheckoutLocation, External, Revision};
use crate::error::{CheckoutError, ClientError};
use crate::io::client::{CancelToken, CheckoutRequest, UpdateClient};
use crate::io::pipe::{PipeWriter, pipe};
use crate::io::relay::spawn_relay;
use crate::io::revision::RevisionResolver;
use crate::io::sink::LogSink;
use crate::io::workspace::{clean_directory, prepare_local_dir};

/// Fresh checkout of one location into a workspace.
#[derive(Debug, Clone)]
pub struct CheckoutTask {
    workspace: PathBuf,
    location: CheckoutLocation,
    cancel: CancelToken,
}

impl CheckoutTask {
    pub fn new(workspace: impl Into<PathBuf>, location: CheckoutLocation) -> Self {
        Self {
            workspace: workspace.into(),
            location,
            cancel: CancelToken::new(),
        }
    }

    /// Use `cancel` to abort the task from another thread.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn location(&self) -> &CheckoutLocation {
        &self.location
    }

    /// Path of the location's working copy below the workspace.
    pub fn local_path(&self) -> PathBuf {
        self.workspace.join(self.location.local_dir())
    }

    /// Run the checkout and return the externals it discovered.
    ///
    /// Returns `Ok(None)` when the client gave up on authentication: the
    /// failure is written to the log but not raised. Every other cancellation
    /// is [`CheckoutError::Interrupted`]; other failures are
    /// [`CheckoutError::Transport`]. On all paths the log pipe is closed and
    /// the relay drained before this returns.
    #[instrument(skip_all, fields(remote = %self.location.remote, local = %self.location.local_dir()))]
    pub fn perform<C, R, S>(
        &self,
        client: &C,
        resolver: &R,
        sink: &mut S,
    ) -> Result<Option<Vec<External>>, CheckoutError>
    where
        C: UpdateClient + ?Sized,
        R: RevisionResolver + ?Sized,
        S: LogSink + ?Sized,
    {
        let local_dir = self.location.local_dir();
        let local = self.local_path();

        if let Err(e) = sink.line(&format!("Cleaning local Directory {local_dir}")) {
            warn!(err = %e, "failed to write to build log");
        }
        clean_directory(&local).map_err(|source| CheckoutError::Workspace {
            remote: self.location.remote.clone(),
            local: local.clone(),
            source,
        })?;

        let (writer, reader) = pipe();
        thread::scope(|scope| {
            let relay = spawn_relay(scope, reader, &mut *sink).map_err(|e| CheckoutError::Relay {
                remote: self.location.remote.clone(),
                local: local.clone(),
                message: format!("spawn relay thread: {e}"),
            })?;

            let mut collector = UpdateEventCollector::new(writer, local_dir, self.cancel.clone());
            let outcome = self.run_checkout(client, resolver, &local, &mut collector);
            let (writer, externals) = collector.into_parts();

            writer.close();
            let delivered = relay.join().map_err(|_| {
                if let Err(primary) = &outcome {
                    warn!(err = %primary, "checkout failed before the log relay panicked");
                }
                CheckoutError::Relay {
                    remote: self.location.remote.clone(),
                    local: local.clone(),
                    message: "relay thread panicked before draining the log".to_string(),
                }
            })?;
            debug!(delivered, "log relay joined");

            match outcome? {
                Completion::Done => {
                    info!(externals = externals.len(), "checkout complete");
                    Ok(Some(externals))
                }
                Completion::AuthenticationFailed => Ok(None),
            }
        })
    }

    fn run_checkout<C, R>(
        &self,
        client: &C,
        resolver: &R,
        local: &Path,
        collector: &mut UpdateEventCollector<PipeWriter>,
    ) -> Result<Completion, CheckoutError>
    where
        C: UpdateClient + ?Sized,
        R: RevisionResolver + ?Sized,
    {
        let remote = &self.location.remote;

        let revision = resolver.resolve(&self.location).map_err(|source| {
            collector.report_error(&format!("Failed to resolve revision for {remote}"), &*source);
            CheckoutError::Revision {
                remote: remote.clone(),
                local: local.to_path_buf(),
                source,
            }
        })?;

        collector.println(&format!(
            "Checking out {remote} at revision {}",
            revision.display_name()
        ));

        let canonical = prepare_local_dir(local).map_err(|source| {
            collector.report_error(&format!("Failed to check out {remote}"), &*source);
            CheckoutError::Workspace {
                remote: remote.clone(),
                local: local.to_path_buf(),
                source,
            }
        })?;

        let request = CheckoutRequest {
            url: self.location.url().to_string(),
            local: canonical,
            structure_revision: Revision::Head,
            content_revision: revision,
            depth: self.location.depth,
            make_parents: true,
            ignore_externals: self.location.ignore_externals,
        };
        debug!(?request, "invoking checkout");

        match client.checkout(&request, collector) {
            Ok(()) => Ok(Completion::Done),
            Err(err) if err.is_authentication_failure() => {
                warn!(err = %err, "checkout gave up on authentication");
                collector.report_error(&format!("Failed to check out {remote}"), &err);
                Ok(Completion::AuthenticationFailed)
            }
            Err(err @ ClientError::Cancelled(_)) => {
                warn!(err = %err, "checkout cancelled");
                collector.error("Subversion checkout has been canceled");
                Err(CheckoutError::Interrupted {
                    remote: remote.clone(),
                    local: request.local,
                    source: err,
                })
            }
            Err(err) => {
                warn!(err = %err, "checkout failed");
                collector.report_error(&format!("Failed to check out {remote}"), &err);
                Err(CheckoutError::Transport {
                    remote: remote.clone(),
                    local: request.local,
                    source: err,
                })
            }
        }
    }
}

enum Completion {
    Done,
    AuthenticationFailed,
}
