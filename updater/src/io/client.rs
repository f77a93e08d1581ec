//! Checkout client abstraction.
//!
//! The [`UpdateClient`] trait decouples the checkout task from the actual
//! version-control backend (currently the `svn` command line client). Tests
//! use scripted clients that replay events without spawning processes.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

use crate::core::types::{Depth, Revision};
use crate::error::{CancelCause, ClientError};

/// Parameters for a checkout invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Repository URL without revision pin.
    pub url: String,
    /// Canonical absolute path of the working copy.
    pub local: PathBuf,
    /// Revision used to look up the tree structure (peg revision).
    pub structure_revision: Revision,
    /// Revision whose content is checked out (operative revision).
    pub content_revision: Revision,
    pub depth: Depth,
    /// Create missing parent directories of `local`.
    pub make_parents: bool,
    pub ignore_externals: bool,
}

/// What happened to a path during the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAction {
    Added,
    Deleted,
    Updated,
    Conflicted,
    Merged,
    Existed,
    Replaced,
    Restored,
    Skipped,
}

impl PathAction {
    /// Single-letter status code used in progress lines.
    pub fn code(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Deleted => 'D',
            Self::Updated => 'U',
            Self::Conflicted => 'C',
            Self::Merged => 'G',
            Self::Existed => 'E',
            Self::Replaced => 'R',
            Self::Restored => 'r',
            Self::Skipped => 'S',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'A' => Some(Self::Added),
            'D' => Some(Self::Deleted),
            'U' => Some(Self::Updated),
            'C' => Some(Self::Conflicted),
            'G' => Some(Self::Merged),
            'E' => Some(Self::Existed),
            'R' => Some(Self::Replaced),
            'r' => Some(Self::Restored),
            'S' => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Progress notification emitted by a client.
///
/// Paths are `/`-separated and relative to the working copy root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Path { action: PathAction, path: String },
    /// The client started fetching an external into `path`.
    ExternalFetch { path: String },
    /// The working copy (or an external) reached `revision`.
    Completed { revision: u64, external: bool },
    /// Free-form client output.
    Notice(String),
}

/// An `svn:externals` definition found on a directory of the working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalsDefinition {
    /// Owning directory relative to the working copy root (`""` for the root).
    pub owner: String,
    /// Repository URL of the owning directory, when known.
    pub owner_url: Option<String>,
    /// Repository root URL, when known.
    pub repository_root: Option<String>,
    /// Raw property value.
    pub definition: String,
}

/// Notification callbacks a client drives during a checkout.
pub trait UpdateEventHandler {
    fn on_progress(&mut self, event: &ProgressEvent);

    fn on_externals_discovered(&mut self, definition: &ExternalsDefinition);

    /// Polled by clients between events; an error aborts the operation.
    fn check_cancelled(&self) -> Result<(), ClientError>;
}

/// Abstraction over checkout backends.
pub trait UpdateClient {
    /// Check out `request.url` into `request.local`, reporting through `handler`.
    fn checkout(
        &self,
        request: &CheckoutRequest,
        handler: &mut dyn UpdateEventHandler,
    ) -> Result<(), ClientError>;
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel when the process receives SIGINT or SIGTERM.
    ///
    /// A second signal while cancellation is pending exits with `exit_code`.
    pub fn cancel_on_termination(&self, exit_code: i32) -> io::Result<()> {
        for signal in [SIGINT, SIGTERM] {
            flag::register_conditional_shutdown(signal, exit_code, Arc::clone(&self.cancelled))?;
            flag::register(signal, Arc::clone(&self.cancelled))?;
        }
        Ok(())
    }

    /// `Err(Cancelled(Requested))` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<(), ClientError> {
        if self.is_cancelled() {
            return Err(ClientError::Cancelled(CancelCause::Requested));
        }
        Ok(())
    }
}
