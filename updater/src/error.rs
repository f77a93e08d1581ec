//! Error types for checkout tasks.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a checkout operation was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelCause {
    /// The client gave up because credentials were rejected or missing.
    Authentication { detail: String },
    /// The caller asked for cancellation.
    Requested,
    /// Any other cancellation raised by the client.
    Other { detail: String },
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication { detail } => write!(f, "authentication failed: {detail}"),
            Self::Requested => write!(f, "cancellation requested"),
            Self::Other { detail } => write!(f, "{detail}"),
        }
    }
}

/// Failure raised by an [`UpdateClient`](crate::io::client::UpdateClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("operation cancelled: {0}")]
    Cancelled(CancelCause),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ClientError {
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Cancelled(CancelCause::Authentication { .. }))
    }
}

/// Failure returned by [`CheckoutTask::perform`](crate::checkout::CheckoutTask::perform).
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The checkout was cancelled for a reason other than authentication.
    #[error("checkout of {remote} into {} was interrupted", local.display())]
    Interrupted {
        remote: String,
        local: PathBuf,
        #[source]
        source: ClientError,
    },

    /// The checkout operation failed.
    #[error("failed to check out {remote} into {}", local.display())]
    Transport {
        remote: String,
        local: PathBuf,
        #[source]
        source: ClientError,
    },

    /// The revision specifier could not be resolved.
    #[error("failed to resolve revision for {remote} into {}", local.display())]
    Revision {
        remote: String,
        local: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The local directory could not be cleaned or prepared.
    #[error("failed to prepare {} for {remote}", local.display())]
    Workspace {
        remote: String,
        local: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The log relay thread could not be started or did not finish cleanly.
    #[error("log relay for {remote} into {} failed: {message}", local.display())]
    Relay {
        remote: String,
        local: PathBuf,
        message: String,
    },
}

impl CheckoutError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn authentication_cancellation_is_tagged() {
        let auth = ClientError::Cancelled(CancelCause::Authentication {
            detail: "E170001".to_string(),
        });
        assert!(auth.is_authentication_failure());
        assert!(!ClientError::Cancelled(CancelCause::Requested).is_authentication_failure());
        assert!(!ClientError::Failed(anyhow::anyhow!("boom")).is_authentication_failure());
    }

    #[test]
    fn checkout_errors_keep_remote_local_and_source() {
        let err = CheckoutError::Transport {
            remote: "https://svn.example.org/repo".to_string(),
            local: PathBuf::from("/ws/repo"),
            source: ClientError::Failed(anyhow::anyhow!("connection refused")),
        };
        assert_eq!(
            err.to_string(),
            "failed to check out https://svn.example.org/repo into /ws/repo"
        );
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "connection refused");
    }

    #[test]
    fn every_task_failure_names_remote_and_local() {
        let remote = "https://svn.example.org/repo";
        let local = PathBuf::from("/ws/repo");
        let errors = [
            CheckoutError::Revision {
                remote: remote.to_string(),
                local: local.clone(),
                source: anyhow::anyhow!("bad pin"),
            },
            CheckoutError::Workspace {
                remote: remote.to_string(),
                local: local.clone(),
                source: anyhow::anyhow!("permission denied"),
            },
            CheckoutError::Relay {
                remote: remote.to_string(),
                local: local.clone(),
                message: "relay thread panicked".to_string(),
            },
        ];
        for err in errors {
            let text = err.to_string();
            assert!(text.contains(remote), "{text}");
            assert!(text.contains("/ws/repo"), "{text}");
        }
    }
}
