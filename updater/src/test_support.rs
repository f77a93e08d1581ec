//! Test-only helpers: scripted clients and recording sinks.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::Context;

use crate::error::{CancelCause, ClientError};
use crate::io::client::{
    CheckoutRequest, ExternalsDefinition, PathAction, ProgressEvent, UpdateClient,
    UpdateEventHandler,
};
use crate::io::sink::LogSink;

/// One step replayed by a [`ScriptedClient`].
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Progress(ProgressEvent),
    Externals(ExternalsDefinition),
    /// Create a file (relative to the working copy) with the given contents.
    WriteFile { path: String, contents: String },
}

/// How a [`ScriptedClient`] ends after replaying its steps.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    Authentication(String),
    Cancelled,
    Failed(String),
}

impl ScriptedFailure {
    fn to_error(&self) -> ClientError {
        match self {
            Self::Authentication(detail) => ClientError::Cancelled(CancelCause::Authentication {
                detail: detail.clone(),
            }),
            Self::Cancelled => ClientError::Cancelled(CancelCause::Requested),
            Self::Failed(message) => ClientError::Failed(anyhow::anyhow!(message.clone())),
        }
    }
}

/// Client that replays a fixed script and records the requests it received.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    steps: Vec<ScriptStep>,
    failure: Option<ScriptedFailure>,
    requests: Mutex<Vec<CheckoutRequest>>,
}

impl ScriptedClient {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn failing_with(mut self, failure: ScriptedFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn requests(&self) -> Vec<CheckoutRequest> {
        lock(&self.requests).clone()
    }
}

impl UpdateClient for ScriptedClient {
    fn checkout(
        &self,
        request: &CheckoutRequest,
        handler: &mut dyn UpdateEventHandler,
    ) -> Result<(), ClientError> {
        lock(&self.requests).push(request.clone());
        for step in &self.steps {
            handler.check_cancelled()?;
            match step {
                ScriptStep::Progress(event) => handler.on_progress(event),
                ScriptStep::Externals(definition) => handler.on_externals_discovered(definition),
                ScriptStep::WriteFile { path, contents } => {
                    write_file(&request.local, path, contents)?;
                }
            }
        }
        match &self.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

fn write_file(root: &Path, path: &str, contents: &str) -> anyhow::Result<()> {
    let target = root.join(path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&target, contents).with_context(|| format!("write {}", target.display()))
}

/// `Added` progress step for `path`.
pub fn added(path: &str) -> ScriptStep {
    ScriptStep::Progress(ProgressEvent::Path {
        action: PathAction::Added,
        path: path.to_string(),
    })
}

/// Externals definition step on `owner`, without URL context.
pub fn externals(owner: &str, definition: &str) -> ScriptStep {
    ScriptStep::Externals(ExternalsDefinition {
        owner: owner.to_string(),
        owner_url: None,
        repository_root: None,
        definition: definition.to_string(),
    })
}

/// Cloneable sink recording every line it receives.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    /// Index of the first line containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lines().iter().position(|line| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn line(&mut self, line: &str) -> io::Result<()> {
        lock(&self.lines).push(line.to_string());
        Ok(())
    }
}

/// Sink that sleeps before recording each line.
#[derive(Debug, Clone)]
pub struct SlowSink {
    inner: MemorySink,
    delay: Duration,
}

impl SlowSink {
    pub fn new(inner: MemorySink, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl LogSink for SlowSink {
    fn line(&mut self, line: &str) -> io::Result<()> {
        thread::sleep(self.delay);
        self.inner.line(line)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
