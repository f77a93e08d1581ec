//! `svn` command line adapter.
//!
//! Runs the Subversion client non-interactively with a fixed locale, turns its
//! stdout into [`UpdateEventHandler`] callbacks and classifies failures from
//! the error codes on stderr.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Output, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use regex::Regex;
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::{CancelCause, ClientError};
use crate::io::client::{
    CheckoutRequest, ExternalsDefinition, PathAction, ProgressEvent, UpdateClient,
    UpdateEventHandler,
};
use crate::io::config::SvnConfig;

/// How often cancellation and the deadline are checked while svn is silent.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Error codes svn reports when credentials are rejected or exhausted.
const AUTH_ERROR_CODES: &[&str] = &["E170001", "E215004"];

/// `SVN_ERR_CANCELLED`.
const CANCELLED_ERROR_CODE: &str = "E200015";

/// `Property not found` warning from `svn propget`.
const PROPERTY_NOT_FOUND: &str = "W200017";

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([ADUCGER ])([ UCG])([ B])([ C]) (.+)$").expect("valid status regex")
});
static REVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:Checked out|Updated to|At) (external at )?revision (\d+)\.$")
        .expect("valid revision regex")
});
static EXTERNAL_REVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^External at revision (\d+)\.$").expect("valid external revision regex")
});
static FETCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Fetching external item into '(.+)':?$").expect("valid fetch regex")
});
static QUOTED_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Restored|Skipped) '(.+?)'").expect("valid quoted action regex")
});

/// [`UpdateClient`] backed by the `svn` executable.
#[derive(Debug, Clone)]
pub struct SvnCommandClient {
    config: SvnConfig,
}

impl SvnCommandClient {
    pub fn new(config: SvnConfig) -> Self {
        Self { config }
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg(subcommand)
            .arg("--non-interactive")
            // Output parsing relies on untranslated messages.
            .env("LC_ALL", "C");
        if let Some(username) = &self.config.username {
            cmd.arg("--username").arg(username);
        }
        if let Some(password) = &self.config.password {
            cmd.arg("--password").arg(password).arg("--no-auth-cache");
        }
        if self.config.trust_server_cert {
            cmd.arg("--trust-server-cert-failures")
                .arg("unknown-ca,cn-mismatch,expired,not-yet-valid,other");
        }
        if let Some(dir) = &self.config.config_dir {
            cmd.arg("--config-dir").arg(dir);
        }
        cmd
    }

    /// Run `cmd`, feeding each stdout line to `handler` while it runs.
    fn run_streaming(
        &self,
        mut cmd: Command,
        root: &Path,
        handler: &mut dyn UpdateEventHandler,
    ) -> Result<(), ClientError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("spawning svn");
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn {}", self.config.binary))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;

        let limit = self.config.stderr_limit_bytes;
        let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));
        let lines = spawn_line_reader(stdout);
        let deadline = self.config.timeout().map(|timeout| Instant::now() + timeout);

        let mut abort = None;
        loop {
            if let Err(err) = handler.check_cancelled() {
                abort = Some(err);
                break;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                abort = Some(self.timed_out());
                break;
            }
            match lines.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(line)) => {
                    if let Some(event) = parse_output_line(&line, root) {
                        handler.on_progress(&event);
                    }
                }
                Ok(Err(e)) => {
                    abort = Some(ClientError::Failed(
                        anyhow::Error::new(e).context("read svn output"),
                    ));
                    break;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Some(err) = &abort {
            warn!(err = %err, "stopping svn");
            if let Err(e) = child.kill() {
                warn!(err = %e, "failed to kill svn");
            }
        }
        let status = self.wait_for_exit(&mut child, deadline)?;
        let (stderr, stderr_truncated) = join_output(stderr_handle)?;
        if let Some(err) = abort {
            return Err(err);
        }

        debug!(exit_code = ?status.code(), stderr_truncated, "svn finished");
        if !status.success() {
            return Err(classify_failure(
                status.code(),
                &String::from_utf8_lossy(&stderr),
            ));
        }
        Ok(())
    }

    fn wait_for_exit(
        &self,
        child: &mut Child,
        deadline: Option<Instant>,
    ) -> Result<ExitStatus, ClientError> {
        let Some(deadline) = deadline else {
            return Ok(child.wait().context("wait for svn")?);
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        match child.wait_timeout(remaining).context("wait for svn")? {
            Some(status) => Ok(status),
            None => {
                warn!(timeout_secs = self.config.timeout_secs, "svn timed out, killing");
                child.kill().context("kill svn")?;
                child.wait().context("wait for svn after kill")?;
                Err(self.timed_out())
            }
        }
    }

    fn timed_out(&self) -> ClientError {
        ClientError::Failed(anyhow!(
            "svn timed out after {}s",
            self.config.timeout_secs
        ))
    }

    fn run_capture(&self, subcommand: &str, args: &[&str]) -> Result<Output, ClientError> {
        let mut cmd = self.command(subcommand);
        cmd.args(args).stdin(Stdio::null());
        Ok(cmd
            .output()
            .with_context(|| format!("spawn {} {subcommand}", self.config.binary))?)
    }

    /// Report every `svn:externals` definition in the fresh working copy.
    #[instrument(skip_all)]
    fn report_externals(
        &self,
        request: &CheckoutRequest,
        handler: &mut dyn UpdateEventHandler,
    ) -> Result<(), ClientError> {
        handler.check_cancelled()?;
        let local = request.local.to_string_lossy().into_owned();

        let info = self.run_capture("info", &["--show-item", "repos-root-url", &local])?;
        let repository_root = if info.status.success() {
            Some(String::from_utf8_lossy(&info.stdout).trim().to_string())
                .filter(|root| !root.is_empty())
        } else {
            debug!(
                stderr = %String::from_utf8_lossy(&info.stderr).trim(),
                "repository root unavailable"
            );
            None
        };

        let listing = self.run_capture("propget", &["svn:externals", "--recursive", &local])?;
        let stderr = String::from_utf8_lossy(&listing.stderr);
        if !listing.status.success() {
            if stderr.contains(PROPERTY_NOT_FOUND) {
                debug!("no externals defined");
                return Ok(());
            }
            return Err(classify_failure(listing.status.code(), &stderr));
        }

        let listing = String::from_utf8_lossy(&listing.stdout);
        let is_dir = |path: &str| Path::new(path).is_dir();
        for (path, definition) in parse_propget_listing(&listing, &local, is_dir) {
            handler.check_cancelled()?;
            let owner = relative_to(&path, &request.local);
            let owner_url = if owner.is_empty() {
                request.url.trim_end_matches('/').to_string()
            } else {
                format!("{}/{owner}", request.url.trim_end_matches('/'))
            };
            handler.on_externals_discovered(&ExternalsDefinition {
                owner,
                owner_url: Some(owner_url),
                repository_root: repository_root.clone(),
                definition,
            });
        }
        Ok(())
    }
}

impl UpdateClient for SvnCommandClient {
    #[instrument(skip_all, fields(url = %request.url, revision = %request.content_revision))]
    fn checkout(
        &self,
        request: &CheckoutRequest,
        handler: &mut dyn UpdateEventHandler,
    ) -> Result<(), ClientError> {
        handler.check_cancelled()?;

        // `svn checkout` creates missing parents itself, so `make_parents` needs no flag.
        let mut cmd = self.command("checkout");
        if let Some(depth) = request.depth.as_arg() {
            cmd.arg("--depth").arg(depth);
        }
        if request.ignore_externals {
            cmd.arg("--ignore-externals");
        }
        cmd.arg("--revision")
            .arg(request.content_revision.to_string())
            .arg(format!("{}@{}", request.url, request.structure_revision))
            .arg(&request.local);

        self.run_streaming(cmd, &request.local, handler)?;

        if !request.ignore_externals {
            self.report_externals(request, handler)?;
        }
        Ok(())
    }
}

/// Map one line of `svn checkout` output to a progress event.
fn parse_output_line(line: &str, root: &Path) -> Option<ProgressEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    if let Some(caps) = STATUS_RE.captures(line) {
        let text = caps[1].chars().next().unwrap_or(' ');
        let props = caps[2].chars().next().unwrap_or(' ');
        let code = if text != ' ' { text } else { props };
        if let Some(action) = PathAction::from_code(code) {
            return Some(ProgressEvent::Path {
                action,
                path: relative_to(&caps[5], root),
            });
        }
    }
    if let Some(caps) = QUOTED_ACTION_RE.captures(line) {
        let action = if &caps[1] == "Restored" {
            PathAction::Restored
        } else {
            PathAction::Skipped
        };
        return Some(ProgressEvent::Path {
            action,
            path: relative_to(&caps[2], root),
        });
    }
    if let Some(caps) = FETCH_RE.captures(line) {
        return Some(ProgressEvent::ExternalFetch {
            path: relative_to(&caps[1], root),
        });
    }
    if let Some(caps) = REVISION_RE.captures(line)
        && let Ok(revision) = caps[2].parse()
    {
        return Some(ProgressEvent::Completed {
            revision,
            external: caps.get(1).is_some(),
        });
    }
    if let Some(caps) = EXTERNAL_REVISION_RE.captures(line)
        && let Ok(revision) = caps[1].parse()
    {
        return Some(ProgressEvent::Completed {
            revision,
            external: true,
        });
    }
    Some(ProgressEvent::Notice(line.to_string()))
}

/// `/`-separated form of `path` relative to `root` (unchanged if outside it).
fn relative_to(path: &str, root: &Path) -> String {
    let relative = Path::new(path)
        .strip_prefix(root)
        .map(|rel| rel.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string());
    relative.replace('\\', "/")
}

/// Split `svn propget --recursive` output into `(path, value)` pairs.
///
/// Each property starts with a `PATH - ` header (PATH beginning with `root`);
/// following lines up to the next header continue the value. Paths may
/// themselves contain ` - `, so `is_dir` picks the separator that ends at an
/// existing directory.
fn parse_propget_listing(
    listing: &str,
    root: &str,
    is_dir: impl Fn(&str) -> bool,
) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for line in listing.lines() {
        if let Some((path, first)) = split_propget_header(line, root, &is_dir) {
            out.push((path, format!("{first}\n")));
            continue;
        }
        if let Some((_, value)) = out.last_mut() {
            value.push_str(line);
            value.push('\n');
        }
    }
    out
}

fn split_propget_header(
    line: &str,
    root: &str,
    is_dir: impl Fn(&str) -> bool,
) -> Option<(String, String)> {
    let rest = line.strip_prefix(root)?;
    if !(rest.starts_with(" - ") || rest.starts_with('/') || rest.starts_with('\\')) {
        return None;
    }
    let separators: Vec<usize> = rest.match_indices(" - ").map(|(idx, _)| idx).collect();
    let first = *separators.first()?;
    let idx = separators
        .iter()
        .rev()
        .copied()
        .find(|&idx| is_dir(&format!("{root}{}", &rest[..idx])))
        .unwrap_or(first);
    Some((format!("{root}{}", &rest[..idx]), rest[idx + 3..].to_string()))
}

/// Turn a failed svn invocation into a [`ClientError`].
fn classify_failure(code: Option<i32>, stderr: &str) -> ClientError {
    let detail = error_summary(stderr);
    if AUTH_ERROR_CODES.iter().any(|auth| stderr.contains(auth)) {
        return ClientError::Cancelled(CancelCause::Authentication { detail });
    }
    if stderr.contains(CANCELLED_ERROR_CODE) {
        return ClientError::Cancelled(CancelCause::Other { detail });
    }
    ClientError::Failed(anyhow!("svn exited with status {code:?}: {detail}"))
}

fn error_summary(stderr: &str) -> String {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("svn: E"))
        .collect();
    if !errors.is_empty() {
        return errors.join("; ");
    }
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        "no error output".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Forward stdout lines over a channel so the caller can poll for cancellation.
fn spawn_line_reader(stdout: ChildStdout) -> Receiver<std::io::Result<String>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in BufReader::new(stdout).split(b'\n') {
            let line = line.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

fn join_output(
    handle: thread::JoinHandle<anyhow::Result<(Vec<u8>, usize)>>,
) -> Result<(Vec<u8>, usize), ClientError> {
    match handle.join() {
        Ok(result) => Ok(result.context("read svn stderr")?),
        Err(_) => Err(ClientError::Failed(anyhow!("stderr reader thread panicked"))),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> anyhow::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}
