//! Scenario tests for `CheckoutTask::perform`.
//!
//! Each test drives a scripted client through a full task run and checks the
//! returned externals, the build log and the working copy on disk.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::{FixedOffset, TimeZone};
use updater::checkout::CheckoutTask;
use updater::core::types::{CheckoutLocation, External, Revision};
use updater::error::{CancelCause, CheckoutError, ClientError};
use updater::io::client::{CancelToken, ProgressEvent};
use updater::io::revision::{FixedRevisionResolver, UrlRevisionResolver};
use updater::io::sink::LogSink;
use updater::test_support::{
    MemorySink, ScriptStep, ScriptedClient, ScriptedFailure, SlowSink, added, externals,
};

const REMOTE: &str = "https://svn.example.org/repo/trunk";

fn task(workspace: &Path) -> CheckoutTask {
    CheckoutTask::new(workspace, CheckoutLocation::new(REMOTE))
}

/// Accepts the first line, then panics on the relay thread.
struct PanickingSink {
    accepted: usize,
}

impl LogSink for PanickingSink {
    fn line(&mut self, _line: &str) -> io::Result<()> {
        if self.accepted >= 1 {
            panic!("sink exploded");
        }
        self.accepted += 1;
        Ok(())
    }
}

/// Empty workspace, no externals: empty result and the standard log preamble.
#[test]
fn scenario_a_success_without_externals() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(vec![added("a.txt"), added("src/b.txt")]);
    let mut sink = MemorySink::new();

    let result = task(temp.path())
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .expect("perform");

    assert_eq!(result, Some(Vec::new()));
    assert_eq!(
        sink.lines(),
        vec![
            "Cleaning local Directory trunk".to_string(),
            format!("Checking out {REMOTE} at revision HEAD"),
            "A    trunk/a.txt".to_string(),
            "A    trunk/src/b.txt".to_string(),
        ]
    );
}

/// One externals definition for `lib/foo` pinned at 42.
#[test]
fn scenario_b_single_pinned_external() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(vec![externals(
        "",
        "-r 42 https://svn.example.org/vendor/foo lib/foo",
    )]);
    let location = CheckoutLocation::new(REMOTE).with_local(".");
    let mut sink = MemorySink::new();

    let result = CheckoutTask::new(temp.path(), location)
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .expect("perform");

    assert_eq!(
        result,
        Some(vec![External {
            local_path: "lib/foo".to_string(),
            remote: "https://svn.example.org/vendor/foo".to_string(),
            pinned_revision: Some(Revision::Number(42)),
        }])
    );
}

/// Authentication cancellation is a soft exit: no result, no error.
#[test]
fn scenario_c_authentication_failure_returns_none() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(vec![added("a.txt")]).failing_with(
        ScriptedFailure::Authentication("svn: E170001: Authorization failed".to_string()),
    );
    let mut sink = MemorySink::new();

    let result = task(temp.path())
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .expect("authentication failure must not raise");

    assert_eq!(result, None);
    let lines = sink.lines();
    assert!(lines.contains(&format!("ERROR: Failed to check out {REMOTE}")));
    assert!(lines.iter().any(|line| line.contains("E170001")));
}

/// Any other cancellation is raised as an interruption.
#[test]
fn scenario_d_cancellation_is_interrupted() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(vec![added("a.txt")]).failing_with(ScriptedFailure::Cancelled);
    let mut sink = MemorySink::new();

    let err = task(temp.path())
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .unwrap_err();

    assert!(err.is_interrupted());
    assert!(matches!(
        err,
        CheckoutError::Interrupted {
            source: ClientError::Cancelled(CancelCause::Requested),
            ..
        }
    ));
    assert!(
        sink.position("has been canceled").is_some(),
        "log should announce the cancellation"
    );
}

/// Generic failures become transport errors and keep remote/local context.
#[test]
fn generic_failure_is_transport_error_with_context() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(Vec::new())
        .failing_with(ScriptedFailure::Failed("connection refused".to_string()));
    let mut sink = MemorySink::new();

    let err = task(temp.path())
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .unwrap_err();

    match &err {
        CheckoutError::Transport { remote, local, .. } => {
            assert_eq!(remote, REMOTE);
            assert!(local.ends_with("trunk"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    let lines = sink.lines();
    let failed = sink
        .position(&format!("ERROR: Failed to check out {REMOTE}"))
        .expect("failure line");
    assert_eq!(lines[failed + 1], "connection refused");
}

/// Pre-existing contents are wiped before the client populates the directory.
#[test]
fn cleanup_removes_residue_before_checkout() {
    let temp = tempfile::tempdir().expect("tempdir");
    let local = temp.path().join("trunk");
    fs::create_dir_all(local.join("old/dir")).expect("mkdir");
    fs::write(local.join("old/dir/stale.txt"), "stale").expect("write");
    fs::write(local.join("keep-me-not.txt"), "stale").expect("write");

    let client = ScriptedClient::new(vec![ScriptStep::WriteFile {
        path: "fresh.txt".to_string(),
        contents: "fresh".to_string(),
    }]);
    let mut sink = MemorySink::new();
    task(temp.path())
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .expect("perform");

    let mut names: Vec<String> = fs::read_dir(&local)
        .expect("read")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["fresh.txt".to_string()]);
}

/// Every progress line reaches the sink, in order, before `perform` returns,
/// even when the sink is much slower than the producer.
#[test]
fn slow_sink_receives_all_lines_in_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let steps: Vec<ScriptStep> = (0..50).map(|i| added(&format!("f{i:02}.txt"))).collect();
    let client = ScriptedClient::new(steps);
    let memory = MemorySink::new();
    let mut sink = SlowSink::new(memory.clone(), Duration::from_millis(2));

    task(temp.path())
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .expect("perform");

    let progress: Vec<String> = memory
        .lines()
        .into_iter()
        .filter(|line| line.starts_with("A    "))
        .collect();
    let expected: Vec<String> = (0..50).map(|i| format!("A    trunk/f{i:02}.txt")).collect();
    assert_eq!(progress, expected);

    let settled = memory.lines().len();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(memory.lines().len(), settled, "no line may arrive after return");
}

/// Failure lines are flushed through the relay before the error is returned.
#[test]
fn log_is_complete_on_every_exit_path() {
    for failure in [
        None,
        Some(ScriptedFailure::Authentication("E215004".to_string())),
        Some(ScriptedFailure::Cancelled),
        Some(ScriptedFailure::Failed("boom".to_string())),
    ] {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut client = ScriptedClient::new(vec![added("one"), added("two")]);
        if let Some(failure) = failure.clone() {
            client = client.failing_with(failure);
        }
        let mut sink = MemorySink::new();

        let _ = task(temp.path()).perform(&client, &UrlRevisionResolver::new(), &mut sink);

        let lines = sink.lines();
        assert_eq!(lines[2], "A    trunk/one", "case {failure:?}");
        assert_eq!(lines[3], "A    trunk/two", "case {failure:?}");
        if failure.is_some() {
            assert!(lines.len() > 4, "failure line missing for {failure:?}");
        }
    }
}

/// Externals come back in notification order; definitions without entries add nothing.
#[test]
fn externals_keep_notification_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(vec![
        externals("", "http://x/b b\nhttp://x/a a"),
        added("a"),
        externals("sub", "# nothing here\n"),
        externals("sub", "-r7 http://x/c c"),
    ]);
    let mut sink = MemorySink::new();

    let result = task(temp.path())
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .expect("perform")
        .expect("some");

    let paths: Vec<&str> = result.iter().map(|e| e.local_path.as_str()).collect();
    assert_eq!(paths, vec!["trunk/b", "trunk/a", "trunk/sub/c"]);
    assert_eq!(result[2].pinned_revision, Some(Revision::Number(7)));
}

/// Malformed externals entries are logged and skipped.
#[test]
fn malformed_externals_are_warned_not_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(vec![externals("", "broken\nhttp://x/ok ok")]);
    let mut sink = MemorySink::new();

    let result = task(temp.path())
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .expect("perform")
        .expect("some");

    assert_eq!(result.len(), 1);
    assert!(sink.position("WARNING: skipping malformed svn:externals entry").is_some());
}

/// The client gets HEAD as structure revision, the resolved content revision
/// and a canonical absolute path.
#[test]
fn request_carries_resolved_revision_and_canonical_path() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(Vec::new());
    let date = FixedOffset::east_opt(3600)
        .expect("offset")
        .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
        .single()
        .expect("date");
    let resolver = FixedRevisionResolver(Revision::Date(date));
    let mut sink = MemorySink::new();

    task(temp.path())
        .perform(&client, &resolver, &mut sink)
        .expect("perform");

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.url, REMOTE);
    assert_eq!(request.structure_revision, Revision::Head);
    assert_eq!(request.content_revision, Revision::Date(date));
    assert!(request.make_parents);
    assert!(request.local.is_absolute());
    assert!(request.local.ends_with("trunk"));
    assert!(
        sink.lines()
            .contains(&format!("Checking out {REMOTE} at revision '2024-05-06T07:08:09.000 +0100'"))
    );
}

/// A pinned URL is announced with its pin but checked out without it.
#[test]
fn pinned_remote_is_stripped_for_the_client() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(Vec::new());
    let location = CheckoutLocation::new(format!("{REMOTE}@99"));
    let mut sink = MemorySink::new();

    CheckoutTask::new(temp.path(), location)
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .expect("perform");

    let request = &client.requests()[0];
    assert_eq!(request.url, REMOTE);
    assert_eq!(request.content_revision, Revision::Number(99));
    assert_eq!(sink.lines()[0], "Cleaning local Directory trunk");
}

/// A cancel token set before the run interrupts at the first event.
#[test]
fn cancel_token_interrupts_the_client() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(vec![added("never")]);
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut sink = MemorySink::new();

    let err = task(temp.path())
        .with_cancel_token(cancel)
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .unwrap_err();

    assert!(err.is_interrupted());
    assert!(sink.position("trunk/never").is_none());
}

/// Notices from the client pass through unchanged.
#[test]
fn notices_are_relayed_verbatim() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(vec![ScriptStep::Progress(ProgressEvent::Notice(
        "svn: warning: W000000: something odd".to_string(),
    ))]);
    let mut sink = MemorySink::new();

    task(temp.path())
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .expect("perform");

    assert_eq!(sink.lines()[2], "svn: warning: W000000: something odd");
}

/// An unresolvable revision pin fails without invoking the client.
#[test]
fn bad_revision_pin_fails_before_checkout() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = ScriptedClient::new(Vec::new());
    let location = CheckoutLocation::new(format!("{REMOTE}@tomorrow"));
    let mut sink = MemorySink::new();

    let err = CheckoutTask::new(temp.path(), location)
        .perform(&client, &UrlRevisionResolver::new(), &mut sink)
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Revision { .. }));
    assert!(client.requests().is_empty());
    assert!(sink.position("Failed to resolve revision").is_some());
}

/// A relay that dies surfaces as a relay error, whatever the checkout did.
#[test]
fn relay_panic_is_reported_after_teardown() {
    for failure in [None, Some(ScriptedFailure::Failed("boom".to_string()))] {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut client = ScriptedClient::new(vec![added("one"), added("two")]);
        if let Some(failure) = failure.clone() {
            client = client.failing_with(failure);
        }
        let mut sink = PanickingSink { accepted: 0 };

        let err = task(temp.path())
            .perform(&client, &UrlRevisionResolver::new(), &mut sink)
            .unwrap_err();

        match err {
            CheckoutError::Relay { remote, local, .. } => {
                assert_eq!(remote, REMOTE, "case {failure:?}");
                assert!(local.ends_with("trunk"), "case {failure:?}");
            }
            other => panic!("case {failure:?}: unexpected error {other:?}"),
        }
        assert_eq!(client.requests().len(), 1, "checkout still ran for {failure:?}");
    }
}
