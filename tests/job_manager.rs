//! Whole-process integration tests for the job manager: these fork real
//! children and read real pipes, so they live in `tests/` rather than a
//! `#[cfg(test)]` module beside the code, matching the "process/signal
//! tests need a whole-process-level harness" convention the variable and
//! program stores don't need.
//!
//! Each test gets its own `JobManager` and calls `init`/`fini` around its
//! body, but the signal handlers and pending-event flags they install are
//! process-wide (see `job::signal`) — so tests still serialize through
//! `TEST_LOCK` rather than trusting `cargo test`'s default thread-per-test
//! parallelism to keep separate managers from stealing each other's reaps.

use std::sync::{Mutex, MutexGuard};

use mush_core::pipeline::StringLiteral;
use mush_core::{Command, JobManager, JobManagerConfig, Pipeline};

fn one_stage(argv: &[&str]) -> Pipeline<StringLiteral> {
    let args = argv.iter().map(|a| StringLiteral::new(*a)).collect();
    Pipeline::new(vec![Command::new(args)])
}

fn two_stage(first: &[&str], second: &[&str]) -> Pipeline<StringLiteral> {
    let a = first.iter().map(|a| StringLiteral::new(*a)).collect();
    let b = second.iter().map(|a| StringLiteral::new(*a)).collect();
    Pipeline::new(vec![Command::new(a), Command::new(b)])
}

/// The job manager installs process-wide SIGCHLD/SIGIO handlers and uses
/// process-wide "pending" flags (see `job::signal`), so two `JobManager`s
/// running concurrently in the same test binary could steal each other's
/// reaps via `waitpid(-1, ...)`. Serialize every test through this lock
/// rather than relying on `cargo test`'s default thread-per-test
/// parallelism.
static TEST_LOCK: Mutex<()> = Mutex::new(());

fn new_manager() -> (MutexGuard<'static, ()>, JobManager<StringLiteral>) {
    let guard = TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut manager = JobManager::new(JobManagerConfig::default());
    manager.init().expect("init");
    (guard, manager)
}

#[test]
fn scenario_s3_pipeline_success_with_capture() {
    let (_guard, mut manager) = new_manager();
    let pipeline = two_stage(&["printf", "hello"], &["cat"]).with_capture(true);

    let job_id = manager.run(&pipeline).expect("run");
    manager.wait(job_id).expect("wait");

    let job_line = render_job_line(&mut manager, job_id);
    assert!(job_line.contains("\tcompleted\t"), "expected completed: {job_line}");

    let output = manager.get_output(job_id).unwrap().unwrap();
    assert_eq!(output, b"hello");

    manager.expunge(job_id).expect("expunge");
    manager.fini().expect("fini");
}

#[test]
fn scenario_s4_abort() {
    let (_guard, mut manager) = new_manager();
    let pipeline = one_stage(&["false"]);

    let job_id = manager.run(&pipeline).expect("run");
    manager.wait(job_id).expect("wait");

    let job_line = render_job_line(&mut manager, job_id);
    assert!(job_line.contains("\taborted\t"), "expected aborted: {job_line}");
    assert_eq!(manager.get_output(job_id).unwrap(), None);

    manager.expunge(job_id).expect("expunge");
    manager.fini().expect("fini");
}

#[test]
fn scenario_s5_cancel() {
    let (_guard, mut manager) = new_manager();
    let pipeline = one_stage(&["sleep", "60"]);

    let job_id = manager.run(&pipeline).expect("run");
    manager.cancel(job_id).expect("cancel");
    manager.wait(job_id).expect("wait");

    let job_line = render_job_line(&mut manager, job_id);
    assert!(job_line.contains("\tcanceled\t"), "expected canceled: {job_line}");

    assert!(manager.cancel(job_id).is_err(), "second cancel must fail");

    manager.expunge(job_id).expect("expunge");
    manager.fini().expect("fini");
}

#[test]
fn scenario_s6_show_format() {
    let (_guard, mut manager) = new_manager();
    let pipeline = two_stage(&["printf", "hello"], &["cat"]).with_capture(true);

    let job_id = manager.run(&pipeline).expect("run");
    manager.wait(job_id).expect("wait");

    let mut out = Vec::new();
    manager.show(&mut out).expect("show");
    let text = String::from_utf8(out).unwrap();

    let line = text.lines().next().expect("at least one job line");
    let fields: Vec<&str> = line.splitn(4, '\t').collect();
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[0], "0");
    assert!(fields[1].parse::<i32>().is_ok(), "pgid should be numeric: {fields:?}");
    assert_eq!(fields[2], "completed");

    manager.expunge(job_id).expect("expunge");
    manager.fini().expect("fini");
}

#[test]
fn job_ids_are_monotonic_and_never_reused() {
    let (_guard, mut manager) = new_manager();
    let first = manager.run(&one_stage(&["true"])).unwrap();
    manager.wait(first).unwrap();
    manager.expunge(first).unwrap();

    let second = manager.run(&one_stage(&["true"])).unwrap();
    manager.wait(second).unwrap();

    assert!(second > first);
    assert_ne!(second, first);

    manager.expunge(second).unwrap();
    manager.fini().unwrap();
}

#[test]
fn wait_is_idempotent_on_a_terminal_job() {
    let (_guard, mut manager) = new_manager();
    let job_id = manager.run(&one_stage(&["true"])).unwrap();

    let first = manager.wait(job_id).unwrap();
    let second = manager.wait(job_id).unwrap();
    assert_eq!(first, second);

    manager.expunge(job_id).unwrap();
    manager.fini().unwrap();
}

#[test]
fn poll_errors_while_running_then_succeeds_once_terminal() {
    let (_guard, mut manager) = new_manager();
    let job_id = manager.run(&one_stage(&["sleep", "1"])).unwrap();

    // May race and already be done; either outcome (err, or a terminal
    // poll) is acceptable here, the real assertion is after `wait`.
    let _ = manager.poll(job_id);

    manager.wait(job_id).unwrap();
    assert!(manager.poll(job_id).is_ok());

    manager.expunge(job_id).unwrap();
    manager.fini().unwrap();
}

#[test]
fn expunge_before_terminal_fails() {
    let (_guard, mut manager) = new_manager();
    let job_id = manager.run(&one_stage(&["sleep", "1"])).unwrap();

    assert!(manager.expunge(job_id).is_err());

    manager.cancel(job_id).unwrap();
    manager.wait(job_id).unwrap();
    manager.expunge(job_id).unwrap();
    manager.fini().unwrap();
}

#[test]
fn pipeline_failure_propagates_through_input_redirection() {
    // Earlier stage (`false`) fails; per Open Question 2 this must make
    // the leader's own exit non-success even though `cat` (the last
    // stage) would have succeeded on its own.
    let (_guard, mut manager) = new_manager();
    let pipeline = two_stage(&["false"], &["cat"]);

    let job_id = manager.run(&pipeline).unwrap();
    manager.wait(job_id).unwrap();

    let job_line = render_job_line(&mut manager, job_id);
    assert!(job_line.contains("\taborted\t"), "expected aborted: {job_line}");

    manager.expunge(job_id).unwrap();
    manager.fini().unwrap();
}

#[test]
fn show_observes_a_termination_that_arrived_via_pause_alone() {
    // `show` must reflect a status transition that already arrived
    // asynchronously (via SIGCHLD) even when the caller never called
    // `wait`/`poll` to process it: `pause()` only blocks for a signal, it
    // doesn't itself drain the job table, so `show` has to do that itself.
    let (_guard, mut manager) = new_manager();
    let job_id = manager.run(&one_stage(&["true"])).unwrap();

    // SIGCHLD is blocked process-wide outside of sigsuspend (see
    // job::signal::install), so if the child has already exited by the time
    // we get here the signal is simply pending and is delivered the moment
    // `pause` enters sigsuspend — no race, one `pause` call suffices for a
    // single-child pipeline with no capture (so no competing SIGIO).
    manager.pause().expect("pause");

    let job_line = render_job_line(&mut manager, job_id);
    assert!(
        job_line.contains("\tcompleted\t"),
        "expected completed, got: {job_line}"
    );

    manager.expunge(job_id).unwrap();
    manager.fini().unwrap();
}

fn render_job_line(manager: &mut JobManager<StringLiteral>, job_id: u64) -> String {
    let mut out = Vec::new();
    manager.show(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    text.lines()
        .find(|line| line.starts_with(&format!("{job_id}\t")))
        .unwrap_or_default()
        .to_string()
}
