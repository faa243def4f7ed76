//! OS-level pipeline launch protocol (spec.md §4.3.3).
//!
//! This is the only module that forks, execs or manipulates raw file
//! descriptors directly. It is deliberately ignorant of the job table —
//! `launch` hands back the bits [`super::JobManager::run`] needs (the
//! leader's pid, the capture fd if any) and the caller is responsible for
//! publishing the job record.
//!
//! Everything here runs with all signals blocked by the caller (see
//! [`super::signal::AllSignalsBlocked`]) for as long as the leader fork and
//! the job-record publish need to look atomic to a SIGCHLD handler.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::Path;

use nix::unistd::Pid;

use super::classify;
use super::{JobError, JobManagerConfig};
use crate::pipeline::{ArgExpr, Command, Pipeline};

/// What a successful [`launch`] hands back to the job manager.
pub(super) struct Launched {
    pub pgid: Pid,
    pub capture_fd: Option<OwnedFd>,
    pub captured_output: Option<Vec<u8>>,
}

/// Runs the full launch protocol: capture pipe, leader fork, per-stage
/// forks inside the leader, and async-capture setup in the parent.
pub(super) fn launch<E: ArgExpr>(
    pipeline: &Pipeline<E>,
    config: &JobManagerConfig,
) -> Result<Launched, JobError> {
    // Step 1: capture pipe, created unconditionally in the parent — even
    // when the pipeline doesn't request capture, so every code path below
    // has two real fds to pass down to the leader and close.
    let (capture_r, capture_w) = new_pipe()?;

    // Step 3: fork the leader.
    let leader_pid = unsafe { libc::fork() };
    if leader_pid < 0 {
        return Err(JobError::Os(nix::errno::Errno::last()));
    }

    if leader_pid == 0 {
        // Child: becomes its own process-group leader.
        unsafe { libc::setpgid(0, 0) };
        run_leader(pipeline, capture_r.as_raw_fd(), capture_w.as_raw_fd());
        // run_leader never returns normally.
        unsafe { libc::_exit(127) };
    }

    let leader_pid = Pid::from_raw(leader_pid);

    // Step 6: parent's own write end is never used; the leader's last
    // stage writes to it instead.
    drop(capture_w);

    let (capture_fd, captured_output) = if pipeline.capture_output {
        configure_async_capture(&capture_r)?;
        (
            Some(capture_r),
            Some(Vec::with_capacity(config.capture_chunk_size)),
        )
    } else {
        drop(capture_r);
        (None, None)
    };

    Ok(Launched {
        pgid: leader_pid,
        capture_fd,
        captured_output,
    })
}

/// Body of the forked leader process (spec.md §4.3.3 steps 4–5). Forks one
/// child per pipeline stage, wires up the inter-stage pipes and the two
/// optional redirections, waits for every stage and exits reflecting their
/// combined outcome. Never returns: every path ends in `_exit`.
fn run_leader<E: ArgExpr>(pipeline: &Pipeline<E>, capture_r: RawFd, capture_w: RawFd) -> ! {
    let leader_pid = unsafe { libc::getpid() };
    let stage_count = pipeline.commands.len();
    let mut prev_input: RawFd = libc::STDIN_FILENO;
    // (pid, is_last) for every forked stage, so the reap loop below can
    // tell the last stage's exit apart from an earlier one without relying
    // on reap order (waitpid(-1, ...) reaps whichever child exits first,
    // not necessarily in pipeline order).
    let mut stages: Vec<(libc::pid_t, bool)> = Vec::with_capacity(stage_count);

    for (i, cmd) in pipeline.commands.iter().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == stage_count;

        let (stage_r, stage_w) = match new_pipe() {
            Ok(pair) => pair,
            Err(_) => unsafe { libc::_exit(1) },
        };

        let child_pid = unsafe { libc::fork() };
        if child_pid < 0 {
            unsafe { libc::_exit(1) };
        }

        if child_pid == 0 {
            unsafe { libc::setpgid(0, leader_pid) };
            run_stage(
                cmd,
                pipeline,
                is_first,
                is_last,
                prev_input,
                stage_r.as_raw_fd(),
                stage_w.as_raw_fd(),
                capture_r,
                capture_w,
            );
            unsafe { libc::_exit(127) };
        }

        stages.push((child_pid, is_last));

        // Leader side: done with the write end, the stage child owns it
        // now; the previous stage's read end is consumed too.
        drop(stage_w);
        if prev_input != libc::STDIN_FILENO {
            unsafe {
                libc::close(prev_input);
            }
        }
        prev_input = stage_r.into_raw_fd();
    }

    if prev_input != libc::STDIN_FILENO {
        unsafe {
            libc::close(prev_input);
        }
    }
    unsafe {
        libc::close(capture_r);
        libc::close(capture_w);
    }

    // Step 5: reap every stage child. An earlier (non-last) stage failing
    // always makes the leader's own exit non-success; otherwise the leader
    // propagates the last stage's exit code verbatim (Open Question 2 —
    // the reference loses this code when an earlier stage fails first).
    let mut earlier_failed = false;
    let mut last_stage_code: Option<i32> = None;

    loop {
        let mut status: i32 = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, 0) };
        if pid <= 0 {
            break;
        }
        let is_last = stages.iter().any(|&(p, last)| p == pid && last);
        if is_last {
            last_stage_code = Some(if classify::wifexited(status) {
                classify::wexitstatus(status)
            } else {
                1
            });
        } else if !(classify::wifexited(status) && classify::wexitstatus(status) == 0) {
            earlier_failed = true;
        }
    }

    let final_code = match (earlier_failed, last_stage_code) {
        (true, _) => 1,
        (false, Some(code)) => code,
        (false, None) => 1,
    };
    unsafe { libc::_exit(final_code) };
}

/// Body of one forked pipeline stage, run before exec. Wires up
/// stdin/stdout per spec.md §4.3.3 step 4c, then execs the stage's
/// program. Never returns on success (exec replaces the process image);
/// any failure before exec falls through to the caller's `_exit(127)`.
fn run_stage<E: ArgExpr>(
    cmd: &Command<E>,
    pipeline: &Pipeline<E>,
    is_first: bool,
    is_last: bool,
    prev_input: RawFd,
    stage_r: RawFd,
    stage_w: RawFd,
    capture_r: RawFd,
    capture_w: RawFd,
) {
    if is_first {
        if let Some(path) = &pipeline.input_file {
            let fd = match open_raw(path, libc::O_RDONLY, 0) {
                Ok(fd) => fd,
                Err(_) => unsafe { libc::_exit(127) },
            };
            dup2_or_exit(fd, libc::STDIN_FILENO);
            unsafe {
                libc::close(fd);
            }
        }
    } else {
        dup2_or_exit(prev_input, libc::STDIN_FILENO);
        unsafe {
            libc::close(prev_input);
        }
    }

    if is_last {
        if let Some(path) = &pipeline.output_file {
            let fd = match open_raw(path, libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC, 0o644) {
                Ok(fd) => fd,
                Err(_) => unsafe { libc::_exit(127) },
            };
            dup2_or_exit(fd, libc::STDOUT_FILENO);
            unsafe {
                libc::close(fd);
            }
        } else if pipeline.capture_output {
            dup2_or_exit(capture_w, libc::STDOUT_FILENO);
        }
    } else {
        dup2_or_exit(stage_w, libc::STDOUT_FILENO);
    }

    // Whichever of these weren't just dup'd onto 0/1 still need closing so
    // the exec'd program doesn't inherit stray pipe ends.
    unsafe {
        if stage_r != libc::STDIN_FILENO {
            libc::close(stage_r);
        }
        if stage_w != libc::STDOUT_FILENO {
            libc::close(stage_w);
        }
        libc::close(capture_r);
        libc::close(capture_w);
    }

    let Some(argv) = build_argv(cmd) else {
        unsafe { libc::_exit(127) };
    };
    let mut raw_argv: Vec<*const libc::c_char> = argv.iter().map(|s| s.as_ptr()).collect();
    raw_argv.push(std::ptr::null());

    unsafe {
        libc::execvp(raw_argv[0], raw_argv.as_ptr());
    }
    // Only reached if execvp failed.
    unsafe { libc::_exit(127) };
}

/// Evaluates every argument expression to a `CString`. Returns `None` on
/// any evaluation failure or embedded NUL byte — both terminate the child
/// with a non-success status per spec.md §4.3.3 step 4c / §7.
fn build_argv<E: ArgExpr>(cmd: &Command<E>) -> Option<Vec<CString>> {
    cmd.args
        .iter()
        .map(|expr| {
            let bytes = expr.eval_to_string().ok()?;
            CString::new(bytes).ok()
        })
        .collect()
}

fn dup2_or_exit(from: RawFd, to: RawFd) {
    if from != to && unsafe { libc::dup2(from, to) } < 0 {
        unsafe { libc::_exit(127) };
    }
}

fn open_raw(path: &Path, flags: libc::c_int, mode: libc::mode_t) -> io::Result<RawFd> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let fd = unsafe { libc::open(c_path.as_ptr(), flags, mode as libc::c_int) };
    if fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

fn new_pipe() -> Result<(OwnedFd, OwnedFd), JobError> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(JobError::Os(nix::errno::Errno::last()));
    }
    // SAFETY: `pipe(2)` just handed us two freshly opened, uniquely owned
    // descriptors.
    unsafe { Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
}

/// Makes `fd` non-blocking and registers it for `SIGIO` delivery to this
/// process when it becomes readable (spec.md §4.3.3 step 6).
fn configure_async_capture(fd: &OwnedFd) -> Result<(), JobError> {
    let raw = fd.as_raw_fd();
    unsafe {
        let flags = libc::fcntl(raw, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(JobError::Os(nix::errno::Errno::last()));
        }
        if libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK | libc::O_ASYNC) < 0 {
            return Err(JobError::Os(nix::errno::Errno::last()));
        }
        if libc::fcntl(raw, libc::F_SETOWN, libc::getpid()) < 0 {
            return Err(JobError::Os(nix::errno::Errno::last()));
        }
    }
    Ok(())
}
