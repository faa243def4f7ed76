//! Job manager: pipeline launch under a dedicated process group, async
//! lifecycle tracking via SIGCHLD/SIGIO, optional output capture, and
//! wait/poll/cancel/expunge (spec.md §4.3).
//!
//! The manager owns its job table directly rather than behind a
//! process-wide static — see DESIGN.md for why: the signal handlers
//! installed by [`signal::install`] never touch the table themselves, they
//! only flip an atomic flag, so there is no async-signal-safety reason to
//! make the table reachable from a `static`. All table mutation happens on
//! the thread that calls `JobManager`'s methods, serialized against signal
//! delivery by masking (`signal::AllSignalsBlocked`) rather than a mutex.

mod classify;
mod launch;
pub(crate) mod record;
mod signal;

use std::fmt;
use std::io;
use std::os::fd::AsRawFd;

use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, trace};

pub use record::JobStatus;
use record::JobRecord;

use crate::pipeline::{render_pipeline, ArgExpr, Pipeline};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("unknown job id {0}")]
    NotFound(u64),

    #[error("job {0} has already reached a terminal state")]
    AlreadyTerminal(u64),

    #[error("job {0} has not terminated yet")]
    StillRunning(u64),

    #[error("job {0} has already been canceled")]
    AlreadyCanceled(u64),

    #[error("job manager already initialized")]
    AlreadyInitialized,

    #[error("job manager not initialized; call init() first")]
    NotInitialized,

    #[error("OS call failed: {0}")]
    Os(#[from] nix::errno::Errno),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Tuning knobs for the job manager (spec.md §4.3.x ambient config).
#[derive(Debug, Clone, Copy)]
pub struct JobManagerConfig {
    /// Initial capacity reserved for each job's captured-output buffer.
    pub capture_chunk_size: usize,
    /// Read chunk size used when draining a capture pipe.
    pub drain_chunk_size: usize,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            capture_chunk_size: 4096,
            drain_chunk_size: 4096,
        }
    }
}

/// The job table and its lifecycle (spec.md §4.3.2).
///
/// `E` is the argument-expression type the pipeline's commands carry; see
/// [`crate::pipeline::ArgExpr`].
pub struct JobManager<E> {
    config: JobManagerConfig,
    initialized: bool,
    next_job_id: u64,
    jobs: Vec<JobRecord<E>>,
}

impl<E> JobManager<E> {
    pub fn new(config: JobManagerConfig) -> Self {
        Self {
            config,
            initialized: false,
            next_job_id: 0,
            jobs: Vec::new(),
        }
    }

    /// Installs the SIGCHLD/SIGIO handlers and creates the empty job
    /// table. Must be called exactly once before any other operation.
    pub fn init(&mut self) -> Result<(), JobError> {
        if self.initialized {
            return Err(JobError::AlreadyInitialized);
        }
        signal::install()?;
        self.initialized = true;
        debug!("job manager initialized");
        Ok(())
    }

    /// For each job still running: cancels and waits for it, then expunges
    /// every job and tears the table down. Best-effort — a job that was
    /// already mid-cancel when `fini` runs is simply waited on, not
    /// re-canceled.
    pub fn fini(&mut self) -> Result<(), JobError> {
        self.require_initialized()?;
        let ids: Vec<u64> = self.jobs.iter().map(|j| j.job_id).collect();
        for id in ids {
            let terminal = self.find(id).map(|j| j.is_terminal()).unwrap_or(true);
            if !terminal {
                let _ = self.cancel(id);
                let _ = self.wait(id);
            }
            self.expunge(id)?;
        }
        self.initialized = false;
        debug!("job manager torn down");
        Ok(())
    }

    /// Blocks until the job's status is terminal and returns its raw wait
    /// status. Errors if `job_id` is unknown. Idempotent: calling this
    /// again on an already-terminal job returns the same status without
    /// blocking (spec.md §8 law 9).
    pub fn wait(&mut self, job_id: u64) -> Result<i32, JobError> {
        self.require_initialized()?;
        loop {
            self.process_pending_events();
            if let Some(status) = self.find(job_id)?.exit_status {
                return Ok(status);
            }
            signal::suspend_unblocking_sigchld();
        }
    }

    /// Non-blocking: returns the raw wait status if the job is terminal,
    /// otherwise `Err(JobError::StillRunning)`. Errors if unknown.
    pub fn poll(&mut self, job_id: u64) -> Result<i32, JobError> {
        self.require_initialized()?;
        self.process_pending_events();
        self.find(job_id)?
            .exit_status
            .ok_or(JobError::StillRunning(job_id))
    }

    /// Sends `SIGKILL` to the job's entire process group and marks it
    /// cancel-requested. The state transition to `Canceled` happens later,
    /// when the termination event for the leader arrives. Requires the job
    /// to be running and not already canceled.
    pub fn cancel(&mut self, job_id: u64) -> Result<(), JobError> {
        self.require_initialized()?;
        self.process_pending_events();
        let job = self.find_mut(job_id)?;
        if job.is_terminal() {
            return Err(JobError::AlreadyTerminal(job_id));
        }
        if job.cancel_requested {
            return Err(JobError::AlreadyCanceled(job_id));
        }
        job.cancel_requested = true;
        let pgid = job.pgid;
        // SAFETY: `kill` with a negative pid targets the whole process
        // group; no memory unsafety, just an OS call that can fail.
        unsafe {
            libc::kill(-pgid.as_raw(), libc::SIGKILL);
        }
        debug!(job_id, pgid = pgid.as_raw(), "canceled job");
        Ok(())
    }

    /// Closes the capture fd (if open), frees the pipeline copy and
    /// captured output, and removes the record. Requires the job to be
    /// terminal.
    pub fn expunge(&mut self, job_id: u64) -> Result<(), JobError> {
        self.require_initialized()?;
        let idx = self
            .jobs
            .iter()
            .position(|j| j.job_id == job_id)
            .ok_or(JobError::NotFound(job_id))?;
        if !self.jobs[idx].is_terminal() {
            return Err(JobError::StillRunning(job_id));
        }
        // Dropping the record closes `capture_fd` (an `OwnedFd`) and frees
        // `captured_output`/`pipeline` — no explicit free callback needed.
        self.jobs.remove(idx);
        trace!(job_id, "expunged job");
        Ok(())
    }

    /// Borrowed view of the captured output, or `None` if the pipeline
    /// didn't request capture. Must be called before `expunge`.
    pub fn get_output(&self, job_id: u64) -> Result<Option<&[u8]>, JobError> {
        Ok(self.find(job_id)?.captured_output.as_deref())
    }

    /// Blocks until any signal is delivered. Used by the dispatcher to idle
    /// between status events without busy-waiting; does not itself process
    /// pending events — the next `wait`/`poll`/`show` call does that.
    pub fn pause(&self) -> Result<(), JobError> {
        self.require_initialized()?;
        signal::suspend_until_any_signal();
        Ok(())
    }

    fn require_initialized(&self) -> Result<(), JobError> {
        if self.initialized {
            Ok(())
        } else {
            Err(JobError::NotInitialized)
        }
    }

    fn find(&self, job_id: u64) -> Result<&JobRecord<E>, JobError> {
        self.jobs
            .iter()
            .find(|j| j.job_id == job_id)
            .ok_or(JobError::NotFound(job_id))
    }

    fn find_mut(&mut self, job_id: u64) -> Result<&mut JobRecord<E>, JobError> {
        self.jobs
            .iter_mut()
            .find(|j| j.job_id == job_id)
            .ok_or(JobError::NotFound(job_id))
    }

    /// Reaps every terminated child and drains every readable capture pipe.
    /// Always safe to call speculatively: both operations are non-blocking
    /// and idempotent once there's nothing left to reap/drain. Called at
    /// the top of every `wait`/`poll`/`cancel` iteration rather than being
    /// gated strictly on the pending-signal flags, so a flag coalesced
    /// across two deliveries never leaves state stale.
    fn process_pending_events(&mut self) {
        let _ = signal::take_sigchld_pending();
        let _ = signal::take_sigio_pending();
        self.reap_terminated();
        self.drain_capture_pipes();
    }

    /// Non-blocking coalescing reap loop (spec.md §4.3.5, Design Notes
    /// "single coalescing reap loop"; also resolves Open Question 3 — the
    /// conventional `> 0` loop condition, not the reference's inverted one).
    fn reap_terminated(&mut self) {
        loop {
            let mut status: i32 = 0;
            let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
            if pid <= 0 {
                break;
            }
            let pid = Pid::from_raw(pid);
            if let Some(job) = self.jobs.iter_mut().find(|j| j.pgid == pid) {
                let new_status = classify::classify_wait_status(status);
                job.exit_status = Some(status);
                job.status = new_status;
                debug!(job_id = job.job_id, status = %new_status, "job terminated");
            }
            // A pid matching no job's pgid is a stage child; stage children
            // are reaped by their own leader, not by us, so this is
            // expected and silently discarded.
        }
    }

    /// Drains every job's capture pipe with non-blocking reads until it
    /// would block or hits end-of-file. End-of-file does not close the fd;
    /// that's deferred to `expunge` (spec.md §4.3.4).
    fn drain_capture_pipes(&mut self) {
        let chunk = self.config.drain_chunk_size;
        let mut buf = vec![0u8; chunk];
        for job in &mut self.jobs {
            let Some(fd) = &job.capture_fd else {
                continue;
            };
            let raw = fd.as_raw_fd();
            loop {
                let n = unsafe {
                    libc::read(raw, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
                };
                if n > 0 {
                    let out = job.captured_output.get_or_insert_with(Vec::new);
                    out.extend_from_slice(&buf[..n as usize]);
                } else if n == 0 {
                    break;
                } else {
                    // EAGAIN/EWOULDBLOCK (fd is non-blocking and has
                    // nothing more right now) or some other read error —
                    // either way, stop draining this job for this pass.
                    break;
                }
            }
        }
    }
}

impl<E: ArgExpr + Clone> JobManager<E> {
    /// Launches `pipeline` under a fresh process group and returns its job
    /// id. Takes a deep copy of `pipeline` for the job record (spec.md
    /// §4.3.3 step 7 / §5 "pipelines are deep-copied on `run`"); the
    /// original stays owned by the caller (e.g. a program-store line that
    /// may be run again later).
    pub fn run(&mut self, pipeline: &Pipeline<E>) -> Result<u64, JobError> {
        self.require_initialized()?;

        // Block all signals across the fork/record-publish critical
        // section so a termination event can never observe a
        // half-published job record (spec.md §4.3.3 step 2, §5).
        let _guard = signal::AllSignalsBlocked::enter()?;

        let launched = launch::launch(pipeline, &self.config)?;

        let job_id = self.next_job_id;
        self.next_job_id += 1;
        self.jobs.push(JobRecord {
            job_id,
            pgid: launched.pgid,
            status: JobStatus::Running,
            exit_status: None,
            capture_fd: launched.capture_fd,
            pipeline: pipeline.clone(),
            captured_output: launched.captured_output,
            cancel_requested: false,
        });
        debug!(job_id, pgid = launched.pgid.as_raw(), "job running");
        Ok(job_id)
        // `_guard` drops here, restoring the signal mask the caller had on
        // entry to `run`.
    }
}

impl<E: ArgExpr + fmt::Display> JobManager<E> {
    /// Emits one line per job: `<job_id>\t<pgid>\t<status>\t<pipeline>\n`
    /// (spec.md §6). Processes any pending SIGCHLD/SIGIO events first, so a
    /// termination that already arrived asynchronously (e.g. observed via a
    /// prior `pause()`) is reflected even without an intervening
    /// `wait`/`poll` call.
    pub fn show<W: io::Write>(&mut self, sink: &mut W) -> io::Result<()> {
        self.process_pending_events();
        for job in &self.jobs {
            write!(sink, "{}\t{}\t{}\t", job.job_id, job.pgid.as_raw(), job.status)?;
            render_pipeline(sink, &job.pipeline)?;
            writeln!(sink)?;
        }
        Ok(())
    }
}
