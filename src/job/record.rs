//! Job record and status lifecycle.

use std::fmt;

use nix::unistd::Pid;

use crate::pipeline::Pipeline;

/// Status lifecycle. `NEW` is observable only transiently inside `run` —
/// by the time `run` returns, the job is already `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    New,
    Running,
    Completed,
    Aborted,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Aborted | JobStatus::Canceled
        )
    }

    /// The lowercase word used by `JobManager::show` (spec.md §6).
    pub fn as_word(self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Aborted => "aborted",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_word())
    }
}

pub(crate) struct JobRecord<E> {
    pub job_id: u64,
    pub pgid: Pid,
    pub status: JobStatus,
    /// Raw `wait(2)` status of the leader; meaningful only once `status`
    /// is terminal.
    pub exit_status: Option<i32>,
    /// Read end of the capture pipe, if the pipeline requested capture.
    pub capture_fd: Option<std::os::fd::OwnedFd>,
    pub pipeline: Pipeline<E>,
    pub captured_output: Option<Vec<u8>>,
    pub cancel_requested: bool,
}

impl<E> JobRecord<E> {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
