//! Crate-wide error type.
//!
//! Each component (variable store, program store, job manager) exposes its
//! own narrow error enum so callers can match on exactly what can go wrong
//! in that component. This type exists for call sites — the demo binary,
//! integration tests — that want to bubble any of them up through a single
//! `?`-friendly type.

use thiserror::Error;

use crate::job::JobError;
use crate::program::ProgramError;
use crate::vars::VarError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Var(#[from] VarError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OS call failed: {0}")]
    Nix(#[from] nix::errno::Errno),
}

pub type Result<T> = std::result::Result<T, Error>;
