//! mush_core — runtime core for a line-numbered, job-controlled command
//! shell: a job manager, a program store and a variable store.
//!
//! These three components are the shell's execution core; the lexer,
//! parser, AST printer, expression evaluator and top-level dispatcher are
//! out of scope and are expected to sit one layer above, consuming the
//! public API of [`job`], [`program`] and [`vars`].

pub mod error;
pub mod job;
pub mod pipeline;
pub mod program;
pub mod vars;

pub use error::{Error, Result};
pub use job::{JobError, JobManager, JobManagerConfig, JobStatus};
pub use pipeline::{ArgExpr, Command, Pipeline};
pub use program::{render_stmt, ProgramError, ProgramStore};
pub use vars::{VarError, VariableStore};
