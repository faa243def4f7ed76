//! Pipeline AST: a forward-linked sequence of commands connected by pipes,
//! plus the three optional attributes the job manager's launch protocol
//! needs (`input_file`, `output_file`, `capture_output`).
//!
//! The pipeline is generic over `E: ArgExpr`, the argument-expression type
//! owned by the (out-of-scope) expression evaluator. The job manager only
//! ever calls `ArgExpr::eval_to_string` on it; it never needs to know what
//! an expression actually *is*.

pub mod literal;
pub mod render;

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub use literal::StringLiteral;
pub use render::render_pipeline;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to evaluate argument: {0}")]
pub struct EvalError(pub String);

/// The external `eval_to_string` collaborator: evaluates an argument
/// expression to the bytes that should be passed to `execvp`.
pub trait ArgExpr: fmt::Debug {
    fn eval_to_string(&self) -> Result<Vec<u8>, EvalError>;
}

/// One stage of a pipeline.
#[derive(Debug, Clone)]
pub struct Command<E> {
    /// `args[0]` is the program name, the rest are its arguments.
    pub args: Vec<E>,
}

impl<E> Command<E> {
    pub fn new(args: Vec<E>) -> Self {
        Self { args }
    }
}

/// A pipeline: an ordered sequence of commands whose standard streams are
/// chained, plus at most one input redirection on the first stage and
/// either an output redirection or output capture on the last.
#[derive(Debug, Clone)]
pub struct Pipeline<E> {
    pub commands: Vec<Command<E>>,
    pub input_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub capture_output: bool,
}

impl<E> Pipeline<E> {
    pub fn new(commands: Vec<Command<E>>) -> Self {
        Self {
            commands,
            input_file: None,
            output_file: None,
            capture_output: false,
        }
    }

    pub fn with_input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_file = Some(path.into());
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }
}
