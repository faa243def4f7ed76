//! A trivial `ArgExpr` implementation: an already-evaluated string.
//!
//! The real expression evaluator lives outside this crate's scope (it's the
//! dispatcher's job to turn `$foo"bar"` into bytes). `StringLiteral` exists
//! so the crate's own tests and the `mush` demo binary can build pipelines
//! without pulling in a real evaluator.

use std::fmt;

use super::{ArgExpr, EvalError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLiteral(pub String);

impl StringLiteral {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for StringLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ArgExpr for StringLiteral {
    fn eval_to_string(&self) -> Result<Vec<u8>, EvalError> {
        Ok(self.0.clone().into_bytes())
    }
}
