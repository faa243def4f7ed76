//! Variable store: a string-keyed environment with typed getters/setters
//! over a single string representation.
//!
//! Entries are kept in an [`IndexMap`] rather than a bare `Vec` scanned
//! linearly — the reference implementation's "names are few, linear scan is
//! fine" note describes an *implementation detail*, not an observable
//! contract; `IndexMap` gives the same insertion-order iteration with O(1)
//! amortized lookup, which is strictly better for the same semantics.

use std::fmt::Write as _;

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VarError {
    #[error("variable name must not be empty")]
    EmptyName,

    #[error("unknown variable {0:?}")]
    NotFound(String),

    #[error("variable {0:?} is unset")]
    Unset(String),

    #[error("variable {0:?} is not a valid integer")]
    ParseInt(String),
}

/// A single variable slot: `None` once the entry has been set to *unset*,
/// `Some(bytes)` while it holds a value. The entry itself is never removed
/// from the map once created — only its slot is cleared — so that insertion
/// order (and the name's "known-ness") survives an unset/reset cycle.
type Slot = Option<Vec<u8>>;

/// String-keyed variable environment.
///
/// All failures are reported through `Result`; no operation partially
/// mutates the store before returning an error.
#[derive(Debug, Default)]
pub struct VariableStore {
    entries: IndexMap<String, Slot>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value, or `None` if the name is unknown or unset.
    pub fn get_string(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).and_then(|slot| slot.as_deref())
    }

    /// Parses the current value as a signed base-10 integer. Fails if the
    /// name is unknown, unset, empty, or contains anything beyond an
    /// optional leading `-` and decimal digits (no leading `+`, no
    /// whitespace, no trailing garbage).
    pub fn get_int(&self, name: &str) -> Result<i64, VarError> {
        let value = self
            .entries
            .get(name)
            .ok_or_else(|| VarError::NotFound(name.to_string()))?
            .as_deref()
            .ok_or_else(|| VarError::Unset(name.to_string()))?;

        parse_strict_int(value).ok_or_else(|| VarError::ParseInt(name.to_string()))
    }

    /// Creates or updates `name` to hold `value`, or marks it unset if
    /// `value` is `None`. Fails if `name` is empty. Reassigning an existing
    /// entry updates it in place — its position in iteration order does not
    /// change.
    pub fn set_string(&mut self, name: &str, value: Option<&[u8]>) -> Result<(), VarError> {
        if name.is_empty() {
            return Err(VarError::EmptyName);
        }
        let slot = value.map(|v| v.to_vec());
        match self.entries.get_mut(name) {
            Some(existing) => *existing = slot,
            None => {
                self.entries.insert(name.to_string(), slot);
            }
        }
        Ok(())
    }

    /// Stores the canonical base-10 text of `value` (no leading zeros,
    /// `-` only for negatives).
    pub fn set_int(&mut self, name: &str, value: i64) -> Result<(), VarError> {
        self.set_string(name, Some(value.to_string().as_bytes()))
    }

    /// Writes a brace-delimited debug rendering: `{}` for an empty store,
    /// else `{` + entries joined by `, ` + `}`. A set entry renders as
    /// `name=value`; an unset entry as `name ` (trailing space, preserved
    /// for compatibility with the reference dump format even though it
    /// reads as ambiguous — see Open Questions).
    pub fn show<W: std::fmt::Write>(&self, sink: &mut W) -> std::fmt::Result {
        sink.write_char('{')?;
        for (i, (name, slot)) in self.entries.iter().enumerate() {
            if i > 0 {
                sink.write_str(", ")?;
            }
            match slot {
                Some(value) => {
                    write!(sink, "{name}=")?;
                    sink.write_str(&String::from_utf8_lossy(value))?;
                }
                None => write!(sink, "{name} ")?,
            }
        }
        sink.write_char('}')
    }

    /// Renders [`show`](Self::show) into an owned `String`, for callers that
    /// don't already have a `Write` sink handy (e.g. tests, the demo CLI).
    pub fn show_to_string(&self) -> String {
        let mut s = String::new();
        self.show(&mut s).expect("String writes are infallible");
        s
    }
}

/// Strict signed base-10 integer parse: rejects empty input, leading/trailing
/// whitespace, a leading `+`, and any non-digit trailing characters. Accepts
/// a single leading `-` for negatives.
fn parse_strict_int(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() {
        return None;
    }
    let s = std::str::from_utf8(bytes).ok()?;
    let mut chars = s.chars();
    let first = chars.clone().next()?;
    if first == '+' {
        return None;
    }
    let digits_start = if first == '-' { 1 } else { 0 };
    if s[digits_start..].is_empty() {
        return None;
    }
    if !s[digits_start..].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok()
}
