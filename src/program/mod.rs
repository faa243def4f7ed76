//! Program store: an ordered, line-numbered statement table with a cursor
//! ("program counter") that survives edits.
//!
//! Lines live in a [`BTreeMap`] keyed by line number. Because that key space
//! never shifts under insertion or deletion (unlike a vector index), the
//! cursor can simply remember the line number it designates — that number
//! is already a stable handle, so no arena or generation counter is needed
//! to satisfy the "cursor survives structural edits" invariant.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("line number must be positive")]
    NonPositiveLine,

    #[error("delete range [{min}, {max}] is empty or inverted")]
    BadRange { min: i64, max: i64 },
}

/// Logical cursor position: before a specific stored line, or past the last
/// one. `None` at the `ProgramStore` level additionally represents "never
/// reset" (distinct from `AtEnd`, which means "reset, but store was/＝is
/// empty").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Before(i64),
    AtEnd,
}

/// Ordered line-numbered statement table.
///
/// `S` is the opaque statement type owned by the store; it corresponds to
/// the reference's `stmt` pointer. Rust's ownership model means `insert`
/// and `delete` simply drop replaced/removed statements — no `free_stmt`
/// callback is required.
#[derive(Debug)]
pub struct ProgramStore<S> {
    lines: BTreeMap<i64, S>,
    cursor: Option<Cursor>,
}

impl<S> Default for ProgramStore<S> {
    fn default() -> Self {
        Self {
            lines: BTreeMap::new(),
            cursor: None,
        }
    }
}

impl<S> ProgramStore<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the statement at `lineno`. Never moves the
    /// cursor: if the cursor designated the replaced line, it still
    /// designates it (now holding the new statement); if it designated
    /// `AtEnd` or some other line, it is unaffected.
    pub fn insert(&mut self, lineno: i64, stmt: S) -> Result<(), ProgramError> {
        if lineno <= 0 {
            return Err(ProgramError::NonPositiveLine);
        }
        self.lines.insert(lineno, stmt);
        Ok(())
    }

    /// Removes every line with `lineno` in `[min, max]`. If the cursor
    /// pointed inside the removed range, it advances to the first
    /// surviving line past `max`, or `AtEnd` if none survives.
    pub fn delete(&mut self, min: i64, max: i64) -> Result<(), ProgramError> {
        if min < 1 || min > max {
            return Err(ProgramError::BadRange { min, max });
        }

        let removed_cursor_line = matches!(self.cursor, Some(Cursor::Before(l)) if l >= min && l <= max);

        self.lines.retain(|&lineno, _| lineno < min || lineno > max);

        if removed_cursor_line {
            self.cursor = Some(match self.lines.range((max + 1)..).next() {
                Some((&lineno, _)) => Cursor::Before(lineno),
                None => Cursor::AtEnd,
            });
        }
        Ok(())
    }

    /// Sets the cursor to the first stored line, or `AtEnd` if the store is
    /// empty.
    pub fn reset(&mut self) {
        self.cursor = Some(match self.lines.keys().next() {
            Some(&lineno) => Cursor::Before(lineno),
            None => Cursor::AtEnd,
        });
    }

    /// Returns the statement at the cursor without advancing it.
    pub fn fetch(&self) -> Option<&S> {
        match self.cursor {
            Some(Cursor::Before(lineno)) => self.lines.get(&lineno),
            _ => None,
        }
    }

    /// Advances the cursor by one position (if not already `AtEnd`) and
    /// returns the statement now at the cursor.
    pub fn next(&mut self) -> Option<&S> {
        if let Some(Cursor::Before(lineno)) = self.cursor {
            self.cursor = Some(match self.lines.range((lineno + 1)..).next() {
                Some((&next_line, _)) => Cursor::Before(next_line),
                None => Cursor::AtEnd,
            });
        }
        self.fetch()
    }

    /// If `lineno` exists, moves the cursor to designate it and returns its
    /// statement; otherwise leaves the cursor untouched and returns `None`.
    pub fn goto(&mut self, lineno: i64) -> Option<&S> {
        if self.lines.contains_key(&lineno) {
            self.cursor = Some(Cursor::Before(lineno));
            self.lines.get(&lineno)
        } else {
            None
        }
    }

    /// Emits every statement in line-number order via `render`, writing a
    /// bare `-->\n` marker line immediately before the statement at the
    /// cursor position (or at the very end, if the cursor is `AtEnd`).
    pub fn list<W: std::io::Write>(
        &self,
        sink: &mut W,
        mut render: impl FnMut(&S, &mut W) -> std::io::Result<()>,
    ) -> std::io::Result<()> {
        let cursor_line = match self.cursor {
            Some(Cursor::Before(lineno)) => Some(lineno),
            _ => None,
        };

        for (&lineno, stmt) in &self.lines {
            if cursor_line == Some(lineno) {
                sink.write_all(b"-->\n")?;
            }
            render(stmt, sink)?;
        }

        if cursor_line.is_none() && self.cursor.is_some() {
            sink.write_all(b"-->\n")?;
        }
        Ok(())
    }

    /// Statements in line-number order (for callers that want an iterator
    /// rather than the `list` sink-based form, e.g. tests).
    pub fn iter(&self) -> impl Iterator<Item = (i64, &S)> {
        self.lines.iter().map(|(&lineno, stmt)| (lineno, stmt))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl<S: fmt::Display> ProgramStore<S> {
    /// Convenience over [`list`](Self::list) for statement types that
    /// already implement `Display` — the reference `show_stmt` collaborator
    /// reduced to one line per statement. A dispatcher with a richer AST
    /// printer would call `list` directly with its own renderer instead.
    pub fn list_display<W: std::io::Write>(&self, sink: &mut W) -> std::io::Result<()> {
        self.list(sink, render_stmt)
    }
}

/// Reference `show_stmt` implementation: writes `{stmt}\n`. Exists so
/// `ProgramStore::list` has something to call for statement types that are
/// plain `Display`able; a real dispatcher supplies its own renderer to
/// `list` directly instead.
pub fn render_stmt<S: fmt::Display, W: std::io::Write>(
    stmt: &S,
    sink: &mut W,
) -> std::io::Result<()> {
    writeln!(sink, "{stmt}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_ordering_holds_after_inserts_and_deletes() {
        let mut store = ProgramStore::new();
        store.insert(30, "c").unwrap();
        store.insert(10, "a").unwrap();
        store.insert(20, "b").unwrap();
        store.delete(15, 25).unwrap();

        let linenos: Vec<i64> = store.iter().map(|(n, _)| n).collect();
        assert!(linenos.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(linenos, vec![10, 30]);
    }

    #[test]
    fn cursor_preserved_across_insert() {
        let mut store = ProgramStore::new();
        store.insert(10, "a").unwrap();
        store.insert(30, "c").unwrap();
        store.goto(30);
        store.insert(20, "b").unwrap();
        assert_eq!(store.fetch(), Some(&"c"));
    }

    #[test]
    fn cursor_preserved_across_delete() {
        let mut store = ProgramStore::new();
        store.insert(10, "a").unwrap();
        store.insert(20, "b").unwrap();
        store.insert(30, "c").unwrap();
        store.goto(20);

        store.delete(20, 20).unwrap();
        assert_eq!(store.fetch(), Some(&"c"));

        store.delete(20, 30).unwrap();
        assert_eq!(store.fetch(), None);
    }

    #[test]
    fn scenario_s2_program_edits() {
        let mut store = ProgramStore::new();
        store.insert(10, "a").unwrap();
        store.insert(20, "b").unwrap();
        store.insert(30, "c").unwrap();

        store.reset();
        assert_eq!(store.fetch(), Some(&"a"));
        assert_eq!(store.next(), Some(&"b"));

        store.delete(15, 25).unwrap();
        assert_eq!(store.fetch(), Some(&"c"));
    }

    #[test]
    fn insert_replaces_without_moving_cursor() {
        let mut store = ProgramStore::new();
        store.insert(10, "a").unwrap();
        store.goto(10);
        store.insert(10, "a2").unwrap();
        assert_eq!(store.fetch(), Some(&"a2"));
    }

    #[test]
    fn reset_on_empty_store_is_at_end() {
        let mut store: ProgramStore<&str> = ProgramStore::new();
        store.reset();
        assert_eq!(store.fetch(), None);
    }

    #[test]
    fn bad_ranges_rejected() {
        let mut store: ProgramStore<&str> = ProgramStore::new();
        assert_eq!(store.insert(0, "x"), Err(ProgramError::NonPositiveLine));
        assert_eq!(
            store.delete(5, 2),
            Err(ProgramError::BadRange { min: 5, max: 2 })
        );
    }

    #[test]
    fn list_emits_marker_at_cursor_and_at_end() {
        let mut store = ProgramStore::new();
        store.insert(10, "a").unwrap();
        store.insert(20, "b").unwrap();
        store.goto(20);

        let mut out = Vec::new();
        store
            .list(&mut out, |s, w| writeln!(w, "{s}"))
            .unwrap();
        assert_eq!(out, b"a\n-->\nb\n".to_vec());

        store.next();
        let mut out = Vec::new();
        store
            .list(&mut out, |s, w| writeln!(w, "{s}"))
            .unwrap();
        assert_eq!(out, b"a\nb\n-->\n".to_vec());
    }

    #[test]
    fn list_display_uses_render_stmt_default() {
        let mut store = ProgramStore::new();
        store.insert(10, "a").unwrap();
        store.insert(20, "b").unwrap();
        store.reset();

        let mut out = Vec::new();
        store.list_display(&mut out).unwrap();
        assert_eq!(out, b"-->\na\nb\n".to_vec());
    }
}
