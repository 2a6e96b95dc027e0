//! Linear undo/redo history of whole-document snapshots.
//!
//! Every structural mutation pushes the complete element list. Undo and redo
//! move a cursor and hand back the snapshot under it; the caller replaces its
//! elements wholesale. Pushing after an undo discards the redo tail.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use crate::element::Element;

/// Snapshot history with a cursor.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<Vec<Element>>,
    index: usize,
    limit: Option<usize>,
}

impl History {
    /// History holding only `baseline`. With `Some(limit)` at most `limit`
    /// snapshots are retained; `None` keeps every snapshot.
    #[must_use]
    pub fn new(baseline: Vec<Element>, limit: Option<usize>) -> Self {
        Self { entries: vec![baseline], index: 0, limit: limit.map(|n| n.max(1)) }
    }

    /// Record a new snapshot after the cursor, dropping any redo tail.
    pub fn push(&mut self, snapshot: Vec<Element>) {
        self.entries.truncate(self.index + 1);
        self.entries.push(snapshot);
        if let Some(limit) = self.limit {
            if self.entries.len() > limit {
                let overflow = self.entries.len() - limit;
                self.entries.drain(..overflow);
            }
        }
        self.index = self.entries.len() - 1;
    }

    /// Step back one snapshot. `None` at the oldest entry.
    pub fn undo(&mut self) -> Option<&[Element]> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        self.entries.get(self.index).map(Vec::as_slice)
    }

    /// Step forward one snapshot. `None` at the newest entry.
    pub fn redo(&mut self) -> Option<&[Element]> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index).map(Vec::as_slice)
    }

    /// Discard everything and start again from `baseline`.
    pub fn reset(&mut self, baseline: Vec<Element>) {
        self.entries.clear();
        self.entries.push(baseline);
        self.index = 0;
    }

    /// Position of the cursor.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of retained snapshots, including the baseline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; a history holds at least its baseline.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }
}
