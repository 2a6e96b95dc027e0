//! Document store: the single authoritative holder of whiteboard state.
//!
//! DESIGN
//! ======
//! `DocStore` owns the element list (paint order, last = topmost), the
//! selection, the active tool and the undo history. Every mutation goes
//! through its methods so history and selection invariants are enforced in
//! one place.
//!
//! Local structural mutations (add, update, move, transform, delete, group,
//! ungroup, clear) push a full snapshot onto the history. The remote path
//! (`apply_remote`, `remove_remote`, `load_snapshot`, `reapply_local`) never
//! touches history, so remote edits neither pollute undo nor look like local
//! changes.
//!
//! Each mutation publishes a [`DocEvent`] to every channel handed out by
//! [`DocStore::subscribe`]. The sync layer listens there instead of
//! inspecting the store.
//!
//! TRADE-OFFS
//! ==========
//! Undo replays whole local snapshots, so undoing after a remote edit can
//! revert that remote edit. The restored state is then re-broadcast like any
//! other local change (last write wins).

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::debug;

use crate::consts::TOMBSTONE_LIMIT;
use crate::element::{Bounds, Element, ElementId, ElementPatch, GroupId, new_group_id};
use crate::group;
use crate::history::History;
use crate::input::Tool;

/// What kind of mutation produced a [`DocEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Moved,
    Transformed,
    Deleted,
    Cleared,
    Grouped,
    Ungrouped,
    Undo,
    Redo,
    /// A remote element upsert was merged.
    RemoteUpsert,
    /// A remote delete was applied.
    RemoteDelete,
    /// The whole document was replaced by a remote snapshot.
    SnapshotLoaded,
    /// Unsent local edits were replayed on top of a fresh snapshot.
    Rebased,
    SelectionChanged,
    ToolChanged,
}

impl ChangeKind {
    /// Whether the change originated locally and must reach the remote store.
    #[must_use]
    pub fn needs_sync(self) -> bool {
        matches!(
            self,
            Self::Added
                | Self::Updated
                | Self::Moved
                | Self::Transformed
                | Self::Deleted
                | Self::Cleared
                | Self::Grouped
                | Self::Ungrouped
                | Self::Undo
                | Self::Redo
                | Self::Rebased
        )
    }

    /// Whether the change completes a visible gesture and should be saved
    /// without waiting out the idle window.
    #[must_use]
    pub fn is_gesture_completion(self) -> bool {
        matches!(self, Self::Added | Self::Moved | Self::Transformed | Self::Grouped | Self::Ungrouped)
    }
}

/// Notification published after every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct DocEvent {
    pub kind: ChangeKind,
    /// Elements touched. Empty when the whole document may have changed
    /// (undo, redo, clear, snapshot).
    pub ids: Vec<ElementId>,
    /// History cursor after the mutation.
    pub history_index: usize,
}

/// Result of merging one remote element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The id was new and the element was appended.
    Inserted,
    /// An existing element was overwritten (last write wins).
    Replaced,
    /// The incoming element was identical to the local one.
    Unchanged,
    /// The id was deleted locally; the update was ignored.
    Tombstoned,
}

/// Locally deleted ids, bounded at [`TOMBSTONE_LIMIT`] with the oldest
/// evicted first.
#[derive(Debug, Default)]
struct Tombstones {
    ids: HashSet<ElementId>,
    order: VecDeque<ElementId>,
}

impl Tombstones {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: ElementId) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > TOMBSTONE_LIMIT {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn lift(&mut self, id: &str) {
        if self.ids.remove(id) {
            self.order.retain(|t| t != id);
        }
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

impl Extend<ElementId> for Tombstones {
    fn extend<I: IntoIterator<Item = ElementId>>(&mut self, iter: I) {
        for id in iter {
            self.insert(id);
        }
    }
}

/// In-memory whiteboard document.
pub struct DocStore {
    elements: Vec<Element>,
    selected: BTreeSet<ElementId>,
    /// Explicitly picked ids in selection order; the last is the primary.
    picks: Vec<ElementId>,
    tool: Tool,
    history: History,
    /// Ids removed by local operations; remote upserts for them are ignored
    /// until the next full snapshot.
    tombstones: Tombstones,
    subscribers: Vec<Sender<DocEvent>>,
}

impl DocStore {
    /// Create an empty store with unbounded history.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_limit(None)
    }

    /// Create an empty store; `Some(limit)` caps the retained history
    /// snapshots, `None` keeps them all.
    #[must_use]
    pub fn with_history_limit(limit: Option<usize>) -> Self {
        Self {
            elements: Vec::new(),
            selected: BTreeSet::new(),
            picks: Vec::new(),
            tool: Tool::default(),
            history: History::new(Vec::new(), limit),
            tombstones: Tombstones::default(),
            subscribers: Vec::new(),
        }
    }

    /// Open a channel that receives every subsequent [`DocEvent`].
    pub fn subscribe(&mut self) -> Receiver<DocEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    // --- Queries ---

    /// Elements in paint order.
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Ids currently selected.
    #[must_use]
    pub fn selected_ids(&self) -> &BTreeSet<ElementId> {
        &self.selected
    }

    /// The most recently selected id, if any.
    #[must_use]
    pub fn selected_element_id(&self) -> Option<&str> {
        self.picks.last().map(String::as_str)
    }

    /// Padded bounding box around the current selection.
    #[must_use]
    pub fn selection_bounds(&self) -> Option<Bounds> {
        group::selection_bounds(&self.elements, &self.selected)
    }

    #[must_use]
    pub fn tool(&self) -> Tool {
        self.tool
    }

    #[must_use]
    pub fn history_index(&self) -> usize {
        self.history.index()
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Whether `id` was deleted locally since the last snapshot.
    #[must_use]
    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }

    /// Number of locally deleted ids currently remembered.
    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    // --- Local mutations ---

    /// Append an element. Duplicate ids are ignored.
    pub fn add_element(&mut self, mut element: Element) -> bool {
        if self.contains(&element.id) {
            debug!(id = %element.id, "add ignored: duplicate id");
            return false;
        }
        element.normalize();
        let id = element.id.clone();
        self.tombstones.lift(&id);
        self.elements.push(element);
        self.commit(ChangeKind::Added, vec![id]);
        true
    }

    /// Merge `patch` into the element `id`. Unknown ids and no-op patches
    /// change nothing.
    pub fn update_element(&mut self, id: &str, patch: &ElementPatch) -> bool {
        let Some(element) = self.elements.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        if !element.apply(patch) {
            return false;
        }
        self.commit(ChangeKind::Updated, vec![id.to_owned()]);
        true
    }

    /// Translate every element in `ids` by `(dx, dy)` as one history entry.
    pub fn move_many<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>, dx: f64, dy: f64) -> bool {
        if dx == 0.0 && dy == 0.0 {
            return false;
        }
        let wanted: HashSet<&str> = ids.into_iter().collect();
        let mut moved = Vec::new();
        for element in &mut self.elements {
            if wanted.contains(element.id.as_str()) {
                element.translate(dx, dy);
                moved.push(element.id.clone());
            }
        }
        if moved.is_empty() {
            return false;
        }
        self.commit(ChangeKind::Moved, moved);
        true
    }

    /// Scale every element in `ids` about the center of `original` by
    /// `(sx, sy)` as one history entry.
    pub fn transform_many(&mut self, ids: &BTreeSet<ElementId>, original: &Bounds, sx: f64, sy: f64) -> bool {
        let scaled = group::scale_selection(&self.elements, ids, original, sx, sy);
        let mut changed = Vec::new();
        for replacement in scaled {
            if let Some(slot) = self.elements.iter_mut().find(|e| e.id == replacement.id) {
                if *slot != replacement {
                    changed.push(replacement.id.clone());
                    *slot = replacement;
                }
            }
        }
        if changed.is_empty() {
            return false;
        }
        self.commit(ChangeKind::Transformed, changed);
        true
    }

    /// Remove one element.
    pub fn delete_element(&mut self, id: &str) -> bool {
        let ids: HashSet<ElementId> = std::iter::once(id.to_owned()).collect();
        self.delete_ids(&ids)
    }

    /// Remove every selected element.
    pub fn delete_selected(&mut self) -> bool {
        let ids: HashSet<ElementId> = self.selected.iter().cloned().collect();
        self.delete_ids(&ids)
    }

    /// Remove every element.
    pub fn clear_canvas(&mut self) -> bool {
        if self.elements.is_empty() {
            return false;
        }
        self.tombstones.extend(self.elements.drain(..).map(|e| e.id));
        self.selected.clear();
        self.picks.clear();
        self.commit(ChangeKind::Cleared, Vec::new());
        true
    }

    /// Put every selected element into one fresh group.
    ///
    /// Requires at least two selected elements; returns the new group id.
    pub fn group_selected(&mut self) -> Option<GroupId> {
        if self.selected.len() < 2 {
            return None;
        }
        let group_id = new_group_id();
        let mut members = Vec::new();
        for element in &mut self.elements {
            if self.selected.contains(&element.id) {
                element.group_id = Some(group_id.clone());
                members.push(element.id.clone());
            }
        }
        if members.len() < 2 {
            return None;
        }
        self.commit(ChangeKind::Grouped, members);
        Some(group_id)
    }

    /// Dissolve every group touched by the selection, including members
    /// that are not selected themselves.
    pub fn ungroup_selected(&mut self) -> bool {
        let groups = group::groups_of(&self.elements, &self.selected);
        if groups.is_empty() {
            return false;
        }
        let mut released = Vec::new();
        for element in &mut self.elements {
            if element.group_id.as_ref().is_some_and(|g| groups.contains(g)) {
                element.group_id = None;
                released.push(element.id.clone());
            }
        }
        self.commit(ChangeKind::Ungrouped, released);
        true
    }

    /// Step back one history entry. Clears the selection.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo().map(<[Element]>::to_vec) else {
            return false;
        };
        self.restore(snapshot, ChangeKind::Undo);
        true
    }

    /// Step forward one history entry. Clears the selection.
    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo().map(<[Element]>::to_vec) else {
            return false;
        };
        self.restore(snapshot, ChangeKind::Redo);
        true
    }

    // --- Selection / tool ---

    /// Select `id` (and its whole group).
    ///
    /// With `additive`, the group is toggled instead: removed if every member
    /// is already selected, added otherwise. `None` clears the selection.
    pub fn select_element(&mut self, id: Option<&str>, additive: bool) -> bool {
        let Some(id) = id else {
            return self.clear_selection();
        };
        if !self.contains(id) {
            return false;
        }
        let members = group::expand_groups(&self.elements, [id]);

        if !additive {
            if self.selected == members && self.selected_element_id() == Some(id) {
                return false;
            }
            self.selected = members;
            self.picks = vec![id.to_owned()];
        } else if members.is_subset(&self.selected) {
            for member in &members {
                self.selected.remove(member);
            }
            self.picks.retain(|p| !members.contains(p));
        } else {
            self.selected.extend(members);
            self.picks.retain(|p| p != id);
            self.picks.push(id.to_owned());
        }
        self.publish(ChangeKind::SelectionChanged, self.selected.iter().cloned().collect());
        true
    }

    /// Replace the selection with the group closure of `ids`.
    pub fn select_many<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> bool {
        let ids: Vec<&str> = ids.into_iter().collect();
        let members = group::expand_groups(&self.elements, ids.iter().copied());
        if members.is_empty() {
            return self.clear_selection();
        }
        self.picks.clear();
        for id in ids.iter().filter(|id| members.contains(**id)) {
            self.picks.retain(|p| p != id);
            self.picks.push((*id).to_owned());
        }
        self.selected = members;
        self.publish(ChangeKind::SelectionChanged, self.selected.iter().cloned().collect());
        true
    }

    /// Deselect everything.
    pub fn clear_selection(&mut self) -> bool {
        if self.selected.is_empty() && self.picks.is_empty() {
            return false;
        }
        self.selected.clear();
        self.picks.clear();
        self.publish(ChangeKind::SelectionChanged, Vec::new());
        true
    }

    /// Switch the active tool. Never touches elements.
    pub fn set_tool(&mut self, tool: Tool) {
        if self.tool != tool {
            self.tool = tool;
            self.publish(ChangeKind::ToolChanged, Vec::new());
        }
    }

    // --- Remote path (no history) ---

    /// Merge one remote element, last write wins.
    pub fn apply_remote(&mut self, mut element: Element) -> RemoteOutcome {
        if self.tombstones.contains(&element.id) {
            debug!(id = %element.id, "remote upsert ignored: deleted locally");
            return RemoteOutcome::Tombstoned;
        }
        element.normalize();
        let id = element.id.clone();
        let outcome = match self.elements.iter_mut().find(|e| e.id == id) {
            Some(existing) if *existing == element => return RemoteOutcome::Unchanged,
            Some(existing) => {
                *existing = element;
                RemoteOutcome::Replaced
            }
            None => {
                self.elements.push(element);
                RemoteOutcome::Inserted
            }
        };
        self.publish(ChangeKind::RemoteUpsert, vec![id]);
        outcome
    }

    /// Remove an element deleted by another participant.
    pub fn remove_remote(&mut self, id: &str) -> bool {
        let before = self.elements.len();
        self.elements.retain(|e| e.id != id);
        if self.elements.len() == before {
            return false;
        }
        self.drop_from_selection(|sid| sid == id);
        self.publish(ChangeKind::RemoteDelete, vec![id.to_owned()]);
        true
    }

    /// Replace the whole document with a remote snapshot.
    ///
    /// Duplicate ids collapse to their last occurrence. The snapshot becomes
    /// the new undo baseline and every tombstone is lifted. Returns the
    /// number of elements kept.
    pub fn load_snapshot(&mut self, records: Vec<Element>) -> usize {
        let mut seen = HashSet::new();
        let mut elements: Vec<Element> = records.into_iter().rev().filter(|e| seen.insert(e.id.clone())).collect();
        elements.reverse();
        for element in &mut elements {
            element.normalize();
        }

        self.elements = elements;
        let present: HashSet<&str> = self.elements.iter().map(|e| e.id.as_str()).collect();
        self.selected.retain(|id| present.contains(id.as_str()));
        if self.picks.last().is_some_and(|p| !present.contains(p.as_str())) {
            self.picks.clear();
        }
        self.picks.retain(|p| present.contains(p.as_str()));
        self.tombstones.clear();
        self.history.reset(self.elements.clone());
        self.publish(ChangeKind::SnapshotLoaded, Vec::new());
        self.elements.len()
    }

    /// Replay unsent local edits on top of the current (freshly loaded)
    /// elements without touching history.
    ///
    /// `changed` elements overwrite or extend the document; `removed` ids are
    /// deleted and tombstoned again.
    pub fn reapply_local(&mut self, changed: Vec<Element>, removed: &[ElementId]) -> bool {
        if changed.is_empty() && removed.is_empty() {
            return false;
        }
        let mut ids = Vec::new();
        for element in changed {
            ids.push(element.id.clone());
            match self.elements.iter_mut().find(|e| e.id == element.id) {
                Some(existing) => *existing = element,
                None => self.elements.push(element),
            }
        }
        let gone: HashSet<&str> = removed.iter().map(String::as_str).collect();
        self.elements.retain(|e| !gone.contains(e.id.as_str()));
        self.drop_from_selection(|sid| gone.contains(sid));
        self.tombstones.extend(removed.iter().cloned());
        ids.extend(removed.iter().cloned());
        self.publish(ChangeKind::Rebased, ids);
        true
    }

    // --- Internals ---

    fn delete_ids(&mut self, ids: &HashSet<ElementId>) -> bool {
        let before = self.elements.len();
        self.elements.retain(|e| !ids.contains(&e.id));
        if self.elements.len() == before {
            return false;
        }
        self.drop_from_selection(|sid| ids.contains(sid));
        self.tombstones.extend(ids.iter().cloned());
        self.commit(ChangeKind::Deleted, ids.iter().cloned().collect());
        true
    }

    fn drop_from_selection(&mut self, mut removed: impl FnMut(&str) -> bool) {
        self.selected.retain(|sid| !removed(sid.as_str()));
        if self.picks.last().is_some_and(|p| removed(p)) {
            self.picks.clear();
        }
        self.picks.retain(|p| !removed(p));
    }

    fn restore(&mut self, snapshot: Vec<Element>, kind: ChangeKind) {
        let after: HashSet<&str> = snapshot.iter().map(|e| e.id.as_str()).collect();
        for element in &self.elements {
            if !after.contains(element.id.as_str()) {
                self.tombstones.insert(element.id.clone());
            }
        }
        for id in &after {
            self.tombstones.lift(id);
        }
        self.elements = snapshot;
        self.selected.clear();
        self.picks.clear();
        self.publish(kind, Vec::new());
    }

    /// Enforce group invariants, record a history snapshot, and notify.
    fn commit(&mut self, kind: ChangeKind, mut ids: Vec<ElementId>) {
        for id in group::prune_singleton_groups(&mut self.elements) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        self.history.push(self.elements.clone());
        self.publish(kind, ids);
    }

    fn publish(&mut self, kind: ChangeKind, ids: Vec<ElementId>) {
        let event = DocEvent { kind, ids, history_index: self.history.index() };
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for DocStore {
    fn default() -> Self {
        Self::new()
    }
}
