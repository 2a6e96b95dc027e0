//! Session: the testable core a host embeds.
//!
//! DESIGN
//! ======
//! A `Session` owns one `DocStore`, one `SyncCoordinator` and the gesture in
//! progress. Hosts translate device input into `on_pointer_*` / `on_key_down`
//! calls, forward server traffic to `handle_inbound`, and call `tick` on
//! every timer wake-up (see `next_deadline`). Each entry point drains the
//! store's change events into the coordinator before returning, so the
//! flush timer always reflects the latest mutation.
//!
//! Time comes from an injected [`Clock`] so tests can drive the debounce
//! window deterministically.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::sync::mpsc::Receiver;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::doc::{DocEvent, DocStore};
use crate::element::{Element, ElementId, ElementIdGen, ElementPatch, Point, Style};
use crate::group;
use crate::hit::{self, Hit};
use crate::input::{self, Command, Gesture, Key, Modifiers, Tool};
use crate::sync::{FlushReport, Inbound, SyncConfig, SyncCoordinator, SyncStatus, Transport, TransportError};

/// Source of time for a [`Session`].
pub trait Clock {
    /// Monotonic time used for debounce deadlines.
    fn now(&self) -> Instant;
    /// Wall-clock milliseconds used to stamp new element ids.
    fn unix_millis(&self) -> u64;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Actions returned from input handlers for the host to process.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// A new element was committed.
    ElementCreated(ElementId),
    /// Elements changed; the scene must be redrawn.
    ElementsChanged,
    SelectionChanged,
    ToolChanged(Tool),
    /// Only transient state (a draft, a marquee, a drag preview) changed.
    RenderNeeded,
}

/// One participant's editing session in one room.
pub struct Session<T: Transport, C: Clock = SystemClock> {
    doc: DocStore,
    sync: SyncCoordinator<T>,
    events: Receiver<DocEvent>,
    gesture: Gesture,
    ids: ElementIdGen,
    style: Style,
    clock: C,
}

impl<T: Transport> Session<T, SystemClock> {
    #[must_use]
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self::with_clock(transport, config, SystemClock)
    }
}

impl<T: Transport, C: Clock> Session<T, C> {
    #[must_use]
    pub fn with_clock(transport: T, config: SyncConfig, clock: C) -> Self {
        let mut doc = DocStore::with_history_limit(config.history_limit);
        let events = doc.subscribe();
        Self {
            doc,
            sync: SyncCoordinator::new(transport, config),
            events,
            gesture: Gesture::Idle,
            ids: ElementIdGen::new(),
            style: Style::default(),
            clock,
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn doc(&self) -> &DocStore {
        &self.doc
    }

    #[must_use]
    pub fn sync(&self) -> &SyncCoordinator<T> {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut SyncCoordinator<T> {
        &mut self.sync
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.sync.status()
    }

    #[must_use]
    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// The element being drawn, for preview rendering.
    #[must_use]
    pub fn draft(&self) -> Option<&Element> {
        match &self.gesture {
            Gesture::Drawing { draft, .. } => Some(draft),
            _ => None,
        }
    }

    /// When the host should next call [`Session::tick`].
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sync.deadline()
    }

    #[must_use]
    pub fn style(&self) -> &Style {
        &self.style
    }

    /// Style applied to elements drawn from now on.
    pub fn set_style(&mut self, style: Style) {
        self.style = style;
    }

    // --- Room lifecycle ---

    /// Join `room_id`; the snapshot arrives later through `handle_inbound`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the join could not be sent.
    pub fn join(&mut self, room_id: &str) -> Result<(), TransportError> {
        self.sync.join(room_id)
    }

    /// Flush everything, optionally persist, and leave the room.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the leave could not be sent.
    pub fn leave(&mut self, persist: bool) -> Result<FlushReport, TransportError> {
        self.pump();
        self.sync.leave(&self.doc, persist)
    }

    /// Merge a server message.
    pub fn handle_inbound(&mut self, message: Inbound) -> Vec<Action> {
        let changed = self.sync.handle_inbound(&mut self.doc, message);
        self.pump();
        if changed { vec![Action::ElementsChanged] } else { Vec::new() }
    }

    /// Flush if the debounce timer is due.
    pub fn tick(&mut self) -> Option<FlushReport> {
        self.pump();
        self.sync.poll(&self.doc, self.clock.now())
    }

    /// Manual save: cancel the timer and flush now.
    pub fn save(&mut self, persist: bool) -> FlushReport {
        self.pump();
        self.sync.save(&self.doc, persist)
    }

    // --- Document commands ---

    pub fn set_tool(&mut self, tool: Tool) -> Vec<Action> {
        self.gesture = Gesture::Idle;
        if self.doc.tool() == tool {
            return Vec::new();
        }
        self.doc.set_tool(tool);
        self.pump();
        vec![Action::ToolChanged(tool)]
    }

    /// Replace the text of a text element or sticky note.
    pub fn set_text(&mut self, id: &str, text: &str) -> Vec<Action> {
        let patch = ElementPatch { text: Some(text.to_owned()), ..ElementPatch::default() };
        self.mutate(|doc| doc.update_element(id, &patch))
    }

    /// Apply an arbitrary patch to one element.
    pub fn update_element(&mut self, id: &str, patch: &ElementPatch) -> Vec<Action> {
        self.mutate(|doc| doc.update_element(id, patch))
    }

    /// Select `id` (and its group), or clear the selection with `None`.
    pub fn select(&mut self, id: Option<&str>, additive: bool) -> Vec<Action> {
        let changed = self.doc.select_element(id, additive);
        self.pump();
        if changed { vec![Action::SelectionChanged] } else { Vec::new() }
    }

    /// Run a keyboard-bound command.
    pub fn execute(&mut self, command: Command) -> Vec<Action> {
        match command {
            Command::DeleteSelection => self.mutate(DocStore::delete_selected),
            Command::Undo => self.mutate(DocStore::undo),
            Command::Redo => self.mutate(DocStore::redo),
            Command::Group => self.mutate(|doc| doc.group_selected().is_some()),
            Command::Ungroup => self.mutate(DocStore::ungroup_selected),
            Command::Cancel => {
                self.gesture = Gesture::Idle;
                let mut actions = vec![Action::RenderNeeded];
                if self.doc.clear_selection() {
                    actions.push(Action::SelectionChanged);
                }
                self.pump();
                actions
            }
        }
    }

    pub fn clear_canvas(&mut self) -> Vec<Action> {
        self.mutate(DocStore::clear_canvas)
    }

    // --- Input ---

    pub fn on_key_down(&mut self, key: &Key, modifiers: Modifiers) -> Vec<Action> {
        match input::shortcut(key, modifiers) {
            Some(command) => self.execute(command),
            None => Vec::new(),
        }
    }

    pub fn on_pointer_down(&mut self, pos: Point, modifiers: Modifiers) -> Vec<Action> {
        let tool = self.doc.tool();
        if tool == Tool::Select {
            return self.begin_select_gesture(pos, modifiers);
        }
        let Some(kind) = tool.element_kind() else {
            return Vec::new();
        };
        let id = self.ids.next(kind, self.clock.unix_millis());
        let Some(draft) = input::begin_draft(tool, id, pos, &self.style) else {
            return Vec::new();
        };
        if tool.places_on_click() {
            return self.commit_draft(draft);
        }
        self.gesture = Gesture::Drawing { start: pos, draft };
        vec![Action::RenderNeeded]
    }

    pub fn on_pointer_move(&mut self, pos: Point, _modifiers: Modifiers) -> Vec<Action> {
        match &mut self.gesture {
            Gesture::Idle => return Vec::new(),
            Gesture::Drawing { start, draft } => input::update_draft(draft, *start, pos),
            Gesture::Marquee { current, .. } | Gesture::Dragging { current, .. } | Gesture::Resizing { current, .. } => {
                *current = pos;
            }
        }
        vec![Action::RenderNeeded]
    }

    pub fn on_pointer_up(&mut self, pos: Point, modifiers: Modifiers) -> Vec<Action> {
        // Apply the release position first; some devices skip the final move.
        self.on_pointer_move(pos, modifiers);
        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => Vec::new(),
            Gesture::Drawing { draft, .. } => match input::finish_draft(draft) {
                Some(element) => self.commit_draft(element),
                None => vec![Action::RenderNeeded],
            },
            Gesture::Marquee { start, current } => {
                let area = input::drag_bounds(start, current);
                let changed = if input::is_meaningful_marquee(&area) {
                    let hits = group::marquee_hits(self.doc.elements(), &area);
                    self.doc.select_many(hits.iter().map(String::as_str))
                } else {
                    self.doc.clear_selection()
                };
                self.pump();
                let mut actions = vec![Action::RenderNeeded];
                if changed {
                    actions.push(Action::SelectionChanged);
                }
                actions
            }
            Gesture::Dragging { start, current } => {
                let (dx, dy) = (current.x - start.x, current.y - start.y);
                let ids: Vec<ElementId> = self.doc.selected_ids().iter().cloned().collect();
                self.mutate(|doc| doc.move_many(ids.iter().map(String::as_str), dx, dy))
            }
            Gesture::Resizing { anchor, original, start, current } => {
                let (sx, sy) = group::resize_factors(&original, anchor, current.x - start.x, current.y - start.y);
                let ids = self.doc.selected_ids().clone();
                self.mutate(|doc| doc.transform_many(&ids, &original, sx, sy))
            }
        }
    }

    // --- Internals ---

    fn begin_select_gesture(&mut self, pos: Point, modifiers: Modifiers) -> Vec<Action> {
        let selection = self.doc.selection_bounds();
        let hit = hit::hit_test(pos, self.doc.elements(), selection.as_ref());
        let mut actions = Vec::new();
        match hit {
            Some(Hit::Handle(anchor)) => {
                if let Some(original) = group::union_bounds(self.doc.elements(), self.doc.selected_ids()) {
                    self.gesture = Gesture::Resizing { anchor, original, start: pos, current: pos };
                }
            }
            Some(Hit::Element(id)) => {
                if modifiers.shift {
                    if self.doc.select_element(Some(id.as_str()), true) {
                        actions.push(Action::SelectionChanged);
                    }
                } else {
                    if !self.doc.selected_ids().contains(&id) && self.doc.select_element(Some(id.as_str()), false) {
                        actions.push(Action::SelectionChanged);
                    }
                    self.gesture = Gesture::Dragging { start: pos, current: pos };
                }
            }
            None => {
                if !modifiers.shift && self.doc.clear_selection() {
                    actions.push(Action::SelectionChanged);
                }
                self.gesture = Gesture::Marquee { start: pos, current: pos };
            }
        }
        self.pump();
        actions
    }

    fn commit_draft(&mut self, element: Element) -> Vec<Action> {
        let id = element.id.clone();
        let tool = self.doc.tool();
        if !self.doc.add_element(element) {
            return Vec::new();
        }
        let mut actions = vec![Action::ElementCreated(id.clone()), Action::ElementsChanged];
        if !tool.stays_active() {
            self.doc.select_element(Some(id.as_str()), false);
            self.doc.set_tool(Tool::Select);
            actions.push(Action::SelectionChanged);
            actions.push(Action::ToolChanged(Tool::Select));
        }
        debug!(%id, ?tool, "element drawn");
        self.pump();
        actions
    }

    fn mutate(&mut self, op: impl FnOnce(&mut DocStore) -> bool) -> Vec<Action> {
        let changed = op(&mut self.doc);
        self.pump();
        if changed { vec![Action::ElementsChanged] } else { Vec::new() }
    }

    /// Forward pending store events to the coordinator.
    fn pump(&mut self) {
        let now = self.clock.now();
        for event in self.events.try_iter() {
            self.sync.on_doc_event(&event, now);
        }
    }
}
