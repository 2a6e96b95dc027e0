#![allow(clippy::float_cmp)]

use std::time::Duration;

use super::*;
use crate::element::ElementKind;
use crate::group::ResizeAnchor;
use crate::sync::Outbound;

// =============================================================
// Helpers
// =============================================================

#[derive(Debug, Default)]
struct RecordingTransport {
    sent: Vec<Outbound>,
}

impl Transport for RecordingTransport {
    fn emit(&mut self, message: Outbound) -> Result<(), TransportError> {
        self.sent.push(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

struct ManualClock {
    base: Instant,
    elapsed: Duration,
    millis: u64,
}

impl ManualClock {
    fn new() -> Self {
        Self { base: Instant::now(), elapsed: Duration::ZERO, millis: 1_700_000_000_000 }
    }

    fn advance(&mut self, ms: u64) {
        self.elapsed += Duration::from_millis(ms);
        self.millis += ms;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed
    }

    fn unix_millis(&self) -> u64 {
        self.millis
    }
}

type TestSession = Session<RecordingTransport, ManualClock>;

fn p(x: f64, y: f64) -> Point {
    Point::new(x, y)
}

fn none() -> Modifiers {
    Modifiers::default()
}

fn shift() -> Modifiers {
    Modifiers { shift: true, ..Modifiers::default() }
}

fn cmd() -> Modifiers {
    Modifiers { meta: true, ..Modifiers::default() }
}

fn rect(id: &str, x: f64, y: f64) -> Element {
    Element::new(id, ElementKind::Rectangle, x, y).with_size(40.0, 30.0)
}

fn grouped(mut el: Element, group: &str) -> Element {
    el.group_id = Some(group.to_owned());
    el
}

/// A session joined to `room-1` whose snapshot held `elements`.
fn live_with(elements: &[Element]) -> TestSession {
    let mut s = Session::with_clock(RecordingTransport::default(), SyncConfig::default(), ManualClock::new());
    s.join("room-1").unwrap();
    let records = elements.iter().map(|e| serde_json::to_value(e).unwrap()).collect();
    s.handle_inbound(Inbound::Snapshot(records));
    s.sync_mut().transport_mut().sent.clear();
    s
}

fn live() -> TestSession {
    live_with(&[])
}

fn drag(s: &mut TestSession, from: Point, to: Point) -> Vec<Action> {
    s.on_pointer_down(from, none());
    s.on_pointer_move(to, none());
    s.on_pointer_up(to, none())
}

fn sent(s: &TestSession) -> &[Outbound] {
    &s.sync().transport().sent
}

fn upserted(s: &TestSession) -> Vec<Element> {
    sent(s)
        .iter()
        .filter_map(|m| match m {
            Outbound::Upsert { element, .. } => Some(element.clone()),
            _ => None,
        })
        .collect()
}

fn selected(s: &TestSession) -> Vec<&str> {
    s.doc().selected_ids().iter().map(String::as_str).collect()
}

/// Advance the clock by `ms` and tick.
fn after(s: &mut TestSession, ms: u64) -> Option<FlushReport> {
    s.clock_mut().advance(ms);
    s.tick()
}

// =============================================================
// Drawing
// =============================================================

#[test]
fn draw_rectangle_then_sync() {
    let mut s = live();
    s.set_tool(Tool::Rectangle);
    s.on_pointer_down(p(10.0, 10.0), none());
    s.on_pointer_move(p(40.0, 30.0), none());
    let actions = s.on_pointer_up(p(60.0, 60.0), none());

    let id = "rectangle-1700000000000";
    assert_eq!(actions[0], Action::ElementCreated(id.to_owned()));
    let el = s.doc().get(id).unwrap();
    assert_eq!((el.x, el.y, el.width, el.height), (10.0, 10.0, Some(50.0), Some(50.0)));
    assert_eq!(selected(&s), vec![id]);
    assert_eq!(s.doc().tool(), Tool::Select);
    assert_eq!(s.status(), SyncStatus::Pending);

    assert!(after(&mut s, 99).is_none());
    let report = after(&mut s, 1).unwrap();
    assert_eq!(report.upserts, 1);
    let out = upserted(&s);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, id);
    assert_eq!(s.status(), SyncStatus::Idle);
}

#[test]
fn tiny_box_is_discarded() {
    let mut s = live();
    s.set_tool(Tool::Diamond);
    drag(&mut s, p(0.0, 0.0), p(4.0, 40.0));
    assert!(s.doc().is_empty());
    assert_eq!(s.doc().tool(), Tool::Diamond);
    assert!(s.next_deadline().is_none());
}

#[test]
fn draft_is_visible_while_drawing() {
    let mut s = live();
    s.set_tool(Tool::Circle);
    s.on_pointer_down(p(0.0, 0.0), none());
    s.on_pointer_move(p(20.0, 20.0), none());
    assert_eq!(s.draft().unwrap().width, Some(20.0));
    assert!(s.doc().is_empty());
}

#[test]
fn pencil_stays_active_and_keeps_selection() {
    let mut s = live();
    s.set_tool(Tool::Pencil);
    s.on_pointer_down(p(0.0, 0.0), none());
    s.on_pointer_move(p(1.0, 1.0), none());
    s.on_pointer_move(p(2.0, 2.0), none());
    s.on_pointer_up(p(3.0, 3.0), none());

    assert_eq!(s.doc().tool(), Tool::Pencil);
    assert!(s.doc().selected_ids().is_empty());
    let stroke = &s.doc().elements()[0];
    assert_eq!(stroke.kind, ElementKind::Pencil);
    assert_eq!(stroke.points.as_ref().unwrap().len(), 4);
}

#[test]
fn text_is_placed_on_click() {
    let mut s = live();
    s.set_tool(Tool::Text);
    let actions = s.on_pointer_down(p(5.0, 6.0), none());
    let id = "text-1700000000000".to_owned();
    assert_eq!(
        actions,
        vec![
            Action::ElementCreated(id.clone()),
            Action::ElementsChanged,
            Action::SelectionChanged,
            Action::ToolChanged(Tool::Select),
        ]
    );
    assert_eq!(s.doc().get(&id).unwrap().text.as_deref(), Some("Text"));
    assert!(matches!(s.gesture(), Gesture::Idle));
}

#[test]
fn ids_stay_unique_within_one_millisecond() {
    let mut s = live();
    s.set_tool(Tool::Sticky);
    s.on_pointer_down(p(0.0, 0.0), none());
    s.set_tool(Tool::Sticky);
    s.on_pointer_down(p(200.0, 0.0), none());
    let ids: Vec<&str> = s.doc().elements().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["sticky-1700000000000", "sticky-1700000000000-1"]);
}

#[test]
fn polygon_commits_as_hexagon() {
    let mut s = live();
    s.set_tool(Tool::Polygon);
    drag(&mut s, p(0.0, 0.0), p(60.0, 60.0));
    let poly = &s.doc().elements()[0];
    assert_eq!(poly.points.as_ref().unwrap().len(), 6);
}

#[test]
fn arrow_keeps_start_and_end() {
    let mut s = live();
    s.set_tool(Tool::Arrow);
    drag(&mut s, p(5.0, 5.0), p(80.0, 40.0));
    let arrow = &s.doc().elements()[0];
    assert_eq!(arrow.points.as_deref().unwrap(), &[p(5.0, 5.0), p(80.0, 40.0)]);
}

#[test]
fn escape_abandons_draft() {
    let mut s = live();
    s.set_tool(Tool::Rectangle);
    s.on_pointer_down(p(0.0, 0.0), none());
    s.on_pointer_move(p(50.0, 50.0), none());
    s.on_key_down(&Key("Escape".into()), none());
    assert!(s.draft().is_none());
    assert!(s.on_pointer_up(p(50.0, 50.0), none()).is_empty());
    assert!(s.doc().is_empty());
}

// =============================================================
// Selection gestures
// =============================================================

#[test]
fn click_selects_whole_group() {
    let mut s = live_with(&[grouped(rect("a", 0.0, 0.0), "g"), grouped(rect("b", 100.0, 0.0), "g")]);
    s.on_pointer_down(p(110.0, 10.0), none());
    s.on_pointer_up(p(110.0, 10.0), none());
    assert_eq!(selected(&s), vec!["a", "b"]);
    assert_eq!(s.doc().selected_element_id(), Some("b"));
}

#[test]
fn shift_click_toggles() {
    let mut s = live_with(&[rect("a", 0.0, 0.0), rect("b", 100.0, 0.0)]);
    s.select(Some("a"), false);
    s.on_pointer_down(p(110.0, 10.0), shift());
    s.on_pointer_up(p(110.0, 10.0), shift());
    assert_eq!(selected(&s), vec!["a", "b"]);
    s.on_pointer_down(p(110.0, 10.0), shift());
    s.on_pointer_up(p(110.0, 10.0), shift());
    assert_eq!(selected(&s), vec!["a"]);
}

#[test]
fn marquee_selects_intersecting_groups() {
    let mut s = live_with(&[
        grouped(rect("a", 0.0, 0.0), "g"),
        grouped(rect("b", 300.0, 0.0), "g"),
        rect("c", 0.0, 300.0),
    ]);
    let actions = drag(&mut s, p(-20.0, -20.0), p(15.0, 15.0));
    assert!(actions.contains(&Action::SelectionChanged));
    assert_eq!(selected(&s), vec!["a", "b"]);
}

#[test]
fn click_on_empty_space_clears_selection() {
    let mut s = live_with(&[rect("a", 0.0, 0.0)]);
    s.select(Some("a"), false);
    drag(&mut s, p(500.0, 500.0), p(502.0, 501.0));
    assert!(s.doc().selected_ids().is_empty());
}

// =============================================================
// Move and resize
// =============================================================

#[test]
fn dragging_moves_selection_as_one_entry() {
    let mut s = live_with(&[rect("a", 0.0, 0.0), rect("b", 100.0, 0.0)]);
    s.select(Some("a"), false);
    s.select(Some("b"), true);
    let before = s.doc().history_len();

    drag(&mut s, p(20.0, 15.0), p(30.0, 20.0));
    let a = s.doc().get("a").unwrap();
    let b = s.doc().get("b").unwrap();
    assert_eq!((a.x, a.y), (10.0, 5.0));
    assert_eq!((b.x, b.y), (110.0, 5.0));
    assert_eq!(s.doc().history_len(), before + 1);

    assert_eq!(after(&mut s, 100).unwrap().upserts, 2);
}

#[test]
fn drag_without_movement_changes_nothing() {
    let mut s = live_with(&[rect("a", 0.0, 0.0)]);
    drag(&mut s, p(20.0, 15.0), p(20.0, 15.0));
    assert_eq!(s.doc().history_len(), 1);
    assert_eq!(selected(&s), vec!["a"]);
}

#[test]
fn resize_handle_scales_selection() {
    let mut s = live_with(&[Element::new("a", ElementKind::Rectangle, 0.0, 0.0).with_size(100.0, 100.0)]);
    s.select(Some("a"), false);
    // South-east handle sits on the padded selection box.
    s.on_pointer_down(p(108.0, 108.0), none());
    assert!(matches!(s.gesture(), Gesture::Resizing { anchor: ResizeAnchor::Se, .. }));
    s.on_pointer_up(p(208.0, 208.0), none());

    let a = s.doc().get("a").unwrap();
    assert_eq!((a.x, a.y), (-50.0, -50.0));
    assert_eq!((a.width, a.height), (Some(200.0), Some(200.0)));
    assert_eq!(s.next_deadline(), Some(s.clock().now() + Duration::from_millis(100)));
}

// =============================================================
// Keyboard
// =============================================================

#[test]
fn delete_undo_redo_from_keyboard() {
    let mut s = live_with(&[rect("a", 0.0, 0.0)]);
    s.select(Some("a"), false);
    s.on_key_down(&Key("Delete".into()), none());
    assert!(s.doc().is_empty());
    s.on_key_down(&Key("z".into()), cmd());
    assert!(s.doc().contains("a"));
    s.on_key_down(&Key("z".into()), Modifiers { shift: true, ..cmd() });
    assert!(s.doc().is_empty());

    s.save(false);
    assert_eq!(sent(&s).last(), Some(&Outbound::Delete { room_id: "room-1".into(), id: "a".into() }));
}

#[test]
fn group_shortcut_groups_selection() {
    let mut s = live_with(&[rect("a", 0.0, 0.0), rect("b", 100.0, 0.0)]);
    s.select(Some("a"), false);
    s.select(Some("b"), true);
    let actions = s.on_key_down(&Key("g".into()), cmd());
    assert_eq!(actions, vec![Action::ElementsChanged]);
    let group = s.doc().get("a").unwrap().group_id.clone();
    assert!(group.is_some());
    assert_eq!(s.doc().get("b").unwrap().group_id, group);
    assert_eq!(after(&mut s, 100).unwrap().upserts, 2);
}

#[test]
fn unknown_key_does_nothing() {
    let mut s = live();
    assert!(s.on_key_down(&Key("q".into()), none()).is_empty());
}

// =============================================================
// Sync timing through the session
// =============================================================

#[test]
fn text_edit_uses_debounce_window() {
    let mut s = live_with(&[rect("a", 0.0, 0.0)]);
    s.set_text("a", "hello");
    assert!(after(&mut s, 299).is_none());
    assert_eq!(after(&mut s, 1).unwrap().upserts, 1);
}

#[test]
fn manual_save_persists() {
    let mut s = live_with(&[rect("a", 0.0, 0.0)]);
    s.set_text("a", "hello");
    let report = s.save(true);
    assert_eq!(report.upserts, 1);
    assert_eq!(sent(&s).last(), Some(&Outbound::Persist { room_id: "room-1".into() }));
    assert!(s.next_deadline().is_none());
}

#[test]
fn leave_flushes_pending_edits() {
    let mut s = live_with(&[rect("a", 0.0, 0.0)]);
    s.set_text("a", "bye");
    s.leave(false).unwrap();
    assert_eq!(upserted(&s).len(), 1);
    assert_eq!(sent(&s).last(), Some(&Outbound::Leave { room_id: "room-1".into() }));
}

// =============================================================
// Local/remote race on one element
// =============================================================

#[test]
fn remote_update_after_unsent_local_edit_wins() {
    // Documented limitation: the later-applied write wins, even over a
    // local edit that has not been flushed yet.
    let mut s = live_with(&[rect("a", 0.0, 0.0)]);
    s.update_element("a", &ElementPatch::position(50.0, 0.0));
    let remote = serde_json::to_value(rect("a", 99.0, 0.0)).unwrap();
    s.handle_inbound(Inbound::Upsert(remote));

    assert_eq!(s.doc().get("a").unwrap().x, 99.0);
    let report = after(&mut s, 300).unwrap();
    assert_eq!(report.sent(), 0);
}

#[test]
fn local_edit_after_remote_update_wins() {
    let mut s = live_with(&[rect("a", 0.0, 0.0)]);
    let remote = serde_json::to_value(rect("a", 99.0, 0.0)).unwrap();
    s.handle_inbound(Inbound::Upsert(remote));
    s.update_element("a", &ElementPatch::position(50.0, 0.0));

    assert_eq!(after(&mut s, 300).unwrap().upserts, 1);
    assert_eq!(upserted(&s)[0].x, 50.0);
}

#[test]
fn remote_traffic_does_not_schedule_flush() {
    let mut s = live();
    let actions = s.handle_inbound(Inbound::Upsert(serde_json::to_value(rect("r", 0.0, 0.0)).unwrap()));
    assert_eq!(actions, vec![Action::ElementsChanged]);
    assert!(s.next_deadline().is_none());
    assert!(!s.doc().can_undo());
}
