#![allow(clippy::float_cmp)]

use std::sync::mpsc::Receiver;

use super::*;
use crate::element::{ElementKind, ElementPatch};

// =============================================================
// Helpers
// =============================================================

#[derive(Debug)]
struct RecordingTransport {
    sent: Vec<Outbound>,
    connected: bool,
    /// Fail every emit once this many messages have been recorded.
    fail_after: Option<usize>,
}

impl RecordingTransport {
    fn connected() -> Self {
        Self { sent: Vec::new(), connected: true, fail_after: None }
    }

    fn upserted_ids(&self) -> Vec<&str> {
        self.sent
            .iter()
            .filter_map(|m| match m {
                Outbound::Upsert { element, .. } => Some(element.id.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn emit(&mut self, message: Outbound) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        if self.fail_after.is_some_and(|n| self.sent.len() >= n) {
            return Err(TransportError::Send("socket closed".into()));
        }
        self.sent.push(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

type Sync = SyncCoordinator<RecordingTransport>;

const MS: Duration = Duration::from_millis(1);

fn rect(id: &str, x: f64, y: f64) -> Element {
    Element::new(id, ElementKind::Rectangle, x, y).with_size(50.0, 50.0)
}

fn json(el: &Element) -> Value {
    serde_json::to_value(el).unwrap()
}

fn feed(sync: &mut Sync, rx: &Receiver<DocEvent>, now: Instant) {
    for event in rx.try_iter() {
        sync.on_doc_event(&event, now);
    }
}

/// A store and coordinator that have joined `room-1` and loaded `snapshot`.
fn live_with(snapshot: &[Element]) -> (DocStore, Receiver<DocEvent>, Sync) {
    let mut doc = DocStore::new();
    let rx = doc.subscribe();
    let mut sync = SyncCoordinator::new(RecordingTransport::connected(), SyncConfig::default());
    sync.join("room-1").unwrap();
    sync.handle_inbound(&mut doc, Inbound::Snapshot(snapshot.iter().map(json).collect()));
    rx.try_iter().for_each(drop);
    sync.transport_mut().sent.clear();
    (doc, rx, sync)
}

fn live() -> (DocStore, Receiver<DocEvent>, Sync) {
    live_with(&[])
}

// =============================================================
// Config
// =============================================================

#[test]
fn config_defaults() {
    let config = SyncConfig::default();
    assert_eq!(config.debounce, MS * 300);
    assert_eq!(config.urgent_delay, MS * 100);
    assert_eq!(config.history_limit, None);
}

#[test]
fn env_parse_missing_returns_default() {
    let val: u64 = env_parse("__COLLAB_TEST_MISSING__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__COLLAB_TEST_VALID__", " 75 ") };
    let val: u64 = env_parse("__COLLAB_TEST_VALID__", 0);
    assert_eq!(val, 75);
    unsafe { std::env::remove_var("__COLLAB_TEST_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__COLLAB_TEST_INVALID__", "soon") };
    let val: usize = env_parse("__COLLAB_TEST_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__COLLAB_TEST_INVALID__") };
}

// =============================================================
// Join / leave
// =============================================================

#[test]
fn join_emits_join_and_waits_for_snapshot() {
    let mut sync = SyncCoordinator::new(RecordingTransport::connected(), SyncConfig::default());
    sync.join("room-1").unwrap();
    assert_eq!(sync.transport().sent, vec![Outbound::Join { room_id: "room-1".into() }]);
    assert_eq!(sync.room_id(), Some("room-1"));
    assert!(!sync.is_live());
}

#[test]
fn flush_before_snapshot_is_deferred() {
    let mut doc = DocStore::new();
    let mut sync = SyncCoordinator::new(RecordingTransport::connected(), SyncConfig::default());
    sync.join("room-1").unwrap();
    doc.add_element(rect("a", 0.0, 0.0));
    let report = sync.flush(&doc);
    assert_eq!(report.sent(), 0);
    assert_eq!(report.pending, 1);
    assert_eq!(sync.transport().sent.len(), 1);
}

#[test]
fn join_failure_goes_offline() {
    let mut transport = RecordingTransport::connected();
    transport.connected = false;
    let mut sync = SyncCoordinator::new(transport, SyncConfig::default());
    assert_eq!(sync.join("room-1"), Err(TransportError::Disconnected));
    assert_eq!(sync.status(), SyncStatus::Offline);
}

#[test]
fn leave_flushes_persists_and_leaves() {
    let (mut doc, _rx, mut sync) = live();
    doc.add_element(rect("a", 0.0, 0.0));
    let report = sync.leave(&doc, true).unwrap();
    assert_eq!(report.upserts, 1);
    let sent = &sync.transport().sent;
    assert_eq!(sent.len(), 3);
    assert!(matches!(sent[0], Outbound::Upsert { .. }));
    assert_eq!(sent[1], Outbound::Persist { room_id: "room-1".into() });
    assert_eq!(sent[2], Outbound::Leave { room_id: "room-1".into() });
    assert!(sync.room_id().is_none());
}

#[test]
fn leave_without_persist_skips_persist() {
    let (doc, _rx, mut sync) = live();
    sync.leave(&doc, false).unwrap();
    assert_eq!(sync.transport().sent, vec![Outbound::Leave { room_id: "room-1".into() }]);
}

// =============================================================
// Dedupe
// =============================================================

#[test]
fn second_flush_without_mutation_is_empty() {
    let (mut doc, _rx, mut sync) = live();
    doc.add_element(rect("a", 0.0, 0.0));
    doc.add_element(rect("b", 60.0, 0.0));
    assert_eq!(sync.flush(&doc).upserts, 2);
    let second = sync.flush(&doc);
    assert_eq!(second.sent(), 0);
    assert_eq!(sync.transport().sent.len(), 2);
}

#[test]
fn only_changed_elements_are_resent() {
    let (mut doc, _rx, mut sync) = live();
    doc.add_element(rect("a", 0.0, 0.0));
    doc.add_element(rect("b", 60.0, 0.0));
    sync.flush(&doc);
    doc.move_many(["b"], 1.0, 1.0);
    sync.flush(&doc);
    assert_eq!(sync.transport().upserted_ids(), vec!["a", "b", "b"]);
}

#[test]
fn remote_update_converges_fingerprint() {
    let (mut doc, _rx, mut sync) = live();
    assert!(sync.handle_inbound(&mut doc, Inbound::Upsert(json(&rect("r", 4.0, 4.0)))));
    assert_eq!(sync.pending_changes(&doc), 0);
    assert_eq!(sync.flush(&doc).sent(), 0);
}

#[test]
fn remote_record_with_defaults_converges_too() {
    let (mut doc, _rx, mut sync) = live();
    let sparse = serde_json::json!({ "id": "c1", "type": "circle" });
    sync.handle_inbound(&mut doc, Inbound::Upsert(sparse));
    assert_eq!(doc.get("c1").unwrap().width, Some(100.0));
    assert_eq!(sync.pending_changes(&doc), 0);
}

#[test]
fn malformed_remote_record_is_dropped() {
    let (mut doc, _rx, mut sync) = live();
    assert!(!sync.handle_inbound(&mut doc, Inbound::Upsert(serde_json::json!({ "type": "rectangle" }))));
    assert!(doc.is_empty());
}

// =============================================================
// Debounce
// =============================================================

#[test]
fn ordinary_edit_waits_for_debounce_window() {
    let (mut doc, rx, mut sync) = live_with(&[rect("a", 0.0, 0.0)]);
    let t0 = Instant::now();
    doc.update_element("a", &ElementPatch { text: Some("hi".into()), ..ElementPatch::default() });
    feed(&mut sync, &rx, t0);
    assert_eq!(sync.status(), SyncStatus::Pending);
    assert!(sync.poll(&doc, t0 + MS * 299).is_none());
    let report = sync.poll(&doc, t0 + MS * 300).unwrap();
    assert_eq!(report.upserts, 1);
    assert_eq!(sync.status(), SyncStatus::Idle);
}

#[test]
fn burst_of_edits_coalesces_into_one_flush() {
    let (mut doc, rx, mut sync) = live_with(&[rect("a", 0.0, 0.0)]);
    let t0 = Instant::now();
    for i in 0..10 {
        let now = t0 + MS * (i * 50);
        doc.update_element("a", &ElementPatch { width: Some(60.0 + f64::from(i)), ..ElementPatch::default() });
        feed(&mut sync, &rx, now);
        assert!(sync.poll(&doc, now).is_none());
    }
    assert_eq!(sync.deadline(), Some(t0 + MS * 750));
    assert_eq!(sync.poll(&doc, t0 + MS * 750).unwrap().upserts, 1);
    assert_eq!(sync.transport().sent.len(), 1);
}

#[test]
fn gesture_completion_flushes_on_short_delay() {
    let (mut doc, rx, mut sync) = live();
    let t0 = Instant::now();
    doc.add_element(rect("a", 10.0, 10.0));
    feed(&mut sync, &rx, t0);
    assert_eq!(sync.deadline(), Some(t0 + MS * 100));
    assert!(sync.poll(&doc, t0 + MS * 100).is_some());
}

#[test]
fn selection_and_remote_events_do_not_schedule() {
    let (mut doc, rx, mut sync) = live_with(&[rect("a", 0.0, 0.0)]);
    doc.select_element(Some("a"), false);
    sync.handle_inbound(&mut doc, Inbound::Upsert(json(&rect("b", 0.0, 0.0))));
    feed(&mut sync, &rx, Instant::now());
    assert!(sync.deadline().is_none());
    assert_eq!(sync.status(), SyncStatus::Idle);
}

#[test]
fn manual_save_cancels_timer_and_flushes() {
    let (mut doc, rx, mut sync) = live();
    doc.add_element(rect("a", 0.0, 0.0));
    feed(&mut sync, &rx, Instant::now());
    let report = sync.save(&doc, false);
    assert_eq!(report.upserts, 1);
    assert!(sync.deadline().is_none());
}

// =============================================================
// Deletes and tombstones
// =============================================================

#[test]
fn local_delete_is_propagated() {
    let (mut doc, _rx, mut sync) = live();
    doc.add_element(rect("a", 0.0, 0.0));
    sync.flush(&doc);
    doc.delete_element("a");
    let report = sync.flush(&doc);
    assert_eq!(report.deletes, 1);
    assert_eq!(
        sync.transport().sent.last(),
        Some(&Outbound::Delete { room_id: "room-1".into(), id: "a".into() })
    );
    assert_eq!(sync.flush(&doc).sent(), 0);
}

#[test]
fn unsent_element_deleted_locally_sends_nothing() {
    let (mut doc, _rx, mut sync) = live();
    doc.add_element(rect("a", 0.0, 0.0));
    doc.delete_element("a");
    assert_eq!(sync.flush(&doc).sent(), 0);
}

#[test]
fn remote_upsert_for_deleted_element_is_ignored() {
    let (mut doc, _rx, mut sync) = live_with(&[rect("a", 0.0, 0.0)]);
    doc.delete_element("a");
    assert!(!sync.handle_inbound(&mut doc, Inbound::Upsert(json(&rect("a", 9.0, 9.0)))));
    assert!(doc.is_empty());
    // The delete is still owed to the server.
    assert_eq!(sync.flush(&doc).deletes, 1);
}

#[test]
fn remote_delete_is_applied_without_echo() {
    let (mut doc, _rx, mut sync) = live_with(&[rect("a", 0.0, 0.0)]);
    assert!(sync.handle_inbound(&mut doc, Inbound::Deleted("a".into())));
    assert!(doc.is_empty());
    assert_eq!(sync.flush(&doc).sent(), 0);
}

// =============================================================
// Failure and reconnect
// =============================================================

#[test]
fn failed_emit_keeps_changes_pending() {
    let (mut doc, _rx, mut sync) = live();
    doc.add_element(rect("a", 0.0, 0.0));
    doc.add_element(rect("b", 60.0, 0.0));
    sync.transport_mut().fail_after = Some(1);

    let report = sync.flush(&doc);
    assert!(report.failed);
    assert_eq!(report.upserts, 1);
    assert_eq!(report.pending, 1);
    assert_eq!(sync.status(), SyncStatus::Offline);
    assert_eq!(sync.pending_changes(&doc), 1);

    sync.transport_mut().fail_after = None;
    let retry = sync.flush(&doc);
    assert_eq!(retry.upserts, 1);
    assert_eq!(sync.transport().upserted_ids(), vec!["a", "b"]);
    assert_eq!(sync.status(), SyncStatus::Idle);
}

#[test]
fn disconnected_transport_flush_goes_offline() {
    let (mut doc, _rx, mut sync) = live();
    doc.add_element(rect("a", 0.0, 0.0));
    sync.transport_mut().connected = false;
    let report = sync.flush(&doc);
    assert_eq!(report.sent(), 0);
    assert_eq!(report.pending, 1);
    assert_eq!(sync.status(), SyncStatus::Offline);
}

#[test]
fn persist_is_skipped_after_failed_flush() {
    let (mut doc, _rx, mut sync) = live();
    doc.add_element(rect("a", 0.0, 0.0));
    sync.transport_mut().fail_after = Some(0);
    let report = sync.save(&doc, true);
    assert!(report.failed);
    assert!(sync.transport().sent.is_empty());
}

#[test]
fn reconnect_rejoins_and_replays_unsent_edits() {
    let (mut doc, _rx, mut sync) = live();
    doc.add_element(rect("a", 0.0, 0.0));
    sync.flush(&doc);

    sync.handle_inbound(&mut doc, Inbound::Disconnected);
    assert_eq!(sync.status(), SyncStatus::Offline);
    doc.move_many(["a"], 5.0, 5.0);

    sync.handle_inbound(&mut doc, Inbound::Connected);
    assert_eq!(sync.transport().sent.last(), Some(&Outbound::Join { room_id: "room-1".into() }));
    assert_eq!(sync.flush(&doc).sent(), 0);

    let server = vec![json(&rect("a", 0.0, 0.0)), json(&rect("b", 200.0, 0.0))];
    sync.handle_inbound(&mut doc, Inbound::Snapshot(server));
    assert_eq!(doc.get("a").unwrap().x, 5.0);
    assert!(doc.contains("b"));

    let before = sync.transport().sent.len();
    let report = sync.flush(&doc);
    assert_eq!(report.upserts, 1);
    assert_eq!(sync.transport().upserted_ids()[1..], ["a"]);
    assert_eq!(sync.transport().sent.len(), before + 1);
}

#[test]
fn reconnect_replays_unsent_local_delete() {
    let (mut doc, _rx, mut sync) = live_with(&[rect("a", 0.0, 0.0)]);
    sync.handle_inbound(&mut doc, Inbound::Disconnected);
    doc.delete_element("a");
    sync.handle_inbound(&mut doc, Inbound::Connected);
    sync.handle_inbound(&mut doc, Inbound::Snapshot(vec![json(&rect("a", 0.0, 0.0))]));
    assert!(doc.is_empty());
    assert_eq!(sync.flush(&doc).deletes, 1);
}

#[test]
fn snapshot_skips_malformed_records() {
    let mut doc = DocStore::new();
    let mut sync = SyncCoordinator::new(RecordingTransport::connected(), SyncConfig::default());
    sync.join("room-1").unwrap();
    let records = vec![json(&rect("a", 0.0, 0.0)), serde_json::json!("junk"), serde_json::json!({ "id": "x" })];
    sync.handle_inbound(&mut doc, Inbound::Snapshot(records));
    assert_eq!(doc.len(), 1);
    assert!(sync.is_live());
    assert_eq!(sync.pending_changes(&doc), 0);
}

#[test]
fn outbound_room_id_accessor() {
    let m = Outbound::Delete { room_id: "r".into(), id: "a".into() };
    assert_eq!(m.room_id(), "r");
}
