//! Sync coordinator: bridges the document store and the room transport.
//!
//! DESIGN
//! ======
//! The coordinator owns everything about *when* local state goes out and how
//! remote state comes in:
//!
//! - Outbound: document change events arm a single cancellable timer.
//!   Ordinary edits wait out the debounce window; gesture completions use
//!   the short urgent delay. When the timer fires, the change detector diffs
//!   the document against what was last sent and each changed element is
//!   emitted as its own upsert. Ids that disappeared are emitted as deletes.
//! - Inbound: remote upserts and deletes go through the store's remote path
//!   (no history) and are absorbed into the detector so they are never
//!   echoed back. A full snapshot replaces the document and becomes the new
//!   diff baseline; edits that were still unsent are replayed on top of it.
//!
//! Transport and clock are injected: the coordinator never blocks, never
//! sleeps, and never spawns. The host calls [`SyncCoordinator::poll`] with
//! the current time and routes inbound traffic to
//! [`SyncCoordinator::handle_inbound`].
//!
//! ERROR HANDLING
//! ==============
//! An element's fingerprint is recorded as sent only after its emit call
//! succeeds. A failed emit stops the flush, flips the status to `Offline`
//! and leaves every remaining change pending for the next flush or the
//! reconnect overlay. Nothing here returns an error to the UI.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::str::FromStr;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_DEBOUNCE_MS, DEFAULT_URGENT_FLUSH_MS};
use crate::doc::{DocEvent, DocStore, RemoteOutcome};
use crate::element::{Element, ElementId};
use crate::fingerprint::ChangeDetector;
use crate::timer::Debouncer;

// =============================================================================
// TRANSPORT CONTRACT
// =============================================================================

/// Failure reported by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport is disconnected")]
    Disconnected,
    #[error("send failed: {0}")]
    Send(String),
}

/// Message sent to the room server.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Join { room_id: String },
    Upsert { room_id: String, element: Element },
    Delete { room_id: String, id: ElementId },
    /// Ask the server to commit the room's staging store to durable storage.
    Persist { room_id: String },
    Leave { room_id: String },
}

impl Outbound {
    /// Room the message is addressed to.
    #[must_use]
    pub fn room_id(&self) -> &str {
        match self {
            Self::Join { room_id }
            | Self::Upsert { room_id, .. }
            | Self::Delete { room_id, .. }
            | Self::Persist { room_id }
            | Self::Leave { room_id } => room_id,
        }
    }
}

/// Message or connection event delivered by the room server.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Full room state sent in reply to a join. Records are raw so that one
    /// malformed record does not reject the rest.
    Snapshot(Vec<Value>),
    /// One element broadcast by any participant.
    Upsert(Value),
    /// An element deleted by another participant.
    Deleted(ElementId),
    Connected,
    Disconnected,
}

/// Outbound half of the room connection.
pub trait Transport {
    /// Hand a message to the connection. Must not block on acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the message could not be queued.
    fn emit(&mut self, message: Outbound) -> Result<(), TransportError>;

    /// Whether the connection is currently usable.
    fn is_connected(&self) -> bool;
}

// =============================================================================
// CONFIG
// =============================================================================

/// Timing and history knobs, loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Idle window before ordinary edits are flushed.
    pub debounce: Duration,
    /// Delay before flushing after a completed gesture.
    pub urgent_delay: Duration,
    /// Maximum undo snapshots retained by the document; `None` is unbounded.
    pub history_limit: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            urgent_delay: Duration::from_millis(DEFAULT_URGENT_FLUSH_MS),
            history_limit: None,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            debounce: Duration::from_millis(env_parse("COLLAB_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)),
            urgent_delay: Duration::from_millis(env_parse("COLLAB_URGENT_FLUSH_MS", DEFAULT_URGENT_FLUSH_MS)),
            // 0 (the default) leaves history unbounded.
            history_limit: Some(env_parse("COLLAB_HISTORY_LIMIT", 0_usize)).filter(|&n| n > 0),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(%key, %raw, "ignoring unparsable config value");
            default
        }
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Autosave indicator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Everything local has been sent.
    #[default]
    Idle,
    /// Changes are waiting for the timer.
    Pending,
    /// A flush is emitting.
    Saving,
    /// The last emit failed or the connection is down; changes are retained.
    Offline,
}

/// Where the coordinator is in the room lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No room joined.
    Detached,
    /// Joined, waiting for the snapshot that establishes the baseline.
    AwaitingSnapshot,
    /// Baseline established; flushes go out.
    Live,
}

/// What one flush did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub upserts: usize,
    pub deletes: usize,
    /// Changes left unsent because the flush was skipped or failed.
    pub pending: usize,
    pub failed: bool,
}

impl FlushReport {
    /// Messages emitted.
    #[must_use]
    pub fn sent(&self) -> usize {
        self.upserts + self.deletes
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Owns outbound timing and inbound merging for one room connection.
pub struct SyncCoordinator<T: Transport> {
    transport: T,
    config: SyncConfig,
    detector: ChangeDetector,
    timer: Debouncer,
    room_id: Option<String>,
    phase: Phase,
    status: SyncStatus,
}

impl<T: Transport> SyncCoordinator<T> {
    #[must_use]
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            detector: ChangeDetector::new(),
            timer: Debouncer::new(),
            room_id: None,
            phase: Phase::Detached,
            status: SyncStatus::Idle,
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// When the pending flush is due, if one is armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Whether the join snapshot has been received.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.phase == Phase::Live
    }

    /// Number of local changes not yet sent.
    #[must_use]
    pub fn pending_changes(&self, doc: &DocStore) -> usize {
        self.detector.diff(doc.elements()).len()
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // --- Room lifecycle ---

    /// Join `room_id`. The server answers with a snapshot.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the join could not be sent; the join
    /// is retried on the next [`Inbound::Connected`].
    pub fn join(&mut self, room_id: &str) -> Result<(), TransportError> {
        self.room_id = Some(room_id.to_owned());
        self.phase = Phase::AwaitingSnapshot;
        info!(%room_id, "joining room");
        self.emit_join()
    }

    /// Flush, optionally request persistence, then leave the room.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the leave could not be sent.
    pub fn leave(&mut self, doc: &DocStore, persist: bool) -> Result<FlushReport, TransportError> {
        let report = self.save(doc, persist);
        self.timer.cancel_all();
        let Some(room_id) = self.room_id.take() else {
            return Ok(report);
        };
        self.phase = Phase::Detached;
        info!(%room_id, sent = report.sent(), pending = report.pending, "leaving room");
        self.transport.emit(Outbound::Leave { room_id })?;
        Ok(report)
    }

    // --- Outbound ---

    /// React to a document change event published by the store.
    pub fn on_doc_event(&mut self, event: &DocEvent, now: Instant) {
        if !event.kind.needs_sync() {
            return;
        }
        let delay = if event.kind.is_gesture_completion() { self.config.urgent_delay } else { self.config.debounce };
        self.timer.arm(now, delay);
        if self.status != SyncStatus::Offline {
            self.set_status(SyncStatus::Pending);
        }
        debug!(kind = ?event.kind, ids = event.ids.len(), delay_ms = delay.as_millis(), "flush scheduled");
    }

    /// Flush if the timer is due at `now`.
    pub fn poll(&mut self, doc: &DocStore, now: Instant) -> Option<FlushReport> {
        self.timer.fire(now)?;
        Some(self.flush(doc))
    }

    /// Cancel any pending timer and flush now. With `persist`, ask the
    /// server to commit the room to durable storage after a clean flush.
    pub fn save(&mut self, doc: &DocStore, persist: bool) -> FlushReport {
        self.timer.cancel_all();
        let report = self.flush(doc);
        if persist && !report.failed && self.phase == Phase::Live {
            if let Some(room_id) = self.room_id.clone() {
                if let Err(err) = self.transport.emit(Outbound::Persist { room_id }) {
                    warn!(error = %err, "persist request failed");
                    self.set_status(SyncStatus::Offline);
                }
            }
        }
        report
    }

    /// Emit every element that differs from what was last sent.
    pub fn flush(&mut self, doc: &DocStore) -> FlushReport {
        let changes = self.detector.diff(doc.elements());
        let mut report = FlushReport { pending: changes.len(), ..FlushReport::default() };

        let room_id = match (&self.room_id, self.phase) {
            (Some(room_id), Phase::Live) => room_id.clone(),
            _ => {
                debug!(pending = report.pending, "flush deferred until the room snapshot arrives");
                return report;
            }
        };
        if changes.is_empty() {
            self.set_status(SyncStatus::Idle);
            return report;
        }
        if !self.transport.is_connected() {
            self.set_status(SyncStatus::Offline);
            return report;
        }

        self.set_status(SyncStatus::Saving);
        for element in changes.changed {
            let id = element.id.clone();
            let sent = element.clone();
            match self.transport.emit(Outbound::Upsert { room_id: room_id.clone(), element }) {
                Ok(()) => {
                    self.detector.mark_sent(&sent);
                    report.upserts += 1;
                    report.pending -= 1;
                }
                Err(err) => return self.fail(report, &id, &err),
            }
        }
        for id in changes.removed {
            match self.transport.emit(Outbound::Delete { room_id: room_id.clone(), id: id.clone() }) {
                Ok(()) => {
                    self.detector.mark_removed(&id);
                    report.deletes += 1;
                    report.pending -= 1;
                }
                Err(err) => return self.fail(report, &id, &err),
            }
        }

        debug!(%room_id, upserts = report.upserts, deletes = report.deletes, "flushed");
        self.set_status(SyncStatus::Idle);
        report
    }

    // --- Inbound ---

    /// Merge one message from the server into `doc`.
    ///
    /// Returns `true` if the document's elements changed.
    pub fn handle_inbound(&mut self, doc: &mut DocStore, message: Inbound) -> bool {
        match message {
            Inbound::Snapshot(records) => self.load_snapshot(doc, records),
            Inbound::Upsert(record) => match Element::from_value(record) {
                Ok(element) => self.merge_remote(doc, element),
                Err(err) => {
                    warn!(error = %err, "dropping malformed element");
                    false
                }
            },
            Inbound::Deleted(id) => {
                self.detector.forget(&id);
                doc.remove_remote(&id)
            }
            Inbound::Connected => {
                if self.room_id.is_some() {
                    self.phase = Phase::AwaitingSnapshot;
                    info!(room_id = self.room_id.as_deref().unwrap_or_default(), "reconnected; rejoining");
                    if let Err(err) = self.emit_join() {
                        warn!(error = %err, "rejoin failed");
                    }
                }
                false
            }
            Inbound::Disconnected => {
                if self.phase == Phase::Live {
                    self.phase = Phase::AwaitingSnapshot;
                }
                self.set_status(SyncStatus::Offline);
                false
            }
        }
    }

    fn merge_remote(&mut self, doc: &mut DocStore, element: Element) -> bool {
        let id = element.id.clone();
        let outcome = doc.apply_remote(element);
        if outcome == RemoteOutcome::Tombstoned {
            return false;
        }
        if let Some(current) = doc.get(&id) {
            self.detector.absorb(current);
        }
        debug!(%id, ?outcome, "merged remote element");
        matches!(outcome, RemoteOutcome::Inserted | RemoteOutcome::Replaced)
    }

    fn load_snapshot(&mut self, doc: &mut DocStore, records: Vec<Value>) -> bool {
        let total = records.len();
        let elements: Vec<Element> = records
            .into_iter()
            .filter_map(|record| match Element::from_value(record) {
                Ok(element) => Some(element),
                Err(err) => {
                    warn!(error = %err, "skipping malformed snapshot record");
                    None
                }
            })
            .collect();

        let unsent = self.detector.diff(doc.elements());
        let kept = doc.load_snapshot(elements);
        self.detector.reset(doc.elements());
        self.phase = Phase::Live;
        info!(received = total, kept, unsent = unsent.len(), "room snapshot loaded");

        if !unsent.is_empty() {
            doc.reapply_local(unsent.changed, &unsent.removed);
        }
        if !self.timer.is_armed() && self.status != SyncStatus::Pending {
            self.set_status(SyncStatus::Idle);
        }
        true
    }

    // --- Internals ---

    fn emit_join(&mut self) -> Result<(), TransportError> {
        let Some(room_id) = self.room_id.clone() else {
            return Ok(());
        };
        self.transport.emit(Outbound::Join { room_id }).inspect_err(|err| {
            warn!(error = %err, "join failed");
            self.status = SyncStatus::Offline;
        })
    }

    fn fail(&mut self, mut report: FlushReport, id: &str, err: &TransportError) -> FlushReport {
        warn!(%id, error = %err, pending = report.pending, "emit failed; keeping changes pending");
        report.failed = true;
        self.set_status(SyncStatus::Offline);
        report
    }

    fn set_status(&mut self, status: SyncStatus) {
        if self.status != status {
            debug!(from = ?self.status, to = ?status, "sync status");
            self.status = status;
        }
    }
}
