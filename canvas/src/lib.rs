//! Client core for the collaborative whiteboard.
//!
//! This crate owns everything a participant's client does between raw input
//! and the wire: the element model, the local document store with undo/redo,
//! group-aware selection, drawing gestures, and the sync coordinator that
//! turns local edits into debounced, deduplicated server messages. Rendering
//! and the socket itself belong to the host; the host drives a
//! [`engine::Session`] and supplies a [`sync::Transport`].
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Testable [`engine::Session`] tying store, gestures and sync together |
//! | [`element`] | Element kinds, geometry and wire decoding |
//! | [`doc`] | Document store, change events and remote merge |
//! | [`history`] | Bounded snapshot undo/redo |
//! | [`group`] | Group expansion, selection bounds and group resize |
//! | [`input`] | Tools, keyboard shortcuts and the gesture state machine |
//! | [`hit`] | Hit-testing against elements and resize handles |
//! | [`fingerprint`] | Content fingerprints and change detection |
//! | [`timer`] | Single-shot debounce timer |
//! | [`sync`] | Sync coordinator and transport seam |
//! | [`consts`] | Shared numeric constants (sizes, timings, limits) |

pub mod consts;
pub mod doc;
pub mod element;
pub mod engine;
pub mod fingerprint;
pub mod group;
pub mod history;
pub mod hit;
pub mod input;
pub mod sync;
pub mod timer;
