//! Shared numeric constants for the canvas crate.

// ── Element fallbacks ───────────────────────────────────────────

/// Width/height substituted for box shapes that arrive without extents.
pub const FALLBACK_BOX_SIZE: f64 = 60.0;

/// Width/height substituted for circles that arrive without extents.
pub const FALLBACK_CIRCLE_SIZE: f64 = 100.0;

/// Side length of a freshly placed sticky note.
pub const STICKY_SIZE: f64 = 150.0;

/// Font size used for text elements when none is set.
pub const DEFAULT_FONT_SIZE: f64 = 28.0;

/// Placeholder content for a freshly placed text element.
pub const DEFAULT_TEXT: &str = "Text";

/// Placeholder content for a freshly placed sticky note.
pub const DEFAULT_STICKY_TEXT: &str = "Note";

// ── Text estimation ─────────────────────────────────────────────

/// Average glyph advance as a fraction of the font size.
pub const TEXT_ADVANCE_RATIO: f64 = 0.6;

/// Minimum estimated width of a text element.
pub const TEXT_MIN_WIDTH: f64 = 100.0;

/// Vertical padding added to the font size for a text element's height.
pub const TEXT_LINE_PADDING: f64 = 8.0;

// ── Selection ───────────────────────────────────────────────────

/// Padding around the union bounding box of a multi-selection.
pub const SELECTION_PADDING: f64 = 8.0;

/// Smallest scale factor a group resize may produce.
pub const MIN_SCALE: f64 = 0.05;

// ── Gestures ────────────────────────────────────────────────────

/// A drawn box shape must exceed this size on both axes to be committed.
/// A marquee must exceed it on either axis to select anything.
pub const MIN_DRAW_SIZE: f64 = 5.0;

/// Number of sides of a polygon drawn with the polygon tool.
pub const POLYGON_SIDES: usize = 6;

/// Stroke width applied to newly drawn shapes.
pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;

// ── Sync ────────────────────────────────────────────────────────

/// Quiet period before ordinary edits are flushed, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Delay before completed gestures (draw, drag, resize, group) are flushed.
pub const DEFAULT_URGENT_FLUSH_MS: u64 = 100;

/// Locally deleted ids remembered between snapshots; the oldest is forgotten
/// first.
pub const TOMBSTONE_LIMIT: usize = 4096;

// ── Hit-testing ─────────────────────────────────────────────────

/// Distance from a resize handle's center that still grabs it.
pub const HANDLE_HIT_RADIUS: f64 = 6.0;

/// Extra slack around a stroke, beyond half its width, that counts as a hit.
pub const STROKE_HIT_TOLERANCE: f64 = 4.0;
