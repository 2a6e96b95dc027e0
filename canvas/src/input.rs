//! Input model: tools and the draw gesture state machine.
//!
//! `Tool` is the interaction mode. `Gesture` is the gesture tracked between
//! pointer-down and pointer-up, carrying what is needed to produce the final
//! document mutation on release. The free functions build, grow and commit
//! draft elements; they are pure so the engine can be tested without a
//! pointer device.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use std::f64::consts::{FRAC_PI_2, TAU};

use crate::consts::{DEFAULT_FONT_SIZE, DEFAULT_STICKY_TEXT, DEFAULT_TEXT, MIN_DRAW_SIZE, POLYGON_SIDES, STICKY_SIZE};
use crate::element::{Bounds, Element, ElementId, ElementKind, Point, Style};
use crate::group::ResizeAnchor;

/// Which tool is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// Pointer / selection tool (default).
    #[default]
    Select,
    Rectangle,
    Circle,
    Line,
    Arrow,
    Triangle,
    Diamond,
    Polygon,
    /// Freehand drawing; stays active after each stroke.
    Pencil,
    /// Places a text element on click.
    Text,
    /// Places a sticky note on click.
    Sticky,
}

impl Tool {
    /// The kind of element this tool creates, `None` for `Select`.
    #[must_use]
    pub fn element_kind(self) -> Option<ElementKind> {
        match self {
            Self::Select => None,
            Self::Rectangle => Some(ElementKind::Rectangle),
            Self::Circle => Some(ElementKind::Circle),
            Self::Line => Some(ElementKind::Line),
            Self::Arrow => Some(ElementKind::Arrow),
            Self::Triangle => Some(ElementKind::Triangle),
            Self::Diamond => Some(ElementKind::Diamond),
            Self::Polygon => Some(ElementKind::Polygon),
            Self::Pencil => Some(ElementKind::Pencil),
            Self::Text => Some(ElementKind::Text),
            Self::Sticky => Some(ElementKind::Sticky),
        }
    }

    /// Parse a tool name (`"select"` or any element kind name).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if name == "select" {
            return Some(Self::Select);
        }
        ElementKind::parse(name).map(Self::for_kind)
    }

    /// The tool that draws `kind`.
    #[must_use]
    pub fn for_kind(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Rectangle => Self::Rectangle,
            ElementKind::Circle => Self::Circle,
            ElementKind::Line => Self::Line,
            ElementKind::Arrow => Self::Arrow,
            ElementKind::Triangle => Self::Triangle,
            ElementKind::Diamond => Self::Diamond,
            ElementKind::Polygon => Self::Polygon,
            ElementKind::Pencil => Self::Pencil,
            ElementKind::Text => Self::Text,
            ElementKind::Sticky => Self::Sticky,
        }
    }

    /// Whether the tool is dragged out as a box (polygon included).
    #[must_use]
    pub fn is_box(self) -> bool {
        matches!(self, Self::Rectangle | Self::Circle | Self::Triangle | Self::Diamond | Self::Polygon)
    }

    /// Whether the tool places a finished element on pointer-down.
    #[must_use]
    pub fn places_on_click(self) -> bool {
        matches!(self, Self::Text | Self::Sticky)
    }

    /// Whether the tool remains active after completing an element.
    #[must_use]
    pub fn stays_active(self) -> bool {
        self == Self::Pencil
    }
}

/// Keyboard modifier state at the time of an input event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    /// Meta / Command key is held.
    pub meta: bool,
}

impl Modifiers {
    /// Ctrl on most platforms, Command on macOS.
    #[must_use]
    pub fn command(self) -> bool {
        self.ctrl || self.meta
    }
}

/// A keyboard key, named as the DOM `KeyboardEvent.key` names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(pub String);

/// Document command bound to a keyboard shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    DeleteSelection,
    Undo,
    Redo,
    Group,
    Ungroup,
    /// Abandon the gesture in progress and clear the selection.
    Cancel,
}

/// Resolve a key press to a document command.
#[must_use]
pub fn shortcut(key: &Key, mods: Modifiers) -> Option<Command> {
    match (key.0.as_str(), mods.command(), mods.shift) {
        ("Delete" | "Backspace", _, _) => Some(Command::DeleteSelection),
        ("Escape", _, _) => Some(Command::Cancel),
        ("z" | "Z", true, false) => Some(Command::Undo),
        ("z" | "Z", true, true) | ("y" | "Y", true, _) => Some(Command::Redo),
        ("g" | "G", true, false) => Some(Command::Group),
        ("g" | "G", true, true) => Some(Command::Ungroup),
        _ => None,
    }
}

/// Gesture in progress between pointer-down and pointer-up.
#[derive(Debug, Clone, Default)]
pub enum Gesture {
    /// No gesture; waiting for the next pointer-down.
    #[default]
    Idle,
    /// A shape tool is dragging out a draft element.
    Drawing {
        /// Pointer position at pointer-down.
        start: Point,
        draft: Element,
    },
    /// The select tool is dragging a marquee over empty space.
    Marquee { start: Point, current: Point },
    /// The selection is being dragged.
    Dragging {
        /// Pointer position at pointer-down.
        start: Point,
        /// Latest pointer position.
        current: Point,
    },
    /// A handle of the selection box is being dragged.
    Resizing {
        anchor: ResizeAnchor,
        /// Unpadded selection bounds at pointer-down.
        original: Bounds,
        start: Point,
        current: Point,
    },
}

/// Start a draft for `tool` at `pos`.
///
/// Returns `None` for `Select`. Text and sticky drafts are already complete.
#[must_use]
pub fn begin_draft(tool: Tool, id: ElementId, pos: Point, style: &Style) -> Option<Element> {
    let kind = tool.element_kind()?;
    let base = Element::new(id, kind, pos.x, pos.y);
    let draft = match tool {
        Tool::Select => return None,
        Tool::Line | Tool::Arrow => Element { x: 0.0, y: 0.0, ..base }.with_points(vec![pos, pos]),
        Tool::Pencil => Element { x: 0.0, y: 0.0, ..base }.with_points(vec![pos]),
        Tool::Text => base.with_text(DEFAULT_TEXT, DEFAULT_FONT_SIZE),
        Tool::Sticky => {
            let mut sticky = base.with_size(STICKY_SIZE, STICKY_SIZE);
            sticky.text = Some(DEFAULT_STICKY_TEXT.to_owned());
            sticky
        }
        Tool::Rectangle | Tool::Circle | Tool::Triangle | Tool::Diamond | Tool::Polygon => base.with_size(0.0, 0.0),
    };
    Some(draft.with_style(style))
}

/// Grow `draft` to follow the pointer at `pos`.
pub fn update_draft(draft: &mut Element, start: Point, pos: Point) {
    match draft.kind {
        ElementKind::Line | ElementKind::Arrow => {
            let points = draft.points.get_or_insert_with(|| vec![start]);
            points.truncate(1);
            points.push(pos);
        }
        ElementKind::Pencil => draft.points.get_or_insert_with(Vec::new).push(pos),
        ElementKind::Text | ElementKind::Sticky => {}
        ElementKind::Rectangle
        | ElementKind::Circle
        | ElementKind::Triangle
        | ElementKind::Diamond
        | ElementKind::Polygon => {
            let b = drag_bounds(start, pos);
            draft.x = b.min_x;
            draft.y = b.min_y;
            draft.width = Some(b.width());
            draft.height = Some(b.height());
        }
    }
}

/// Turn a draft into the element to commit, or `None` if it is too small.
///
/// Box shapes must exceed [`MIN_DRAW_SIZE`] on both axes. Polygons become a
/// regular polygon inscribed in the dragged box.
#[must_use]
pub fn finish_draft(mut draft: Element) -> Option<Element> {
    match draft.kind {
        ElementKind::Rectangle | ElementKind::Circle | ElementKind::Triangle | ElementKind::Diamond => {
            is_large_enough(&draft).then_some(draft)
        }
        ElementKind::Polygon => {
            if !is_large_enough(&draft) {
                return None;
            }
            let (w, h) = draft.box_size();
            draft.points = Some(regular_polygon(Bounds::from_rect(draft.x, draft.y, w, h), POLYGON_SIDES));
            draft.width = None;
            draft.height = None;
            Some(draft)
        }
        ElementKind::Line | ElementKind::Arrow | ElementKind::Pencil | ElementKind::Text | ElementKind::Sticky => {
            Some(draft)
        }
    }
}

/// Vertices of a regular polygon inscribed in `bounds`, first vertex at the top.
#[must_use]
pub fn regular_polygon(bounds: Bounds, sides: usize) -> Vec<Point> {
    let center = bounds.center();
    let radius = bounds.width().min(bounds.height()) / 2.0;
    #[allow(clippy::cast_precision_loss)]
    let step = TAU / sides.max(3) as f64;
    (0..sides.max(3))
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let angle = i as f64 * step - FRAC_PI_2;
            Point::new(center.x + angle.cos() * radius, center.y + angle.sin() * radius)
        })
        .collect()
}

/// Normalised box spanned by two drag corners.
#[must_use]
pub fn drag_bounds(start: Point, pos: Point) -> Bounds {
    Bounds {
        min_x: start.x.min(pos.x),
        min_y: start.y.min(pos.y),
        max_x: start.x.max(pos.x),
        max_y: start.y.max(pos.y),
    }
}

/// Whether a marquee is big enough to select anything.
#[must_use]
pub fn is_meaningful_marquee(bounds: &Bounds) -> bool {
    bounds.width() > MIN_DRAW_SIZE || bounds.height() > MIN_DRAW_SIZE
}

fn is_large_enough(draft: &Element) -> bool {
    let (w, h) = draft.box_size();
    w > MIN_DRAW_SIZE && h > MIN_DRAW_SIZE
}
