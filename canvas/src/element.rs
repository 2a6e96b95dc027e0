//! Element model: the shapes on a whiteboard and their geometry helpers.
//!
//! An [`Element`] is the atomic unit of synchronisation. It is a flat record
//! tagged by [`ElementKind`]; which optional fields are meaningful depends on
//! the kind. Box shapes use `x`/`y` as the top-left corner plus
//! `width`/`height`. Point shapes (line, arrow, polygon, pencil) carry
//! absolute coordinates in `points` and keep `x`/`y` as an offset that is
//! normally zero. Text uses `x`/`y` as its origin.
//!
//! Data arrives here from local gestures and from the network. Network data
//! goes through [`Element::from_value`], which tolerates missing or mistyped
//! geometry and fills per-kind fallbacks via [`Element::normalize`].

#[cfg(test)]
#[path = "element_test.rs"]
mod element_test;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::consts::{
    DEFAULT_FONT_SIZE, DEFAULT_STICKY_TEXT, DEFAULT_STROKE_WIDTH, DEFAULT_TEXT, FALLBACK_BOX_SIZE,
    FALLBACK_CIRCLE_SIZE, STICKY_SIZE, TEXT_ADVANCE_RATIO, TEXT_LINE_PADDING, TEXT_MIN_WIDTH,
};

/// Unique identifier for an element, e.g. `"rectangle-1718000000000"`.
pub type ElementId = String;

/// Identifier shared by every member of a group.
pub type GroupId = String;

/// Numeric fields that are dropped (and later defaulted) when mistyped on the wire.
const NUMERIC_FIELDS: [&str; 6] = ["x", "y", "width", "height", "fontSize", "strokeWidth"];

/// String fields that are dropped when mistyped on the wire.
const STRING_FIELDS: [&str; 4] = ["text", "strokeColor", "fillColor", "groupId"];

/// Error returned by [`Element::from_value`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not a JSON object.
    #[error("element payload is not an object")]
    NotAnObject,
    /// The payload has no usable `id`.
    #[error("element payload has no id")]
    MissingId,
    /// The `type` tag is absent or names no known kind.
    #[error("element {id} has an invalid type")]
    InvalidType { id: String },
    /// The payload could not be deserialized after sanitising.
    #[error("element payload rejected: {0}")]
    Json(#[from] serde_json::Error),
}

/// The shape kind of an element. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Axis-aligned rectangle.
    Rectangle,
    /// Ellipse inscribed in its bounding box; `x`/`y` is the box's top-left.
    Circle,
    /// Straight segment between two points.
    Line,
    /// Segment with an arrowhead seeded from the last two points.
    Arrow,
    /// Isosceles triangle inscribed in its bounding box.
    Triangle,
    /// Rhombus with vertices at the bounding box edge midpoints.
    Diamond,
    /// Closed polygon through `points`.
    Polygon,
    /// Freehand stroke through sampled `points`.
    Pencil,
    /// Single-line text anchored at `x`/`y`.
    Text,
    /// Sticky note: a filled box holding text.
    Sticky,
}

impl ElementKind {
    /// Every kind, in toolbar order.
    pub const ALL: [Self; 10] = [
        Self::Rectangle,
        Self::Circle,
        Self::Line,
        Self::Arrow,
        Self::Triangle,
        Self::Diamond,
        Self::Polygon,
        Self::Pencil,
        Self::Text,
        Self::Sticky,
    ];

    /// Wire name of the kind, also used as the id prefix.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Circle => "circle",
            Self::Line => "line",
            Self::Arrow => "arrow",
            Self::Triangle => "triangle",
            Self::Diamond => "diamond",
            Self::Polygon => "polygon",
            Self::Pencil => "pencil",
            Self::Text => "text",
            Self::Sticky => "sticky",
        }
    }

    /// Parse a wire name back into a kind.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether geometry lives in `points` rather than `x`/`y`/`width`/`height`.
    #[must_use]
    pub fn uses_points(self) -> bool {
        matches!(self, Self::Line | Self::Arrow | Self::Polygon | Self::Pencil)
    }

    /// Whether the kind is laid out in a `width` × `height` box.
    #[must_use]
    pub fn is_box(self) -> bool {
        matches!(self, Self::Rectangle | Self::Circle | Self::Triangle | Self::Diamond | Self::Sticky)
    }

    fn fallback_size(self) -> f64 {
        match self {
            Self::Circle => FALLBACK_CIRCLE_SIZE,
            Self::Sticky => STICKY_SIZE,
            _ => FALLBACK_BOX_SIZE,
        }
    }
}

/// A point in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Scale this point about `origin` by `(sx, sy)`.
    #[must_use]
    pub fn scaled_about(self, origin: Point, sx: f64, sy: f64) -> Self {
        Self { x: origin.x + (self.x - origin.x) * sx, y: origin.y + (self.y - origin.y) * sy }
    }
}

/// Axis-aligned bounding region in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Bounds of the box with top-left `(x, y)` and the given extents.
    #[must_use]
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { min_x: x, min_y: y, max_x: x + width, max_y: y + height }
    }

    /// Min/max over `points`, or `None` when the slice is empty.
    #[must_use]
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let start = Self { min_x: first.x, min_y: first.y, max_x: first.x, max_y: first.y };
        Some(rest.iter().fold(start, |b, p| Self {
            min_x: b.min_x.min(p.x),
            min_y: b.min_y.min(p.y),
            max_x: b.max_x.max(p.x),
            max_y: b.max_y.max(p.y),
        }))
    }

    /// Smallest bounds covering both `self` and `other`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow the bounds by `pad` on every side.
    #[must_use]
    pub fn expand(self, pad: f64) -> Self {
        Self { min_x: self.min_x - pad, min_y: self.min_y - pad, max_x: self.max_x + pad, max_y: self.max_y + pad }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point::new((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Whether `p` lies inside the region, edges included.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Whether the two regions overlap; touching edges count.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !(other.max_x < self.min_x || other.min_x > self.max_x || other.max_y < self.min_y || other.min_y > self.max_y)
    }
}

/// Presentation attributes applied to newly created elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub stroke_color: String,
    pub fill_color: String,
    pub stroke_width: f64,
    /// Fill used for sticky notes instead of `fill_color`.
    pub sticky_fill: String,
    /// Border used for sticky notes instead of `stroke_color`.
    pub sticky_stroke: String,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            stroke_color: "#94a3b8".to_owned(),
            fill_color: "transparent".to_owned(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            sticky_fill: "#fef3c7".to_owned(),
            sticky_stroke: "#fcd34d".to_owned(),
        }
    }
}

/// A whiteboard element as stored in the document and on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Unique identifier, immutable for the element's lifetime.
    pub id: ElementId,
    /// Shape kind, immutable after creation.
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Left edge for box shapes, origin for text, offset for point shapes.
    #[serde(default)]
    pub x: f64,
    /// Top edge for box shapes, origin for text, offset for point shapes.
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Ordered path for point shapes; order defines the path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    /// Shared by every member of a group; `None` means ungrouped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

impl Element {
    /// A bare element of `kind` at `(x, y)` with every optional field unset.
    #[must_use]
    pub fn new(id: impl Into<ElementId>, kind: ElementKind, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            x,
            y,
            width: None,
            height: None,
            points: None,
            text: None,
            font_size: None,
            stroke_color: None,
            fill_color: None,
            stroke_width: None,
            group_id: None,
        }
    }

    #[must_use]
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    #[must_use]
    pub fn with_points(mut self, points: Vec<Point>) -> Self {
        self.points = Some(points);
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>, font_size: f64) -> Self {
        self.text = Some(text.into());
        self.font_size = Some(font_size);
        self
    }

    /// Apply the stroke/fill of `style`. Line-like kinds take no fill.
    #[must_use]
    pub fn with_style(mut self, style: &Style) -> Self {
        match self.kind {
            ElementKind::Sticky => {
                self.stroke_color = Some(style.sticky_stroke.clone());
                self.fill_color = Some(style.sticky_fill.clone());
            }
            ElementKind::Line | ElementKind::Arrow | ElementKind::Pencil | ElementKind::Text => {
                self.stroke_color = Some(style.stroke_color.clone());
                if self.kind != ElementKind::Text {
                    self.stroke_width = Some(style.stroke_width);
                }
            }
            _ => {
                self.stroke_color = Some(style.stroke_color.clone());
                self.fill_color = Some(style.fill_color.clone());
                self.stroke_width = Some(style.stroke_width);
            }
        }
        self
    }

    /// Decode an element received from the network, tolerating bad geometry.
    ///
    /// Mistyped optional fields are dropped and then defaulted by
    /// [`Element::normalize`]; mistyped points are filtered out individually.
    ///
    /// # Errors
    ///
    /// Fails only when the record cannot be identified: it is not an object,
    /// has no id, or has no recognisable `type`.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(mut map) = value else {
            return Err(DecodeError::NotAnObject);
        };
        let id = match map.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(DecodeError::MissingId),
        };
        map.insert("id".to_owned(), Value::String(id.clone()));

        let kind = map.get("type").and_then(Value::as_str).and_then(ElementKind::parse);
        if kind.is_none() {
            return Err(DecodeError::InvalidType { id });
        }

        sanitize_fields(&mut map);
        let mut element: Self = serde_json::from_value(Value::Object(map))?;
        element.normalize();
        Ok(element)
    }

    /// Fill in per-kind fallbacks so that every element has usable geometry.
    pub fn normalize(&mut self) {
        if !self.x.is_finite() {
            self.x = 0.0;
        }
        if !self.y.is_finite() {
            self.y = 0.0;
        }

        if self.kind.is_box() {
            let fallback = self.kind.fallback_size();
            self.width = Some(finite_or(self.width, fallback));
            self.height = Some(finite_or(self.height, fallback));
        }

        if self.points.as_ref().is_some_and(Vec::is_empty) {
            self.points = None;
        }
        if self.kind.uses_points() && self.points.is_none() {
            self.points = Some(vec![Point::new(self.x, self.y)]);
        }

        match self.kind {
            ElementKind::Text => {
                self.text.get_or_insert_with(|| DEFAULT_TEXT.to_owned());
                self.font_size = Some(finite_or(self.font_size, DEFAULT_FONT_SIZE));
            }
            ElementKind::Sticky => {
                self.text.get_or_insert_with(|| DEFAULT_STICKY_TEXT.to_owned());
            }
            _ => {}
        }

        if self.group_id.as_deref().is_some_and(str::is_empty) {
            self.group_id = None;
        }
    }

    /// Width and height of a box shape, falling back when unset.
    #[must_use]
    pub fn box_size(&self) -> (f64, f64) {
        let fallback = self.kind.fallback_size();
        (self.width.unwrap_or(fallback), self.height.unwrap_or(fallback))
    }

    /// Font size, falling back to the default when unset.
    #[must_use]
    pub fn font_size_or_default(&self) -> f64 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    /// Bounding region of the element.
    ///
    /// Circles are boxes with `x`/`y` at the top-left. Point shapes use the
    /// extent of their points. Text is estimated from the font size and the
    /// character count since no glyph metrics are available.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        if self.kind == ElementKind::Circle {
            let (w, h) = self.box_size();
            return Bounds::from_rect(self.x, self.y, w, h);
        }
        if let Some(bounds) = self.points.as_deref().and_then(Bounds::from_points) {
            return bounds;
        }
        if self.kind == ElementKind::Text {
            let font_size = self.font_size_or_default();
            let chars = self.text.as_deref().unwrap_or(DEFAULT_TEXT).chars().count();
            #[allow(clippy::cast_precision_loss)]
            let width = (chars as f64 * font_size * TEXT_ADVANCE_RATIO).max(TEXT_MIN_WIDTH);
            return Bounds::from_rect(self.x, self.y, width, font_size + TEXT_LINE_PADDING);
        }
        let (w, h) = self.box_size();
        Bounds::from_rect(self.x, self.y, w, h)
    }

    /// Translate the element. Point shapes move their points; everything
    /// else moves `x`/`y`.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        if let Some(points) = self.points.as_mut() {
            for p in points {
                p.x += dx;
                p.y += dy;
            }
        } else {
            self.x += dx;
            self.y += dy;
        }
    }

    /// A copy of this element scaled about `origin` by `(sx, sy)`.
    ///
    /// The position is scaled relative to `origin` and the element's own
    /// extent (size, points, font size) by the same factors, so a set of
    /// elements scaled about a shared origin keeps its relative layout.
    #[must_use]
    pub fn scaled_about(&self, origin: Point, sx: f64, sy: f64) -> Self {
        let mut out = self.clone();
        if let Some(points) = out.points.as_mut() {
            for p in points.iter_mut() {
                *p = p.scaled_about(origin, sx, sy);
            }
            return out;
        }

        let corner = Point::new(self.x, self.y).scaled_about(origin, sx, sy);
        out.x = corner.x;
        out.y = corner.y;
        if self.kind.is_box() {
            let (w, h) = self.box_size();
            out.width = Some(w * sx);
            out.height = Some(h * sy);
        }
        if self.kind == ElementKind::Text || self.font_size.is_some() {
            out.font_size = Some(self.font_size_or_default() * sy);
        }
        out
    }

    /// Merge the set fields of `patch` into this element, then normalize.
    ///
    /// Returns `true` if any field actually changed.
    pub fn apply(&mut self, patch: &ElementPatch) -> bool {
        let before = self.clone();
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(w) = patch.width {
            self.width = Some(w);
        }
        if let Some(h) = patch.height {
            self.height = Some(h);
        }
        if let Some(ref points) = patch.points {
            self.points = Some(points.clone());
        }
        if let Some(ref text) = patch.text {
            self.text = Some(text.clone());
        }
        if let Some(size) = patch.font_size {
            self.font_size = Some(size);
        }
        if let Some(ref color) = patch.stroke_color {
            self.stroke_color = Some(color.clone());
        }
        if let Some(ref color) = patch.fill_color {
            self.fill_color = Some(color.clone());
        }
        if let Some(width) = patch.stroke_width {
            self.stroke_width = Some(width);
        }
        if let Some(ref group) = patch.group_id {
            self.group_id.clone_from(group);
        }
        self.normalize();
        *self != before
    }
}

/// Sparse update for an element. Only set fields are applied; `id` and
/// `kind` cannot be patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub points: Option<Vec<Point>>,
    pub text: Option<String>,
    pub font_size: Option<f64>,
    pub stroke_color: Option<String>,
    pub fill_color: Option<String>,
    pub stroke_width: Option<f64>,
    /// `Some(None)` clears the group, `Some(Some(g))` assigns one.
    pub group_id: Option<Option<GroupId>>,
}

impl ElementPatch {
    /// Patch that moves a box/text element to `(x, y)`.
    #[must_use]
    pub fn position(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }
}

/// Generates `<kind>-<millis>` ids, suffixing `-<n>` within the same millisecond.
#[derive(Debug, Default)]
pub struct ElementIdGen {
    last_ms: u64,
    seq: u32,
}

impl ElementIdGen {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for `kind` created at `now_ms`.
    pub fn next(&mut self, kind: ElementKind, now_ms: u64) -> ElementId {
        // EDGE: a clock that stalls or steps backwards reuses the last stamp.
        if now_ms <= self.last_ms {
            self.seq += 1;
            return format!("{}-{}-{}", kind.as_str(), self.last_ms, self.seq);
        }
        self.last_ms = now_ms;
        self.seq = 0;
        format!("{}-{now_ms}", kind.as_str())
    }
}

/// Fresh group identifier.
#[must_use]
pub fn new_group_id() -> GroupId {
    format!("group-{}", uuid::Uuid::new_v4())
}

fn finite_or(value: Option<f64>, fallback: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(fallback)
}

fn sanitize_fields(map: &mut Map<String, Value>) {
    for key in NUMERIC_FIELDS {
        if map.get(key).is_some_and(|v| !v.is_number()) {
            map.remove(key);
        }
    }
    for key in STRING_FIELDS {
        if map.get(key).is_some_and(|v| !v.is_string()) {
            map.remove(key);
        }
    }

    let points = match map.remove("points") {
        Some(Value::Array(items)) => items.into_iter().filter(is_point).collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    if !points.is_empty() {
        map.insert("points".to_owned(), Value::Array(points));
    }
}

fn is_point(value: &Value) -> bool {
    value.get("x").is_some_and(Value::is_number) && value.get("y").is_some_and(Value::is_number)
}
