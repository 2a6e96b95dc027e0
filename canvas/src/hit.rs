#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use crate::consts::{DEFAULT_STROKE_WIDTH, HANDLE_HIT_RADIUS, STROKE_HIT_TOLERANCE};
use crate::element::{Bounds, Element, ElementId, ElementKind, Point};
use crate::group::ResizeAnchor;

/// What lies under the pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hit {
    /// A resize handle of the selection box.
    Handle(ResizeAnchor),
    /// The body of an element.
    Element(ElementId),
}

/// Center of `anchor`'s handle on `bounds`.
#[must_use]
pub fn handle_position(bounds: &Bounds, anchor: ResizeAnchor) -> Point {
    let c = bounds.center();
    match anchor {
        ResizeAnchor::N => Point::new(c.x, bounds.min_y),
        ResizeAnchor::Ne => Point::new(bounds.max_x, bounds.min_y),
        ResizeAnchor::E => Point::new(bounds.max_x, c.y),
        ResizeAnchor::Se => Point::new(bounds.max_x, bounds.max_y),
        ResizeAnchor::S => Point::new(c.x, bounds.max_y),
        ResizeAnchor::Sw => Point::new(bounds.min_x, bounds.max_y),
        ResizeAnchor::W => Point::new(bounds.min_x, c.y),
        ResizeAnchor::Nw => Point::new(bounds.min_x, bounds.min_y),
    }
}

/// Test what is under `pos`, checking the selection handles first and then
/// elements from topmost to bottommost.
#[must_use]
pub fn hit_test(pos: Point, elements: &[Element], selection: Option<&Bounds>) -> Option<Hit> {
    if let Some(bounds) = selection {
        let handle = ResizeAnchor::ALL
            .into_iter()
            .find(|a| distance(pos, handle_position(bounds, *a)) <= HANDLE_HIT_RADIUS);
        if let Some(anchor) = handle {
            return Some(Hit::Handle(anchor));
        }
    }
    elements
        .iter()
        .rev()
        .find(|e| element_contains(e, pos))
        .map(|e| Hit::Element(e.id.clone()))
}

/// Whether `pos` falls on `element`.
///
/// Open strokes (line, arrow, pencil) hit within half the stroke width plus
/// a tolerance of any segment; everything else hits inside its bounds.
#[must_use]
pub fn element_contains(element: &Element, pos: Point) -> bool {
    match (element.kind, element.points.as_deref()) {
        (ElementKind::Line | ElementKind::Arrow | ElementKind::Pencil, Some(points)) if !points.is_empty() => {
            let reach = element.stroke_width.unwrap_or(DEFAULT_STROKE_WIDTH) / 2.0 + STROKE_HIT_TOLERANCE;
            if let [only] = points {
                return distance(pos, *only) <= reach;
            }
            points.windows(2).any(|seg| segment_distance(pos, seg[0], seg[1]) <= reach)
        }
        _ => element.bounds().contains(pos),
    }
}

fn distance(a: Point, b: Point) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return distance(p, a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    distance(p, Point::new(a.x + t * dx, a.y + t * dy))
}
