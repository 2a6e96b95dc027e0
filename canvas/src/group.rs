//! Selection and group resolution.
//!
//! Pure functions over an element slice: expanding ids to whole groups,
//! computing the unified selection box, marquee hit-testing, and the
//! group-aware resize transform. Nothing here is stored; callers recompute
//! from the current elements whenever they need it.

#[cfg(test)]
#[path = "group_test.rs"]
mod group_test;

use std::collections::{BTreeSet, HashMap};

use crate::consts::{MIN_SCALE, SELECTION_PADDING};
use crate::element::{Bounds, Element, ElementId, GroupId};

/// Handle on the selection box being dragged during a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAnchor {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

impl ResizeAnchor {
    pub const ALL: [Self; 8] = [Self::N, Self::Ne, Self::E, Self::Se, Self::S, Self::Sw, Self::W, Self::Nw];

    /// Horizontal direction of the handle: -1 west, 1 east, 0 neither.
    fn x_sign(self) -> f64 {
        match self {
            Self::Ne | Self::E | Self::Se => 1.0,
            Self::Nw | Self::W | Self::Sw => -1.0,
            Self::N | Self::S => 0.0,
        }
    }

    /// Vertical direction of the handle: -1 north, 1 south, 0 neither.
    fn y_sign(self) -> f64 {
        match self {
            Self::Se | Self::S | Self::Sw => 1.0,
            Self::Ne | Self::N | Self::Nw => -1.0,
            Self::E | Self::W => 0.0,
        }
    }
}

/// Ids of every element carrying `group_id`, in paint order.
#[must_use]
pub fn group_members(elements: &[Element], group_id: &str) -> Vec<ElementId> {
    elements
        .iter()
        .filter(|e| e.group_id.as_deref() == Some(group_id))
        .map(|e| e.id.clone())
        .collect()
}

/// Close `ids` over group membership. Unknown ids are dropped.
#[must_use]
pub fn expand_groups<'a>(elements: &[Element], ids: impl IntoIterator<Item = &'a str>) -> BTreeSet<ElementId> {
    let mut out = BTreeSet::new();
    let mut groups: BTreeSet<&str> = BTreeSet::new();
    for id in ids {
        let Some(el) = elements.iter().find(|e| e.id == id) else {
            continue;
        };
        out.insert(el.id.clone());
        if let Some(group) = el.group_id.as_deref() {
            groups.insert(group);
        }
    }
    for el in elements {
        if el.group_id.as_deref().is_some_and(|g| groups.contains(g)) {
            out.insert(el.id.clone());
        }
    }
    out
}

/// Distinct group ids touched by `ids`.
#[must_use]
pub fn groups_of(elements: &[Element], ids: &BTreeSet<ElementId>) -> BTreeSet<GroupId> {
    elements
        .iter()
        .filter(|e| ids.contains(&e.id))
        .filter_map(|e| e.group_id.clone())
        .collect()
}

/// Union of the bounds of the elements in `ids`, without padding.
#[must_use]
pub fn union_bounds(elements: &[Element], ids: &BTreeSet<ElementId>) -> Option<Bounds> {
    elements
        .iter()
        .filter(|e| ids.contains(&e.id))
        .map(Element::bounds)
        .reduce(Bounds::union)
}

/// The unified selection box drawn around `ids`.
#[must_use]
pub fn selection_bounds(elements: &[Element], ids: &BTreeSet<ElementId>) -> Option<Bounds> {
    union_bounds(elements, ids).map(|b| b.expand(SELECTION_PADDING))
}

/// Ids of the elements whose bounds intersect `marquee`, in paint order.
#[must_use]
pub fn marquee_hits(elements: &[Element], marquee: &Bounds) -> Vec<ElementId> {
    elements
        .iter()
        .filter(|e| e.bounds().intersects(marquee))
        .map(|e| e.id.clone())
        .collect()
}

/// Scale factors for dragging `anchor` of `bounds` by `(dx, dy)`.
///
/// Axes the handle does not control keep a factor of 1. Factors never drop
/// below [`MIN_SCALE`], so a handle dragged across the opposite edge
/// collapses the selection instead of mirroring it.
#[must_use]
pub fn resize_factors(bounds: &Bounds, anchor: ResizeAnchor, dx: f64, dy: f64) -> (f64, f64) {
    (
        axis_factor(bounds.width(), anchor.x_sign() * dx),
        axis_factor(bounds.height(), anchor.y_sign() * dy),
    )
}

fn axis_factor(extent: f64, growth: f64) -> f64 {
    if extent <= 0.0 || growth == 0.0 {
        return 1.0;
    }
    ((extent + growth) / extent).max(MIN_SCALE)
}

/// Scaled copies of the elements in `ids`, all scaled about the center of
/// `original` so the group keeps its relative layout.
#[must_use]
pub fn scale_selection(
    elements: &[Element],
    ids: &BTreeSet<ElementId>,
    original: &Bounds,
    sx: f64,
    sy: f64,
) -> Vec<Element> {
    let origin = original.center();
    elements
        .iter()
        .filter(|e| ids.contains(&e.id))
        .map(|e| e.scaled_about(origin, sx, sy))
        .collect()
}

/// Clear `group_id` on elements that are the only member of their group.
///
/// Returns the ids that were changed.
pub fn prune_singleton_groups(elements: &mut [Element]) -> Vec<ElementId> {
    let mut counts: HashMap<GroupId, usize> = HashMap::new();
    for el in elements.iter() {
        if let Some(group) = &el.group_id {
            *counts.entry(group.clone()).or_default() += 1;
        }
    }

    let mut pruned = Vec::new();
    for el in elements.iter_mut() {
        let lonely = el.group_id.as_ref().is_some_and(|g| counts.get(g).copied() == Some(1));
        if lonely {
            el.group_id = None;
            pruned.push(el.id.clone());
        }
    }
    pruned
}
