//! Change detection by element fingerprint.
//!
//! A fingerprint is the canonical serialization of an element. The
//! [`ChangeDetector`] remembers the fingerprint last confirmed on the wire
//! for each id; diffing the document against it yields exactly the elements
//! that still need sending.
//!
//! Remote records are absorbed into the detector after they are applied so
//! that echoing them back is never mistaken for a local change.

#[cfg(test)]
#[path = "fingerprint_test.rs"]
mod fingerprint_test;

use std::collections::{HashMap, HashSet};

use crate::element::{Element, ElementId};

/// Canonical serialized form of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Fingerprint of `element`.
///
/// Field order follows the struct declaration and unset optionals are
/// omitted, so equal elements always produce equal fingerprints.
#[must_use]
pub fn fingerprint(element: &Element) -> Fingerprint {
    Fingerprint(serde_json::to_string(element).unwrap_or_default())
}

/// Elements awaiting transmission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Elements whose fingerprint differs from the last one sent, in paint order.
    pub changed: Vec<Element>,
    /// Ids sent before that are no longer in the document.
    pub removed: Vec<ElementId>,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changed.len() + self.removed.len()
    }
}

/// Tracks the last fingerprint sent for each element id.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    sent: HashMap<ElementId, Fingerprint>,
}

impl ChangeDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `elements` against the sent fingerprints.
    #[must_use]
    pub fn diff(&self, elements: &[Element]) -> ChangeSet {
        let changed = elements
            .iter()
            .filter(|e| self.sent.get(&e.id) != Some(&fingerprint(e)))
            .cloned()
            .collect();

        let present: HashSet<&str> = elements.iter().map(|e| e.id.as_str()).collect();
        let mut removed: Vec<ElementId> =
            self.sent.keys().filter(|id| !present.contains(id.as_str())).cloned().collect();
        removed.sort();

        ChangeSet { changed, removed }
    }

    /// Record `element` as delivered.
    pub fn mark_sent(&mut self, element: &Element) {
        self.sent.insert(element.id.clone(), fingerprint(element));
    }

    /// Record the deletion of `id` as delivered.
    pub fn mark_removed(&mut self, id: &str) {
        self.sent.remove(id);
    }

    /// Treat a remotely received element as already in sync.
    pub fn absorb(&mut self, element: &Element) {
        self.mark_sent(element);
    }

    /// Drop tracking for an id removed remotely.
    pub fn forget(&mut self, id: &str) {
        self.sent.remove(id);
    }

    /// Replace all tracking with the given remote state.
    pub fn reset<'a>(&mut self, elements: impl IntoIterator<Item = &'a Element>) {
        self.sent = elements.into_iter().map(|e| (e.id.clone(), fingerprint(e))).collect();
    }

    /// Whether `element` matches what was last sent.
    #[must_use]
    pub fn is_synced(&self, element: &Element) -> bool {
        self.sent.get(&element.id) == Some(&fingerprint(element))
    }

    /// Number of ids tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.sent.len()
    }
}
