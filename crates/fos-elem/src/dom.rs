//! DOM Boundary
//!
//! The loader never owns a document. Whatever renders the page exposes
//! its element tree through [`ElementTree`] so directories can find the
//! custom elements they define.

use std::cmp::Ordering;

/// Read-only view of a document's elements
pub trait ElementTree {
    type Element: Clone + PartialEq;

    /// Descendants of `root` with the given (lower-case) tag name.
    fn elements_by_tag_name(&self, root: &Self::Element, tag: &str) -> Vec<Self::Element>;

    /// Relative document position of two elements, or `None` when either
    /// element cannot report its position.
    fn compare_document_position(&self, _a: &Self::Element, _b: &Self::Element) -> Option<Ordering> {
        None
    }

    /// Position of the element in source order.
    fn source_index(&self, element: &Self::Element) -> usize;
}

/// Elements under `root` carrying any of `tags`, sorted into document order.
pub fn find_matches<T: ElementTree>(dom: &T, root: &T::Element, tags: &[String]) -> Vec<T::Element> {
    let mut found = Vec::new();

    for tag in tags {
        found.extend(dom.elements_by_tag_name(root, tag));
    }

    found.sort_by(|a, b| document_order(dom, a, b));
    found
}

fn document_order<T: ElementTree>(dom: &T, a: &T::Element, b: &T::Element) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    match dom.compare_document_position(a, b) {
        Some(order) => order,
        None => dom.source_index(a).cmp(&dom.source_index(b)),
    }
}
