//! Reading order: the spine and the [`Section`] entries it produces.

use std::sync::Arc;

use crate::manifest::{Item, ItemIndex};
use crate::xml::Element;

/// One position in a reading order or table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub content: Arc<Item>,
    /// 1-based position, dense within the list this section belongs to.
    pub reading_order: usize,
    pub title: Option<String>,
    pub linear: bool,
    /// Nested under the preceding top-level entry of a navigation document.
    pub sub_section: bool,
}

/// Build sections from a package `<spine>` element.
///
/// `itemref`s whose `idref` is not in the manifest are dropped and do not
/// consume a position. An entry is linear only when its `linear` attribute
/// is literally `yes`.
pub fn build_spine(spine: &Element, index: &ItemIndex) -> Vec<Section> {
    let mut sections = Vec::new();
    for itemref in spine.children_named("itemref") {
        let idref = itemref.attr("idref").map(str::trim).unwrap_or("");
        let Some(item) = index.by_id(idref) else {
            tracing::debug!(idref, "skipping spine reference to unknown item");
            continue;
        };
        sections.push(Section {
            content: Arc::clone(item),
            reading_order: sections.len() + 1,
            title: None,
            linear: itemref.attr("linear").map(str::trim) == Some("yes"),
            sub_section: false,
        });
    }
    sections
}

/// Reassign reading orders `1..=n` in list order.
pub fn renumber(sections: impl IntoIterator<Item = Section>) -> Vec<Section> {
    sections
        .into_iter()
        .enumerate()
        .map(|(i, section)| Section {
            reading_order: i + 1,
            ..section
        })
        .collect()
}
