//! Table of contents resolution.
//!
//! Three sources are tried in order and the first one that yields at least
//! one section wins:
//!
//! 1. the EPUB 3 navigation document (`properties="nav"`, `<nav epub:type="toc">`)
//! 2. the EPUB 2 NCX named by the spine's `toc` attribute
//! 3. the spine itself, minus leading navigation and non-linear entries
//!
//! Each tier is a plain function over a [`NavContext`] so it can be run and
//! tested on its own.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::manifest::{Item, ItemIndex, MediaType};
use crate::path;
use crate::spine::{Section, renumber};
use crate::xml::{self, Element};

/// Access to the raw bytes of manifest items.
pub trait ResourceLoader {
    fn load(&self, item: &Item) -> Result<Vec<u8>>;
}

/// Which tier produced a table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavSource {
    NavDocument,
    Ncx,
    Spine,
}

impl fmt::Display for NavSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NavSource::NavDocument => "navigation document",
            NavSource::Ncx => "NCX",
            NavSource::Spine => "spine",
        })
    }
}

/// A resolved table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Navigation {
    /// `None` when every tier came up empty.
    pub source: Option<NavSource>,
    pub sections: Vec<Section>,
}

/// Everything the tiers read from.
pub struct NavContext<'a> {
    /// Manifest items in manifest order.
    pub items: &'a [Arc<Item>],
    pub index: &'a ItemIndex,
    /// Sections built from the spine.
    pub spine: &'a [Section],
    /// Value of the spine's `toc` attribute.
    pub spine_toc: Option<&'a str>,
    pub loader: &'a dyn ResourceLoader,
}

type Tier = fn(&NavContext<'_>) -> Option<Vec<Section>>;

const TIERS: [(NavSource, Tier); 3] = [
    (NavSource::NavDocument, nav_document_tier),
    (NavSource::Ncx, ncx_tier),
    (NavSource::Spine, spine_tier),
];

/// Run the tiers in order and keep the first non-empty result.
pub fn resolve(ctx: &NavContext<'_>) -> Navigation {
    for (source, tier) in TIERS {
        if let Some(sections) = tier(ctx) {
            tracing::debug!(%source, sections = sections.len(), "resolved table of contents");
            return Navigation {
                source: Some(source),
                sections,
            };
        }
    }
    tracing::debug!("no table of contents found");
    Navigation::default()
}

/// Tier 1: the EPUB 3 navigation document.
///
/// Each top-level `<li>` of the `toc` nav contributes its first link as a
/// section; every further link inside that `<li>` becomes a subsection
/// unless it points at a fragment.
pub fn nav_document_tier(ctx: &NavContext<'_>) -> Option<Vec<Section>> {
    let nav_item = ctx.items.iter().find(|item| item.is_nav())?;
    let root = ctx.parse(nav_item)?;

    let toc = root.find_all("nav").find(|nav| is_toc_nav(nav))?;
    let list = toc
        .descendants()
        .find(|e| matches!(e.local_name(), "ol" | "ul"))?;

    let mut out = SectionList::new(ctx, nav_item);
    for entry in list.children_named("li") {
        let mut links = entry.find_all("a");
        if let Some(first) = links.next() {
            out.push(first.attr("href"), first.trimmed_text(), false);
        }
        for link in links {
            let href = link.attr("href");
            if href.is_some_and(|h| h.contains('#')) {
                continue;
            }
            out.push(href, link.trimmed_text(), true);
        }
    }
    out.finish()
}

/// Tier 2: the EPUB 2 NCX.
///
/// Every `navPoint` in document order becomes one flat section; nesting is
/// not preserved.
pub fn ncx_tier(ctx: &NavContext<'_>) -> Option<Vec<Section>> {
    let ncx_item = ncx_item(ctx)?;
    let root = ctx.parse(ncx_item)?;
    let nav_map = root.find("navMap")?;

    let mut out = SectionList::new(ctx, ncx_item);
    for point in nav_map.find_all("navPoint") {
        let Some(label) = point.child("navLabel").and_then(|l| l.child("text")) else {
            continue;
        };
        let Some(content) = point.child("content") else {
            continue;
        };
        out.push(content.attr("src"), label.trimmed_text(), false);
    }
    out.finish()
}

/// Tier 3: the spine, without leading navigation documents and the
/// non-linear entries that follow them.
pub fn spine_tier(ctx: &NavContext<'_>) -> Option<Vec<Section>> {
    let remaining = ctx
        .spine
        .iter()
        .skip_while(|s| s.content.is_nav())
        .skip_while(|s| !s.linear)
        .cloned();
    non_empty(renumber(remaining))
}

/// The NCX item: the one named by the spine's `toc` attribute, or failing
/// that the first item with the NCX media type.
pub fn ncx_item<'a>(ctx: &NavContext<'a>) -> Option<&'a Arc<Item>> {
    ctx.spine_toc
        .and_then(|id| ctx.index.by_id(id.trim()))
        .or_else(|| {
            ctx.items
                .iter()
                .find(|item| item.media_type == MediaType::Ncx)
        })
}

fn is_toc_nav(nav: &Element) -> bool {
    nav.attr("type")
        .is_some_and(|t| t.split_ascii_whitespace().any(|token| token == "toc"))
}

fn non_empty(sections: Vec<Section>) -> Option<Vec<Section>> {
    (!sections.is_empty()).then_some(sections)
}

impl NavContext<'_> {
    /// Load and parse a navigation source. Failures are logged and treated
    /// as "this tier has nothing".
    fn parse(&self, item: &Item) -> Option<Element> {
        let bytes = match self.loader.load(item) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(href = %item.href, error = %e, "cannot read navigation source");
                return None;
            }
        };
        match xml::parse(&bytes) {
            Ok(root) => Some(root),
            Err(e) => {
                tracing::warn!(href = %item.href, error = %e, "cannot parse navigation source");
                None
            }
        }
    }
}

/// Accumulates sections with a single reading-order counter.
struct SectionList<'a> {
    index: &'a ItemIndex,
    /// Href of the document the links are written in.
    base_href: &'a str,
    linear: HashMap<&'a str, bool>,
    sections: Vec<Section>,
}

impl<'a> SectionList<'a> {
    fn new(ctx: &NavContext<'a>, source: &'a Item) -> Self {
        let mut linear = HashMap::new();
        for section in ctx.spine {
            linear
                .entry(section.content.id.as_str())
                .or_insert(section.linear);
        }
        Self {
            index: ctx.index,
            base_href: &source.href,
            linear,
            sections: Vec::new(),
        }
    }

    /// Add a link. Links that do not resolve to a manifest item are skipped
    /// and do not take a reading-order position.
    fn push(&mut self, href: Option<&str>, title: Option<String>, sub_section: bool) {
        let Some(href) = href.map(str::trim).filter(|h| !h.is_empty()) else {
            return;
        };
        let index = self.index;
        let Some(item) = path::resolve_relative(self.base_href, href)
            .and_then(|target| index.by_path(&target))
        else {
            tracing::debug!(href, "skipping table of contents link to unknown item");
            return;
        };

        self.sections.push(Section {
            content: Arc::clone(item),
            reading_order: self.sections.len() + 1,
            title,
            linear: self.linear.get(item.id.as_str()).copied().unwrap_or(true),
            sub_section,
        });
    }

    fn finish(self) -> Option<Vec<Section>> {
        non_empty(self.sections)
    }
}
