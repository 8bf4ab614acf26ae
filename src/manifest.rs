//! Manifest items: the resources declared by the package document.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::metadata::{self, ExtendedRecord, MetadataRecord};
use crate::path;
use crate::xml::Element;

/// Media type of a manifest item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaType {
    Xhtml,
    Html,
    Css,
    Ncx,
    Smil,
    Svg,
    Jpeg,
    Png,
    Gif,
    Webp,
    OpenType,
    TrueType,
    Woff,
    Woff2,
    JavaScript,
    Mp3,
    Mp4Audio,
    Pls,
    Other(String),
}

impl MediaType {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "application/xhtml+xml" => MediaType::Xhtml,
            "text/html" => MediaType::Html,
            "text/css" => MediaType::Css,
            "application/x-dtbncx+xml" => MediaType::Ncx,
            "application/smil+xml" => MediaType::Smil,
            "image/svg+xml" => MediaType::Svg,
            "image/jpeg" | "image/jpg" => MediaType::Jpeg,
            "image/png" => MediaType::Png,
            "image/gif" => MediaType::Gif,
            "image/webp" => MediaType::Webp,
            "font/otf" | "application/font-sfnt" | "application/vnd.ms-opentype" => {
                MediaType::OpenType
            }
            "font/ttf" | "application/x-font-ttf" => MediaType::TrueType,
            "font/woff" | "application/font-woff" => MediaType::Woff,
            "font/woff2" => MediaType::Woff2,
            "application/javascript" | "text/javascript" | "application/ecmascript" => {
                MediaType::JavaScript
            }
            "audio/mpeg" => MediaType::Mp3,
            "audio/mp4" => MediaType::Mp4Audio,
            "application/pls+xml" => MediaType::Pls,
            _ => MediaType::Other(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MediaType::Xhtml => "application/xhtml+xml",
            MediaType::Html => "text/html",
            MediaType::Css => "text/css",
            MediaType::Ncx => "application/x-dtbncx+xml",
            MediaType::Smil => "application/smil+xml",
            MediaType::Svg => "image/svg+xml",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Gif => "image/gif",
            MediaType::Webp => "image/webp",
            MediaType::OpenType => "font/otf",
            MediaType::TrueType => "font/ttf",
            MediaType::Woff => "font/woff",
            MediaType::Woff2 => "font/woff2",
            MediaType::JavaScript => "application/javascript",
            MediaType::Mp3 => "audio/mpeg",
            MediaType::Mp4Audio => "audio/mp4",
            MediaType::Pls => "application/pls+xml",
            MediaType::Other(s) => s,
        }
    }

    /// XHTML or HTML content document.
    pub fn is_document(&self) -> bool {
        matches!(self, MediaType::Xhtml | MediaType::Html)
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self,
            MediaType::Svg | MediaType::Jpeg | MediaType::Png | MediaType::Gif | MediaType::Webp
        )
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A manifest `properties` flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Property {
    CoverImage,
    Nav,
    Mathml,
    Scripted,
    Svg,
    RemoteResources,
    Switch,
    /// A token outside the known vocabulary, kept verbatim.
    Unsupported(String),
}

impl Property {
    pub fn parse(token: &str) -> Self {
        match token {
            "cover-image" => Property::CoverImage,
            "nav" => Property::Nav,
            "mathml" => Property::Mathml,
            "scripted" => Property::Scripted,
            "svg" => Property::Svg,
            "remote-resources" => Property::RemoteResources,
            "switch" => Property::Switch,
            other => Property::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Property::CoverImage => "cover-image",
            Property::Nav => "nav",
            Property::Mathml => "mathml",
            Property::Scripted => "scripted",
            Property::Svg => "svg",
            Property::RemoteResources => "remote-resources",
            Property::Switch => "switch",
            Property::Unsupported(s) => s,
        }
    }
}

/// Parse a space-separated `properties` attribute.
pub fn parse_properties(value: &str) -> BTreeSet<Property> {
    value.split_ascii_whitespace().map(Property::parse).collect()
}

/// A resource declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    /// Href as written, relative to the package base directory.
    pub href: String,
    pub media_type: MediaType,
    pub properties: BTreeSet<Property>,
    /// Id of the fallback item, if declared.
    pub fallback: Option<String>,
    /// Synchronized narration (SMIL) for this item.
    pub media_overlay: Option<Arc<Item>>,
    /// `<meta refines="#id">` records targeting this item.
    pub refinements: Vec<ExtendedRecord>,
}

impl Item {
    pub fn has_property(&self, property: &Property) -> bool {
        self.properties.contains(property)
    }

    /// Whether this item is the EPUB 3 navigation document.
    pub fn is_nav(&self) -> bool {
        self.has_property(&Property::Nav)
    }

    pub fn is_cover_image(&self) -> bool {
        self.has_property(&Property::CoverImage)
    }

    /// First refinement carrying the given property (e.g. `media:duration`).
    pub fn refinement(&self, property: &str) -> Option<&ExtendedRecord> {
        self.refinements
            .iter()
            .find(|r| r.property.as_deref() == Some(property))
    }
}

/// Build the item list from a package `<manifest>` element.
///
/// Each `<item>` is built independently: one that fails with
/// [`Error::Format`] is logged and skipped. A `media-overlay` naming an id
/// that no manifest element declares is a contradiction in the package and
/// fails the whole manifest with [`Error::Inconsistent`].
pub fn build_manifest(manifest: &Element, metadata: &[MetadataRecord]) -> Result<Vec<Arc<Item>>> {
    let elements: Vec<&Element> = manifest.children_named("item").collect();
    let mut builder = ManifestBuilder::new(&elements, metadata);

    let mut items = Vec::with_capacity(elements.len());
    for index in 0..elements.len() {
        match builder.build(index) {
            Ok(item) => items.push(item),
            Err(Error::Format(reason)) => {
                tracing::warn!(
                    index,
                    id = elements[index].attr("id").unwrap_or(""),
                    %reason,
                    "skipping malformed manifest item"
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(items)
}

struct ManifestBuilder<'a> {
    elements: &'a [&'a Element],
    by_id: HashMap<&'a str, usize>,
    refinements: HashMap<&'a str, Vec<&'a ExtendedRecord>>,
    /// Items are shared between the list and the overlays that point at them.
    built: HashMap<usize, Arc<Item>>,
    /// Format errors of elements that already failed, so overlay chains
    /// ending in a malformed element are only walked once.
    failed: HashMap<usize, String>,
    visiting: HashSet<usize>,
}

impl<'a> ManifestBuilder<'a> {
    fn new(elements: &'a [&'a Element], metadata: &'a [MetadataRecord]) -> Self {
        let mut by_id: HashMap<&str, usize> = HashMap::new();
        for (index, element) in elements.iter().enumerate() {
            if let Some(id) = element.attr("id").map(str::trim) {
                by_id.entry(id).or_insert(index);
            }
        }
        Self {
            elements,
            by_id,
            refinements: metadata::refines_index(metadata),
            built: HashMap::new(),
            failed: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    fn build(&mut self, index: usize) -> Result<Arc<Item>> {
        if let Some(item) = self.built.get(&index) {
            return Ok(Arc::clone(item));
        }
        if let Some(reason) = self.failed.get(&index) {
            return Err(Error::Format(reason.clone()));
        }
        if !self.visiting.insert(index) {
            return Err(Error::format("media-overlay references form a cycle"));
        }
        let result = self.build_uncached(index);
        self.visiting.remove(&index);

        match result {
            Ok(item) => {
                let item = Arc::new(item);
                self.built.insert(index, Arc::clone(&item));
                Ok(item)
            }
            Err(Error::Format(reason)) => {
                self.failed.insert(index, reason.clone());
                Err(Error::Format(reason))
            }
            Err(e) => Err(e),
        }
    }

    fn build_uncached(&mut self, index: usize) -> Result<Item> {
        let element = self.elements[index];
        let id = required(element, "id")?;
        let href = required(element, "href")?;
        let media_type = required(element, "media-type")?;

        // The overlay is resolved before the item that references it.
        let media_overlay = match element.attr("media-overlay").map(str::trim) {
            None => None,
            Some("") => return Err(Error::format("empty media-overlay reference")),
            Some(target) => {
                let Some(&target_index) = self.by_id.get(target) else {
                    return Err(Error::Inconsistent(format!(
                        "item `{}` has media-overlay `{}` which is not in the manifest",
                        id, target
                    )));
                };
                Some(self.build(target_index)?)
            }
        };

        let refinements = self
            .refinements
            .get(id)
            .map(|records| records.iter().map(|r| (*r).clone()).collect())
            .unwrap_or_default();

        Ok(Item {
            id: id.to_string(),
            href: href.to_string(),
            media_type: MediaType::parse(media_type),
            properties: element.attr("properties").map(parse_properties).unwrap_or_default(),
            fallback: element
                .attr("fallback")
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string),
            media_overlay,
            refinements,
        })
    }
}

/// Id and href lookups over a built manifest.
///
/// Hrefs are keyed in normalized, percent-decoded form relative to the
/// package base directory, which is also what [`crate::path::resolve_relative`]
/// produces for links inside navigation documents.
#[derive(Debug, Default)]
pub struct ItemIndex {
    by_id: HashMap<String, Arc<Item>>,
    by_href: HashMap<String, Arc<Item>>,
}

impl ItemIndex {
    pub fn new(items: &[Arc<Item>]) -> Self {
        let mut index = ItemIndex::default();
        for item in items {
            index
                .by_id
                .entry(item.id.clone())
                .or_insert_with(|| Arc::clone(item));
            index
                .by_href
                .entry(href_key(&item.href))
                .or_insert_with(|| Arc::clone(item));
        }
        index
    }

    pub fn by_id(&self, id: &str) -> Option<&Arc<Item>> {
        self.by_id.get(id)
    }

    /// Look up an href relative to the package base directory. Any fragment
    /// is ignored.
    pub fn by_href(&self, href: &str) -> Option<&Arc<Item>> {
        self.by_href.get(&href_key(href))
    }

    /// Look up a path that is already normalized and percent-decoded, such
    /// as the output of [`crate::path::resolve_relative`].
    pub fn by_path(&self, path: &str) -> Option<&Arc<Item>> {
        self.by_href.get(path)
    }
}

fn href_key(href: &str) -> String {
    path::normalize(&path::decode(path::strip_fragment(href)))
}

fn required<'a>(element: &'a Element, name: &str) -> Result<&'a str> {
    element
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::format(format!("manifest item missing `{}` attribute", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::build_metadata;
    use crate::xml;

    fn build(metadata: &str, manifest: &str) -> Result<Vec<Arc<Item>>> {
        let doc = format!(
            r#"<package xmlns:dc="http://purl.org/dc/elements/1.1/"><metadata>{}</metadata><manifest>{}</manifest></package>"#,
            metadata, manifest
        );
        let root = xml::parse_str(&doc).unwrap();
        let records = build_metadata(root.child("metadata").unwrap());
        build_manifest(root.child("manifest").unwrap(), &records)
    }

    #[test]
    fn test_media_type_parse() {
        assert_eq!(MediaType::parse("application/xhtml+xml"), MediaType::Xhtml);
        assert_eq!(MediaType::parse("IMAGE/JPEG"), MediaType::Jpeg);
        assert_eq!(
            MediaType::parse("application/x-thing"),
            MediaType::Other("application/x-thing".to_string())
        );
        assert_eq!(MediaType::Ncx.as_str(), "application/x-dtbncx+xml");
        assert!(MediaType::Png.is_image());
        assert!(MediaType::Html.is_document());
    }

    #[test]
    fn test_properties_with_unsupported_token() {
        let props = parse_properties("nav  scripted future-flag");
        assert!(props.contains(&Property::Nav));
        assert!(props.contains(&Property::Scripted));
        assert!(props.contains(&Property::Unsupported("future-flag".to_string())));
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn test_items_in_manifest_order() {
        let items = build(
            "",
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
               <item id="cover" href="images/cover.jpg" media-type="image/jpeg" properties="cover-image"/>
               <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml" fallback="ch1-alt"/>"#,
        )
        .unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["nav", "cover", "ch1"]);
        assert!(items[0].is_nav());
        assert!(items[1].is_cover_image());
        assert_eq!(items[1].media_type, MediaType::Jpeg);
        assert_eq!(items[2].fallback.as_deref(), Some("ch1-alt"));
    }

    #[test]
    fn test_missing_attribute_skips_item() {
        let items = build(
            "",
            r#"<item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
               <item id="b" media-type="application/xhtml+xml"/>
               <item href="c.xhtml" media-type="application/xhtml+xml"/>
               <item id="d" href="d.xhtml"/>
               <item id="e" href="e.xhtml" media-type="application/xhtml+xml"/>"#,
        )
        .unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "e"]);
    }

    #[test]
    fn test_media_overlay_is_shared_and_refined() {
        let items = build(
            r##"<meta property="media:duration" refines="#ch1-audio">0:32:29</meta>
                <meta property="media:duration" refines="#ch1">0:00:01</meta>"##,
            r#"<item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml" media-overlay="ch1-audio"/>
               <item id="ch1-audio" href="ch1.smil" media-type="application/smil+xml"/>"#,
        )
        .unwrap();

        assert_eq!(items.len(), 2);
        let overlay = items[0].media_overlay.as_ref().unwrap();
        assert_eq!(overlay.id, "ch1-audio");
        assert!(Arc::ptr_eq(overlay, &items[1]));
        assert_eq!(
            overlay.refinement("media:duration").unwrap().value.as_deref(),
            Some("0:32:29")
        );
        assert_eq!(
            items[0].refinement("media:duration").unwrap().value.as_deref(),
            Some("0:00:01")
        );
    }

    #[test]
    fn test_dangling_media_overlay_is_inconsistent() {
        let result = build(
            "",
            r#"<item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml" media-overlay="missing"/>"#,
        );
        assert!(matches!(result, Err(Error::Inconsistent(_))));
    }

    #[test]
    fn test_malformed_media_overlay_skips_item() {
        let items = build(
            "",
            r#"<item id="a" href="a.xhtml" media-type="application/xhtml+xml" media-overlay=" "/>
               <item id="b" href="b.xhtml" media-type="application/xhtml+xml" media-overlay="b-audio"/>
               <item id="b-audio" media-type="application/smil+xml"/>
               <item id="c" href="c.xhtml" media-type="application/xhtml+xml"/>"#,
        )
        .unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn test_item_index() {
        let items = build(
            "",
            r#"<item id="a" href="text/chapter%201.xhtml" media-type="application/xhtml+xml"/>
               <item id="b" href="./images/b.png" media-type="image/png"/>"#,
        )
        .unwrap();
        let index = ItemIndex::new(&items);

        assert_eq!(index.by_id("b").unwrap().href, "./images/b.png");
        assert_eq!(index.by_href("text/chapter 1.xhtml#p3").unwrap().id, "a");
        assert_eq!(index.by_href("images/b.png").unwrap().id, "b");
        assert!(index.by_href("missing.xhtml").is_none());
    }

    #[test]
    fn test_media_overlay_cycle_skips_items() {
        let items = build(
            "",
            r#"<item id="a" href="a.smil" media-type="application/smil+xml" media-overlay="b"/>
               <item id="b" href="b.smil" media-type="application/smil+xml" media-overlay="a"/>
               <item id="c" href="c.xhtml" media-type="application/xhtml+xml"/>"#,
        )
        .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "c");
    }

    #[test]
    fn test_media_overlay_matches_trimmed_id() {
        let items = build(
            "",
            r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml" media-overlay="s1"/>
               <item id=" s1 " href="c1.smil" media-type="application/smil+xml"/>"#,
        )
        .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].media_overlay.as_ref().unwrap().id, "s1");
    }

    #[test]
    fn test_failed_overlay_chain_is_built_once() {
        let mut manifest = String::new();
        for i in 0..50 {
            manifest.push_str(&format!(
                r#"<item id="s{i}" href="s{i}.smil" media-type="application/smil+xml" media-overlay="s{}"/>"#,
                i + 1
            ));
        }
        manifest.push_str(r#"<item id="s50" media-type="application/smil+xml"/>"#);
        let doc = format!("<package><manifest>{manifest}</manifest></package>");
        let root = xml::parse_str(&doc).unwrap();
        let elements: Vec<&Element> = root.child("manifest").unwrap().children_named("item").collect();

        let mut builder = ManifestBuilder::new(&elements, &[]);
        assert!(matches!(builder.build(0), Err(Error::Format(_))));
        assert_eq!(builder.failed.len(), 51);
        assert!(builder.visiting.is_empty());

        // Later elements of the chain fail from the cache.
        assert!(matches!(builder.build(25), Err(Error::Format(_))));
        assert_eq!(builder.failed.len(), 51);
        assert!(builder.built.is_empty());
    }

    #[test]
    fn test_item_index_by_path_skips_decoding() {
        let items = build(
            "",
            r#"<item id="a" href="a%2541.xhtml" media-type="application/xhtml+xml"/>"#,
        )
        .unwrap();
        let index = ItemIndex::new(&items);

        assert_eq!(index.by_href("a%2541.xhtml").unwrap().id, "a");
        assert_eq!(index.by_path("a%41.xhtml").unwrap().id, "a");
        assert!(index.by_path("aA.xhtml").is_none());
    }
}
