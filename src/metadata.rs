//! Package metadata: Dublin Core records and `<meta>` records, with
//! refinements folded under the records they refine.

use std::collections::HashMap;

use crate::xml::Element;

/// Dublin Core elements namespace.
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// A single metadata entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataRecord {
    /// A Dublin Core element (`dc:title`, `dc:creator`, ...).
    Core(CoreRecord),
    /// A generic `<meta>` element (EPUB 3 `property` or EPUB 2 `name`/`content`).
    Extended(ExtendedRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreRecord {
    /// Local element name (`title`, `creator`, `language`, ...).
    pub key: String,
    pub value: Option<String>,
    pub id: Option<String>,
    pub refinements: Vec<ExtendedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedRecord {
    /// EPUB 2 `name` attribute.
    pub name: Option<String>,
    /// Element text, or the `content` attribute when there is no text.
    pub value: Option<String>,
    pub id: Option<String>,
    /// Id of the record (or manifest item) this one refines, without `#`.
    pub refines: Option<String>,
    pub property: Option<String>,
    pub scheme: Option<String>,
    pub refinements: Vec<ExtendedRecord>,
}

impl MetadataRecord {
    pub fn id(&self) -> Option<&str> {
        match self {
            MetadataRecord::Core(r) => r.id.as_deref(),
            MetadataRecord::Extended(r) => r.id.as_deref(),
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            MetadataRecord::Core(r) => r.value.as_deref(),
            MetadataRecord::Extended(r) => r.value.as_deref(),
        }
    }

    pub fn refinements(&self) -> &[ExtendedRecord] {
        match self {
            MetadataRecord::Core(r) => &r.refinements,
            MetadataRecord::Extended(r) => &r.refinements,
        }
    }

    fn refinements_mut(&mut self) -> &mut Vec<ExtendedRecord> {
        match self {
            MetadataRecord::Core(r) => &mut r.refinements,
            MetadataRecord::Extended(r) => &mut r.refinements,
        }
    }

    pub fn as_core(&self) -> Option<&CoreRecord> {
        match self {
            MetadataRecord::Core(r) => Some(r),
            MetadataRecord::Extended(_) => None,
        }
    }

    pub fn as_extended(&self) -> Option<&ExtendedRecord> {
        match self {
            MetadataRecord::Extended(r) => Some(r),
            MetadataRecord::Core(_) => None,
        }
    }

    /// Whether this is a Dublin Core record with the given key.
    pub fn is_core(&self, key: &str) -> bool {
        self.as_core().is_some_and(|r| r.key == key)
    }
}

impl ExtendedRecord {
    /// First refinement carrying the given property (e.g. `role`, `file-as`).
    pub fn refinement(&self, property: &str) -> Option<&ExtendedRecord> {
        self.refinements
            .iter()
            .find(|r| r.property.as_deref() == Some(property))
    }
}

impl CoreRecord {
    /// First refinement carrying the given property (e.g. `role`, `file-as`).
    pub fn refinement(&self, property: &str) -> Option<&ExtendedRecord> {
        self.refinements
            .iter()
            .find(|r| r.property.as_deref() == Some(property))
    }
}

/// Build the metadata record list from a package `<metadata>` element.
///
/// Descendants are visited once in document order. A `<meta refines="#x">`
/// is folded under the record with id `x` only if that record was already
/// seen; a refinement that precedes its target, names a missing target, or
/// refines itself stays top-level.
pub fn build_metadata(metadata: &Element) -> Vec<MetadataRecord> {
    struct Slot {
        record: Option<MetadataRecord>,
        children: Vec<usize>,
    }

    let mut slots: Vec<Slot> = Vec::new();
    let mut top_level: Vec<usize> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();

    for element in metadata.descendants() {
        let Some(record) = classify(element) else {
            continue;
        };
        let index = slots.len();

        let target = match &record {
            MetadataRecord::Extended(r) => r.refines.as_deref().and_then(|t| by_id.get(t)).copied(),
            MetadataRecord::Core(_) => None,
        };
        match target {
            Some(parent) => slots[parent].children.push(index),
            None => top_level.push(index),
        }

        if let Some(id) = record.id() {
            by_id.entry(id.to_string()).or_insert(index);
        }
        slots.push(Slot {
            record: Some(record),
            children: Vec::new(),
        });
    }

    // Children always come after their parent, so materializing from the
    // back lets every parent take already finished children.
    for index in (0..slots.len()).rev() {
        let children = std::mem::take(&mut slots[index].children);
        let mut folded = Vec::with_capacity(children.len());
        for child in children {
            if let Some(MetadataRecord::Extended(r)) = slots[child].record.take() {
                folded.push(r);
            }
        }
        if let Some(record) = slots[index].record.as_mut() {
            record.refinements_mut().extend(folded);
        }
    }

    top_level
        .into_iter()
        .filter_map(|index| slots[index].record.take())
        .collect()
}

fn classify(element: &Element) -> Option<MetadataRecord> {
    let is_dc = element.prefix() == Some("dc") || element.namespace() == Some(DC_NAMESPACE);
    if is_dc {
        return Some(MetadataRecord::Core(CoreRecord {
            key: element.local_name().to_string(),
            value: element.trimmed_text(),
            id: non_empty(element.attr("id")),
            refinements: Vec::new(),
        }));
    }

    if element.local_name() == "meta" {
        let refines = non_empty(element.attr("refines"))
            .map(|r| r.trim_start_matches('#').to_string())
            .filter(|r| !r.is_empty());
        return Some(MetadataRecord::Extended(ExtendedRecord {
            name: non_empty(element.attr("name")),
            value: element
                .trimmed_text()
                .or_else(|| non_empty(element.attr("content"))),
            id: non_empty(element.attr("id")),
            refines,
            property: non_empty(element.attr("property")),
            scheme: non_empty(element.attr("scheme")),
            refinements: Vec::new(),
        }));
    }

    None
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ----------------------------------------------------------------------------
// Lookups
// ----------------------------------------------------------------------------

/// Values of all Dublin Core records with the given key, in document order.
pub fn core_values<'a>(records: &'a [MetadataRecord], key: &'a str) -> impl Iterator<Item = &'a str> {
    records
        .iter()
        .filter(move |r| r.is_core(key))
        .filter_map(|r| r.value())
}

/// Index every extended record in the tree by the id it refines.
///
/// Nested refinements are included, so a lookup sees a record regardless of
/// whether it was folded.
pub fn refines_index(records: &[MetadataRecord]) -> HashMap<&str, Vec<&ExtendedRecord>> {
    fn visit<'a>(record: &'a ExtendedRecord, index: &mut HashMap<&'a str, Vec<&'a ExtendedRecord>>) {
        if let Some(target) = record.refines.as_deref() {
            index.entry(target).or_default().push(record);
        }
        for child in &record.refinements {
            visit(child, index);
        }
    }

    let mut index = HashMap::new();
    for record in records {
        if let MetadataRecord::Extended(r) = record {
            visit(r, &mut index);
        } else {
            for child in record.refinements() {
                visit(child, &mut index);
            }
        }
    }
    index
}

/// Manifest id named by an EPUB 2 `<meta name="cover" content="..."/>`.
pub fn legacy_cover_id(records: &[MetadataRecord]) -> Option<&str> {
    records
        .iter()
        .filter_map(MetadataRecord::as_extended)
        .find(|r| r.name.as_deref() == Some("cover"))
        .and_then(|r| r.value.as_deref())
}
