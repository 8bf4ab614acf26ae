//! A small owned element tree over quick-xml.
//!
//! Package documents, navigation documents and NCX files are all small, so
//! the resolver works on a fully built tree instead of a streaming reader.
//! Queries are namespace-agnostic: elements and attributes match on their
//! local name and ignore the prefix.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::util::decode_text;

/// An XML element with its attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    prefix: Option<String>,
    local_name: String,
    namespace: Option<String>,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An attribute with its qualified name (`epub:type`) and unescaped value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Parse raw markup bytes into the document's root element.
pub fn parse(bytes: &[u8]) -> Result<Element> {
    let content = decode_text(strip_bom(bytes));
    parse_str(&content)
}

/// Parse markup text into the document's root element.
pub fn parse_str(content: &str) -> Result<Element> {
    let mut reader = Reader::from_str(content);
    // Content documents in the wild are not always well-formed XHTML.
    reader.config_mut().check_end_names = false;

    let mut stack: Vec<Element> = Vec::new();
    let mut scopes: Vec<Vec<(Option<String>, String)>> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let (element, decls) = open_element(&e, &scopes);
                scopes.push(decls);
                stack.push(element);
            }
            Ok(Event::Empty(e)) => {
                let (element, _) = open_element(&e, &scopes);
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                scopes.pop();
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Ok(Event::Text(e)) => {
                push_text(&mut stack, &String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::CData(e)) => {
                push_text(&mut stack, &String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::GeneralRef(e)) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                if let Some(resolved) = resolve_entity(&entity) {
                    push_text(&mut stack, &resolved);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    // Unclosed elements at EOF are closed implicitly.
    while let Some(element) = stack.pop() {
        attach(&mut stack, &mut root, element);
    }

    root.ok_or_else(|| Error::format("document has no root element"))
}

impl Element {
    /// Local name without prefix (`dc:title` -> `title`).
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Namespace URI bound to this element's prefix, if declared.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Look up an attribute by name.
    ///
    /// An exact match on the qualified name wins; otherwise the first
    /// attribute whose local name equals `name` is returned. Namespace
    /// declarations never match.
    pub fn attr(&self, name: &str) -> Option<&str> {
        let mut candidates = self
            .attributes
            .iter()
            .filter(|a| a.name != "xmlns" && !a.name.starts_with("xmlns:"));
        if let Some(exact) = candidates.clone().find(|a| a.name == name) {
            return Some(&exact.value);
        }
        candidates
            .find(|a| local_name(&a.name) == local_name(name))
            .map(|a| a.value.as_str())
    }

    /// Child elements, in document order.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// All child nodes, text included.
    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    /// Child elements with the given local name.
    pub fn children_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a Element> + use<'a, 'n> {
        self.children().filter(move |e| e.local_name == name)
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children_named(name).next()
    }

    /// All descendant elements in document order (pre-order, self excluded).
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: vec![self.children.iter()],
        }
    }

    /// First descendant element with the given local name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.descendants().find(|e| e.local_name == name)
    }

    /// All descendant elements with the given local name.
    pub fn find_all<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a Element> + use<'a, 'n> {
        self.descendants().filter(move |e| e.local_name == name)
    }

    /// Path-like query over local names.
    ///
    /// `"manifest/item"` walks children step by step from this element;
    /// a leading `//` matches the first step against all descendants.
    pub fn select_all(&self, path: &str) -> Vec<&Element> {
        let (deep, path) = match path.strip_prefix("//") {
            Some(rest) => (true, rest),
            None => (false, path),
        };
        let mut steps = path.split('/').filter(|s| !s.is_empty());
        let Some(first) = steps.next() else {
            return Vec::new();
        };

        let mut current: Vec<&Element> = if deep {
            self.find_all(first).collect()
        } else {
            self.children_named(first).collect()
        };
        for step in steps {
            current = current
                .into_iter()
                .flat_map(|e| e.children_named(step))
                .collect();
        }
        current
    }

    /// First match of [`Element::select_all`].
    pub fn select(&self, path: &str) -> Option<&Element> {
        self.select_all(path).into_iter().next()
    }

    /// Concatenated text of this element and all its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Text content with surrounding whitespace removed and inner runs of
    /// whitespace collapsed to one space. `None` when nothing remains.
    pub fn trimmed_text(&self) -> Option<String> {
        let text = self.text();
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (!collapsed.is_empty()).then_some(collapsed)
    }
}

/// Pre-order iterator over descendant elements.
pub struct Descendants<'a> {
    stack: Vec<std::slice::Iter<'a, Node>>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(iter) = self.stack.last_mut() {
            match iter.next() {
                Some(Node::Element(e)) => {
                    self.stack.push(e.children.iter());
                    return Some(e);
                }
                Some(Node::Text(_)) => {}
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
        }
    }
}

// ----------------------------------------------------------------------------
// Tree building
// ----------------------------------------------------------------------------

fn open_element(
    e: &BytesStart<'_>,
    scopes: &[Vec<(Option<String>, String)>],
) -> (Element, Vec<(Option<String>, String)>) {
    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let (prefix, local) = split_qname(&qname);

    let mut attributes = Vec::new();
    let mut decls = Vec::new();
    for attr in e.attributes().flatten() {
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = quick_xml::escape::unescape(&raw)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| raw.to_string());

        if name == "xmlns" {
            decls.push((None, value.clone()));
        } else if let Some(p) = name.strip_prefix("xmlns:") {
            decls.push((Some(p.to_string()), value.clone()));
        }
        attributes.push(Attribute { name, value });
    }

    let namespace = decls
        .iter()
        .rev()
        .chain(scopes.iter().rev().flat_map(|s| s.iter().rev()))
        .find(|(p, _)| p.as_deref() == prefix)
        .map(|(_, uri)| uri.clone());

    let element = Element {
        prefix: prefix.map(str::to_string),
        local_name: local.to_string(),
        namespace,
        attributes,
        children: Vec::new(),
    };
    (element, decls)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn push_text(stack: &mut [Element], text: &str) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if let Some(Node::Text(existing)) = parent.children.last_mut() {
        existing.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Strip UTF-8 BOM if present.
fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
fn local_name(name: &str) -> &str {
    split_qname(name).1
}

/// Resolve XML entity references.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        "nbsp" => return Some("\u{a0}".to_string()),
        _ => {}
    }

    if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r##"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title id="t">Tom &amp; Jerry</dc:title>
    <meta property="title-type" refines="#t">main</meta>
  </metadata>
  <manifest>
    <item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
    <item id="b" href="b.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
</package>"##;

    #[test]
    fn test_parse_names_and_namespaces() {
        let root = parse_str(OPF).unwrap();
        assert_eq!(root.local_name(), "package");
        assert_eq!(root.namespace(), Some("http://www.idpf.org/2007/opf"));

        let title = root.find("title").unwrap();
        assert_eq!(title.prefix(), Some("dc"));
        assert_eq!(title.namespace(), Some("http://purl.org/dc/elements/1.1/"));
        assert_eq!(title.text(), "Tom & Jerry");

        let meta = root.find("meta").unwrap();
        assert_eq!(meta.namespace(), Some("http://www.idpf.org/2007/opf"));
    }

    #[test]
    fn test_select_paths() {
        let root = parse_str(OPF).unwrap();
        let items = root.select_all("manifest/item");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].attr("href"), Some("b.xhtml"));

        assert!(root.select("metadata/title").is_some());
        assert!(root.select("title").is_none());
        assert!(root.select("//title").is_some());
    }

    #[test]
    fn test_attr_is_namespace_agnostic() {
        let root = parse_str(
            r#"<nav xmlns:epub="http://www.idpf.org/2007/ops" epub:type="toc" xmlns:x="urn:x" x:href="p"/>"#,
        )
        .unwrap();
        assert_eq!(root.attr("epub:type"), Some("toc"));
        assert_eq!(root.attr("type"), Some("toc"));
        assert_eq!(root.attr("href"), Some("p"));
        assert_eq!(root.attr("epub"), None);
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = parse_str("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<_> = root.descendants().map(|e| e.local_name()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_trimmed_text_collapses_whitespace() {
        let root = parse_str("<a>\n  Chapter <span>One</span>\n</a>").unwrap();
        assert_eq!(root.trimmed_text(), Some("Chapter One".to_string()));

        let empty = parse_str("<a>  </a>").unwrap();
        assert_eq!(empty.trimmed_text(), None);
    }

    #[test]
    fn test_entities_and_cdata() {
        let root = parse_str("<a>x&#65;&#x42;&nbsp;<![CDATA[<y>]]></a>").unwrap();
        assert_eq!(root.text(), "xAB\u{a0}<y>");
    }

    #[test]
    fn test_parse_bytes_with_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"<root/>");
        assert_eq!(parse(&bytes).unwrap().local_name(), "root");
    }

    #[test]
    fn test_empty_document_is_format_error() {
        assert!(matches!(parse_str("  "), Err(Error::Format(_))));
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp"), Some("&".to_string()));
        assert_eq!(resolve_entity("#8217"), Some("\u{2019}".to_string()));
        assert_eq!(resolve_entity("#x2019"), Some("\u{2019}".to_string()));
        assert_eq!(resolve_entity("bogus"), None);
    }
}
