//! Helpers for building EPUB containers in memory.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Builds an EPUB whose package document lives at `OEBPS/content.opf`.
pub struct EpubBuilder {
    files: Vec<(String, Vec<u8>)>,
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self {
            files: vec![
                ("mimetype".into(), b"application/epub+zip".to_vec()),
                ("META-INF/container.xml".into(), CONTAINER_XML.as_bytes().to_vec()),
            ],
        }
    }

    /// An archive with only the mimetype entry.
    pub fn bare() -> Self {
        Self {
            files: vec![("mimetype".into(), b"application/epub+zip".to_vec())],
        }
    }

    pub fn file(mut self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.files.retain(|(n, _)| n != name);
        self.files.push((name.to_string(), content.as_ref().to_vec()));
        self
    }

    /// Add a file relative to the `OEBPS` directory.
    pub fn content(self, href: &str, content: impl AsRef<[u8]>) -> Self {
        self.file(&format!("OEBPS/{}", href), content)
    }

    pub fn package(self, opf: &str) -> Self {
        self.content("content.opf", opf)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let deflated =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in &self.files {
            let options = if name == "mimetype" { stored } else { deflated };
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }
}

/// Assemble an EPUB 3 package document.
pub fn opf(metadata: &str, manifest: &str, spine_attrs: &str, spine: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
{metadata}
  </metadata>
  <manifest>
{manifest}
  </manifest>
  <spine {spine_attrs}>
{spine}
  </spine>
</package>"#
    )
}

/// An XHTML manifest item.
pub fn xhtml_item(id: &str, href: &str) -> String {
    format!(r#"<item id="{id}" href="{href}" media-type="application/xhtml+xml"/>"#)
}

pub fn itemref(idref: &str, linear: Option<&str>) -> String {
    match linear {
        Some(value) => format!(r#"<itemref idref="{idref}" linear="{value}"/>"#),
        None => format!(r#"<itemref idref="{idref}"/>"#),
    }
}

/// A navigation document whose toc lists `(href, title, children)`.
pub fn nav_document(entries: &[(&str, &str, &[(&str, &str)])]) -> String {
    let mut list = String::new();
    for (href, title, children) in entries {
        list.push_str(&format!(r#"<li><a href="{href}">{title}</a>"#));
        if !children.is_empty() {
            list.push_str("<ol>");
            for (child_href, child_title) in children.iter() {
                list.push_str(&format!(r#"<li><a href="{child_href}">{child_title}</a></li>"#));
            }
            list.push_str("</ol>");
        }
        list.push_str("</li>");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Contents</title></head>
<body><nav epub:type="toc"><h1>Contents</h1><ol>{list}</ol></nav></body>
</html>"#
    )
}

/// An NCX with one flat navPoint per `(src, label)`.
pub fn ncx_document(entries: &[(&str, &str)]) -> String {
    let mut points = String::new();
    for (i, (src, label)) in entries.iter().enumerate() {
        points.push_str(&format!(
            r#"<navPoint id="np{n}" playOrder="{n}"><navLabel><text>{label}</text></navLabel><content src="{src}"/></navPoint>"#,
            n = i + 1
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head/>
  <docTitle><text>Book</text></docTitle>
  <navMap>{points}</navMap>
</ncx>"#
    )
}
