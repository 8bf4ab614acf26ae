//! Locating the package document through `META-INF/container.xml`.

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::path;
use crate::xml;

/// Fixed location of the container indirection file.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Where the package document lives inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePath {
    /// Archive path of the package document (e.g. `OEBPS/content.opf`).
    pub full_path: String,
    /// Directory that every manifest href is relative to (e.g. `OEBPS`).
    /// Empty when the package document sits at the archive root.
    pub base_dir: String,
}

impl PackagePath {
    pub fn new(full_path: impl Into<String>) -> Self {
        let full_path = path::normalize(&full_path.into());
        let base_dir = path::parent_dir(&full_path).to_string();
        Self {
            full_path,
            base_dir,
        }
    }

    /// Archive path of an href written in the package document.
    pub fn resolve(&self, href: &str) -> String {
        path::join(&self.base_dir, href)
    }
}

/// Find the package document path declared by the container file.
pub fn locate_package(archive: &Archive) -> Result<PackagePath> {
    let bytes = match archive.read(CONTAINER_PATH) {
        Ok(bytes) => bytes,
        Err(Error::ResourceNotFound(_)) => return Err(Error::format("container not found")),
        Err(e) => return Err(e),
    };
    parse_container(&bytes)
}

/// Parse container.xml and return the first rootfile's path.
pub fn parse_container(bytes: &[u8]) -> Result<PackagePath> {
    let root = xml::parse(bytes)?;
    let rootfile = if root.local_name() == "rootfile" {
        Some(&root)
    } else {
        root.find("rootfile")
    };

    rootfile
        .and_then(|e| e.attr("full-path"))
        .filter(|p| !p.trim().is_empty())
        .map(|p| PackagePath::new(p.trim()))
        .ok_or_else(|| Error::format("root path attribute missing"))
}
