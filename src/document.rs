//! The [`Document`] facade: lazily resolved views over an EPUB container.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::archive::Archive;
use crate::container::{self, PackagePath};
use crate::error::{Error, Result};
use crate::manifest::{Item, ItemIndex, build_manifest};
use crate::metadata::{self, MetadataRecord, build_metadata};
use crate::navigation::{self, NavContext, NavSource, Navigation, ResourceLoader};
use crate::spine::{Section, build_spine};
use crate::util::decode_text;
use crate::xml::{self, Element};

/// An EPUB publication.
///
/// Nothing beyond the ZIP directory is parsed up front. Each view (package,
/// metadata, items, sections, navigation) is computed on first access,
/// pulling in whatever it depends on, and then cached for the lifetime of
/// the document. A failed computation is not cached, so the next access
/// retries it. Concurrent first access from several threads runs the
/// computation once.
///
/// # Example
///
/// ```no_run
/// use spindle::Document;
///
/// let doc = Document::open("book.epub")?;
/// println!("{} by {}", doc.title()?, doc.authors()?.join(", "));
/// for section in doc.navigation()? {
///     println!("{:>3}. {}", section.reading_order, section.title.as_deref().unwrap_or("?"));
/// }
/// # Ok::<(), spindle::Error>(())
/// ```
pub struct Document {
    archive: Archive,
    package: OnceCell<Package>,
    metadata: OnceCell<Vec<MetadataRecord>>,
    manifest: OnceCell<Manifest>,
    sections: OnceCell<Vec<Section>>,
    navigation: OnceCell<Navigation>,
}

/// The located and parsed package document.
struct Package {
    path: PackagePath,
    root: Element,
}

struct Manifest {
    items: Vec<Arc<Item>>,
    index: ItemIndex,
}

impl Document {
    /// Open an `.epub` file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_archive(Archive::open(path)?))
    }

    /// Open an EPUB held in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Ok(Self::from_archive(Archive::from_bytes(bytes)?))
    }

    pub fn from_archive(archive: Archive) -> Self {
        Self {
            archive,
            package: OnceCell::new(),
            metadata: OnceCell::new(),
            manifest: OnceCell::new(),
            sections: OnceCell::new(),
            navigation: OnceCell::new(),
        }
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    // --- Views ---

    /// Location of the package document inside the archive.
    pub fn package_path(&self) -> Result<&PackagePath> {
        Ok(&self.package()?.path)
    }

    /// Metadata records in document order, refinements folded.
    pub fn metadata(&self) -> Result<&[MetadataRecord]> {
        self.metadata
            .get_or_try_init(|| -> Result<_> {
                let package = self.package()?;
                tracing::trace!("resolving metadata");
                Ok(package
                    .root
                    .child("metadata")
                    .map(build_metadata)
                    .unwrap_or_default())
            })
            .map(Vec::as_slice)
    }

    /// Manifest items in manifest order.
    pub fn items(&self) -> Result<&[Arc<Item>]> {
        Ok(&self.manifest()?.items)
    }

    /// Spine sections in reading order.
    pub fn sections(&self) -> Result<&[Section]> {
        self.sections
            .get_or_try_init(|| -> Result<_> {
                let manifest = self.manifest()?;
                tracing::trace!("resolving spine");
                Ok(self
                    .package()?
                    .root
                    .child("spine")
                    .map(|spine| build_spine(spine, &manifest.index))
                    .unwrap_or_default())
            })
            .map(Vec::as_slice)
    }

    /// The resolved table of contents.
    pub fn navigation(&self) -> Result<&[Section]> {
        Ok(&self.resolved_navigation()?.sections)
    }

    /// Which source the table of contents came from, `None` if it is empty.
    pub fn navigation_source(&self) -> Result<Option<NavSource>> {
        Ok(self.resolved_navigation()?.source)
    }

    // --- Convenience lookups ---

    /// The first `dc:title`, or an empty string.
    pub fn title(&self) -> Result<&str> {
        Ok(metadata::core_values(self.metadata()?, "title")
            .next()
            .unwrap_or(""))
    }

    /// Every `dc:creator`, in document order.
    pub fn authors(&self) -> Result<Vec<&str>> {
        Ok(metadata::core_values(self.metadata()?, "creator").collect())
    }

    /// The first `dc:language`.
    pub fn language(&self) -> Result<Option<&str>> {
        Ok(metadata::core_values(self.metadata()?, "language").next())
    }

    /// The `dc:identifier` named by `package@unique-identifier`, falling back
    /// to the first identifier.
    pub fn identifier(&self) -> Result<Option<&str>> {
        let unique = self.package()?.root.attr("unique-identifier");
        let metadata = self.metadata()?;
        let named = unique.and_then(|id| {
            metadata
                .iter()
                .find(|r| r.is_core("identifier") && r.id() == Some(id))
                .and_then(MetadataRecord::value)
        });
        Ok(named.or_else(|| metadata::core_values(metadata, "identifier").next()))
    }

    /// `package@version` (`"2.0"`, `"3.0"`, ...).
    pub fn version(&self) -> Result<Option<&str>> {
        Ok(self.package()?.root.attr("version"))
    }

    /// The cover image item: the item with `properties="cover-image"`, or
    /// the one named by an EPUB 2 `<meta name="cover">`.
    pub fn cover(&self) -> Result<Option<&Arc<Item>>> {
        let manifest = self.manifest()?;
        if let Some(item) = manifest.items.iter().find(|i| i.is_cover_image()) {
            return Ok(Some(item));
        }
        Ok(metadata::legacy_cover_id(self.metadata()?).and_then(|id| manifest.index.by_id(id)))
    }

    pub fn item_by_id(&self, id: &str) -> Result<Option<&Arc<Item>>> {
        Ok(self.manifest()?.index.by_id(id))
    }

    /// Look up an item by href, relative to the package base directory.
    pub fn item_by_href(&self, href: &str) -> Result<Option<&Arc<Item>>> {
        Ok(self.manifest()?.index.by_href(href))
    }

    /// The legacy NCX item, if the package has one.
    pub fn spine_toc(&self) -> Result<Option<&Arc<Item>>> {
        let ctx = self.nav_context()?;
        Ok(navigation::ncx_item(&ctx))
    }

    // --- Content ---

    /// Raw bytes of an item.
    ///
    /// An item whose file is missing from the archive yields
    /// [`Error::ResourceNotFound`].
    pub fn read_item(&self, item: &Item) -> Result<Vec<u8>> {
        let path = self.package()?.path.resolve(&item.href);
        self.archive.read(&path)
    }

    /// Text of an item, decoded from its declared or detected encoding.
    pub fn read_item_to_string(&self, item: &Item) -> Result<String> {
        Ok(decode_text(&self.read_item(item)?).into_owned())
    }

    /// Raw bytes of any archive entry by its full path.
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        self.archive.read(name)
    }

    // --- Internals ---

    fn package(&self) -> Result<&Package> {
        self.package.get_or_try_init(|| Package::load(&self.archive))
    }

    fn manifest(&self) -> Result<&Manifest> {
        self.manifest.get_or_try_init(|| -> Result<_> {
            let package = self.package()?;
            let metadata = self.metadata()?;
            tracing::trace!("resolving manifest");
            let items = match package.root.child("manifest") {
                Some(manifest) => build_manifest(manifest, metadata)?,
                None => Vec::new(),
            };
            let index = ItemIndex::new(&items);
            Ok(Manifest { items, index })
        })
    }

    fn resolved_navigation(&self) -> Result<&Navigation> {
        self.navigation.get_or_try_init(|| -> Result<_> {
            let ctx = self.nav_context()?;
            tracing::trace!("resolving navigation");
            Ok(navigation::resolve(&ctx))
        })
    }

    fn nav_context(&self) -> Result<NavContext<'_>> {
        let manifest = self.manifest()?;
        let spine = self.sections()?;
        Ok(NavContext {
            items: &manifest.items,
            index: &manifest.index,
            spine,
            spine_toc: self.package()?.root.child("spine").and_then(|s| s.attr("toc")),
            loader: self,
        })
    }
}

impl Package {
    fn load(archive: &Archive) -> Result<Self> {
        let path = container::locate_package(archive)?;
        let bytes = match archive.read(&path.full_path) {
            Ok(bytes) => bytes,
            Err(Error::ResourceNotFound(name)) => {
                return Err(Error::Format(format!("package document {} not found", name)));
            }
            Err(e) => return Err(e),
        };
        let root = xml::parse(&bytes)?;
        if root.local_name() != "package" {
            return Err(Error::format(format!(
                "expected <package> root in {}, found <{}>",
                path.full_path,
                root.local_name()
            )));
        }
        tracing::debug!(path = %path.full_path, "loaded package document");
        Ok(Self { path, root })
    }
}

impl ResourceLoader for Document {
    fn load(&self, item: &Item) -> Result<Vec<u8>> {
        self.read_item(item)
    }
}

/// Documents compare by their resolved metadata, items and sections. A view
/// that has not been computed on either side is left out of the comparison.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        fn same<T: PartialEq>(a: Option<&T>, b: Option<&T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        same(self.metadata.get(), other.metadata.get())
            && same(
                self.manifest.get().map(|m| &m.items),
                other.manifest.get().map(|m| &m.items),
            )
            && same(self.sections.get(), other.sections.get())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("archive", &self.archive)
            .field("package", &self.package.get().map(|p| &p.path))
            .field("metadata", &self.metadata.get().map(Vec::len))
            .field("items", &self.manifest.get().map(|m| m.items.len()))
            .field("sections", &self.sections.get().map(Vec::len))
            .field("navigation", &self.navigation.get().map(|n| n.sections.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Document>();
    }
}
