//! Random access to the entries of an in-memory EPUB (ZIP) container.

use std::fmt;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Error, Result};

/// An opened ZIP container.
///
/// The raw bytes are shared behind an `Arc`, so every read works on a cheap
/// clone of the archive handle and `&self` access is enough. This keeps the
/// type `Send + Sync` without a lock.
#[derive(Clone)]
pub struct Archive {
    zip: ZipArchive<Cursor<Arc<[u8]>>>,
}

impl Archive {
    /// Open an archive from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let data: Arc<[u8]> = Arc::from(bytes.into());
        let zip = ZipArchive::new(Cursor::new(data))?;
        tracing::trace!(entries = zip.len(), "opened archive");
        Ok(Self { zip })
    }

    /// Read an `.epub` file from disk.
    ///
    /// Paths without an `.epub` extension are rejected before any I/O.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_epub = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"));
        if !is_epub {
            return Err(Error::UnsupportedFormat(format!(
                "expected an .epub file, got {}",
                path.display()
            )));
        }
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    /// Entry names in central-directory order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.zip.file_names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.zip.index_for_name(name).is_some()
    }

    /// Read and decompress an entry.
    ///
    /// A missing entry is reported as [`Error::ResourceNotFound`], distinct
    /// from a corrupt archive.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let mut zip = self.zip.clone();
        let mut file = match zip.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(Error::ResourceNotFound(name.to_string())),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("entries", &self.zip.len())
            .finish()
    }
}
