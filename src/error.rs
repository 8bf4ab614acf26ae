//! Error types for spindle operations.

use thiserror::Error;

/// Errors that can occur while resolving an EPUB.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A required file or attribute is missing and no fallback exists.
    #[error("Invalid EPUB: {0}")]
    Format(String),

    /// The package document contradicts itself (e.g. a media overlay
    /// pointing at an undeclared manifest id).
    #[error("Inconsistent package document: {0}")]
    Inconsistent(String),

    /// A declared resource is not present in the archive.
    #[error("Resource not found in archive: {0}")]
    ResourceNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
