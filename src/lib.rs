//! # spindle
//!
//! Resolve an EPUB container into a navigable document model: metadata,
//! manifest items, spine order and table of contents.
//!
//! ## Features
//!
//! - EPUB 2 and EPUB 3 package documents
//! - Metadata refinements (`<meta refines="#id">`) folded into their targets
//! - Manifest `properties` flags and media overlays
//! - Table of contents from the navigation document, the NCX, or the spine,
//!   in that order of preference
//! - Lazy, cached views that are safe to share across threads
//!
//! ## Quick Start
//!
//! ```no_run
//! use spindle::Document;
//!
//! let doc = Document::open("input.epub")?;
//! println!("Title: {}", doc.title()?);
//!
//! for section in doc.navigation()? {
//!     let indent = if section.sub_section { "    " } else { "" };
//!     println!("{indent}{}", section.title.as_deref().unwrap_or(&section.content.href));
//! }
//!
//! if let Some(cover) = doc.cover()? {
//!     let bytes = doc.read_item(cover)?;
//!     println!("cover: {} ({} bytes)", cover.media_type, bytes.len());
//! }
//! # Ok::<(), spindle::Error>(())
//! ```

pub mod archive;
pub mod container;
pub mod document;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod navigation;
pub mod path;
pub mod spine;
pub(crate) mod util;
pub mod xml;

pub use archive::Archive;
pub use container::PackagePath;
pub use document::Document;
pub use error::{Error, Result};
pub use manifest::{Item, MediaType, Property};
pub use metadata::{CoreRecord, ExtendedRecord, MetadataRecord};
pub use navigation::{NavSource, Navigation};
pub use spine::Section;
