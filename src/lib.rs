//! # metaimage
//!
//! Reader/writer for the MetaImage medical image container format
//! (`.mha`/`.mhd`), as produced by ITK-based tools.
//!
//! A MetaImage file is a plain-text header of typed `tag = value` lines
//! followed by a raw binary payload, stored either inline after the header
//! (`.mha`) or in a sibling `.raw`/`.zraw` file (`.mhd`). This crate
//! round-trips that container byte-, type- and shape-faithfully between
//! disk and a dynamically typed [`ndarray`] value; it does not interpret
//! pixel semantics.
//!
//! ## Architecture
//!
//! The library is organized leaf-first:
//!
//! - [`element`] - element kinds and their on-disk tokens
//! - [`data`] - dynamically typed N-d pixel array and the byte-level codec
//! - [`tags`] - the tag schema: traits, arities, aliases, the registry
//! - [`collection`] - validated, registry-ordered tag collections
//! - [`image`] - the container coupling one array with one tag collection
//! - [`codec`] - file loading and saving, compression, storage layout
//! - [`error`] - the error taxonomy
//!
//! ## Example
//!
//! ```rust,no_run
//! use metaimage::{read, write, ImageData, RawTags};
//! use ndarray::Array3;
//!
//! fn main() -> Result<(), metaimage::MetaImageError> {
//!     let volume = ImageData::from(Array3::<u16>::zeros((10, 20, 30)));
//!     write("volume.mha", volume, RawTags::new())?;
//!
//!     let (data, tags) = read("volume.mha")?;
//!     assert_eq!(data.shape(), &[10, 20, 30]);
//!     assert_eq!(tags.get_int("NDims"), Some(3));
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod collection;
pub mod data;
pub mod element;
pub mod error;
pub mod image;
pub mod tags;

// Re-export commonly used types
pub use codec::{read, write, FILE_EXTENSIONS, LOCAL_DATA};
pub use collection::{MetaTags, RawTags};
pub use data::ImageData;
pub use element::ElementType;
pub use error::{MetaImageError, TagError};
pub use image::MetaImage;
pub use tags::{resolve, Arity, TagKind, TagTrait, TagValue, TAG_TRAITS};
