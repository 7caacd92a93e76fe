//! Metadata layer
//!
//! Locates the metadata root inside a module of the target and decodes the
//! type tables found there into `TypeDefinition`s, one row at a time.

pub mod decoder;
pub mod image;
pub mod layout;
pub mod locator;

pub use decoder::{decode, DecodeOptions, DecodedType, TypeRows};
pub use image::{ImageBuilder, ImageError, MetadataImage, TypeSpec, MODULE_PAGE_SIZE};
pub use layout::RootHeader;
pub use locator::ModuleLocator;
