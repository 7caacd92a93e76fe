//! Writer for synthetic metadata images
//!
//! Builds byte images in the typescope metadata v1 layout. The string heap
//! and field table come first and the root header with its type table last,
//! so the image ends exactly where the type table does:
//!
//! ```text
//! base                                            root
//!  | string heap | pad | field table | pad | header | type table |
//! ```
//!
//! `build_module` additionally prefixes a module page holding the
//! little-endian directory RVA that `ModuleLocator` follows.

use super::layout::{
    header_size, FieldRow, TypeRow, FIELD_FLAG_HAS_VALUE, FIELD_FLAG_STATIC, FIELD_ROW_SIZE,
    HEADER_FIXED_SIZE, HEADER_FLAG_64BIT, MAGIC, NO_PARENT, TYPE_ROW_SIZE, VERSION,
};
use crate::core::types::{Address, PointerWidth, TypeKind};
use crate::memory::Endian;
use std::collections::HashMap;
use thiserror::Error;

/// Size of the module page placed before the metadata by `build_module`
pub const MODULE_PAGE_SIZE: u64 = 0x1000;

/// Error building an image
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ImageError {
    #[error("parent type {parent} of {child} is not part of the image")]
    UnknownParent { child: String, parent: String },

    #[error("image does not fit the target: {0}")]
    TooLarge(String),

    #[error("directory offset 0x{0:X} does not fit in the module page")]
    DirectoryOffset(u64),
}

#[derive(Debug, Clone)]
struct FieldSpec {
    name: String,
    type_name: Option<String>,
    offset: u32,
    flags: u32,
}

#[derive(Debug, Clone)]
enum ParentSpec {
    None,
    Named(String),
    Row(u32),
}

/// A type row to be written
#[derive(Debug, Clone)]
pub struct TypeSpec {
    kind: TypeKind,
    namespace: String,
    name: String,
    parent: ParentSpec,
    fields: Vec<FieldSpec>,
    raw_fields: Option<(u32, u32)>,
}

impl TypeSpec {
    pub fn new(kind: TypeKind, namespace: &str, name: &str) -> Self {
        TypeSpec {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            parent: ParentSpec::None,
            fields: Vec::new(),
            raw_fields: None,
        }
    }

    pub fn class(namespace: &str, name: &str) -> Self {
        Self::new(TypeKind::Class, namespace, name)
    }

    pub fn structure(namespace: &str, name: &str) -> Self {
        Self::new(TypeKind::Struct, namespace, name)
    }

    pub fn enumeration(namespace: &str, name: &str) -> Self {
        Self::new(TypeKind::Enum, namespace, name)
    }

    pub fn interface(namespace: &str, name: &str) -> Self {
        Self::new(TypeKind::Interface, namespace, name)
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    fn push_field(mut self, name: &str, type_name: &str, offset: u32, flags: u32) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            type_name: Some(type_name.to_string()).filter(|t| !t.is_empty()),
            offset,
            flags,
        });
        self
    }

    /// Instance field; an empty type name is written as unknown
    pub fn field(self, name: &str, type_name: &str, offset: u32) -> Self {
        self.push_field(name, type_name, offset, 0)
    }

    pub fn static_field(self, name: &str, type_name: &str, offset: u32) -> Self {
        self.push_field(name, type_name, offset, FIELD_FLAG_STATIC)
    }

    /// Static field with a constant value, such as an enum member
    pub fn constant(self, name: &str, type_name: &str) -> Self {
        self.push_field(name, type_name, 0, FIELD_FLAG_STATIC | FIELD_FLAG_HAS_VALUE)
    }

    /// Base type by full name; resolved to a row index at build time
    pub fn parent(mut self, full_name: &str) -> Self {
        self.parent = ParentSpec::Named(full_name.to_string());
        self
    }

    /// Base type by raw row index, unchecked
    pub fn parent_row(mut self, row: u32) -> Self {
        self.parent = ParentSpec::Row(row);
        self
    }

    /// Writes this field range instead of the type's own fields
    pub fn raw_fields(mut self, start: u32, count: u32) -> Self {
        self.raw_fields = Some((start, count));
        self
    }
}

/// A built image and where its pieces landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataImage {
    pub base: Address,
    pub root: Address,
    pub bytes: Vec<u8>,
}

impl MetadataImage {
    pub fn end(&self) -> Address {
        Address::new(self.base.as_u64() + self.bytes.len() as u64)
    }
}

/// Builder for metadata images
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    width: PointerWidth,
    endian: Endian,
    types: Vec<TypeSpec>,
    declared_type_count: Option<u32>,
    declared_field_count: Option<u32>,
    type_stride: u32,
    field_stride: u32,
}

impl ImageBuilder {
    pub fn new(width: PointerWidth) -> Self {
        ImageBuilder {
            width,
            endian: Endian::Little,
            types: Vec::new(),
            declared_type_count: None,
            declared_field_count: None,
            type_stride: TYPE_ROW_SIZE,
            field_stride: FIELD_ROW_SIZE,
        }
    }

    pub fn pointer_width(mut self, width: PointerWidth) -> Self {
        self.width = width;
        self
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn with_type(mut self, spec: TypeSpec) -> Self {
        self.types.push(spec);
        self
    }

    /// Row count written to the header, regardless of the rows present
    pub fn declared_type_count(mut self, count: u32) -> Self {
        self.declared_type_count = Some(count);
        self
    }

    /// Field row count written to the header, regardless of the rows present
    pub fn declared_field_count(mut self, count: u32) -> Self {
        self.declared_field_count = Some(count);
        self
    }

    /// Row strides; values below the fixed row sizes produce invalid images
    pub fn strides(mut self, type_stride: u32, field_stride: u32) -> Self {
        self.type_stride = type_stride;
        self.field_stride = field_stride;
        self
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Lay out the image starting at `base`
    pub fn build(&self, base: Address) -> Result<MetadataImage, ImageError> {
        let too_large = |what: &str| ImageError::TooLarge(what.to_string());

        let mut heap = StringHeap::default();
        let mut rows_by_name: HashMap<String, u32> = HashMap::new();
        for (i, spec) in self.types.iter().enumerate() {
            rows_by_name.entry(spec.full_name()).or_insert(i as u32);
        }

        // Field rows and type rows, with heap offsets
        let mut field_rows = Vec::new();
        let mut type_rows = Vec::new();
        for spec in &self.types {
            let field_start = u32::try_from(field_rows.len()).map_err(|_| too_large("fields"))?;
            for field in &spec.fields {
                field_rows.push(FieldRow {
                    name: heap.intern(&field.name)?,
                    type_name: match &field.type_name {
                        Some(t) => heap.intern(t)?,
                        None => 0,
                    },
                    offset: field.offset,
                    flags: field.flags,
                });
            }
            let (field_start, field_count) = spec
                .raw_fields
                .unwrap_or((field_start, spec.fields.len() as u32));

            let parent = match &spec.parent {
                ParentSpec::None => NO_PARENT,
                ParentSpec::Row(row) => *row,
                ParentSpec::Named(name) => {
                    *rows_by_name
                        .get(name)
                        .ok_or_else(|| ImageError::UnknownParent {
                            child: spec.full_name(),
                            parent: name.clone(),
                        })?
                }
            };

            type_rows.push(TypeRow {
                name: heap.intern(&spec.name)?,
                namespace: if spec.namespace.is_empty() {
                    0
                } else {
                    heap.intern(&spec.namespace)?
                },
                field_start,
                field_count,
                flags: spec.kind.to_flags(),
                parent,
            });
        }

        let mut bytes = heap.into_bytes();
        pad_to(&mut bytes, 8);
        let field_table = bytes.len() as u64;
        for row in &field_rows {
            let mut cell = vec![0u8; (self.field_stride.max(FIELD_ROW_SIZE)) as usize];
            row.write(&mut cell, self.endian);
            bytes.extend_from_slice(&cell[..self.field_stride as usize]);
        }
        pad_to(&mut bytes, 8);

        let root_offset = bytes.len() as u64;
        let ptr = self.width.bytes();
        let mut header = vec![0u8; header_size(self.width) as usize];
        let flags = match self.width {
            PointerWidth::Bits64 => HEADER_FLAG_64BIT,
            PointerWidth::Bits32 => 0,
        };
        let type_count = match self.declared_type_count {
            Some(count) => count,
            None => u32::try_from(type_rows.len()).map_err(|_| too_large("types"))?,
        };
        let field_count = match self.declared_field_count {
            Some(count) => count,
            None => u32::try_from(field_rows.len()).map_err(|_| too_large("fields"))?,
        };
        self.endian.write_u32(&mut header[0..], MAGIC);
        self.endian.write_u16(&mut header[4..], VERSION);
        self.endian.write_u16(&mut header[6..], flags);
        self.endian.write_u32(&mut header[8..], type_count);
        self.endian.write_u32(&mut header[12..], self.type_stride);
        self.endian.write_u32(&mut header[16..], field_count);
        self.endian.write_u32(&mut header[20..], self.field_stride);

        let heap_address = base;
        let field_address = base
            .checked_add(field_table)
            .ok_or_else(|| too_large("field table address"))?;
        let fixed = HEADER_FIXED_SIZE as usize;
        self.write_ptr(&mut header[fixed..], heap_address)?;
        self.write_ptr(&mut header[fixed + ptr..], field_address)?;
        bytes.extend_from_slice(&header);

        for row in &type_rows {
            let mut cell = vec![0u8; (self.type_stride.max(TYPE_ROW_SIZE)) as usize];
            row.write(&mut cell, self.endian);
            bytes.extend_from_slice(&cell[..self.type_stride as usize]);
        }

        let root = base
            .checked_add(root_offset)
            .ok_or_else(|| too_large("root address"))?;
        base.checked_add(bytes.len() as u64)
            .ok_or_else(|| too_large("image end"))?;

        Ok(MetadataImage { base, root, bytes })
    }

    /// Module page plus metadata, with the root RVA stored at `root_rva_offset`
    pub fn build_module(
        &self,
        base: Address,
        root_rva_offset: u64,
    ) -> Result<MetadataImage, ImageError> {
        if root_rva_offset + 4 > MODULE_PAGE_SIZE {
            return Err(ImageError::DirectoryOffset(root_rva_offset));
        }
        let metadata_base = base
            .checked_add(MODULE_PAGE_SIZE)
            .ok_or_else(|| ImageError::TooLarge("module base".to_string()))?;
        let metadata = self.build(metadata_base)?;

        let rva = u32::try_from(metadata.root.as_u64() - base.as_u64())
            .map_err(|_| ImageError::TooLarge("root RVA".to_string()))?;
        let mut bytes = vec![0u8; MODULE_PAGE_SIZE as usize];
        let slot = root_rva_offset as usize;
        Endian::Little.write_u32(&mut bytes[slot..slot + 4], rva);
        bytes.extend_from_slice(&metadata.bytes);

        Ok(MetadataImage {
            base,
            root: metadata.root,
            bytes,
        })
    }

    fn write_ptr(&self, buf: &mut [u8], address: Address) -> Result<(), ImageError> {
        match self.width {
            PointerWidth::Bits64 => self.endian.write_u64(buf, address.as_u64()),
            PointerWidth::Bits32 => {
                let value = u32::try_from(address.as_u64()).map_err(|_| {
                    ImageError::TooLarge(format!("{} is not a 32-bit address", address))
                })?;
                self.endian.write_u32(buf, value)
            }
        }
        Ok(())
    }
}

fn pad_to(bytes: &mut Vec<u8>, align: usize) {
    let rem = bytes.len() % align;
    if rem != 0 {
        bytes.resize(bytes.len() + align - rem, 0);
    }
}

/// Deduplicating string heap; offset 0 is reserved for "no string"
struct StringHeap {
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Default for StringHeap {
    fn default() -> Self {
        StringHeap {
            bytes: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl StringHeap {
    fn intern(&mut self, s: &str) -> Result<u32, ImageError> {
        if let Some(&offset) = self.offsets.get(s) {
            return Ok(offset);
        }
        let offset = u32::try_from(self.bytes.len())
            .map_err(|_| ImageError::TooLarge("string heap".to_string()))?;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(s.to_string(), offset);
        Ok(offset)
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
