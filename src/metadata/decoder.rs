//! Streaming decoder for metadata type tables
//!
//! `decode` validates the root header and returns `TypeRows`, a lazy
//! iterator that reads one type row per step. Row failures are reported as
//! `RowError` items and never end the iteration early.

use super::layout::{FieldRow, RootHeader, TypeRow, FIELD_ROW_SIZE, NO_PARENT, TYPE_ROW_SIZE};
use crate::config::Config;
use crate::core::types::{
    Address, DecodeError, FieldDefinition, PointerWidth, RowError, TypeDefinition, TypeKind,
};
use crate::memory::{MemorySource, TargetReader};
use std::iter::FusedIterator;

/// Upper bound on field storage reserved before any field row is read
const FIELD_PREALLOC: usize = 64;

/// Limits applied while decoding
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Headers declaring more rows are rejected
    pub max_type_rows: u32,
    /// Headers declaring more field rows are rejected
    pub max_field_rows: u32,
    /// Longest string read from the heap, terminator excluded
    pub max_name_length: usize,
    /// Largest single read
    pub max_read_size: usize,
    /// Recorded on every decoded type
    pub source_module: String,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::from_config(&Config::default(), "")
    }
}

impl DecodeOptions {
    pub fn from_config(config: &Config, source_module: impl Into<String>) -> Self {
        DecodeOptions {
            max_type_rows: config.scan.max_type_rows,
            max_field_rows: config.scan.max_field_rows,
            max_name_length: config.metadata.max_name_length,
            max_read_size: config.memory.max_read_size,
            source_module: source_module.into(),
        }
    }
}

/// One successfully decoded type row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedType {
    pub row_index: u32,
    /// Parent is not yet resolved; see `parent_row`
    pub definition: TypeDefinition,
    /// Row index of the base type, resolved to a name once all rows are read
    pub parent_row: Option<u32>,
}

/// Validate the header at `root` and prepare to stream its type rows.
///
/// Only the header is read here. Calling `decode` again starts over and
/// re-reads target memory.
pub fn decode<'a>(
    source: &'a dyn MemorySource,
    root: Address,
    options: &DecodeOptions,
) -> Result<TypeRows<'a>, DecodeError> {
    let header = RootHeader::read(
        source,
        root,
        options.max_type_rows,
        options.max_field_rows,
    )?;
    let reader = TargetReader::new(source, header.endian, header.pointer_width)
        .with_max_read_size(options.max_read_size);
    Ok(TypeRows {
        reader,
        header,
        options: options.clone(),
        next: 0,
    })
}

/// Lazy, finite, non-restartable sequence of decoded type rows
pub struct TypeRows<'a> {
    reader: TargetReader<'a>,
    header: RootHeader,
    options: DecodeOptions,
    next: u32,
}

impl<'a> TypeRows<'a> {
    /// Number of rows the header declares
    pub fn total(&self) -> u32 {
        self.header.type_count
    }

    /// Rows consumed so far
    pub fn position(&self) -> u32 {
        self.next
    }

    pub fn header(&self) -> &RootHeader {
        &self.header
    }

    pub fn pointer_width(&self) -> PointerWidth {
        self.header.pointer_width
    }

    fn decode_row(&self, index: u32) -> Result<DecodedType, DecodeError> {
        let address = self.header.type_row_address(index)?;
        let bytes = self.reader.read_bytes(address, TYPE_ROW_SIZE as usize)?;
        let row = TypeRow::parse(&bytes, self.header.endian);

        if row.name == 0 {
            return Err(DecodeError::malformed("type name offset is zero"));
        }
        let name = self.read_string(row.name)?;
        if name.is_empty() {
            return Err(DecodeError::malformed("type name is empty"));
        }
        let namespace = match row.namespace {
            0 => None,
            offset => Some(self.read_string(offset)?),
        };

        let field_end = row.field_start.checked_add(row.field_count).ok_or_else(|| {
            DecodeError::malformed(format!(
                "field range {} + {} overflows",
                row.field_start, row.field_count
            ))
        })?;
        if field_end > self.header.field_count {
            return Err(DecodeError::malformed(format!(
                "field range {}..{} exceeds the field table of {} rows",
                row.field_start, field_end, self.header.field_count
            )));
        }

        let parent_row = match row.parent {
            NO_PARENT => None,
            parent if parent >= self.header.type_count => {
                return Err(DecodeError::malformed(format!(
                    "parent row {} is outside the type table of {} rows",
                    parent, self.header.type_count
                )));
            }
            parent => Some(parent),
        };

        let definition = TypeDefinition::new(
            namespace,
            name,
            TypeKind::from_flags(row.flags),
            self.options.source_module.clone(),
        );

        let mut fields = Vec::with_capacity((row.field_count as usize).min(FIELD_PREALLOC));
        for field_index in row.field_start..field_end {
            let field = self
                .decode_field(field_index, definition.full_name())
                .map_err(|e| DecodeError::in_field(field_index, e))?;
            fields.push(field);
        }

        Ok(DecodedType {
            row_index: index,
            definition: definition.with_fields(fields),
            parent_row,
        })
    }

    fn decode_field(
        &self,
        index: u32,
        declaring_type: &str,
    ) -> Result<FieldDefinition, DecodeError> {
        let address = self.header.field_row_address(index)?;
        let bytes = self.reader.read_bytes(address, FIELD_ROW_SIZE as usize)?;
        let row = FieldRow::parse(&bytes, self.header.endian);

        if row.name == 0 {
            return Err(DecodeError::malformed("field name offset is zero"));
        }
        let name = self.read_string(row.name)?;
        if name.is_empty() {
            return Err(DecodeError::malformed("field name is empty"));
        }
        let field_type = match row.type_name {
            0 => None,
            offset => Some(self.read_string(offset)?).filter(|t| !t.is_empty()),
        };

        Ok(
            FieldDefinition::new(name, declaring_type.to_string(), u64::from(row.offset))
                .with_field_type(field_type)
                .with_flags(row.is_static(), row.has_value()),
        )
    }

    fn read_string(&self, offset: u32) -> Result<String, DecodeError> {
        let address = self.header.string_address(offset)?;
        let (bytes, terminated) = self
            .reader
            .read_c_bytes(address, self.options.max_name_length)?;
        if !terminated {
            return Err(DecodeError::malformed(format!(
                "string at heap offset 0x{:X} exceeds {} bytes",
                offset, self.options.max_name_length
            )));
        }
        String::from_utf8(bytes).map_err(|_| {
            DecodeError::malformed(format!("string at heap offset 0x{:X} is not UTF-8", offset))
        })
    }
}

impl<'a> Iterator for TypeRows<'a> {
    type Item = Result<DecodedType, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.header.type_count {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.decode_row(index).map_err(|e| RowError::new(index, e)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.header.type_count - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for TypeRows<'a> {}

impl<'a> FusedIterator for TypeRows<'a> {}
