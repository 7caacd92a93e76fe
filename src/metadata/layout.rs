//! Binary layout of the typescope metadata v1 tables
//!
//! ```text
//! root header
//!   +0   magic        u32   "TYMD"; its byte order is the table byte order
//!   +4   version      u16
//!   +6   flags        u16   bit 0: 64-bit pointers
//!   +8   type_count   u32
//!   +12  type_stride  u32
//!   +16  field_count  u32
//!   +20  field_stride u32
//!   +24  string_heap  ptr
//!   +24+P field_table ptr
//! type table   root + header_size, type_count rows of type_stride bytes
//! field table  field_table, field_count rows of field_stride bytes
//! string heap  NUL-terminated UTF-8, addressed by u32 offsets
//! ```
//!
//! Strides may exceed the fixed row sizes; trailing bytes are ignored.

use crate::core::types::{Address, DecodeError, MemoryResult, PointerWidth};
use crate::memory::{Endian, MemorySource, TargetReader};

/// "TYMD" read as a u32 in the table's own byte order
pub const MAGIC: u32 = 0x444D_5954;
pub const VERSION: u16 = 1;

pub const HEADER_FLAG_64BIT: u16 = 0x1;

/// Bytes of the header before the two pointers
pub const HEADER_FIXED_SIZE: u64 = 24;
pub const TYPE_ROW_SIZE: u32 = 24;
pub const FIELD_ROW_SIZE: u32 = 16;

/// Parent column value for types without a base type
pub const NO_PARENT: u32 = u32::MAX;

pub const FIELD_FLAG_STATIC: u32 = 0x1;
pub const FIELD_FLAG_HAS_VALUE: u32 = 0x2;

/// Header size for the given pointer width
pub const fn header_size(width: PointerWidth) -> u64 {
    HEADER_FIXED_SIZE + 2 * width.bytes() as u64
}

/// Byte order of a table, from the first four bytes at its root
pub fn detect_endian(magic: &[u8]) -> Option<Endian> {
    if magic.len() < 4 {
        return None;
    }
    if Endian::Little.read_u32(magic) == MAGIC {
        Some(Endian::Little)
    } else if Endian::Big.read_u32(magic) == MAGIC {
        Some(Endian::Big)
    } else {
        None
    }
}

/// Cheap check used by the module locator; reads only the magic
pub fn has_magic(source: &dyn MemorySource, root: Address) -> MemoryResult<bool> {
    let reader = TargetReader::new(source, Endian::Little, PointerWidth::Bits64);
    let bytes = reader.read_bytes(root, 4)?;
    Ok(detect_endian(&bytes).is_some())
}

/// Decoded root header with the derived table addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootHeader {
    pub root: Address,
    pub endian: Endian,
    pub pointer_width: PointerWidth,
    pub version: u16,
    pub flags: u16,
    pub type_count: u32,
    pub type_stride: u32,
    pub field_count: u32,
    pub field_stride: u32,
    pub string_heap: Address,
    pub field_table: Address,
    pub type_table: Address,
}

impl RootHeader {
    /// Read and validate the header at `root`.
    ///
    /// Every failure here is fatal to a scan: without a trustworthy header
    /// there is no row count to make progress against.
    pub fn read(
        source: &dyn MemorySource,
        root: Address,
        max_type_rows: u32,
        max_field_rows: u32,
    ) -> Result<Self, DecodeError> {
        let fixed_reader = TargetReader::new(source, Endian::Little, PointerWidth::Bits64);
        let fixed = fixed_reader.read_bytes(root, HEADER_FIXED_SIZE as usize)?;

        let endian = detect_endian(&fixed).ok_or_else(|| {
            DecodeError::malformed(format!(
                "bad metadata magic 0x{:08X} at {}",
                Endian::Little.read_u32(&fixed),
                root
            ))
        })?;

        let version = endian.read_u16(&fixed[4..]);
        if version != VERSION {
            return Err(DecodeError::malformed(format!(
                "unsupported metadata version {} (expected {})",
                version, VERSION
            )));
        }

        let flags = endian.read_u16(&fixed[6..]);
        let pointer_width = if flags & HEADER_FLAG_64BIT != 0 {
            PointerWidth::Bits64
        } else {
            PointerWidth::Bits32
        };

        let type_count = endian.read_u32(&fixed[8..]);
        let type_stride = endian.read_u32(&fixed[12..]);
        let field_count = endian.read_u32(&fixed[16..]);
        let field_stride = endian.read_u32(&fixed[20..]);

        if type_stride < TYPE_ROW_SIZE {
            return Err(DecodeError::malformed(format!(
                "type stride {} is below the {} byte row size",
                type_stride, TYPE_ROW_SIZE
            )));
        }
        if field_stride < FIELD_ROW_SIZE {
            return Err(DecodeError::malformed(format!(
                "field stride {} is below the {} byte row size",
                field_stride, FIELD_ROW_SIZE
            )));
        }
        if type_count > max_type_rows {
            return Err(DecodeError::malformed(format!(
                "type count {} exceeds the limit of {} rows",
                type_count, max_type_rows
            )));
        }
        if field_count > max_field_rows {
            return Err(DecodeError::malformed(format!(
                "field count {} exceeds the limit of {} rows",
                field_count, max_field_rows
            )));
        }

        let reader = TargetReader::new(source, endian, pointer_width);
        let string_heap = reader.read_ptr(root.offset(HEADER_FIXED_SIZE)?)?;
        let field_table =
            reader.read_ptr(root.offset(HEADER_FIXED_SIZE + pointer_width.bytes() as u64)?)?;
        let type_table = root.offset(header_size(pointer_width))?;

        // Both tables must fit in the address space
        table_end(type_table, type_count, type_stride)?;
        table_end(field_table, field_count, field_stride)?;

        Ok(RootHeader {
            root,
            endian,
            pointer_width,
            version,
            flags,
            type_count,
            type_stride,
            field_count,
            field_stride,
            string_heap,
            field_table,
            type_table,
        })
    }

    pub fn type_row_address(&self, index: u32) -> Result<Address, DecodeError> {
        row_address(self.type_table, index, self.type_stride)
    }

    pub fn field_row_address(&self, index: u32) -> Result<Address, DecodeError> {
        row_address(self.field_table, index, self.field_stride)
    }

    pub fn string_address(&self, offset: u32) -> Result<Address, DecodeError> {
        Ok(self.string_heap.offset(u64::from(offset))?)
    }
}

fn row_address(table: Address, index: u32, stride: u32) -> Result<Address, DecodeError> {
    Ok(table.offset(u64::from(index) * u64::from(stride))?)
}

fn table_end(table: Address, count: u32, stride: u32) -> Result<Address, DecodeError> {
    table
        .checked_add(u64::from(count) * u64::from(stride))
        .ok_or_else(|| {
            DecodeError::malformed(format!(
                "table at {} with {} rows of {} bytes overflows the address space",
                table, count, stride
            ))
        })
}

/// Fixed columns of a type row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRow {
    pub name: u32,
    pub namespace: u32,
    pub field_start: u32,
    pub field_count: u32,
    pub flags: u32,
    pub parent: u32,
}

impl TypeRow {
    pub fn parse(bytes: &[u8], endian: Endian) -> Self {
        TypeRow {
            name: endian.read_u32(&bytes[0..]),
            namespace: endian.read_u32(&bytes[4..]),
            field_start: endian.read_u32(&bytes[8..]),
            field_count: endian.read_u32(&bytes[12..]),
            flags: endian.read_u32(&bytes[16..]),
            parent: endian.read_u32(&bytes[20..]),
        }
    }

    pub fn write(&self, bytes: &mut [u8], endian: Endian) {
        endian.write_u32(&mut bytes[0..], self.name);
        endian.write_u32(&mut bytes[4..], self.namespace);
        endian.write_u32(&mut bytes[8..], self.field_start);
        endian.write_u32(&mut bytes[12..], self.field_count);
        endian.write_u32(&mut bytes[16..], self.flags);
        endian.write_u32(&mut bytes[20..], self.parent);
    }
}

/// Fixed columns of a field row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRow {
    pub name: u32,
    pub type_name: u32,
    pub offset: u32,
    pub flags: u32,
}

impl FieldRow {
    pub fn parse(bytes: &[u8], endian: Endian) -> Self {
        FieldRow {
            name: endian.read_u32(&bytes[0..]),
            type_name: endian.read_u32(&bytes[4..]),
            offset: endian.read_u32(&bytes[8..]),
            flags: endian.read_u32(&bytes[12..]),
        }
    }

    pub fn write(&self, bytes: &mut [u8], endian: Endian) {
        endian.write_u32(&mut bytes[0..], self.name);
        endian.write_u32(&mut bytes[4..], self.type_name);
        endian.write_u32(&mut bytes[8..], self.offset);
        endian.write_u32(&mut bytes[12..], self.flags);
    }

    pub fn is_static(&self) -> bool {
        self.flags & FIELD_FLAG_STATIC != 0
    }

    pub fn has_value(&self) -> bool {
        self.flags & FIELD_FLAG_HAS_VALUE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BufferSource;

    #[test]
    fn test_detect_endian() {
        assert_eq!(detect_endian(b"TYMD"), Some(Endian::Little));
        assert_eq!(detect_endian(b"DMYT"), Some(Endian::Big));
        assert_eq!(detect_endian(b"MZ\x90\x00"), None);
        assert_eq!(detect_endian(b"TY"), None);
    }

    #[test]
    fn test_header_size() {
        assert_eq!(header_size(PointerWidth::Bits32), 32);
        assert_eq!(header_size(PointerWidth::Bits64), 40);
    }

    fn header_bytes(endian: Endian, stride: u32, count: u32) -> Vec<u8> {
        header_with_fields(endian, stride, count, 0)
    }

    fn header_with_fields(endian: Endian, stride: u32, count: u32, fields: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; 40];
        endian.write_u32(&mut bytes[0..], MAGIC);
        endian.write_u16(&mut bytes[4..], VERSION);
        endian.write_u16(&mut bytes[6..], HEADER_FLAG_64BIT);
        endian.write_u32(&mut bytes[8..], count);
        endian.write_u32(&mut bytes[12..], stride);
        endian.write_u32(&mut bytes[16..], fields);
        endian.write_u32(&mut bytes[20..], FIELD_ROW_SIZE);
        endian.write_u64(&mut bytes[24..], 0x9000);
        endian.write_u64(&mut bytes[32..], 0xA000);
        bytes
    }

    #[test]
    fn test_read_big_endian_header() {
        let source =
            BufferSource::with_segment(Address::new(0x1000), header_bytes(Endian::Big, 32, 5));
        let header = RootHeader::read(&source, Address::new(0x1000), 100, 100).unwrap();
        assert_eq!(header.endian, Endian::Big);
        assert_eq!(header.pointer_width, PointerWidth::Bits64);
        assert_eq!(header.type_count, 5);
        assert_eq!(header.string_heap, Address::new(0x9000));
        assert_eq!(header.field_table, Address::new(0xA000));
        assert_eq!(header.type_table, Address::new(0x1028));
        assert_eq!(
            header.type_row_address(2).unwrap(),
            Address::new(0x1028 + 64)
        );
    }

    #[test]
    fn test_header_validation() {
        let small_stride =
            BufferSource::with_segment(Address::new(0), header_bytes(Endian::Little, 8, 1));
        assert!(matches!(
            RootHeader::read(&small_stride, Address::new(0), 100, 100),
            Err(DecodeError::Malformed(_))
        ));

        let too_many =
            BufferSource::with_segment(Address::new(0), header_bytes(Endian::Little, 24, 101));
        assert!(matches!(
            RootHeader::read(&too_many, Address::new(0), 100, 100),
            Err(DecodeError::Malformed(_))
        ));

        let huge_fields = BufferSource::with_segment(
            Address::new(0),
            header_with_fields(Endian::Little, 24, 1, u32::MAX),
        );
        let err = RootHeader::read(&huge_fields, Address::new(0), 100, 100).unwrap_err();
        assert!(err.to_string().contains("field count 4294967295 exceeds"));

        let mut bad_version = header_bytes(Endian::Little, 24, 1);
        bad_version[4] = 9;
        let source = BufferSource::with_segment(Address::new(0), bad_version);
        assert!(RootHeader::read(&source, Address::new(0), 100, 100).is_err());
    }

    #[test]
    fn test_unreadable_header_is_memory_error() {
        let source = BufferSource::new();
        let err = RootHeader::read(&source, Address::new(0x1000), 100, 100).unwrap_err();
        assert!(err.is_memory_error());
    }

    #[test]
    fn test_row_columns() {
        let row = TypeRow {
            name: 1,
            namespace: 2,
            field_start: 3,
            field_count: 4,
            flags: 5,
            parent: NO_PARENT,
        };
        let mut bytes = [0u8; TYPE_ROW_SIZE as usize];
        row.write(&mut bytes, Endian::Big);
        assert_eq!(TypeRow::parse(&bytes, Endian::Big), row);

        let field = FieldRow {
            name: 1,
            type_name: 0,
            offset: 0x18,
            flags: FIELD_FLAG_STATIC | FIELD_FLAG_HAS_VALUE,
        };
        assert!(field.is_static());
        assert!(field.has_value());
    }
}
