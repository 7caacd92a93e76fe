//! Typed reads in the target's byte order and pointer width

use super::source::{MemoryRegion, MemorySource};
use crate::core::types::{Address, MemoryError, MemoryResult, PointerWidth};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Chunk size for NUL-terminated string reads; chunks never cross a
/// boundary aligned to this size, so a string ending before an unmapped
/// page never triggers a read of that page.
const STRING_CHUNK: u64 = 64;

/// Byte order of the target process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn read_u16(&self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    pub fn read_u32(&self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    pub fn read_u64(&self, buf: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(buf),
            Endian::Big => BigEndian::read_u64(buf),
        }
    }

    pub fn write_u16(&self, buf: &mut [u8], value: u16) {
        match self {
            Endian::Little => LittleEndian::write_u16(buf, value),
            Endian::Big => BigEndian::write_u16(buf, value),
        }
    }

    pub fn write_u32(&self, buf: &mut [u8], value: u32) {
        match self {
            Endian::Little => LittleEndian::write_u32(buf, value),
            Endian::Big => BigEndian::write_u32(buf, value),
        }
    }

    pub fn write_u64(&self, buf: &mut [u8], value: u64) {
        match self {
            Endian::Little => LittleEndian::write_u64(buf, value),
            Endian::Big => BigEndian::write_u64(buf, value),
        }
    }

    /// Reads a pointer of the given width from the start of `buf`
    pub fn read_ptr(&self, buf: &[u8], width: PointerWidth) -> Address {
        match width {
            PointerWidth::Bits32 => Address::from(self.read_u32(buf)),
            PointerWidth::Bits64 => Address::new(self.read_u64(buf)),
        }
    }
}

/// Typed reader over a memory source
pub struct TargetReader<'a> {
    source: &'a dyn MemorySource,
    endian: Endian,
    width: PointerWidth,
    max_read_size: usize,
}

impl<'a> TargetReader<'a> {
    /// Create a new reader
    pub fn new(source: &'a dyn MemorySource, endian: Endian, width: PointerWidth) -> Self {
        TargetReader {
            source,
            endian,
            width,
            max_read_size: usize::MAX,
        }
    }

    /// Rejects single reads larger than `limit` bytes
    pub fn with_max_read_size(mut self, limit: usize) -> Self {
        self.max_read_size = limit;
        self
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn pointer_width(&self) -> PointerWidth {
        self.width
    }

    /// Read raw bytes, failing unless exactly `len` bytes come back
    pub fn read_bytes(&self, address: Address, len: usize) -> MemoryResult<Vec<u8>> {
        if len > self.max_read_size {
            return Err(MemoryError::ReadTooLarge {
                requested: len,
                limit: self.max_read_size,
            });
        }
        let bytes = self.source.read(MemoryRegion::new(address, len))?;
        if bytes.len() != len {
            return Err(MemoryError::partial_read(address, len, bytes.len()));
        }
        Ok(bytes)
    }

    pub fn read_u16(&self, address: Address) -> MemoryResult<u16> {
        let bytes = self.read_bytes(address, 2)?;
        Ok(self.endian.read_u16(&bytes))
    }

    pub fn read_u32(&self, address: Address) -> MemoryResult<u32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(self.endian.read_u32(&bytes))
    }

    pub fn read_u64(&self, address: Address) -> MemoryResult<u64> {
        let bytes = self.read_bytes(address, 8)?;
        Ok(self.endian.read_u64(&bytes))
    }

    /// Read a target-width pointer
    pub fn read_ptr(&self, address: Address) -> MemoryResult<Address> {
        let bytes = self.read_bytes(address, self.width.bytes())?;
        Ok(self.endian.read_ptr(&bytes, self.width))
    }

    /// Read a NUL-terminated byte string of at most `max_len` bytes.
    ///
    /// Returns the bytes before the terminator and whether a terminator was
    /// found within `max_len`. Reads proceed in aligned chunks; if a chunk is
    /// unreadable the chunk is retried byte by byte so a string that ends
    /// right before an unmapped range still decodes.
    pub fn read_c_bytes(&self, address: Address, max_len: usize) -> MemoryResult<(Vec<u8>, bool)> {
        let mut out = Vec::new();
        let mut cursor = address;

        while out.len() < max_len {
            let to_boundary = STRING_CHUNK - (cursor.as_u64() % STRING_CHUNK);
            let want = (to_boundary as usize).min(max_len - out.len());

            match self.source.read(MemoryRegion::new(cursor, want)) {
                Ok(chunk) if chunk.len() == want => {
                    if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                        out.extend_from_slice(&chunk[..nul]);
                        return Ok((out, true));
                    }
                    out.extend_from_slice(&chunk);
                }
                Ok(chunk) => return Err(MemoryError::partial_read(cursor, want, chunk.len())),
                Err(chunk_err) => {
                    for i in 0..want as u64 {
                        let at = cursor.offset(i)?;
                        let byte = match self.source.read(MemoryRegion::new(at, 1)) {
                            Ok(b) if b.len() == 1 => b[0],
                            _ => return Err(chunk_err),
                        };
                        if byte == 0 {
                            return Ok((out, true));
                        }
                        out.push(byte);
                    }
                }
            }
            cursor = cursor.offset(want as u64)?;
        }

        Ok((out, false))
    }
}
