//! Little-endian byte cursor and the matching `put_*` writers.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, FormatKind, Result};

/// Bounds-checked reader over an in-memory chart image.
///
/// Every failure is reported as a `Format` error carrying the absolute
/// offset of the read that failed and the opcode being decoded, if any.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    cur: Cursor<&'a [u8]>,
    opcode: Option<u8>,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cur: Cursor::new(data),
            opcode: None,
        }
    }

    /// A reader over `data` whose cursor starts at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        let mut reader = Self::new(data);
        reader.cur.set_position(pos as u64);
        reader
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.cur.position() as usize
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.cur.get_ref().len().saturating_sub(self.offset())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn opcode(&self) -> Option<u8> {
        self.opcode
    }

    pub fn set_opcode(&mut self, opcode: Option<u8>) {
        self.opcode = opcode;
    }

    pub fn error(&self, kind: FormatKind) -> Error {
        self.error_at(self.offset(), kind)
    }

    pub fn error_at(&self, offset: usize, kind: FormatKind) -> Error {
        Error::format(self.opcode, offset, kind)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let at = self.offset();
        self.cur
            .read_u8()
            .map_err(|_| self.error_at(at, FormatKind::Truncated))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let at = self.offset();
        self.cur
            .read_u32::<LittleEndian>()
            .map_err(|_| self.error_at(at, FormatKind::Truncated))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let at = self.offset();
        self.cur
            .read_i32::<LittleEndian>()
            .map_err(|_| self.error_at(at, FormatKind::Truncated))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let at = self.offset();
        self.cur
            .read_f64::<LittleEndian>()
            .map_err(|_| self.error_at(at, FormatKind::Truncated))
    }

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.error(FormatKind::Truncated));
        }
        let start = self.offset();
        let data: &'a [u8] = *self.cur.get_ref();
        self.cur.set_position((start + len) as u64);
        Ok(&data[start..start + len])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let at = self.offset();
        let mut buf = [0u8; N];
        self.cur
            .read_exact(&mut buf)
            .map_err(|_| self.error_at(at, FormatKind::Truncated))?;
        Ok(buf)
    }

    /// Split off the next `len` bytes as a reader of their own.
    ///
    /// The sub-reader shares absolute offsets with its parent, so errors
    /// raised inside it still point into the whole image.
    pub fn sub_reader(&mut self, len: usize) -> Result<ByteReader<'a>> {
        let start = self.offset();
        let bytes = self.read_bytes(len)?;
        let data: &'a [u8] = *self.cur.get_ref();
        let mut sub = ByteReader::at(&data[..start + bytes.len()], start);
        sub.opcode = self.opcode;
        Ok(sub)
    }
}

#[inline]
pub fn put_u8(value: u8, buffer: &mut Vec<u8>) {
    buffer.push(value);
}

#[inline]
pub fn put_u32_le(value: u32, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_i32_le(value: i32, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_f64_le(value: f64, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

/// Length-prefixed byte string (`u32` length, no terminator).
#[inline]
pub fn put_blob(bytes: &[u8], buffer: &mut Vec<u8>) {
    put_u32_le(bytes.len() as u32, buffer);
    buffer.extend_from_slice(bytes);
}
