//! Bounds-checked payload serialization.
//!
//! All multi-byte values are little-endian. Strings are written as their utf-8 bytes followed
//! by a NUL terminator.

use std::io::Cursor;

use ackwire_core::error::{DecodingErrorKind, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Appends values to an owned byte buffer.
#[derive(Debug, Default, Clone)]
pub struct PayloadWriter {
    buffer: Vec<u8>,
}

impl PayloadWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    /// Writes a little-endian u16.
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        // Writing into a Vec cannot fail.
        let _ = self.buffer.write_u16::<LittleEndian>(value);
        self
    }

    /// Writes a little-endian u32.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        let _ = self.buffer.write_u32::<LittleEndian>(value);
        self
    }

    /// Writes a little-endian u64.
    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        let _ = self.buffer.write_u64::<LittleEndian>(value);
        self
    }

    /// Writes a little-endian f32.
    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        let _ = self.buffer.write_f32::<LittleEndian>(value);
        self
    }

    /// Writes a NUL-terminated string. Interior NULs are cut off.
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        self.buffer.extend_from_slice(&bytes[..end]);
        self.buffer.push(0);
        self
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns its buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Reads values from a borrowed byte slice, failing instead of reading past the end.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> PayloadReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { cursor: Cursor::new(data) }
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.cursor.read_u8().map_err(|_| DecodingErrorKind::UnexpectedEnd)?)
    }

    /// Reads a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.cursor.read_u16::<LittleEndian>().map_err(|_| DecodingErrorKind::UnexpectedEnd)?)
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.cursor.read_u32::<LittleEndian>().map_err(|_| DecodingErrorKind::UnexpectedEnd)?)
    }

    /// Reads a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.cursor.read_u64::<LittleEndian>().map_err(|_| DecodingErrorKind::UnexpectedEnd)?)
    }

    /// Reads a little-endian f32.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(self.cursor.read_f32::<LittleEndian>().map_err(|_| DecodingErrorKind::UnexpectedEnd)?)
    }

    /// Reads a NUL-terminated utf-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let rest = self.remaining_slice();
        let end = rest.iter().position(|b| *b == 0).ok_or(DecodingErrorKind::UnterminatedString)?;
        let text = std::str::from_utf8(&rest[..end])
            .map_err(|_| DecodingErrorKind::InvalidString)?
            .to_owned();
        self.cursor.set_position(self.cursor.position() + end as u64 + 1);
        Ok(text)
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.remaining_slice().len()
    }

    fn remaining_slice(&self) -> &'a [u8] {
        let data: &'a [u8] = *self.cursor.get_ref();
        let start = (self.cursor.position() as usize).min(data.len());
        &data[start..]
    }
}

#[cfg(test)]
mod tests {
    use ackwire_core::error::ErrorKind;

    use super::*;

    #[test]
    fn test_integers_are_little_endian() {
        let mut writer = PayloadWriter::new();
        writer.write_u16(0x0102).write_u32(0x03040506);
        assert_eq!(writer.as_slice(), &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn test_strings_are_nul_terminated() {
        let mut writer = PayloadWriter::new();
        writer.write_str("abc").write_u8(7);
        assert_eq!(writer.as_slice(), b"abc\0\x07");

        let bytes = writer.into_bytes();
        let mut reader = PayloadReader::new(&bytes);
        assert_eq!(reader.read_string().unwrap(), "abc");
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_reading_past_the_end_fails() {
        let mut reader = PayloadReader::new(&[1, 2, 3]);
        assert!(matches!(
            reader.read_u32(),
            Err(ErrorKind::DecodingError(DecodingErrorKind::UnexpectedEnd))
        ));
    }

    #[test]
    fn test_unterminated_string_fails() {
        let mut reader = PayloadReader::new(b"abc");
        assert!(matches!(
            reader.read_string(),
            Err(ErrorKind::DecodingError(DecodingErrorKind::UnterminatedString))
        ));
    }

    #[test]
    fn test_interior_nul_truncates_written_string() {
        let mut writer = PayloadWriter::new();
        writer.write_str("ab\0cd");
        assert_eq!(writer.as_slice(), b"ab\0");
    }
}
