//! Low-level byte stream parser for class-file decoding.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser used for every structure of a class file: the header, the constant pool, member
//! tables, attributes, annotation element values, and the instruction stream of a `Code`
//! attribute. It offers bounds-checked access to the underlying bytes in big-endian order.
//!
//! # Architecture
//!
//! The parser is built around a simple cursor-based model that maintains a position within
//! a byte slice:
//!
//! - **Position tracking** - Maintains current offset for sequential parsing operations
//! - **Bounds checking** - All operations validate data availability before reading
//! - **Type-safe reading** - Strongly typed reads through [`crate::file::io::ClassIO`]
//! - **Transactions** - [`crate::file::parser::Parser::transactional`] restores the cursor
//!   when a speculative read fails
//!
//! # Examples
//!
//! ```rust
//! use classweave::Parser;
//!
//! let data = [0x00, 0x03, b'a', b'b', b'c', 0xFF];
//! let mut parser = Parser::new(&data);
//!
//! let length = parser.read_be::<u16>()?;
//! let text = parser.read_modified_utf8(usize::from(length))?;
//! assert_eq!(text, "abc");
//! assert_eq!(parser.remaining(), 1);
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    file::{
        io::{read_be_at, ClassIO},
        mutf8,
    },
    Result,
};

/// A cursor over a borrowed byte slice.
///
/// All reads are big-endian and bounds-checked; a failed read leaves the cursor where it was.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the cursor has not reached the end of the buffer.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to an absolute position.
    ///
    /// Seeking to exactly the end of the buffer is allowed; it marks the buffer as consumed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies beyond the buffer.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the cursor forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let end = self.calc_end_position(step)?;
        self.position = end;
        Ok(())
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The whole underlying buffer, independent of the cursor.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Peek at the byte under the cursor without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the buffer.
    pub fn peek_byte(&self) -> Result<u8> {
        if self.position >= self.data.len() {
            return Err(out_of_bounds_error!());
        }
        Ok(self.data[self.position])
    }

    /// Read a value at the cursor without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
    pub fn peek_be<T: ClassIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_be_at::<T>(self.data, &mut temp_position)
    }

    /// Read a big-endian value and advance the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Align the cursor to a multiple of `alignment`, relative to the start of the buffer.
    ///
    /// Used for the padding that precedes `tableswitch` and `lookupswitch` operands.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding runs past the buffer.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Run `f` and restore the cursor if it fails.
    ///
    /// # Errors
    /// Propagates the error returned by `f`.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }
        result
    }

    /// Number of bytes left after the cursor.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check that at least `needed` bytes remain.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] otherwise.
    pub fn ensure_remaining(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(out_of_bounds_error!());
        }
        Ok(())
    }

    /// Compute the position `length` bytes after the cursor, checking it stays in bounds.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on overflow or if the end lies past the buffer.
    pub fn calc_end_position(&self, length: usize) -> Result<usize> {
        let end = self
            .position
            .checked_add(length)
            .ok_or(out_of_bounds_error!())?;

        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(end)
    }

    /// Borrow the next `length` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.calc_end_position(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Read a `u16` length followed by that many bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
    pub fn read_prefixed_bytes_u16(&mut self) -> Result<&'a [u8]> {
        self.transactional(|parser| {
            let length = parser.read_be::<u16>()?;
            parser.read_bytes(usize::from(length))
        })
    }

    /// Read a `u32` length followed by that many bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
    pub fn read_prefixed_bytes_u32(&mut self) -> Result<&'a [u8]> {
        self.transactional(|parser| {
            let length = parser.read_be::<u32>()? as usize;
            parser.read_bytes(length)
        })
    }

    /// Read `length` bytes of modified UTF-8 and decode them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes, or
    /// [`crate::Error::Malformed`] if the bytes are not valid modified UTF-8.
    pub fn read_modified_utf8(&mut self, length: usize) -> Result<String> {
        let start = self.position;
        let bytes = self.read_bytes(length)?;
        mutf8::decode(bytes).map_err(|e| {
            self.position = start;
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn sequential_reads() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_be::<u32>().unwrap(), 0xCAFE_BABE);
        assert_eq!(parser.peek_be::<u16>().unwrap(), 0x34);
        assert_eq!(parser.read_be::<u16>().unwrap(), 0x34);
        assert!(!parser.has_more_data());
        assert!(matches!(
            parser.read_be::<u8>(),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn seek_to_end_is_allowed() {
        let data = [1, 2, 3];
        let mut parser = Parser::new(&data);

        parser.seek(3).unwrap();
        assert_eq!(parser.remaining(), 0);
        assert!(parser.seek(4).is_err());
        assert!(parser.peek_byte().is_err());
    }

    #[test]
    fn align_relative_to_start() {
        let data = [0u8; 12];
        let mut parser = Parser::new(&data);

        parser.advance_by(1).unwrap();
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
    }

    #[test]
    fn transactional_restores_on_failure() {
        let data = [0x00, 0x05, b'a'];
        let mut parser = Parser::new(&data);

        assert!(parser.read_prefixed_bytes_u16().is_err());
        assert_eq!(parser.pos(), 0);

        let value: u16 = parser
            .transactional(|p| p.read_be::<u16>())
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(parser.pos(), 2);
    }

    #[test]
    fn modified_utf8_strings() {
        // "a" NUL "é" in modified UTF-8: NUL is the two-byte form C0 80
        let data = [b'a', 0xC0, 0x80, 0xC3, 0xA9];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_modified_utf8(5).unwrap(), "a\0é");

        let bad = [0xFF];
        let mut parser = Parser::new(&bad);
        assert!(matches!(
            parser.read_modified_utf8(1),
            Err(Error::Malformed { .. })
        ));
        assert_eq!(parser.pos(), 0);
    }
}
