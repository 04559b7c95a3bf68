//! Low-level byte order and safe reading/writing utilities for class-file parsing.
//!
//! Every multi-byte quantity in a class file is stored in big-endian order (JVMS §4). This
//! module provides the bounds-checked primitives the rest of the crate builds on: reading a
//! value at an offset with auto-advance, patching a value in place, and appending a value to a
//! growable output buffer.
//!
//! # Key Components
//!
//! - [`crate::file::io::ClassIO`] - Trait defining big-endian conversion for primitive types
//! - [`crate::file::io::read_be`] / [`crate::file::io::read_be_at`] - Bounds-checked reads
//! - [`crate::file::io::write_be_at`] - Bounds-checked in-place writes
//! - [`crate::file::io::push_be`] - Append to a `Vec<u8>` emitter
//!
//! # Examples
//!
//! ```rust,ignore
//! use classweave::file::io::{read_be_at, push_be};
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x41];
//! let mut offset = 0;
//! let magic: u32 = read_be_at(&data, &mut offset)?;
//! assert_eq!(magic, 0xCAFE_BABE);
//!
//! let mut out = Vec::new();
//! push_be(&mut out, 0x0041_u16);
//! assert_eq!(out, [0x00, 0x41]);
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All reading and in-place writing functions return [`crate::Error::OutOfBounds`] if there are
//! insufficient bytes in the buffer. Appending never fails.

use crate::Result;

/// Trait for implementing type-specific safe big-endian conversion.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait ClassIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Safely reads a value of type `T` in big-endian byte order from the start of a buffer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is shorter than `T`.
pub fn read_be<T: ClassIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_be_at(data, &mut offset)
}

/// Safely reads a value of type `T` in big-endian byte order at `offset`, advancing it.
///
/// # Arguments
///
/// * `data` - The byte buffer to read from
/// * `offset` - Mutable reference to the offset position (will be advanced after reading)
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_be_bytes(read))
}

/// Safely writes a value of type `T` in big-endian byte order at `offset`, advancing it.
///
/// Used to patch already-emitted fields such as branch offsets and attribute lengths.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn write_be_at<T: ClassIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    data[*offset..end].copy_from_slice(value.to_be_bytes().as_ref());
    *offset = end;
    Ok(())
}

/// Appends a value of type `T` in big-endian byte order to an output buffer.
pub fn push_be<T: ClassIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_be_bytes().as_ref());
}

/// Appends a `u16` length prefix, failing if `len` does not fit.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `len` exceeds `u16::MAX`.
pub fn push_len_u16(out: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let value =
        u16::try_from(len).map_err(|_| malformed_error!("Too many {} - {}", what, len))?;
    push_be(out, value);
    Ok(())
}

/// Appends a `u32` length prefix, failing if `len` does not fit.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `len` exceeds `u32::MAX`.
pub fn push_len_u32(out: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let value =
        u32::try_from(len).map_err(|_| malformed_error!("{} too large - {}", what, len))?;
    push_be(out, value);
    Ok(())
}
