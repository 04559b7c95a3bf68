//! Byte-level access to class files and the containers that hold them.
//!
//! Everything above this module works on borrowed byte slices. This module supplies them:
//!
//! - [`crate::file::io`] - Big-endian bounds-checked primitives
//! - [`crate::file::parser`] - Cursor-based [`crate::file::parser::Parser`]
//! - [`crate::file::mutf8`] - Modified UTF-8 codec used by the constant pool
//! - [`crate::file::Backend`] - Abstraction over where container bytes live, implemented by
//!   [`crate::file::Memory`] for owned buffers and [`crate::file::Physical`] for
//!   memory-mapped files
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::file::{Backend, Memory, Physical};
//!
//! let mapped = Physical::new("lib/service.jar")?;
//! let owned = Memory::new(std::fs::read("lib/service.jar")?);
//! assert_eq!(mapped.data(), owned.data());
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod io;
pub mod mutf8;
pub mod parser;

mod memory;
mod physical;

pub use memory::Memory;
pub use physical::Physical;

use crate::Result;

/// Backend trait for container data sources.
///
/// Archive readers hold a `Box<dyn Backend>` so the same code serves archives that were
/// mapped from disk and archives that arrived as bytes.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Arguments
    ///
    /// * `offset` - The starting offset within the data.
    /// * `len` - The length of the slice in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no data.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
