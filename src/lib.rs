// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map an archive into memory

//! # classweave
//!
//! A load-time weaving engine for JVM class files. Built in pure Rust, `classweave` reads
//! units from a class path, answers questions about their structure, generics and marker
//! annotations, and rewrites their bytecode before the runtime defines them.
//!
//! ## Features
//!
//! - **Lazy, memoized discovery** - Units are scanned on first request from directories,
//!   jar archives or memory, and cached for every later stage
//! - **Faithful class-file codec** - Unknown attributes survive a round trip byte for byte
//! - **Label-based bytecode editing** - Bodies decode into instructions and labels; offsets,
//!   `max_stack`, `max_locals` and stack map frames are recomputed on encode
//! - **Generic shapes** - Type variables resolve to their bounds across class and method
//!   declarations
//! - **Marker-driven stages** - Interface injection with accessor synthesis, retry
//!   wrappers and parameter validation
//! - **Structured failure reports** - Every failure is classified, printed with its
//!   context and mapped to an exit code
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use classweave::prelude::*;
//!
//! let scanner = Scanner::new(ClassPath::from_env());
//! let weaver = Weaver::new(scanner, WeaveConfig::from_env());
//!
//! let bytes = std::fs::read("target/classes/com/example/Service.class")?;
//! if let Some(woven) = weaver.transform("app", &bytes) {
//!     std::fs::write("Service.class", woven)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Inspecting units
//!
//! ```rust
//! use classweave::prelude::*;
//!
//! let bytes = ClassBuilder::new("com/example/Service")
//!     .field(FieldSpec::new(FieldAccess::PRIVATE, "name", "Ljava/lang/String;"))
//!     .build()?;
//! let scanner = Scanner::new(MemorySource::new().with(bytes)?);
//!
//! let unit = scanner.scan(&UnitRef::from_dotted("com.example.Service"))?;
//! assert_eq!(unit.info.kind, UnitKind::Ordinary);
//! assert!(unit.content.fields.field("name").is_some());
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - Byte-level primitives, modified UTF-8 and mapped or owned buffers
//! - [`classfile`] - The container format: constant pool, attributes, annotations, access
//!   flags, descriptors and a builder for synthesized units
//! - [`classpath`] - Where units come from: directories, archives and memory
//! - [`assembly`] - Bytecode bodies as labels and instructions, with stack map frames
//! - [`metadata`] - The two-layer unit model, the memoizing scanner and generic shapes
//! - [`weave`] - Stages, the rewrite pipeline and the load hook
//! - [`report`] - Crash reports and exit codes
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Markers
//!
//! The engine reacts to annotations under `io/classweave/marker/`. See
//! [`weave::MarkerKind`] for the closed set and the arguments each marker takes.

#[macro_use]
pub(crate) mod error;

/// Byte-level access: bounds-checked readers, modified UTF-8 and data backends.
pub mod file;

/// The class-file format and its building blocks.
///
/// Parsing is faithful: attributes the engine does not interpret are carried as raw bytes
/// and written back unchanged.
pub mod classfile;

/// Lookup paths and the sources units are read from.
pub mod classpath;

/// Method bodies as editable instruction and label sequences.
pub mod assembly;

/// Unit models built by the scanner.
pub mod metadata;

/// Crash reports and the failure taxonomy.
pub mod report;

/// Load-time weaving.
pub mod weave;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use classweave::prelude::*;
///
/// let config = WeaveConfig::strict();
/// assert!(config.strict_discovery);
/// ```
pub mod prelude;

/// `classweave` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. Used consistently throughout the crate.
///
/// # Examples
///
/// ```rust
/// use classweave::{Result, classfile::ClassFile};
///
/// fn name_of(bytes: &[u8]) -> Result<String> {
///     ClassFile::peek_name(bytes)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `classweave` Error type.
///
/// Every fallible operation of the crate returns this error. See [`report::ReportKind`]
/// for how variants are grouped when a failure is reported.
pub use error::Error;

/// Cursor-based big-endian reader used by every decoder in the crate.
pub use file::parser::Parser;
