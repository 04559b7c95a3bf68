//! JVM bytecode decoding, editing and encoding.
//!
//! This module turns the `code` array of a method into an editable, label-based instruction
//! list and back. Decoding replaces every byte offset with a [`Label`], so stages can insert
//! instructions anywhere without patching branch offsets, exception ranges, debug tables or
//! stack map frames by hand. Encoding lays the list out again, widens branches that no
//! longer fit, and recomputes `max_stack` and `max_locals`.
//!
//! # Key Types
//! - [`MethodBody`] - A decoded `Code` attribute with all side tables over labels
//! - [`Insn`] - One instruction with label operands
//! - [`Node`] - An instruction or a label in a body's node list
//! - [`Frame`] / [`VType`] - Expanded stack map frames
//! - [`FrameContext`] - The method facts that define the implicit first frame
//!
//! # Main Functions
//! - [`decoder::decode_instructions`] - Decode a raw `code` array
//! - [`encoder::encode_nodes`] - Lay out and encode a node list
//! - [`analysis::max_stack`] / [`analysis::max_locals`] - Frame size computation
//!
//! # Example
//! ```rust
//! use classweave::assembly::{opcodes, FrameContext, Insn, MethodBody};
//! use classweave::classfile::{ConstantPool, MethodAccess};
//!
//! let mut pool = ConstantPool::new();
//! let context = FrameContext::new("a/B", "answer", "()I", MethodAccess::STATIC)?;
//!
//! let mut body = MethodBody::new();
//! body.push(Insn::int(42));
//! body.push(Insn::Simple(opcodes::IRETURN));
//! let info = body.encode(&mut pool, &context)?;
//!
//! let decoded = MethodBody::decode(&info, &pool, &context)?;
//! assert_eq!(decoded.instructions().count(), 2);
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod analysis;
mod body;
pub mod decoder;
pub mod encoder;
mod instruction;
pub mod opcodes;
pub mod stackmap;

pub use body::{
    read_local_variables, CodeAttribute, ExceptionHandler, LineNumber, LocalVariable, MethodBody,
    RawLocalVariable,
};
pub use instruction::{Insn, Label, LocalAccess, Node};
pub use stackmap::{Frame, FrameContext, VType};
