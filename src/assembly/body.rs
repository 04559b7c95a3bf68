//! Editable method bodies.
//!
//! [`MethodBody`] is the decoded form of a `Code` attribute: an instruction list interleaved
//! with labels, plus every side table that refers to code offsets (exception handlers, line
//! numbers, local variable ranges and stack map frames) re-expressed over those labels.
//! Stages insert and remove nodes freely; [`MethodBody::encode`] lays the list out again,
//! resolves every label and recomputes `max_stack`/`max_locals`.
//!
//! Code attributes this module does not understand are carried over raw. Type annotations
//! on code positions cannot be relocated and are dropped when a body is decoded for editing.

use crate::{
    assembly::{
        analysis,
        decoder::{decode_instructions, LabelMap},
        encoder::encode_nodes,
        stackmap::{decode_table, encode_table, Frame, FrameContext},
        Insn, Label, Node,
    },
    classfile::{
        attributes::{self, names},
        Attribute, ConstantPool,
    },
    file::{
        io::{push_be, push_len_u16, push_len_u32},
        parser::Parser,
    },
    Result,
};

/// One row of a `Code` attribute's exception table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of the protected range, inclusive
    pub start: Label,
    /// End of the protected range, exclusive
    pub end: Label,
    /// Handler entry
    pub handler: Label,
    /// `Class` index of the caught type, 0 for any
    pub catch_type: u16,
}

/// One `LineNumberTable` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    /// First instruction of the line
    pub start: Label,
    /// Source line
    pub line: u16,
}

/// One `LocalVariableTable` or `LocalVariableTypeTable` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Start of the live range, inclusive
    pub start: Label,
    /// End of the live range, exclusive
    pub end: Label,
    /// Variable name
    pub name: String,
    /// Field descriptor, or generic signature in the type table
    pub descriptor: String,
    /// Local variable slot
    pub slot: u16,
}

/// A local variable table entry with its raw code offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLocalVariable {
    /// `start_pc`
    pub start_pc: u16,
    /// `length`
    pub length: u16,
    /// Variable name
    pub name: String,
    /// Field descriptor or signature
    pub descriptor: String,
    /// Local variable slot
    pub slot: u16,
}

/// Decode the payload of a `LocalVariableTable` or `LocalVariableTypeTable`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated payloads and
/// [`crate::Error::ConstantPool`] for bad name or descriptor indices.
pub fn read_local_variables(info: &[u8], pool: &ConstantPool) -> Result<Vec<RawLocalVariable>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut locals = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let start_pc = parser.read_be()?;
        let length = parser.read_be()?;
        let name = pool.utf8(parser.read_be()?)?;
        let descriptor = pool.utf8(parser.read_be()?)?;
        let slot = parser.read_be()?;
        locals.push(RawLocalVariable {
            start_pc,
            length,
            name,
            descriptor,
            slot,
        });
    }
    Ok(locals)
}

/// The fixed layout of a `Code` attribute, without decoding its instructions.
#[derive(Debug, Clone)]
pub struct CodeAttribute<'a> {
    /// `max_stack`
    pub max_stack: u16,
    /// `max_locals`
    pub max_locals: u16,
    /// The `code` array
    pub code: &'a [u8],
    /// `(start_pc, end_pc, handler_pc, catch_type)` rows
    pub exception_table: Vec<(u16, u16, u16, u16)>,
    /// Nested attributes
    pub attributes: Vec<Attribute>,
}

impl<'a> CodeAttribute<'a> {
    /// Split a `Code` attribute payload into its parts.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated payloads and
    /// [`crate::Error::Malformed`] for an empty code array or trailing bytes.
    pub fn parse(info: &'a [u8]) -> Result<Self> {
        let mut parser = Parser::new(info);
        let max_stack = parser.read_be()?;
        let max_locals = parser.read_be()?;
        let code = parser.read_prefixed_bytes_u32()?;
        if code.is_empty() || code.len() > usize::from(u16::MAX) {
            return Err(malformed_error!("Invalid code length {}", code.len()));
        }

        let handler_count = parser.read_be::<u16>()?;
        let mut exception_table = Vec::with_capacity(usize::from(handler_count));
        for _ in 0..handler_count {
            exception_table.push((
                parser.read_be()?,
                parser.read_be()?,
                parser.read_be()?,
                parser.read_be()?,
            ));
        }

        let attributes = Attribute::parse_list(&mut parser)?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after Code attribute",
                parser.remaining()
            ));
        }

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }
}

/// A decoded, editable method body.
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    /// Declared operand stack size; the recomputed value never goes below it
    pub max_stack: u16,
    /// Declared local variable count; the recomputed value never goes below it
    pub max_locals: u16,
    /// Instructions and labels in layout order
    pub nodes: Vec<Node>,
    /// Exception table, in priority order
    pub handlers: Vec<ExceptionHandler>,
    /// `LineNumberTable` entries
    pub lines: Vec<LineNumber>,
    /// `LocalVariableTable` entries
    pub locals: Vec<LocalVariable>,
    /// `LocalVariableTypeTable` entries
    pub local_types: Vec<LocalVariable>,
    /// Expanded stack map frames
    pub frames: Vec<Frame>,
    /// Whether the source body carried a `StackMapTable`
    pub has_stack_map: bool,
    /// Code attributes carried over unchanged
    pub attributes: Vec<Attribute>,
    next_label: u32,
}

impl MethodBody {
    /// Create an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a label that is unique within this body.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Append an instruction.
    pub fn push(&mut self, insn: Insn) {
        self.nodes.push(Node::Insn(insn));
    }

    /// Append a label.
    pub fn place(&mut self, label: Label) {
        self.nodes.push(Node::Label(label));
    }

    /// Insert `nodes` before position `index` of the node list.
    pub fn insert(&mut self, index: usize, nodes: impl IntoIterator<Item = Node>) {
        let tail = self.nodes.split_off(index.min(self.nodes.len()));
        self.nodes.extend(nodes);
        self.nodes.extend(tail);
    }

    /// The instructions of the body, without labels.
    pub fn instructions(&self) -> impl Iterator<Item = &Insn> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Insn(insn) => Some(insn),
            Node::Label(_) => None,
        })
    }

    /// The first label placed before any instruction, if there is one.
    #[must_use]
    pub fn entry_label(&self) -> Option<Label> {
        match self.nodes.first() {
            Some(Node::Label(label)) => Some(*label),
            _ => None,
        }
    }

    /// Decode the payload of a `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`], [`crate::Error::OutOfBounds`] or
    /// [`crate::Error::InvalidOpcode`] if the code or any side table is invalid, including
    /// offsets that do not fall on an instruction boundary.
    pub fn decode(info: &[u8], pool: &ConstantPool, context: &FrameContext) -> Result<Self> {
        let raw = CodeAttribute::parse(info)?;
        let code_length = raw.code.len();
        let mut labels = LabelMap::new();
        let instructions = decode_instructions(raw.code, &mut labels)?;

        let at = |offset: u16, labels: &mut LabelMap| -> Result<Label> {
            if usize::from(offset) > code_length {
                return Err(malformed_error!(
                    "Offset {} outside code of length {}",
                    offset,
                    code_length
                ));
            }
            Ok(labels.at(usize::from(offset)))
        };

        let mut handlers = Vec::with_capacity(raw.exception_table.len());
        for (start, end, handler, catch_type) in &raw.exception_table {
            handlers.push(ExceptionHandler {
                start: at(*start, &mut labels)?,
                end: at(*end, &mut labels)?,
                handler: at(*handler, &mut labels)?,
                catch_type: *catch_type,
            });
        }

        let mut body = MethodBody {
            max_stack: raw.max_stack,
            max_locals: raw.max_locals,
            handlers,
            ..MethodBody::default()
        };

        for attribute in raw.attributes {
            if attribute.is(pool, names::LINE_NUMBER_TABLE) {
                let mut parser = Parser::new(&attribute.info);
                let count = parser.read_be::<u16>()?;
                for _ in 0..count {
                    let start = at(parser.read_be()?, &mut labels)?;
                    body.lines.push(LineNumber {
                        start,
                        line: parser.read_be()?,
                    });
                }
            } else if attribute.is(pool, names::LOCAL_VARIABLE_TABLE)
                || attribute.is(pool, names::LOCAL_VARIABLE_TYPE_TABLE)
            {
                let typed = attribute.is(pool, names::LOCAL_VARIABLE_TYPE_TABLE);
                for raw_local in read_local_variables(&attribute.info, pool)? {
                    let end = u32::from(raw_local.start_pc) + u32::from(raw_local.length);
                    let end = u16::try_from(end)
                        .map_err(|_| malformed_error!("Local variable range ends at {}", end))?;
                    let local = LocalVariable {
                        start: at(raw_local.start_pc, &mut labels)?,
                        end: at(end, &mut labels)?,
                        name: raw_local.name,
                        descriptor: raw_local.descriptor,
                        slot: raw_local.slot,
                    };
                    if typed {
                        body.local_types.push(local);
                    } else {
                        body.locals.push(local);
                    }
                }
            } else if attribute.is(pool, names::STACK_MAP_TABLE) {
                body.frames = decode_table(&attribute.info, pool, context, &mut labels)?;
                body.has_stack_map = true;
            } else if attribute.is(pool, names::RUNTIME_VISIBLE_TYPE_ANNOTATIONS)
                || attribute.is(pool, names::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS)
            {
                log::warn!(
                    "Dropping code type annotations of {}.{}",
                    context.owner,
                    context.descriptor
                );
            } else {
                body.attributes.push(attribute);
            }
        }

        // Interleave labels with the instructions at their offsets
        let mut placed = labels.iter().peekable();
        let mut nodes = Vec::with_capacity(instructions.len() * 2);
        for (offset, insn) in instructions {
            while let Some((label_offset, label)) = placed.peek().copied() {
                if label_offset > offset {
                    break;
                }
                if label_offset < offset {
                    return Err(malformed_error!(
                        "Offset {} is not an instruction boundary",
                        label_offset
                    ));
                }
                nodes.push(Node::Label(label));
                placed.next();
            }
            nodes.push(Node::Insn(insn));
        }
        for (label_offset, label) in placed {
            if label_offset != code_length {
                return Err(malformed_error!(
                    "Offset {} is not an instruction boundary",
                    label_offset
                ));
            }
            nodes.push(Node::Label(label));
        }

        body.nodes = nodes;
        body.next_label = labels.next_id();
        Ok(body)
    }

    /// Encode the body into the payload of a `Code` attribute.
    ///
    /// `max_stack` and `max_locals` are recomputed; the values stored on the body act as
    /// lower bounds.
    ///
    /// # Errors
    /// Returns [`crate::Error::UndefinedLabel`] if anything refers to a label that is not
    /// placed, [`crate::Error::BranchOutOfRange`] for conditional branches that cannot reach
    /// their target, and [`crate::Error::Malformed`] for oversized code or tables.
    pub fn encode(&self, pool: &mut ConstantPool, context: &FrameContext) -> Result<Vec<u8>> {
        let encoded = encode_nodes(&self.nodes)?;
        let offset = |label: Label| -> Result<u16> {
            // encode_nodes caps the code length at 65535
            Ok(encoded.offset(label)? as u16)
        };

        let max_stack = analysis::max_stack(self, pool)?.max(self.max_stack);
        let max_locals = analysis::max_locals(self, context).max(self.max_locals);

        let mut out = Vec::with_capacity(encoded.code.len() + 64);
        push_be(&mut out, max_stack);
        push_be(&mut out, max_locals);
        push_len_u32(&mut out, encoded.code.len(), "code")?;
        out.extend_from_slice(&encoded.code);

        push_len_u16(&mut out, self.handlers.len(), "exception table")?;
        for handler in &self.handlers {
            push_be(&mut out, offset(handler.start)?);
            push_be(&mut out, offset(handler.end)?);
            push_be(&mut out, offset(handler.handler)?);
            push_be(&mut out, handler.catch_type);
        }

        let mut code_attributes = Vec::with_capacity(self.attributes.len() + 4);
        if !self.lines.is_empty() {
            let mut info = Vec::with_capacity(2 + 4 * self.lines.len());
            push_len_u16(&mut info, self.lines.len(), "line numbers")?;
            for line in &self.lines {
                push_be(&mut info, offset(line.start)?);
                push_be(&mut info, line.line);
            }
            code_attributes.push(Attribute::new(pool, names::LINE_NUMBER_TABLE, info)?);
        }
        for (table, name) in [
            (&self.locals, names::LOCAL_VARIABLE_TABLE),
            (&self.local_types, names::LOCAL_VARIABLE_TYPE_TABLE),
        ] {
            if table.is_empty() {
                continue;
            }
            let mut info = Vec::with_capacity(2 + 10 * table.len());
            push_len_u16(&mut info, table.len(), "local variables")?;
            for local in table {
                let start = offset(local.start)?;
                let end = offset(local.end)?;
                push_be(&mut info, start);
                push_be(&mut info, end.saturating_sub(start));
                push_be(&mut info, pool.add_utf8(&local.name)?);
                push_be(&mut info, pool.add_utf8(&local.descriptor)?);
                push_be(&mut info, local.slot);
            }
            code_attributes.push(Attribute::new(pool, name, info)?);
        }
        if !self.frames.is_empty() {
            let info = encode_table(&self.frames, pool, context, &encoded.offsets)?;
            code_attributes.push(Attribute::new(pool, names::STACK_MAP_TABLE, info)?);
        }
        code_attributes.extend(self.attributes.iter().cloned());
        Attribute::write_list(&mut out, &code_attributes)?;

        Ok(out)
    }

    /// Find the `Code` attribute among method attributes and decode it.
    ///
    /// # Errors
    /// Same as [`MethodBody::decode`].
    pub fn from_attributes(
        method_attributes: &[Attribute],
        pool: &ConstantPool,
        context: &FrameContext,
    ) -> Result<Option<Self>> {
        match attributes::find(pool, method_attributes, names::CODE) {
            Some(code) => Ok(Some(MethodBody::decode(&code.info, pool, context)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{opcodes::*, stackmap::VType},
        classfile::MethodAccess,
    };

    fn sample(pool: &mut ConstantPool) -> (MethodBody, FrameContext) {
        let context = FrameContext::new("a/B", "abs", "(I)I", MethodAccess::STATIC).unwrap();
        let mut body = MethodBody::new();
        let start = body.new_label();
        let negative = body.new_label();
        let end = body.new_label();
        let handler = body.new_label();

        body.place(start);
        body.push(Insn::Simple(ILOAD_0));
        body.push(Insn::jump(IFLT, negative));
        body.push(Insn::Simple(ILOAD_0));
        body.push(Insn::Simple(IRETURN));
        body.place(negative);
        body.push(Insn::Simple(ILOAD_0));
        body.push(Insn::Simple(0x74)); // ineg
        body.push(Insn::Simple(IRETURN));
        body.place(end);
        body.place(handler);
        body.push(Insn::Simple(ICONST_0));
        body.push(Insn::Simple(IRETURN));

        body.handlers.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type: pool.add_class("java/lang/RuntimeException").unwrap(),
        });
        body.lines.push(LineNumber { start, line: 10 });
        body.lines.push(LineNumber {
            start: negative,
            line: 12,
        });
        body.locals.push(LocalVariable {
            start,
            end,
            name: "value".into(),
            descriptor: "I".into(),
            slot: 0,
        });
        body.frames.push(Frame {
            label: negative,
            locals: vec![VType::Integer],
            stack: vec![],
        });
        body.frames.push(Frame {
            label: handler,
            locals: vec![VType::Integer],
            stack: vec![VType::Object("java/lang/Throwable".into())],
        });
        (body, context)
    }

    #[test]
    fn encode_decode_encode_is_stable() {
        let mut pool = ConstantPool::new();
        let (body, context) = sample(&mut pool);
        let first = body.encode(&mut pool, &context).unwrap();

        let decoded = MethodBody::decode(&first, &pool, &context).unwrap();
        assert_eq!(decoded.instructions().count(), 9);
        assert_eq!(decoded.handlers.len(), 1);
        assert_eq!(decoded.lines.len(), 2);
        assert_eq!(decoded.locals[0].name, "value");
        assert!(decoded.has_stack_map);
        assert_eq!(decoded.frames.len(), 2);

        let second = decoded.encode(&mut pool, &context).unwrap();
        assert_eq!(first, second);

        let raw = CodeAttribute::parse(&second).unwrap();
        // the handler leaves the exception under its own constant
        assert_eq!(raw.max_stack, 2);
        assert_eq!(raw.max_locals, 1);
        assert_eq!(raw.exception_table, vec![(0, 9, 9, raw.exception_table[0].3)]);
    }

    #[test]
    fn inserted_prologue_shifts_everything() {
        let mut pool = ConstantPool::new();
        let (body, context) = sample(&mut pool);
        let info = body.encode(&mut pool, &context).unwrap();

        let mut decoded = MethodBody::decode(&info, &pool, &context).unwrap();
        decoded.insert(0, [Node::Insn(Insn::Simple(NOP)), Node::Insn(Insn::Simple(NOP))]);
        let shifted = decoded.encode(&mut pool, &context).unwrap();

        let raw = CodeAttribute::parse(&shifted).unwrap();
        assert_eq!(raw.code.len(), 13);
        assert_eq!(&raw.code[..2], &[NOP, NOP]);
        // the handler range starts at the label that used to be offset 0
        assert_eq!(raw.exception_table[0].0, 2);
        assert_eq!(raw.exception_table[0].2, 11);
    }

    #[test]
    fn new_labels_do_not_collide_with_decoded_ones() {
        let mut pool = ConstantPool::new();
        let (body, context) = sample(&mut pool);
        let info = body.encode(&mut pool, &context).unwrap();
        let mut decoded = MethodBody::decode(&info, &pool, &context).unwrap();

        let fresh = decoded.new_label();
        let used: Vec<Label> = decoded
            .nodes
            .iter()
            .filter_map(|n| match n {
                Node::Label(l) => Some(*l),
                Node::Insn(_) => None,
            })
            .collect();
        assert!(!used.contains(&fresh));
    }

    #[test]
    fn label_inside_instruction_is_malformed() {
        let mut pool = ConstantPool::new();
        let context = FrameContext::new("a/B", "f", "()V", MethodAccess::STATIC).unwrap();
        // bipush 1; return, with a line entry pointing into the bipush operand
        let mut info = vec![0, 1, 0, 0, 0, 0, 0, 3, BIPUSH, 1, RETURN, 0, 0];
        let name = pool.add_utf8(names::LINE_NUMBER_TABLE).unwrap();
        info.extend_from_slice(&[0, 1]);
        info.extend_from_slice(&name.to_be_bytes());
        info.extend_from_slice(&[0, 0, 0, 6, 0, 1, 0, 1, 0, 5]);
        assert!(MethodBody::decode(&info, &pool, &context).is_err());
    }
}
