//! `StackMapTable` frames (JVMS §4.7.4).
//!
//! Frames are held fully expanded: every [`Frame`] lists its complete locals and stack. The
//! compressed frame kinds of the attribute (`same`, `same_locals_1_stack_item`, `chop`,
//! `append`, `same_frame_extended`, `full_frame`) exist only on the wire. Decoding expands
//! them against the previous frame, starting from the implicit frame the method descriptor
//! defines; encoding picks the smallest kind that expresses each frame.

use std::collections::HashMap;

use crate::{
    assembly::{decoder::LabelMap, Label},
    classfile::{
        descriptor::{FieldType, MethodDescriptor},
        ConstantPool, MethodAccess,
    },
    file::{
        io::{push_be, push_len_u16},
        parser::Parser,
    },
    Error, Result,
};

/// A verification type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VType {
    /// Unusable slot
    Top,
    /// `int` and narrower
    Integer,
    /// `float`
    Float,
    /// `double`, covering two local slots
    Double,
    /// `long`, covering two local slots
    Long,
    /// The `null` reference
    Null,
    /// `this` inside a constructor before the super constructor ran
    UninitializedThis,
    /// An initialized reference of the given internal name or array descriptor
    Object(String),
    /// The result of the `new` instruction at the label, not yet initialized
    Uninitialized(Label),
}

impl VType {
    /// Verification type of a value of the given field type.
    #[must_use]
    pub fn from_field_type(field: &FieldType) -> Self {
        match field {
            FieldType::Base('J') => VType::Long,
            FieldType::Base('D') => VType::Double,
            FieldType::Base('F') => VType::Float,
            FieldType::Base(_) => VType::Integer,
            FieldType::Object(name) => VType::Object(name.clone()),
            FieldType::Array(_) => VType::Object(field.to_string()),
        }
    }

    /// Number of local slots covered.
    #[must_use]
    pub fn slots(&self) -> u16 {
        match self {
            VType::Long | VType::Double => 2,
            _ => 1,
        }
    }

    fn parse(parser: &mut Parser, pool: &ConstantPool, labels: &mut LabelMap) -> Result<Self> {
        let tag = parser.read_be::<u8>()?;
        Ok(match tag {
            0 => VType::Top,
            1 => VType::Integer,
            2 => VType::Float,
            3 => VType::Double,
            4 => VType::Long,
            5 => VType::Null,
            6 => VType::UninitializedThis,
            7 => VType::Object(pool.class_name(parser.read_be()?)?),
            8 => VType::Uninitialized(labels.at(usize::from(parser.read_be::<u16>()?))),
            _ => return Err(malformed_error!("Invalid verification type tag {}", tag)),
        })
    }

    fn write(
        &self,
        out: &mut Vec<u8>,
        pool: &mut ConstantPool,
        offsets: &HashMap<Label, usize>,
    ) -> Result<()> {
        match self {
            VType::Top => out.push(0),
            VType::Integer => out.push(1),
            VType::Float => out.push(2),
            VType::Double => out.push(3),
            VType::Long => out.push(4),
            VType::Null => out.push(5),
            VType::UninitializedThis => out.push(6),
            VType::Object(name) => {
                out.push(7);
                push_be(out, pool.add_class(name)?);
            }
            VType::Uninitialized(label) => {
                out.push(8);
                let offset = offsets
                    .get(label)
                    .ok_or(Error::UndefinedLabel(label.0))?;
                push_be(out, *offset as u16);
            }
        }
        Ok(())
    }
}

/// One fully expanded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position the frame describes
    pub label: Label,
    /// Local variable types; `Long`/`Double` appear once
    pub locals: Vec<VType>,
    /// Operand stack types, bottom first
    pub stack: Vec<VType>,
}

/// The facts about a method needed to derive its implicit initial frame.
#[derive(Debug, Clone)]
pub struct FrameContext {
    /// Internal name of the declaring class
    pub owner: String,
    /// Parsed method descriptor
    pub descriptor: MethodDescriptor,
    /// Whether the method is static
    pub is_static: bool,
    /// Whether the method is an instance initializer
    pub is_constructor: bool,
}

impl FrameContext {
    /// Build the context of a method.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is invalid.
    pub fn new(owner: &str, name: &str, descriptor: &str, access: MethodAccess) -> Result<Self> {
        Ok(FrameContext {
            owner: owner.to_string(),
            descriptor: MethodDescriptor::parse(descriptor)?,
            is_static: access.contains(MethodAccess::STATIC),
            is_constructor: name == "<init>",
        })
    }

    /// Locals of the implicit frame at offset 0.
    #[must_use]
    pub fn initial_locals(&self) -> Vec<VType> {
        let mut locals = Vec::with_capacity(self.descriptor.parameters.len() + 1);
        if !self.is_static {
            if self.is_constructor && self.owner != "java/lang/Object" {
                locals.push(VType::UninitializedThis);
            } else {
                locals.push(VType::Object(self.owner.clone()));
            }
        }
        locals.extend(self.descriptor.parameters.iter().map(VType::from_field_type));
        locals
    }

    /// Slots taken by the receiver and the parameters.
    #[must_use]
    pub fn argument_slots(&self) -> u16 {
        self.descriptor.parameter_slots() + u16::from(!self.is_static)
    }
}

/// Decode a `StackMapTable` payload into expanded frames.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for invalid frame types or a `chop` that removes more
/// locals than exist.
pub fn decode_table(
    info: &[u8],
    pool: &ConstantPool,
    context: &FrameContext,
    labels: &mut LabelMap,
) -> Result<Vec<Frame>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut frames = Vec::with_capacity(usize::from(count));
    let mut locals = context.initial_locals();
    let mut previous_offset: Option<usize> = None;

    for _ in 0..count {
        let frame_type = parser.read_be::<u8>()?;
        let (delta, stack) = match frame_type {
            0..=63 => (usize::from(frame_type), Vec::new()),
            64..=127 => (
                usize::from(frame_type - 64),
                vec![VType::parse(&mut parser, pool, labels)?],
            ),
            247 => {
                let delta = usize::from(parser.read_be::<u16>()?);
                (delta, vec![VType::parse(&mut parser, pool, labels)?])
            }
            248..=250 => {
                let delta = usize::from(parser.read_be::<u16>()?);
                let chop = usize::from(251 - frame_type);
                if chop > locals.len() {
                    return Err(malformed_error!(
                        "Chop frame removes {} of {} locals",
                        chop,
                        locals.len()
                    ));
                }
                locals.truncate(locals.len() - chop);
                (delta, Vec::new())
            }
            251 => (usize::from(parser.read_be::<u16>()?), Vec::new()),
            252..=254 => {
                let delta = usize::from(parser.read_be::<u16>()?);
                for _ in 0..(frame_type - 251) {
                    locals.push(VType::parse(&mut parser, pool, labels)?);
                }
                (delta, Vec::new())
            }
            255 => {
                let delta = usize::from(parser.read_be::<u16>()?);
                let local_count = parser.read_be::<u16>()?;
                locals.clear();
                for _ in 0..local_count {
                    locals.push(VType::parse(&mut parser, pool, labels)?);
                }
                let stack_count = parser.read_be::<u16>()?;
                let mut stack = Vec::with_capacity(usize::from(stack_count));
                for _ in 0..stack_count {
                    stack.push(VType::parse(&mut parser, pool, labels)?);
                }
                (delta, stack)
            }
            _ => {
                return Err(malformed_error!(
                    "Reserved stack map frame type {}",
                    frame_type
                ))
            }
        };

        let offset = match previous_offset {
            None => delta,
            Some(previous) => previous + delta + 1,
        };
        previous_offset = Some(offset);

        frames.push(Frame {
            label: labels.at(offset),
            locals: locals.clone(),
            stack,
        });
    }

    Ok(frames)
}

/// Encode expanded frames into a `StackMapTable` payload.
///
/// Frames are ordered by offset; when several frames land on the same offset only the first
/// one in `frames` is kept.
///
/// # Errors
/// Returns [`crate::Error::UndefinedLabel`] if a frame label was never placed.
pub fn encode_table(
    frames: &[Frame],
    pool: &mut ConstantPool,
    context: &FrameContext,
    offsets: &HashMap<Label, usize>,
) -> Result<Vec<u8>> {
    let mut placed: Vec<(usize, &Frame)> = Vec::with_capacity(frames.len());
    for frame in frames {
        let offset = *offsets
            .get(&frame.label)
            .ok_or(Error::UndefinedLabel(frame.label.0))?;
        placed.push((offset, frame));
    }
    placed.sort_by_key(|(offset, _)| *offset);
    placed.dedup_by_key(|(offset, _)| *offset);

    let mut out = Vec::new();
    push_len_u16(&mut out, placed.len(), "stack map frames")?;

    let mut previous_locals = context.initial_locals();
    let mut previous_offset: Option<usize> = None;
    for (offset, frame) in placed {
        let delta = match previous_offset {
            None => offset,
            Some(previous) => offset - previous - 1,
        };
        let delta = u16::try_from(delta)
            .map_err(|_| malformed_error!("Stack map offset delta too large - {}", delta))?;
        write_frame(&mut out, frame, &previous_locals, delta, pool, offsets)?;
        previous_locals.clone_from(&frame.locals);
        previous_offset = Some(offset);
    }

    Ok(out)
}

fn write_frame(
    out: &mut Vec<u8>,
    frame: &Frame,
    previous: &[VType],
    delta: u16,
    pool: &mut ConstantPool,
    offsets: &HashMap<Label, usize>,
) -> Result<()> {
    let locals = &frame.locals;
    let same_locals = locals.as_slice() == previous;

    if same_locals && frame.stack.is_empty() {
        if delta < 64 {
            out.push(delta as u8);
        } else {
            out.push(251);
            push_be(out, delta);
        }
        return Ok(());
    }

    if same_locals && frame.stack.len() == 1 {
        if delta < 64 {
            out.push(64 + delta as u8);
        } else {
            out.push(247);
            push_be(out, delta);
        }
        return frame.stack[0].write(out, pool, offsets);
    }

    if frame.stack.is_empty() {
        if locals.len() < previous.len()
            && previous.len() - locals.len() <= 3
            && previous.starts_with(locals)
        {
            out.push(251 - (previous.len() - locals.len()) as u8);
            push_be(out, delta);
            return Ok(());
        }
        if locals.len() > previous.len()
            && locals.len() - previous.len() <= 3
            && locals.starts_with(previous)
        {
            out.push(251 + (locals.len() - previous.len()) as u8);
            push_be(out, delta);
            for local in &locals[previous.len()..] {
                local.write(out, pool, offsets)?;
            }
            return Ok(());
        }
    }

    out.push(255);
    push_be(out, delta);
    push_len_u16(out, locals.len(), "frame locals")?;
    for local in locals {
        local.write(out, pool, offsets)?;
    }
    push_len_u16(out, frame.stack.len(), "frame stack")?;
    for item in &frame.stack {
        item.write(out, pool, offsets)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> FrameContext {
        FrameContext::new("a/B", "run", "(IJ)V", MethodAccess::PUBLIC).unwrap()
    }

    #[test]
    fn initial_frame() {
        let ctx = context();
        assert_eq!(
            ctx.initial_locals(),
            vec![VType::Object("a/B".into()), VType::Integer, VType::Long]
        );
        assert_eq!(ctx.argument_slots(), 4);

        let ctor = FrameContext::new("a/B", "<init>", "()V", MethodAccess::PUBLIC).unwrap();
        assert_eq!(ctor.initial_locals(), vec![VType::UninitializedThis]);
    }

    #[test]
    fn compressed_kinds_round_trip() {
        let ctx = context();
        let mut pool = ConstantPool::new();
        let mut labels = LabelMap::new();
        let base = ctx.initial_locals();

        let mut appended = base.clone();
        appended.push(VType::Object("java/lang/String".into()));

        let frames = vec![
            Frame {
                label: labels.at(3),
                locals: base.clone(),
                stack: vec![],
            },
            Frame {
                label: labels.at(10),
                locals: base.clone(),
                stack: vec![VType::Integer],
            },
            Frame {
                label: labels.at(20),
                locals: appended.clone(),
                stack: vec![],
            },
            Frame {
                label: labels.at(200),
                locals: base[..1].to_vec(),
                stack: vec![],
            },
            Frame {
                label: labels.at(210),
                locals: vec![VType::Null],
                stack: vec![VType::Top, VType::Float],
            },
        ];

        let offsets: HashMap<Label, usize> =
            labels.iter().map(|(offset, label)| (label, offset)).collect();
        let table = encode_table(&frames, &mut pool, &ctx, &offsets).unwrap();

        // same(3), same_locals_1(6), append(9), chop 2 (179), full
        assert_eq!(&table[..3], &[0, 5, 3]);
        assert_eq!(table[3], 64 + 6);

        let decoded = decode_table(&table, &pool, &ctx, &mut labels).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn duplicate_offsets_keep_first() {
        let ctx = context();
        let mut pool = ConstantPool::new();
        let frames = vec![
            Frame {
                label: Label(0),
                locals: ctx.initial_locals(),
                stack: vec![],
            },
            Frame {
                label: Label(1),
                locals: vec![],
                stack: vec![],
            },
        ];
        let offsets = HashMap::from([(Label(0), 4), (Label(1), 4)]);
        let table = encode_table(&frames, &mut pool, &ctx, &offsets).unwrap();
        assert_eq!(table, vec![0, 1, 4]);
    }

    #[test]
    fn chop_past_start_is_malformed() {
        let ctx = context();
        let pool = ConstantPool::new();
        let mut labels = LabelMap::new();
        // one chop-3 frame against 3 locals is fine, a second is not
        let table = [0, 2, 248, 0, 0, 248, 0, 0];
        assert!(decode_table(&table, &pool, &ctx, &mut labels).is_err());
    }
}
