//! Layout and encoding of label-based instruction lists.
//!
//! Encoding runs in two phases. Layout assigns an offset to every node; because the size of
//! a switch depends on its alignment and the size of a `goto`/`jsr` depends on whether it
//! must be widened, layout repeats until no branch changes form. Emission then writes the
//! bytes with every label resolved.
//!
//! Widening only ever grows instructions, so the fixed point is reached after at most one
//! pass per unconditional branch. A conditional branch whose target lies outside the 16-bit
//! range fails with [`crate::Error::BranchOutOfRange`].

use std::collections::{HashMap, HashSet};

use crate::{
    assembly::{opcodes::*, Insn, Label, Node},
    file::io::push_be,
    Error, Result,
};

/// Upper bound on layout passes; each pass widens at least one branch.
const MAX_LAYOUT_PASSES: usize = 1024;

/// The result of encoding an instruction list.
#[derive(Debug, Clone, Default)]
pub struct EncodedCode {
    /// The `code` array
    pub code: Vec<u8>,
    /// Final offset of every placed label
    pub offsets: HashMap<Label, usize>,
}

impl EncodedCode {
    /// Offset of `label`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UndefinedLabel`] if the label was never placed.
    pub fn offset(&self, label: Label) -> Result<usize> {
        self.offsets
            .get(&label)
            .copied()
            .ok_or(Error::UndefinedLabel(label.0))
    }
}

/// Encode `nodes` into a `code` array.
///
/// # Errors
/// Returns [`crate::Error::UndefinedLabel`] for branches to labels not in `nodes`,
/// [`crate::Error::BranchOutOfRange`] for conditional branches that do not fit 16 bits, and
/// [`crate::Error::Malformed`] if the code exceeds 65535 bytes.
pub fn encode_nodes(nodes: &[Node]) -> Result<EncodedCode> {
    let mut widened: HashSet<usize> = HashSet::new();
    let mut layout = compute_layout(nodes, &widened)?;

    let mut passes = 0;
    loop {
        let mut changed = false;
        for (index, node) in nodes.iter().enumerate() {
            let Node::Insn(Insn::Jump { opcode, target }) = node else {
                continue;
            };
            if widened.contains(&index) {
                continue;
            }
            let relative = layout.relative(index, *target)?;
            if i16::try_from(relative).is_err() {
                if *opcode == GOTO || *opcode == JSR {
                    widened.insert(index);
                    changed = true;
                } else {
                    return Err(Error::BranchOutOfRange(relative));
                }
            }
        }

        if !changed {
            break;
        }
        passes += 1;
        if passes > MAX_LAYOUT_PASSES {
            return Err(malformed_error!("Branch layout did not converge"));
        }
        layout = compute_layout(nodes, &widened)?;
    }

    if layout.length > usize::from(u16::MAX) {
        return Err(malformed_error!("Code length {} exceeds 65535", layout.length));
    }

    let mut code = Vec::with_capacity(layout.length);
    for (index, node) in nodes.iter().enumerate() {
        if let Node::Insn(insn) = node {
            let offset = layout.node_offsets[index];
            debug_assert_eq!(offset, code.len());
            emit(&mut code, insn, offset, widened.contains(&index), &layout)?;
        }
    }

    Ok(EncodedCode {
        code,
        offsets: layout.labels,
    })
}

struct Layout {
    node_offsets: Vec<usize>,
    labels: HashMap<Label, usize>,
    length: usize,
}

impl Layout {
    fn target(&self, label: Label) -> Result<usize> {
        self.labels
            .get(&label)
            .copied()
            .ok_or(Error::UndefinedLabel(label.0))
    }

    fn relative(&self, node: usize, label: Label) -> Result<i64> {
        Ok(self.target(label)? as i64 - self.node_offsets[node] as i64)
    }
}

fn compute_layout(nodes: &[Node], widened: &HashSet<usize>) -> Result<Layout> {
    let mut node_offsets = Vec::with_capacity(nodes.len());
    let mut labels = HashMap::new();
    let mut offset = 0usize;

    for (index, node) in nodes.iter().enumerate() {
        node_offsets.push(offset);
        match node {
            Node::Label(label) => {
                if labels.insert(*label, offset).is_some() {
                    return Err(malformed_error!("Label {} placed twice", label));
                }
            }
            Node::Insn(insn) => offset += size(insn, offset, widened.contains(&index)),
        }
    }

    Ok(Layout {
        node_offsets,
        labels,
        length: offset,
    })
}

fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

fn size(insn: &Insn, offset: usize, wide: bool) -> usize {
    match insn {
        Insn::Simple(_) => 1,
        Insn::Push { opcode, .. } => {
            if *opcode == SIPUSH {
                3
            } else {
                2
            }
        }
        Insn::Local { slot, .. } => {
            if *slot > 0xFF {
                4
            } else {
                2
            }
        }
        Insn::Iinc { slot, delta } => {
            if *slot > 0xFF || i8::try_from(*delta).is_err() {
                6
            } else {
                3
            }
        }
        Insn::Constant { opcode, index } => {
            if *opcode == LDC && *index <= 0xFF {
                2
            } else {
                3
            }
        }
        Insn::InvokeInterface { .. } | Insn::InvokeDynamic { .. } => 5,
        Insn::MultiANewArray { .. } => 4,
        Insn::Jump { .. } => {
            if wide {
                5
            } else {
                3
            }
        }
        Insn::TableSwitch { targets, .. } => 1 + switch_padding(offset) + 12 + 4 * targets.len(),
        Insn::LookupSwitch { pairs, .. } => 1 + switch_padding(offset) + 8 + 8 * pairs.len(),
    }
}

fn emit(out: &mut Vec<u8>, insn: &Insn, offset: usize, wide: bool, layout: &Layout) -> Result<()> {
    let relative = |label: Label| -> Result<i64> { Ok(layout.target(label)? as i64 - offset as i64) };

    match insn {
        Insn::Simple(opcode) => out.push(*opcode),
        Insn::Push { opcode, value } => {
            out.push(*opcode);
            match *opcode {
                SIPUSH => push_be(out, *value as i16),
                BIPUSH => push_be(out, *value as i8),
                _ => out.push(*value as u8),
            }
        }
        Insn::Local { opcode, slot } => {
            if *slot > 0xFF {
                out.push(WIDE);
                out.push(*opcode);
                push_be(out, *slot);
            } else {
                out.push(*opcode);
                out.push(*slot as u8);
            }
        }
        Insn::Iinc { slot, delta } => {
            if *slot > 0xFF || i8::try_from(*delta).is_err() {
                out.push(WIDE);
                out.push(IINC);
                push_be(out, *slot);
                push_be(out, *delta);
            } else {
                out.push(IINC);
                out.push(*slot as u8);
                push_be(out, *delta as i8);
            }
        }
        Insn::Constant { opcode, index } => {
            if *opcode == LDC {
                if *index <= 0xFF {
                    out.push(LDC);
                    out.push(*index as u8);
                } else {
                    out.push(LDC_W);
                    push_be(out, *index);
                }
            } else {
                out.push(*opcode);
                push_be(out, *index);
            }
        }
        Insn::InvokeInterface { index, count } => {
            out.push(INVOKEINTERFACE);
            push_be(out, *index);
            out.push(*count);
            out.push(0);
        }
        Insn::InvokeDynamic { index } => {
            out.push(INVOKEDYNAMIC);
            push_be(out, *index);
            push_be(out, 0_u16);
        }
        Insn::MultiANewArray { index, dimensions } => {
            out.push(MULTIANEWARRAY);
            push_be(out, *index);
            out.push(*dimensions);
        }
        Insn::Jump { opcode, target } => {
            let distance = relative(*target)?;
            if wide {
                out.push(if *opcode == JSR { JSR_W } else { GOTO_W });
                push_be(out, distance as i32);
            } else {
                let short =
                    i16::try_from(distance).map_err(|_| Error::BranchOutOfRange(distance))?;
                out.push(*opcode);
                push_be(out, short);
            }
        }
        Insn::TableSwitch {
            default,
            low,
            targets,
        } => {
            out.push(TABLESWITCH);
            out.resize(out.len() + switch_padding(offset), 0);
            push_be(out, relative(*default)? as i32);
            push_be(out, *low);
            let high = i64::from(*low) + targets.len() as i64 - 1;
            let high = i32::try_from(high)
                .map_err(|_| malformed_error!("tableswitch key range overflows"))?;
            push_be(out, high);
            for target in targets {
                push_be(out, relative(*target)? as i32);
            }
        }
        Insn::LookupSwitch { default, pairs } => {
            out.push(LOOKUPSWITCH);
            out.resize(out.len() + switch_padding(offset), 0);
            push_be(out, relative(*default)? as i32);
            push_be(out, pairs.len() as i32);
            for (key, target) in pairs {
                push_be(out, *key);
                push_be(out, relative(*target)? as i32);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::decoder::{decode_instructions, LabelMap};

    #[test]
    fn labels_resolve_forward_and_backward() {
        let start = Label(0);
        let end = Label(1);
        let nodes = vec![
            Node::Label(start),
            Node::Insn(Insn::Simple(ICONST_0)),
            Node::Insn(Insn::jump(IFEQ, end)),
            Node::Insn(Insn::jump(GOTO, start)),
            Node::Label(end),
            Node::Insn(Insn::Simple(RETURN)),
        ];

        let encoded = encode_nodes(&nodes).unwrap();
        assert_eq!(
            encoded.code,
            vec![ICONST_0, IFEQ, 0x00, 0x06, GOTO, 0xFF, 0xFC, RETURN]
        );
        assert_eq!(encoded.offset(end).unwrap(), 7);
    }

    #[test]
    fn goto_widens_and_conditional_overflows() {
        let far = Label(9);
        let mut nodes = vec![Node::Insn(Insn::jump(GOTO, far))];
        nodes.extend((0..40_000).map(|_| Node::Insn(Insn::Simple(NOP))));
        nodes.push(Node::Label(far));
        nodes.push(Node::Insn(Insn::Simple(RETURN)));

        let encoded = encode_nodes(&nodes).unwrap();
        assert_eq!(encoded.code[0], GOTO_W);
        assert_eq!(encoded.offset(far).unwrap(), 5 + 40_000);

        nodes[0] = Node::Insn(Insn::jump(IFNULL, far));
        assert!(matches!(
            encode_nodes(&nodes),
            Err(Error::BranchOutOfRange(_))
        ));
    }

    #[test]
    fn undefined_label() {
        let nodes = vec![Node::Insn(Insn::jump(GOTO, Label(3)))];
        assert!(matches!(encode_nodes(&nodes), Err(Error::UndefinedLabel(3))));
    }

    #[test]
    fn switch_round_trip() {
        let (a, b, c) = (Label(0), Label(1), Label(2));
        let nodes = vec![
            Node::Insn(Insn::Simple(ICONST_1)),
            Node::Insn(Insn::LookupSwitch {
                default: c,
                pairs: vec![(1, a), (7, b)],
            }),
            Node::Label(a),
            Node::Insn(Insn::Local {
                opcode: ILOAD,
                slot: 400,
            }),
            Node::Label(b),
            Node::Insn(Insn::Iinc { slot: 1, delta: 500 }),
            Node::Label(c),
            Node::Insn(Insn::Simple(RETURN)),
        ];
        let encoded = encode_nodes(&nodes).unwrap();
        // opcode at 1, padding to 4, then 8 + 16 bytes
        assert_eq!(encoded.offset(a).unwrap(), 28);

        let mut labels = LabelMap::new();
        let decoded = decode_instructions(&encoded.code, &mut labels).unwrap();
        assert_eq!(decoded.len(), 5);
        assert_eq!(decoded[2].1, Insn::Local { opcode: ILOAD, slot: 400 });
        assert_eq!(decoded[3].1, Insn::Iinc { slot: 1, delta: 500 });
    }
}
