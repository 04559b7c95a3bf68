//! Bytecode decoding into label-based instructions.
//!
//! Decoding happens in a single forward pass over the `code` array. Every byte offset that
//! anything refers to (branch targets, switch cases, exception ranges, debug tables, frames)
//! is turned into a [`Label`] through a shared [`LabelMap`], so an offset referenced from
//! several places maps to one label.

use std::collections::BTreeMap;

use crate::{
    assembly::{opcodes::*, Insn, Label},
    file::parser::Parser,
    Error, Result,
};

/// Assigns one [`Label`] per referenced code offset.
#[derive(Debug, Default, Clone)]
pub struct LabelMap {
    by_offset: BTreeMap<usize, Label>,
    next: u32,
}

impl LabelMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The label for `offset`, created on first use.
    pub fn at(&mut self, offset: usize) -> Label {
        let next = &mut self.next;
        *self.by_offset.entry(offset).or_insert_with(|| {
            let label = Label(*next);
            *next += 1;
            label
        })
    }

    /// The label for `offset`, if one was created.
    #[must_use]
    pub fn get(&self, offset: usize) -> Option<Label> {
        self.by_offset.get(&offset).copied()
    }

    /// All `(offset, label)` pairs in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Label)> + '_ {
        self.by_offset.iter().map(|(o, l)| (*o, *l))
    }

    /// The first label id not yet handed out.
    #[must_use]
    pub fn next_id(&self) -> u32 {
        self.next
    }
}

/// Decode a `code` array into `(offset, instruction)` pairs.
///
/// # Errors
/// Returns [`crate::Error::InvalidOpcode`] for undefined opcodes, [`crate::Error::Malformed`]
/// for branch targets outside the code array, and [`crate::Error::OutOfBounds`] for
/// truncated operands.
pub fn decode_instructions(code: &[u8], labels: &mut LabelMap) -> Result<Vec<(usize, Insn)>> {
    let mut parser = Parser::new(code);
    let mut decoded = Vec::with_capacity(code.len() / 2);

    while parser.has_more_data() {
        let offset = parser.pos();
        let opcode = parser.read_be::<u8>()?;
        let insn = decode_one(&mut parser, opcode, offset, code.len(), labels)?;
        decoded.push((offset, insn));
    }

    Ok(decoded)
}

fn branch_target(
    offset: usize,
    relative: i64,
    code_length: usize,
    labels: &mut LabelMap,
) -> Result<Label> {
    let target = offset as i64 + relative;
    if target < 0 || target as usize >= code_length {
        return Err(malformed_error!(
            "Branch at {} targets {} outside code of length {}",
            offset,
            target,
            code_length
        ));
    }
    Ok(labels.at(target as usize))
}

fn decode_one(
    parser: &mut Parser,
    opcode: u8,
    offset: usize,
    code_length: usize,
    labels: &mut LabelMap,
) -> Result<Insn> {
    if simple_stack_delta(opcode).is_some() {
        return Ok(Insn::Simple(opcode));
    }

    Ok(match opcode {
        BIPUSH => Insn::Push {
            opcode,
            value: i32::from(parser.read_be::<i8>()?),
        },
        SIPUSH => Insn::Push {
            opcode,
            value: i32::from(parser.read_be::<i16>()?),
        },
        NEWARRAY => Insn::Push {
            opcode,
            value: i32::from(parser.read_be::<u8>()?),
        },
        LDC => Insn::Constant {
            opcode,
            index: u16::from(parser.read_be::<u8>()?),
        },
        LDC_W | LDC2_W | GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
            Insn::Constant {
                opcode,
                index: parser.read_be()?,
            }
        }
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Local {
            opcode,
            slot: u16::from(parser.read_be::<u8>()?),
        },
        IINC => Insn::Iinc {
            slot: u16::from(parser.read_be::<u8>()?),
            delta: i16::from(parser.read_be::<i8>()?),
        },
        WIDE => {
            let widened = parser.read_be::<u8>()?;
            match widened {
                IINC => Insn::Iinc {
                    slot: parser.read_be()?,
                    delta: parser.read_be()?,
                },
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Local {
                    opcode: widened,
                    slot: parser.read_be()?,
                },
                _ => {
                    return Err(Error::InvalidOpcode {
                        opcode: widened,
                        offset: offset + 1,
                    })
                }
            }
        }
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            let relative = i64::from(parser.read_be::<i16>()?);
            Insn::Jump {
                opcode,
                target: branch_target(offset, relative, code_length, labels)?,
            }
        }
        GOTO_W | JSR_W => {
            let relative = i64::from(parser.read_be::<i32>()?);
            Insn::Jump {
                opcode: if opcode == GOTO_W { GOTO } else { JSR },
                target: branch_target(offset, relative, code_length, labels)?,
            }
        }
        TABLESWITCH => {
            parser.align(4)?;
            let default = i64::from(parser.read_be::<i32>()?);
            let low = parser.read_be::<i32>()?;
            let high = parser.read_be::<i32>()?;
            if high < low {
                return Err(malformed_error!(
                    "tableswitch at {} has high {} < low {}",
                    offset,
                    high,
                    low
                ));
            }
            let count = (i64::from(high) - i64::from(low) + 1) as usize;
            parser.ensure_remaining(count.saturating_mul(4))?;
            let default = branch_target(offset, default, code_length, labels)?;
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                let relative = i64::from(parser.read_be::<i32>()?);
                targets.push(branch_target(offset, relative, code_length, labels)?);
            }
            Insn::TableSwitch {
                default,
                low,
                targets,
            }
        }
        LOOKUPSWITCH => {
            parser.align(4)?;
            let default = i64::from(parser.read_be::<i32>()?);
            let count = parser.read_be::<i32>()?;
            if count < 0 {
                return Err(malformed_error!(
                    "lookupswitch at {} has negative pair count",
                    offset
                ));
            }
            let count = count as usize;
            parser.ensure_remaining(count.saturating_mul(8))?;
            let default = branch_target(offset, default, code_length, labels)?;
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = parser.read_be::<i32>()?;
                let relative = i64::from(parser.read_be::<i32>()?);
                pairs.push((key, branch_target(offset, relative, code_length, labels)?));
            }
            Insn::LookupSwitch { default, pairs }
        }
        INVOKEINTERFACE => {
            let index = parser.read_be()?;
            let count = parser.read_be()?;
            parser.advance_by(1)?;
            Insn::InvokeInterface { index, count }
        }
        INVOKEDYNAMIC => {
            let index = parser.read_be()?;
            parser.advance_by(2)?;
            Insn::InvokeDynamic { index }
        }
        MULTIANEWARRAY => Insn::MultiANewArray {
            index: parser.read_be()?,
            dimensions: parser.read_be()?,
        },
        _ => return Err(Error::InvalidOpcode { opcode, offset }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_stream() {
        // 0: iload_1  1: ifeq +6  4: bipush 7  6: ireturn  7: iconst_0  8: ireturn
        let code = [0x1B, IFEQ, 0x00, 0x06, BIPUSH, 0x07, IRETURN, ICONST_0, IRETURN];
        let mut labels = LabelMap::new();
        let decoded = decode_instructions(&code, &mut labels).unwrap();

        assert_eq!(decoded.len(), 6);
        assert_eq!(decoded[0], (0, Insn::Simple(0x1B)));
        assert_eq!(
            decoded[1],
            (
                1,
                Insn::Jump {
                    opcode: IFEQ,
                    target: labels.get(7).unwrap()
                }
            )
        );
        assert_eq!(
            decoded[2].1,
            Insn::Push {
                opcode: BIPUSH,
                value: 7
            }
        );
    }

    #[test]
    fn switch_padding_and_wide() {
        // 0: iload_0  1: tableswitch pad(2) default=+24 low=0 high=0 [+24]  24: return
        // 21: wide iinc 300 -2 (6 bytes) ... laid out explicitly below
        let mut code = vec![0x1A, TABLESWITCH, 0, 0];
        code.extend_from_slice(&19_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&19_i32.to_be_bytes());
        // offset 20: wide iinc slot 300 by -2
        code.extend_from_slice(&[WIDE, IINC, 0x01, 0x2C, 0xFF, 0xFE]);
        let mut labels = LabelMap::new();
        let decoded = decode_instructions(&code, &mut labels).unwrap();

        match &decoded[1].1 {
            Insn::TableSwitch {
                default,
                low,
                targets,
            } => {
                assert_eq!(*low, 0);
                assert_eq!(targets, &vec![*default]);
                assert_eq!(labels.get(20), Some(*default));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(decoded[2], (20, Insn::Iinc { slot: 300, delta: -2 }));
    }

    #[test]
    fn rejects_bad_streams() {
        let mut labels = LabelMap::new();
        assert!(matches!(
            decode_instructions(&[0xCB], &mut labels),
            Err(Error::InvalidOpcode { opcode: 0xCB, .. })
        ));
        assert!(decode_instructions(&[GOTO, 0x00, 0x10], &mut labels).is_err());
        assert!(decode_instructions(&[SIPUSH, 0x00], &mut labels).is_err());
    }
}
