//! Label-based instruction representation.
//!
//! Branch targets are [`Label`]s rather than byte offsets, so instructions can be inserted or
//! removed anywhere in a method body without patching offsets by hand. Offsets only exist
//! again after [`crate::assembly::encoder`] lays the body out.

use std::fmt;

use crate::{
    assembly::opcodes::{self, *},
    classfile::descriptor::ValueKind,
};

/// A position in a method body.
///
/// Labels are unique within one [`crate::assembly::MethodBody`]; they carry no offset of
/// their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    /// Any opcode without operands, including the `xload_n`/`xstore_n` short forms
    Simple(u8),
    /// `bipush`, `sipush` or `newarray` with its immediate
    Push {
        /// The opcode
        opcode: u8,
        /// The immediate value or array type code
        value: i32,
    },
    /// `xload`, `xstore` or `ret` with an explicit slot; `wide` is chosen on encode
    Local {
        /// The opcode
        opcode: u8,
        /// Local variable slot
        slot: u16,
    },
    /// `iinc`; `wide` is chosen on encode
    Iinc {
        /// Local variable slot
        slot: u16,
        /// Signed increment
        delta: i16,
    },
    /// Any instruction whose only operand is a constant pool index
    Constant {
        /// The opcode
        opcode: u8,
        /// Constant pool index
        index: u16,
    },
    /// `invokeinterface`
    InvokeInterface {
        /// Interface method reference
        index: u16,
        /// Argument slot count including the receiver
        count: u8,
    },
    /// `invokedynamic`
    InvokeDynamic {
        /// Call site reference
        index: u16,
    },
    /// `multianewarray`
    MultiANewArray {
        /// Array class reference
        index: u16,
        /// Number of dimensions to create
        dimensions: u8,
    },
    /// Conditional branch, `goto` or `jsr`; `goto_w`/`jsr_w` are normalized here
    Jump {
        /// The opcode (never `goto_w`/`jsr_w`)
        opcode: u8,
        /// Branch target
        target: Label,
    },
    /// `tableswitch`
    TableSwitch {
        /// Default target
        default: Label,
        /// Lowest key
        low: i32,
        /// Targets for keys `low..=low + targets.len() - 1`
        targets: Vec<Label>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Default target
        default: Label,
        /// Sorted `(key, target)` pairs
        pairs: Vec<(i32, Label)>,
    },
}

impl Insn {
    /// Load a local of the given kind.
    #[must_use]
    pub fn load(kind: ValueKind, slot: u16) -> Self {
        let opcode = match kind {
            ValueKind::Int => ILOAD,
            ValueKind::Long => LLOAD,
            ValueKind::Float => FLOAD,
            ValueKind::Double => DLOAD,
            ValueKind::Reference => ALOAD,
        };
        Insn::Local { opcode, slot }
    }

    /// Store into a local of the given kind.
    #[must_use]
    pub fn store(kind: ValueKind, slot: u16) -> Self {
        let opcode = match kind {
            ValueKind::Int => ISTORE,
            ValueKind::Long => LSTORE,
            ValueKind::Float => FSTORE,
            ValueKind::Double => DSTORE,
            ValueKind::Reference => ASTORE,
        };
        Insn::Local { opcode, slot }
    }

    /// Return a value of the given kind, or `return` for `None`.
    #[must_use]
    pub fn return_value(kind: Option<ValueKind>) -> Self {
        Insn::Simple(match kind {
            None => RETURN,
            Some(ValueKind::Int) => IRETURN,
            Some(ValueKind::Long) => LRETURN,
            Some(ValueKind::Float) => FRETURN,
            Some(ValueKind::Double) => DRETURN,
            Some(ValueKind::Reference) => ARETURN,
        })
    }

    /// Push an integer constant using the shortest encoding.
    #[must_use]
    pub fn int(value: i16) -> Self {
        let value = i32::from(value);
        match value {
            -1..=5 => Insn::Simple((ICONST_0 as i32 + value) as u8),
            -128..=127 => Insn::Push {
                opcode: BIPUSH,
                value,
            },
            _ => Insn::Push {
                opcode: SIPUSH,
                value,
            },
        }
    }

    /// A jump to `target`.
    #[must_use]
    pub fn jump(opcode: u8, target: Label) -> Self {
        Insn::Jump { opcode, target }
    }

    /// The opcode this instruction encodes with (ignoring widening).
    #[must_use]
    pub fn opcode(&self) -> u8 {
        match self {
            Insn::Simple(opcode)
            | Insn::Push { opcode, .. }
            | Insn::Local { opcode, .. }
            | Insn::Constant { opcode, .. }
            | Insn::Jump { opcode, .. } => *opcode,
            Insn::Iinc { .. } => IINC,
            Insn::InvokeInterface { .. } => INVOKEINTERFACE,
            Insn::InvokeDynamic { .. } => INVOKEDYNAMIC,
            Insn::MultiANewArray { .. } => MULTIANEWARRAY,
            Insn::TableSwitch { .. } => TABLESWITCH,
            Insn::LookupSwitch { .. } => LOOKUPSWITCH,
        }
    }

    /// Returns `true` if control never falls through past this instruction.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        opcodes::is_terminal(self.opcode())
    }

    /// Every label this instruction may transfer control to.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Insn::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, l)| *l))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The local variable slot this instruction reads or writes, its width in slots, and
    /// whether it is a store.
    ///
    /// Covers the explicit forms, the `_n` short forms and `iinc`.
    #[must_use]
    pub fn local_access(&self) -> Option<LocalAccess> {
        match self {
            Insn::Local { opcode, slot } => {
                let (width, store) = match *opcode {
                    ILOAD | FLOAD | ALOAD => (1, false),
                    LLOAD | DLOAD => (2, false),
                    ISTORE | FSTORE | ASTORE => (1, true),
                    LSTORE | DSTORE => (2, true),
                    _ => (1, false), // ret
                };
                Some(LocalAccess {
                    slot: *slot,
                    width,
                    store,
                })
            }
            Insn::Iinc { slot, .. } => Some(LocalAccess {
                slot: *slot,
                width: 1,
                store: true,
            }),
            Insn::Simple(opcode @ ILOAD_0..=ALOAD_3) => {
                let family = (opcode - ILOAD_0) / 4;
                Some(LocalAccess {
                    slot: u16::from((opcode - ILOAD_0) % 4),
                    width: if family == 1 || family == 3 { 2 } else { 1 },
                    store: false,
                })
            }
            Insn::Simple(opcode @ ISTORE_0..=ASTORE_3) => {
                let family = (opcode - ISTORE_0) / 4;
                Some(LocalAccess {
                    slot: u16::from((opcode - ISTORE_0) % 4),
                    width: if family == 1 || family == 3 { 2 } else { 1 },
                    store: true,
                })
            }
            _ => None,
        }
    }
}

/// A local variable access made by one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAccess {
    /// First slot touched
    pub slot: u16,
    /// Number of slots touched
    pub width: u16,
    /// `true` for stores and `iinc`
    pub store: bool,
}

/// One element of a method body's instruction list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A position marker
    Label(Label),
    /// An instruction
    Insn(Insn),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_local_access() {
        let lload_2 = Insn::Simple(0x20);
        assert_eq!(
            lload_2.local_access(),
            Some(LocalAccess {
                slot: 2,
                width: 2,
                store: false
            })
        );
        let astore_1 = Insn::Simple(0x4C);
        assert_eq!(astore_1.local_access().map(|a| (a.slot, a.store)), Some((1, true)));
        assert_eq!(Insn::Simple(NOP).local_access(), None);
    }

    #[test]
    fn int_constants_choose_shortest_form() {
        assert_eq!(Insn::int(-1), Insn::Simple(ICONST_M1));
        assert_eq!(Insn::int(5), Insn::Simple(0x08));
        assert_eq!(Insn::int(100).opcode(), BIPUSH);
        assert_eq!(Insn::int(1000).opcode(), SIPUSH);
    }

    #[test]
    fn targets_of_switches() {
        let switch = Insn::LookupSwitch {
            default: Label(0),
            pairs: vec![(1, Label(1)), (5, Label(2))],
        };
        assert_eq!(switch.targets(), vec![Label(0), Label(1), Label(2)]);
        assert!(switch.is_terminal());
        assert_eq!(Insn::load(ValueKind::Double, 3).opcode(), DLOAD);
    }
}
