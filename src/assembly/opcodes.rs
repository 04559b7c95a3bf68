//! JVM opcode values and their static properties (JVMS §6.5).
//!
//! Only opcodes without operands need a stack-effect table entry here; the effect of
//! instructions that reference the constant pool depends on the referenced descriptor and is
//! computed in [`crate::assembly::analysis`].

#![allow(missing_docs)]

pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const ICONST_2: u8 = 0x05;
pub const ICONST_3: u8 = 0x06;
pub const ICONST_4: u8 = 0x07;
pub const ICONST_5: u8 = 0x08;
pub const LCONST_0: u8 = 0x09;
pub const LCONST_1: u8 = 0x0A;
pub const FCONST_0: u8 = 0x0B;
pub const FCONST_1: u8 = 0x0C;
pub const FCONST_2: u8 = 0x0D;
pub const DCONST_0: u8 = 0x0E;
pub const DCONST_1: u8 = 0x0F;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1A;
pub const ALOAD_0: u8 = 0x2A;
pub const ALOAD_3: u8 = 0x2D;
pub const IALOAD: u8 = 0x2E;
pub const SALOAD: u8 = 0x35;
pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3A;
pub const ISTORE_0: u8 = 0x3B;
pub const ASTORE_3: u8 = 0x4E;
pub const IASTORE: u8 = 0x4F;
pub const SASTORE: u8 = 0x56;
pub const POP: u8 = 0x57;
pub const POP2: u8 = 0x58;
pub const DUP: u8 = 0x59;
pub const DUP_X1: u8 = 0x5A;
pub const DUP_X2: u8 = 0x5B;
pub const DUP2: u8 = 0x5C;
pub const DUP2_X1: u8 = 0x5D;
pub const DUP2_X2: u8 = 0x5E;
pub const SWAP: u8 = 0x5F;
pub const IADD: u8 = 0x60;
pub const DNEG: u8 = 0x77;
pub const ISHL: u8 = 0x78;
pub const LUSHR: u8 = 0x7D;
pub const IAND: u8 = 0x7E;
pub const LXOR: u8 = 0x83;
pub const IINC: u8 = 0x84;
pub const I2L: u8 = 0x85;
pub const I2S: u8 = 0x93;
pub const LCMP: u8 = 0x94;
pub const FCMPL: u8 = 0x95;
pub const FCMPG: u8 = 0x96;
pub const DCMPL: u8 = 0x97;
pub const DCMPG: u8 = 0x98;
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9A;
pub const IFLT: u8 = 0x9B;
pub const IFGE: u8 = 0x9C;
pub const IFGT: u8 = 0x9D;
pub const IFLE: u8 = 0x9E;
pub const IF_ICMPEQ: u8 = 0x9F;
pub const IF_ICMPNE: u8 = 0xA0;
pub const IF_ICMPLT: u8 = 0xA1;
pub const IF_ICMPGE: u8 = 0xA2;
pub const IF_ICMPGT: u8 = 0xA3;
pub const IF_ICMPLE: u8 = 0xA4;
pub const IF_ACMPEQ: u8 = 0xA5;
pub const IF_ACMPNE: u8 = 0xA6;
pub const GOTO: u8 = 0xA7;
pub const JSR: u8 = 0xA8;
pub const RET: u8 = 0xA9;
pub const TABLESWITCH: u8 = 0xAA;
pub const LOOKUPSWITCH: u8 = 0xAB;
pub const IRETURN: u8 = 0xAC;
pub const LRETURN: u8 = 0xAD;
pub const FRETURN: u8 = 0xAE;
pub const DRETURN: u8 = 0xAF;
pub const ARETURN: u8 = 0xB0;
pub const RETURN: u8 = 0xB1;
pub const GETSTATIC: u8 = 0xB2;
pub const PUTSTATIC: u8 = 0xB3;
pub const GETFIELD: u8 = 0xB4;
pub const PUTFIELD: u8 = 0xB5;
pub const INVOKEVIRTUAL: u8 = 0xB6;
pub const INVOKESPECIAL: u8 = 0xB7;
pub const INVOKESTATIC: u8 = 0xB8;
pub const INVOKEINTERFACE: u8 = 0xB9;
pub const INVOKEDYNAMIC: u8 = 0xBA;
pub const NEW: u8 = 0xBB;
pub const NEWARRAY: u8 = 0xBC;
pub const ANEWARRAY: u8 = 0xBD;
pub const ARRAYLENGTH: u8 = 0xBE;
pub const ATHROW: u8 = 0xBF;
pub const CHECKCAST: u8 = 0xC0;
pub const INSTANCEOF: u8 = 0xC1;
pub const MONITORENTER: u8 = 0xC2;
pub const MONITOREXIT: u8 = 0xC3;
pub const WIDE: u8 = 0xC4;
pub const MULTIANEWARRAY: u8 = 0xC5;
pub const IFNULL: u8 = 0xC6;
pub const IFNONNULL: u8 = 0xC7;
pub const GOTO_W: u8 = 0xC8;
pub const JSR_W: u8 = 0xC9;

/// Net operand stack effect, in slots, of an opcode that carries no operands.
///
/// Returns `None` for opcodes that take operands or are not defined.
#[must_use]
pub fn simple_stack_delta(opcode: u8) -> Option<i32> {
    Some(match opcode {
        // nop swap, ineg..dneg, i2f f2i, i2b i2c i2s
        NOP | SWAP | 0x74..=0x77 | 0x86 | 0x8B | 0x91..=0x93 => 0,
        ACONST_NULL | ICONST_M1..=ICONST_5 | FCONST_0..=FCONST_2 => 1,
        LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => 2,
        // iload_0..aload_3, grouped by type in blocks of four
        0x1A..=0x1D | 0x22..=0x25 | 0x2A..=0x2D => 1,
        0x1E..=0x21 | 0x26..=0x29 => 2,
        // iaload laload faload daload aaload baload caload saload
        0x2E | 0x30 | 0x32..=0x35 => -1,
        0x2F | 0x31 => 0,
        // istore_0..astore_3
        0x3B..=0x3E | 0x43..=0x46 | 0x4B..=0x4E => -1,
        0x3F..=0x42 | 0x47..=0x4A => -2,
        // iastore lastore fastore dastore aastore bastore castore sastore
        0x4F | 0x51 | 0x53..=0x56 => -3,
        0x50 | 0x52 => -4,
        POP => -1,
        POP2 => -2,
        DUP | DUP_X1 | DUP_X2 => 1,
        DUP2 | DUP2_X1 | DUP2_X2 => 2,
        // add sub mul div rem: int/float pop one slot, long/double pop two
        0x60..=0x73 => {
            if (opcode - IADD) % 2 == 0 {
                -1
            } else {
                -2
            }
        }
        // shifts: the shift distance is always an int
        ISHL..=LUSHR => -1,
        // and or xor
        IAND..=LXOR => {
            if (opcode - IAND) % 2 == 0 {
                -1
            } else {
                -2
            }
        }
        // i2l i2d f2l f2d widen; l2i l2f d2i d2f narrow; l2d d2l keep width
        0x85 | 0x87 | 0x8C | 0x8D => 1,
        0x88 | 0x89 | 0x8E | 0x90 => -1,
        0x8A | 0x8F => 0,
        LCMP | DCMPL | DCMPG => -3,
        FCMPL | FCMPG => -1,
        IRETURN | FRETURN | ARETURN => -1,
        LRETURN | DRETURN => -2,
        RETURN => 0,
        ARRAYLENGTH => 0,
        ATHROW | MONITORENTER | MONITOREXIT => -1,
        _ => return None,
    })
}

/// Opcodes after which control never falls through to the next instruction.
#[must_use]
pub fn is_terminal(opcode: u8) -> bool {
    matches!(
        opcode,
        IRETURN..=RETURN | ATHROW | GOTO | GOTO_W | RET | TABLESWITCH | LOOKUPSWITCH
    )
}

/// Conditional branch opcodes that have a 16-bit offset and fall through when not taken.
#[must_use]
pub fn is_conditional_branch(opcode: u8) -> bool {
    matches!(opcode, IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL)
}

/// The `newarray` element type code for a primitive descriptor character.
#[must_use]
pub fn newarray_type(base: char) -> Option<u8> {
    Some(match base {
        'Z' => 4,
        'C' => 5,
        'F' => 6,
        'D' => 7,
        'B' => 8,
        'S' => 9,
        'I' => 10,
        'J' => 11,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_deltas() {
        assert_eq!(simple_stack_delta(ALOAD_0), Some(1));
        assert_eq!(simple_stack_delta(0x1E), Some(2)); // lload_0
        assert_eq!(simple_stack_delta(0x3F), Some(-2)); // lstore_0
        assert_eq!(simple_stack_delta(IADD), Some(-1));
        assert_eq!(simple_stack_delta(0x61), Some(-2)); // ladd
        assert_eq!(simple_stack_delta(0x79), Some(-1)); // lshl
        assert_eq!(simple_stack_delta(0x7F), Some(-2)); // land
        assert_eq!(simple_stack_delta(I2L), Some(1));
        assert_eq!(simple_stack_delta(0x88), Some(-1)); // l2i
        assert_eq!(simple_stack_delta(0x93), Some(0)); // i2s
        assert_eq!(simple_stack_delta(0x50), Some(-4)); // lastore
        assert_eq!(simple_stack_delta(LCMP), Some(-3));
        assert_eq!(simple_stack_delta(BIPUSH), None);
        assert_eq!(simple_stack_delta(GETFIELD), None);
    }

    #[test]
    fn control_flow_classes() {
        assert!(is_terminal(ARETURN));
        assert!(is_terminal(GOTO_W));
        assert!(!is_terminal(IFNULL));
        assert!(is_conditional_branch(IFNULL));
        assert!(is_conditional_branch(IF_ACMPNE));
        assert!(!is_conditional_branch(GOTO));
    }
}
