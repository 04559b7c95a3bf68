//! Operand stack depth and local variable extent of a method body.
//!
//! `max_stack` is found with a worklist over the control-flow graph: each instruction is
//! visited once with the stack depth it is entered with, handler entries start at depth 1,
//! and the deepest point reached is the answer. `max_locals` is the highest slot touched by
//! the arguments, any instruction, or any local variable table entry.

use std::collections::HashMap;

use crate::{
    assembly::{opcodes::*, FrameContext, Insn, Label, MethodBody, Node},
    classfile::{
        descriptor::{FieldType, MethodDescriptor},
        Constant, ConstantPool,
    },
    Error, Result,
};

/// Net stack effect, in slots, of one instruction.
///
/// # Errors
/// Returns [`crate::Error::ConstantPool`] or [`crate::Error::Malformed`] if a referenced
/// constant or descriptor is invalid.
pub fn stack_delta(insn: &Insn, pool: &ConstantPool) -> Result<i32> {
    Ok(match insn {
        Insn::Simple(opcode) => simple_stack_delta(*opcode).ok_or(Error::InvalidOpcode {
            opcode: *opcode,
            offset: 0,
        })?,
        Insn::Push { opcode, .. } => {
            if *opcode == NEWARRAY {
                0
            } else {
                1
            }
        }
        Insn::Local { opcode, .. } => match *opcode {
            ILOAD | FLOAD | ALOAD => 1,
            LLOAD | DLOAD => 2,
            ISTORE | FSTORE | ASTORE => -1,
            LSTORE | DSTORE => -2,
            _ => 0, // ret
        },
        Insn::Iinc { .. } => 0,
        Insn::Constant { opcode, index } => match *opcode {
            LDC | LDC_W => match pool.get(*index)? {
                Constant::Long(_) | Constant::Double(_) => 2,
                Constant::Dynamic { .. } => dynamic_constant_slots(pool, *index)?,
                _ => 1,
            },
            LDC2_W => match pool.get(*index)? {
                Constant::Dynamic { .. } => dynamic_constant_slots(pool, *index)?,
                _ => 2,
            },
            GETSTATIC => field_slots(pool, *index)?,
            PUTSTATIC => -field_slots(pool, *index)?,
            GETFIELD => field_slots(pool, *index)? - 1,
            PUTFIELD => -field_slots(pool, *index)? - 1,
            INVOKEVIRTUAL | INVOKESPECIAL => invoke_delta(pool, *index, true)?,
            INVOKESTATIC => invoke_delta(pool, *index, false)?,
            NEW => 1,
            _ => 0, // anewarray checkcast instanceof
        },
        Insn::InvokeInterface { index, .. } => invoke_delta(pool, *index, true)?,
        Insn::InvokeDynamic { index } => {
            let descriptor = MethodDescriptor::parse(&pool.dynamic_descriptor(*index)?)?;
            i32::from(descriptor.return_slots()) - i32::from(descriptor.parameter_slots())
        }
        Insn::MultiANewArray { dimensions, .. } => 1 - i32::from(*dimensions),
        Insn::Jump { opcode, .. } => match *opcode {
            GOTO => 0,
            JSR => 1,
            IFEQ..=IFLE | IFNULL | IFNONNULL => -1,
            _ => -2, // if_icmp*, if_acmp*
        },
        Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => -1,
    })
}

fn field_slots(pool: &ConstantPool, index: u16) -> Result<i32> {
    let (_, _, descriptor) = pool.member_ref(index)?;
    Ok(i32::from(FieldType::parse(&descriptor)?.slots()))
}

fn dynamic_constant_slots(pool: &ConstantPool, index: u16) -> Result<i32> {
    Ok(i32::from(FieldType::parse(&pool.dynamic_descriptor(index)?)?.slots()))
}

fn invoke_delta(pool: &ConstantPool, index: u16, has_receiver: bool) -> Result<i32> {
    let (_, _, descriptor) = pool.member_ref(index)?;
    let descriptor = MethodDescriptor::parse(&descriptor)?;
    Ok(i32::from(descriptor.return_slots())
        - i32::from(descriptor.parameter_slots())
        - i32::from(has_receiver))
}

/// Compute the maximum operand stack depth of `body`.
///
/// Unreachable code does not contribute.
///
/// # Errors
/// Returns [`crate::Error::UndefinedLabel`] for branches to unplaced labels, and
/// [`crate::Error::Malformed`] if some path pops more than it pushed.
pub fn max_stack(body: &MethodBody, pool: &ConstantPool) -> Result<u16> {
    let mut label_index: HashMap<Label, usize> = HashMap::new();
    for (index, node) in body.nodes.iter().enumerate() {
        if let Node::Label(label) = node {
            label_index.insert(*label, index);
        }
    }
    let position = |label: Label| -> Result<usize> {
        label_index
            .get(&label)
            .copied()
            .ok_or(Error::UndefinedLabel(label.0))
    };

    let mut entry_depth: Vec<Option<i32>> = vec![None; body.nodes.len()];
    let mut worklist: Vec<(usize, i32)> = vec![(0, 0)];
    for handler in &body.handlers {
        worklist.push((position(handler.handler)?, 1));
    }

    let mut max = 0i32;
    while let Some((start, depth)) = worklist.pop() {
        let mut index = start;
        let mut depth = depth;
        while index < body.nodes.len() {
            if entry_depth[index].is_some() {
                break;
            }
            entry_depth[index] = Some(depth);

            if let Node::Insn(insn) = &body.nodes[index] {
                depth += stack_delta(insn, pool)?;
                if depth < 0 {
                    return Err(malformed_error!(
                        "Operand stack underflow at instruction #{}",
                        index
                    ));
                }
                max = max.max(depth);

                for target in insn.targets() {
                    worklist.push((position(target)?, depth));
                }
                if insn.is_terminal() {
                    break;
                }
            }
            index += 1;
        }
    }

    u16::try_from(max).map_err(|_| malformed_error!("Operand stack depth {} exceeds 65535", max))
}

/// Compute the number of local variable slots `body` needs.
#[must_use]
pub fn max_locals(body: &MethodBody, context: &FrameContext) -> u16 {
    let mut max = u32::from(context.argument_slots());
    for node in &body.nodes {
        if let Node::Insn(insn) = node {
            if let Some(access) = insn.local_access() {
                max = max.max(u32::from(access.slot) + u32::from(access.width));
            }
        }
    }
    for local in &body.locals {
        let width = FieldType::parse_prefix(&local.descriptor)
            .map(|(field, _)| field.slots())
            .unwrap_or(1);
        max = max.max(u32::from(local.slot) + u32::from(width));
    }
    u16::try_from(max).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::ExceptionHandler, classfile::MethodAccess};

    #[test]
    fn field_and_invoke_effects() {
        let mut pool = ConstantPool::new();
        let field = pool.add_field_ref("a/B", "total", "J").unwrap();
        let method = pool.add_method_ref("a/B", "mix", "(IJ)D").unwrap();
        let call = pool.add_interface_method_ref("a/C", "run", "()V").unwrap();

        let getfield = Insn::Constant {
            opcode: GETFIELD,
            index: field,
        };
        assert_eq!(stack_delta(&getfield, &pool).unwrap(), 1);
        let putstatic = Insn::Constant {
            opcode: PUTSTATIC,
            index: field,
        };
        assert_eq!(stack_delta(&putstatic, &pool).unwrap(), -2);
        let invoke = Insn::Constant {
            opcode: INVOKEVIRTUAL,
            index: method,
        };
        assert_eq!(stack_delta(&invoke, &pool).unwrap(), 2 - 3 - 1);
        let interface = Insn::InvokeInterface {
            index: call,
            count: 1,
        };
        assert_eq!(stack_delta(&interface, &pool).unwrap(), -1);
    }

    #[test]
    fn max_stack_follows_branches_and_handlers() {
        let pool = ConstantPool::new();
        let mut body = MethodBody::new();
        let else_branch = body.new_label();
        let start = body.new_label();
        let end = body.new_label();
        let handler = body.new_label();

        body.place(start);
        body.push(Insn::Simple(0x1A)); // iload_0
        body.push(Insn::jump(IFEQ, else_branch));
        body.push(Insn::Simple(LCONST_1));
        body.push(Insn::Simple(LCONST_1));
        body.push(Insn::Simple(0x61)); // ladd
        body.push(Insn::Simple(LRETURN));
        body.place(else_branch);
        body.push(Insn::Simple(LCONST_0));
        body.push(Insn::Simple(LRETURN));
        body.place(end);
        body.place(handler);
        body.push(Insn::Simple(ATHROW));
        body.handlers.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type: 0,
        });

        assert_eq!(max_stack(&body, &pool).unwrap(), 4);

        let context = FrameContext::new("a/B", "f", "(I)J", MethodAccess::STATIC).unwrap();
        assert_eq!(max_locals(&body, &context), 1);
    }

    #[test]
    fn underflow_is_malformed() {
        let pool = ConstantPool::new();
        let mut body = MethodBody::new();
        body.push(Insn::Simple(POP));
        body.push(Insn::Simple(RETURN));
        assert!(max_stack(&body, &pool).is_err());
    }
}
