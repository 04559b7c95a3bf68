//! Parameter validation.
//!
//! Parameters marked `NotNull` or `NonNegative` get a check at method entry that throws
//! `java/lang/IllegalArgumentException` naming the parameter, the method and the owner.
//! `NotNull` applies to reference parameters; `NonNegative` to `int`, `short`, `byte`,
//! `long`, `float` and `double` parameters. Floating-point `NaN` fails the check.
//!
//! The checks run before the original first instruction, in parameter order. The inserted
//! entry label reports the body's first source line, so a failing check points at the
//! method rather than at nothing.

use crate::{
    assembly::{opcodes, Frame, Insn, Label, LineNumber, Node},
    classfile::descriptor::{FieldType, ValueKind},
    metadata::{MethodInfo, ParameterInfo, ScannedUnit},
    weave::{
        markers::{MarkerKind, MarkerType},
        rewriter::ClassRewriter,
        scope::ScopeTracker,
        stage::{Stage, WeaveContext},
    },
    Result,
};

/// Exception thrown by a failed check.
pub const VIOLATION_EXCEPTION: &str = "java/lang/IllegalArgumentException";

/// Inserts entry checks for `NotNull` and `NonNegative` parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    NotNull,
    NonNegative,
}

/// A check resolved against the constant pool.
struct PlannedCheck {
    check: Check,
    kind: ValueKind,
    slot: u16,
    message: u16,
}

impl Stage for ValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn description(&self) -> &'static str {
        "Checks marked parameters at method entry"
    }

    fn applies(&self, unit: &ScannedUnit, _context: &WeaveContext<'_>) -> Result<bool> {
        Ok(unit
            .content
            .methods
            .iter()
            .any(|method| method.has_body() && !checks_of(method).is_empty()))
    }

    fn rewrite(
        &self,
        rewriter: &mut ClassRewriter,
        unit: &ScannedUnit,
        _context: &WeaveContext<'_>,
    ) -> Result<bool> {
        let mut modified = false;
        for method in unit.content.methods.iter().filter(|method| method.has_body()) {
            let checks = checks_of(method);
            if checks.is_empty() {
                continue;
            }
            insert_checks(rewriter, unit, method, &checks)?;
            modified = true;
        }
        Ok(modified)
    }
}

/// The checks requested by the parameter markers of `method`.
fn checks_of(method: &MethodInfo) -> Vec<(&ParameterInfo, Check)> {
    let not_null = MarkerType::NotNull.unit();
    let non_negative = MarkerType::NonNegative.unit();
    let mut checks = Vec::new();
    for parameter in &method.parameters {
        if parameter.markers.contains(&not_null) {
            checks.push((parameter, Check::NotNull));
        }
        if parameter.markers.contains(&non_negative) {
            checks.push((parameter, Check::NonNegative));
        }
    }
    checks
}

fn insert_checks(
    rewriter: &mut ClassRewriter,
    unit: &ScannedUnit,
    method: &MethodInfo,
    checks: &[(&ParameterInfo, Check)],
) -> Result<()> {
    let owner = unit.unit();
    let Some(index) = rewriter.find_method(&method.name, &method.descriptor)? else {
        return Err(invariant_error!(
            "{} lost {}{} before the validation stage",
            owner,
            method.name,
            method.descriptor
        ));
    };

    let mut planned = Vec::with_capacity(checks.len());
    for (parameter, check) in checks {
        // Rejects unexpected marker arguments
        MarkerKind::collect(&parameter.markers)?;
        let field = FieldType::parse(&parameter.descriptor)?;
        let accepted = match check {
            Check::NotNull => field.is_reference(),
            Check::NonNegative => matches!(
                field,
                FieldType::Base('I' | 'S' | 'B' | 'J' | 'F' | 'D')
            ),
        };
        if !accepted {
            return Err(contract_error!(
                owner,
                "{} cannot apply to parameter '{}' of {}.{} with type {}",
                match check {
                    Check::NotNull => MarkerType::NotNull,
                    Check::NonNegative => MarkerType::NonNegative,
                },
                parameter.name,
                owner,
                method.name,
                parameter.descriptor
            ));
        }
        let text = format!(
            "parameter '{}' of {}.{} must not be {}",
            parameter.name,
            owner,
            method.name,
            match check {
                Check::NotNull => "null",
                Check::NonNegative => "negative",
            }
        );
        planned.push(PlannedCheck {
            check: *check,
            kind: field.kind(),
            slot: parameter.slot,
            message: rewriter.pool_mut().add_string(&text)?,
        });
    }

    let pool = rewriter.pool_mut();
    let exception = pool.add_class(VIOLATION_EXCEPTION)?;
    let constructor = pool.add_method_ref(VIOLATION_EXCEPTION, "<init>", "(Ljava/lang/String;)V")?;
    let context = rewriter.frame_context(index)?;
    let stack_map = rewriter.class().requires_stack_map();

    let Some(body) = rewriter.body_mut(index)? else {
        return Ok(());
    };
    let entry = body.new_label();
    let mut inserted = vec![entry];
    let mut nodes = vec![Node::Label(entry)];
    for check in &planned {
        let pass = body.new_label();
        inserted.push(pass);
        nodes.push(Node::Insn(Insn::load(check.kind, check.slot)));
        match (check.check, check.kind) {
            (Check::NotNull, _) => nodes.push(Node::Insn(Insn::jump(opcodes::IFNONNULL, pass))),
            (Check::NonNegative, kind) => {
                match kind {
                    ValueKind::Long => {
                        nodes.push(Node::Insn(Insn::Simple(opcodes::LCONST_0)));
                        nodes.push(Node::Insn(Insn::Simple(opcodes::LCMP)));
                    }
                    ValueKind::Float => {
                        nodes.push(Node::Insn(Insn::Simple(opcodes::FCONST_0)));
                        nodes.push(Node::Insn(Insn::Simple(opcodes::FCMPL)));
                    }
                    ValueKind::Double => {
                        nodes.push(Node::Insn(Insn::Simple(opcodes::DCONST_0)));
                        nodes.push(Node::Insn(Insn::Simple(opcodes::DCMPL)));
                    }
                    ValueKind::Int | ValueKind::Reference => {}
                }
                nodes.push(Node::Insn(Insn::jump(opcodes::IFGE, pass)));
            }
        }
        nodes.extend(throw(exception, constructor, check.message));
        nodes.push(Node::Label(pass));
    }
    body.insert(0, nodes);

    let mut tracker = ScopeTracker::walk(body, context.argument_slots())?;
    for label in &inserted {
        tracker.visit_inserted_label(*label);
    }
    if let Some(line) = tracker.line_for(entry)? {
        body.lines.push(LineNumber { start: entry, line });
    }
    if stack_map {
        let locals = context.initial_locals();
        body.frames
            .extend(inserted[1..].iter().map(|label: &Label| Frame {
                label: *label,
                locals: locals.clone(),
                stack: Vec::new(),
            }));
    }

    log::debug!(
        "Inserted {} parameter check(s) into {}.{}{}",
        planned.len(),
        owner,
        method.name,
        method.descriptor
    );
    Ok(())
}

fn throw(exception: u16, constructor: u16, message: u16) -> [Node; 5] {
    [
        Node::Insn(Insn::Constant {
            opcode: opcodes::NEW,
            index: exception,
        }),
        Node::Insn(Insn::Simple(opcodes::DUP)),
        Node::Insn(Insn::Constant {
            opcode: opcodes::LDC,
            index: message,
        }),
        Node::Insn(Insn::Constant {
            opcode: opcodes::INVOKESPECIAL,
            index: constructor,
        }),
        Node::Insn(Insn::Simple(opcodes::ATHROW)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::MethodBody,
        classfile::{AnnotationSpec, ClassBuilder, ClassFile, MethodAccess, MethodSpec},
        classpath::MemorySource,
        metadata::Scanner,
        weave::{config::WeaveConfig, injection::InjectionIndex},
        Error,
    };
    use std::sync::OnceLock;

    fn checked(descriptor: &str, marker: &str, major: u16) -> Vec<u8> {
        let marker = format!("Lio/classweave/marker/{marker};");
        ClassBuilder::new("com/example/Account")
            .version(major, 0)
            .method(
                MethodSpec::new(MethodAccess::PUBLIC, "deposit", descriptor)
                    .parameter_annotation(0, AnnotationSpec::new(&marker))
                    .parameter_names(&["amount"])
                    .code(|_, body| {
                        body.push(Insn::Simple(opcodes::RETURN));
                        Ok(())
                    }),
            )
            .build()
            .unwrap()
    }

    fn weave(bytes: &[u8]) -> Result<Vec<u8>> {
        let scanner = Scanner::new(MemorySource::new());
        let config = WeaveConfig::default();
        let injections: OnceLock<InjectionIndex> = OnceLock::new();
        let context = WeaveContext::new(&scanner, &config, &injections);
        let unit = ScannedUnit::from_bytes(bytes)?;
        let mut rewriter = ClassRewriter::parse(bytes)?;
        assert!(ValidationStage.applies(&unit, &context)?);
        assert!(ValidationStage.rewrite(&mut rewriter, &unit, &context)?);
        Ok(rewriter.finish()?.unwrap())
    }

    fn body_of(bytes: &[u8]) -> MethodBody {
        let class = ClassFile::parse(bytes).unwrap();
        let index = class.methods.len() - 1;
        let mut rewriter = ClassRewriter::new(class).unwrap();
        rewriter.body_mut(index).unwrap().unwrap().clone()
    }

    #[test]
    fn null_check_throws_with_a_message() {
        let woven = weave(&checked("(Ljava/lang/String;)V", "NotNull", 52)).unwrap();
        let body = body_of(&woven);
        let opcodes: Vec<u8> = body.instructions().map(Insn::opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                opcodes::ALOAD,
                opcodes::IFNONNULL,
                opcodes::NEW,
                opcodes::DUP,
                opcodes::LDC,
                opcodes::INVOKESPECIAL,
                opcodes::ATHROW,
                opcodes::RETURN
            ]
        );
        assert_eq!(body.frames.len(), 1);

        let class = ClassFile::parse(&woven).unwrap();
        let expected: &[u8] = b"parameter 'amount' of com.example.Account.deposit must not be null";
        assert!(class.pool.iter().any(|(_, constant)| matches!(
            constant,
            crate::classfile::Constant::Utf8(text) if text.as_slice() == expected
        )));
    }

    #[test]
    fn long_check_compares_against_zero() {
        let body = body_of(&weave(&checked("(J)V", "NonNegative", 52)).unwrap());
        let opcodes: Vec<u8> = body.instructions().map(Insn::opcode).take(4).collect();
        assert_eq!(
            opcodes,
            vec![opcodes::LLOAD, opcodes::LCONST_0, opcodes::LCMP, opcodes::IFGE]
        );
    }

    #[test]
    fn old_class_files_need_no_frames() {
        let body = body_of(&weave(&checked("(I)V", "NonNegative", 49)).unwrap());
        assert!(body.frames.is_empty());
    }

    #[test]
    fn mismatched_parameter_types_are_rejected() {
        assert!(matches!(
            weave(&checked("(I)V", "NotNull", 52)),
            Err(Error::ContractViolation { .. })
        ));
        assert!(matches!(
            weave(&checked("(Ljava/lang/Integer;)V", "NonNegative", 52)),
            Err(Error::ContractViolation { .. })
        ));
        assert!(matches!(
            weave(&checked("(Z)V", "NonNegative", 52)),
            Err(Error::ContractViolation { .. })
        ));
    }
}
