//! Retry wrappers.
//!
//! A method marked `Retry(attempts, on)` is renamed to `name$retry`, made private and
//! synthetic, and replaced by a wrapper with the original name, access, signature and
//! annotations. The wrapper calls the renamed method and, when a throwable assignable to
//! `on` escapes it, calls again until `attempts` calls have been made. The last failure is
//! rethrown unchanged.
//!
//! The wrapper body is:
//!
//! ```text
//!         push attempts; istore c
//! head:   load receiver and arguments; invoke name$retry
//! end:    return
//! catch:  iinc c, -1; iload c; ifle rethrow
//!         pop; goto head
//! rethrow: athrow
//! ```
//!
//! with one exception handler covering `head..end` for `on`.

use crate::{
    assembly::{opcodes, ExceptionHandler, Frame, Insn, VType},
    classfile::{descriptor::ValueKind, AccessLevel, MethodAccess, MethodSpec},
    metadata::{MethodInfo, ScannedUnit, UnitKind, UnitRef},
    weave::{
        markers::{MarkerKind, MarkerType},
        rewriter::{ClassRewriter, ANNOTATION_ATTRIBUTES},
        scope::ScopeTracker,
        stage::{Stage, WeaveContext},
    },
    Result,
};

/// Suffix of the renamed original method.
pub const RETRY_SUFFIX: &str = "$retry";

/// Wraps `Retry` methods in a retry loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryStage;

impl Stage for RetryStage {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn description(&self) -> &'static str {
        "Wraps marked methods in a bounded retry loop"
    }

    fn applies(&self, unit: &ScannedUnit, _context: &WeaveContext<'_>) -> Result<bool> {
        let marker = MarkerType::Retry.unit();
        let marked = unit.content.methods.with_marker(&marker).next().is_some();
        Ok(marked)
    }

    fn rewrite(
        &self,
        rewriter: &mut ClassRewriter,
        unit: &ScannedUnit,
        _context: &WeaveContext<'_>,
    ) -> Result<bool> {
        let marker = MarkerType::Retry.unit();
        let mut modified = false;
        for method in unit.content.methods.with_marker(&marker) {
            let Some(MarkerKind::Retry { attempts, on }) = MarkerKind::collect(&method.markers)?
                .into_iter()
                .find(|kind| kind.marker_type() == MarkerType::Retry)
            else {
                continue;
            };
            if wrap(rewriter, unit, method, attempts, &on)? {
                modified = true;
            }
        }
        Ok(modified)
    }
}

fn wrap(
    rewriter: &mut ClassRewriter,
    unit: &ScannedUnit,
    method: &MethodInfo,
    attempts: u16,
    on: &UnitRef,
) -> Result<bool> {
    let owner = unit.unit();
    if unit.info.kind == UnitKind::Interface {
        return Err(contract_error!(
            owner,
            "Retry on {}.{} is not supported in interfaces",
            owner,
            method.name
        ));
    }
    if method.is_initializer() {
        return Err(contract_error!(
            owner,
            "Retry cannot wrap the initializer {}.{}{}",
            owner,
            method.name,
            method.descriptor
        ));
    }
    if !method.has_body() {
        return Err(contract_error!(
            owner,
            "Retry on {}.{}{} requires a method with a body",
            owner,
            method.name,
            method.descriptor
        ));
    }

    let renamed = format!("{}{RETRY_SUFFIX}", method.name);
    if rewriter.find_method(&renamed, &method.descriptor)?.is_some() {
        log::debug!("{owner}.{} is already wrapped", method.name);
        return Ok(false);
    }
    let Some(index) = rewriter.find_method(&method.name, &method.descriptor)? else {
        return Err(invariant_error!(
            "{} lost {}{} before the retry stage",
            owner,
            method.name,
            method.descriptor
        ));
    };
    let attempts = i16::try_from(attempts)
        .map_err(|_| contract_error!(owner, "Retry attempts {} out of range", attempts))?;

    let context = rewriter.frame_context(index)?;
    let stack_map = rewriter.class().requires_stack_map();
    let moved = rewriter.take_method_attributes(index, ANNOTATION_ATTRIBUTES)?;
    rewriter.rename_method(index, &renamed)?;
    rewriter.set_method_access(
        index,
        method.access.with_level(AccessLevel::Private) | MethodAccess::SYNTHETIC,
    )?;

    let counter = ScopeTracker::new(context.argument_slots()).fresh_slot(1);
    let arguments: Vec<(ValueKind, u16)> = context
        .descriptor
        .parameters
        .iter()
        .map(|parameter| parameter.kind())
        .zip(context.descriptor.parameter_slot_indices(context.is_static))
        .collect();
    let returns = context.descriptor.returns.as_ref().map(|returns| returns.kind());
    let is_static = context.is_static;
    let owner_name = owner.internal_name().to_string();
    let catch = on.internal_name().to_string();
    let mut loop_locals = context.initial_locals();
    loop_locals.push(VType::Integer);
    let target_name = renamed.clone();
    let descriptor = method.descriptor.clone();

    let mut spec = MethodSpec::new(method.access, &method.name, &method.descriptor).code(
        move |pool, body| {
            let target = pool.add_method_ref(&owner_name, &target_name, &descriptor)?;
            let catch_type = pool.add_class(&catch)?;
            let head = body.new_label();
            let end = body.new_label();
            let handler = body.new_label();
            let rethrow = body.new_label();

            body.push(Insn::int(attempts));
            body.push(Insn::store(ValueKind::Int, counter));
            body.place(head);
            if !is_static {
                body.push(Insn::load(ValueKind::Reference, 0));
            }
            for (kind, slot) in &arguments {
                body.push(Insn::load(*kind, *slot));
            }
            body.push(Insn::Constant {
                opcode: if is_static {
                    opcodes::INVOKESTATIC
                } else {
                    opcodes::INVOKESPECIAL
                },
                index: target,
            });
            body.place(end);
            body.push(Insn::return_value(returns));

            body.place(handler);
            body.push(Insn::Iinc {
                slot: counter,
                delta: -1,
            });
            body.push(Insn::load(ValueKind::Int, counter));
            body.push(Insn::jump(opcodes::IFLE, rethrow));
            body.push(Insn::Simple(opcodes::POP));
            body.push(Insn::jump(opcodes::GOTO, head));
            body.place(rethrow);
            body.push(Insn::Simple(opcodes::ATHROW));

            body.handlers.push(ExceptionHandler {
                start: head,
                end,
                handler,
                catch_type,
            });
            if stack_map {
                let thrown = vec![VType::Object(catch.clone())];
                body.frames.push(Frame {
                    label: head,
                    locals: loop_locals.clone(),
                    stack: Vec::new(),
                });
                body.frames.push(Frame {
                    label: handler,
                    locals: loop_locals.clone(),
                    stack: thrown.clone(),
                });
                body.frames.push(Frame {
                    label: rethrow,
                    locals: loop_locals,
                    stack: thrown,
                });
            }
            Ok(())
        },
    );
    if let Some(signature) = &method.signature {
        spec = spec.signature(signature);
    }
    for exception in &method.exceptions {
        spec = spec.exception(exception.internal_name());
    }
    let wrapper = rewriter.add_method(spec)?;
    rewriter.push_method_attributes(wrapper, moved)?;

    log::debug!(
        "Wrapped {owner}.{}{} in {attempts} attempt(s) on {on}",
        method.name,
        method.descriptor
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{AnnotationSpec, ClassBuilder, ClassFile},
        classpath::MemorySource,
        metadata::{Member, Scanner},
        weave::{config::WeaveConfig, injection::InjectionIndex},
    };
    use std::sync::OnceLock;

    fn service(major: u16) -> Vec<u8> {
        ClassBuilder::new("com/example/Fetcher")
            .version(major, 0)
            .method(
                MethodSpec::new(MethodAccess::PUBLIC, "fetch", "(IJ)Ljava/lang/String;")
                    .annotation(AnnotationSpec::new("Lio/classweave/marker/Retry;"))
                    .exception("java/io/IOException")
                    .code(|pool, body| {
                        let value = pool.add_string("ok")?;
                        body.push(Insn::Constant {
                            opcode: opcodes::LDC,
                            index: value,
                        });
                        body.push(Insn::Simple(opcodes::ARETURN));
                        Ok(())
                    }),
            )
            .build()
            .unwrap()
    }

    fn rewrite(bytes: &[u8]) -> Result<(ClassRewriter, bool)> {
        let scanner = Scanner::new(MemorySource::new());
        let config = WeaveConfig::default();
        let injections: OnceLock<InjectionIndex> = OnceLock::new();
        let context = WeaveContext::new(&scanner, &config, &injections);
        let unit = ScannedUnit::from_bytes(bytes)?;
        let mut rewriter = ClassRewriter::parse(bytes)?;
        assert!(RetryStage.applies(&unit, &context)?);
        let changed = RetryStage.rewrite(&mut rewriter, &unit, &context)?;
        Ok((rewriter, changed))
    }

    #[test]
    fn wrapper_takes_over_the_original_identity() {
        let (rewriter, changed) = rewrite(&service(52)).unwrap();
        assert!(changed);
        let woven = ScannedUnit::from_bytes(&rewriter.finish().unwrap().unwrap()).unwrap();

        let wrapper = woven
            .content
            .methods
            .method("fetch", "(IJ)Ljava/lang/String;")
            .unwrap();
        assert_eq!(wrapper.access_level(), AccessLevel::Public);
        assert!(wrapper.markers.contains(&MarkerType::Retry.unit()));
        assert_eq!(wrapper.exceptions, vec![UnitRef::from("java/io/IOException")]);
        // counter lives after this, int and long
        assert_eq!(wrapper.body.unwrap().max_locals, 5);

        let original = woven
            .content
            .methods
            .method("fetch$retry", "(IJ)Ljava/lang/String;")
            .unwrap();
        assert_eq!(original.access_level(), AccessLevel::Private);
        assert!(original.access.contains(MethodAccess::SYNTHETIC));
        assert!(original.markers.is_empty());
    }

    #[test]
    fn wrapper_declares_handler_and_frames() {
        let (rewriter, _) = rewrite(&service(52)).unwrap();
        let bytes = rewriter.finish().unwrap().unwrap();
        let class = ClassFile::parse(&bytes).unwrap();
        let index = class
            .find_method("fetch", "(IJ)Ljava/lang/String;")
            .unwrap()
            .unwrap();
        let mut rewriter = ClassRewriter::parse(&bytes).unwrap();
        let body = rewriter.body_mut(index).unwrap().unwrap();
        assert_eq!(body.handlers.len(), 1);
        assert!(body.has_stack_map);
        assert_eq!(body.frames.len(), 3);
    }

    #[test]
    fn old_class_files_get_no_frames() {
        let (rewriter, _) = rewrite(&service(49)).unwrap();
        let bytes = rewriter.finish().unwrap().unwrap();
        let class = ClassFile::parse(&bytes).unwrap();
        let index = class
            .find_method("fetch", "(IJ)Ljava/lang/String;")
            .unwrap()
            .unwrap();
        let mut rewriter = ClassRewriter::parse(&bytes).unwrap();
        assert!(!rewriter.body_mut(index).unwrap().unwrap().has_stack_map);
    }

    #[test]
    fn weaving_twice_keeps_one_wrapper() {
        let (rewriter, _) = rewrite(&service(52)).unwrap();
        let once = rewriter.finish().unwrap().unwrap();
        let (rewriter, changed) = rewrite(&once).unwrap();
        assert!(!changed);
        assert!(rewriter.finish().unwrap().is_none());
    }

    #[test]
    fn applies_only_to_marked_units() {
        let scanner = Scanner::new(MemorySource::new());
        let config = WeaveConfig::default();
        let injections: OnceLock<InjectionIndex> = OnceLock::new();
        let context = WeaveContext::new(&scanner, &config, &injections);

        let plain = ClassBuilder::new("com/example/Plain").build().unwrap();
        let plain = ScannedUnit::from_bytes(&plain).unwrap();
        assert!(!RetryStage.applies(&plain, &context).unwrap());
        let marked = ScannedUnit::from_bytes(&service(52)).unwrap();
        assert!(RetryStage.applies(&marked, &context).unwrap());
    }

    #[test]
    fn abstract_methods_cannot_be_retried() {
        let bytes = ClassBuilder::new("com/example/Base")
            .access(crate::classfile::ClassAccess::PUBLIC | crate::classfile::ClassAccess::ABSTRACT)
            .method(
                MethodSpec::new(MethodAccess::PUBLIC | MethodAccess::ABSTRACT, "run", "()V")
                    .annotation(AnnotationSpec::new("Lio/classweave/marker/Retry;")),
            )
            .build()
            .unwrap();
        assert!(matches!(
            rewrite(&bytes),
            Err(crate::Error::ContractViolation { .. })
        ));
    }
}
