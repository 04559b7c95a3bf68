//! Integration tests for the weaving pipeline.
//!
//! Units are synthesized with the class builder and served from memory, so every scenario
//! states the exact shape of the interfaces and targets it weaves.

use classweave::{
    classfile::builder::SpecValue,
    metadata::generics::OBJECT,
    prelude::*,
    weave::{stages::InjectionStage, WeaveContext},
};
use std::sync::OnceLock;

const TARGET: &str = "com/example/Person";

fn inject_into(target: &str) -> AnnotationSpec {
    AnnotationSpec::new("Lio/classweave/marker/InjectInto;").with(
        "names",
        SpecValue::Array(vec![SpecValue::String(target.replace('/', "."))]),
    )
}

fn getter(field: &str) -> AnnotationSpec {
    AnnotationSpec::new("Lio/classweave/marker/FieldGetter;")
        .with("value", SpecValue::String(field.to_string()))
}

fn setter(field: &str) -> AnnotationSpec {
    AnnotationSpec::new("Lio/classweave/marker/FieldSetter;")
        .with("value", SpecValue::String(field.to_string()))
}

fn abstract_method(name: &str, descriptor: &str) -> MethodSpec {
    MethodSpec::new(MethodAccess::PUBLIC | MethodAccess::ABSTRACT, name, descriptor)
}

fn person() -> Vec<u8> {
    ClassBuilder::new(TARGET)
        .field(FieldSpec::new(FieldAccess::PRIVATE, "name", "Ljava/lang/String;"))
        .field(FieldSpec::new(FieldAccess::PRIVATE, "age", "I"))
        .method(
            MethodSpec::new(MethodAccess::PUBLIC, "greet", "(Ljava/lang/String;)V").code(
                |_, body| {
                    body.push(Insn::Simple(opcodes::RETURN));
                    Ok(())
                },
            ),
        )
        .build()
        .unwrap()
}

fn named() -> Vec<u8> {
    ClassBuilder::new_interface("com/example/Named")
        .annotation(inject_into(TARGET))
        .method(abstract_method("name", "()Ljava/lang/String;").annotation(getter("name")))
        .build()
        .unwrap()
}

fn weaver(units: Vec<Vec<u8>>, config: WeaveConfig) -> Pipeline {
    let mut source = MemorySource::new();
    for unit in units {
        source = source.with(unit).unwrap();
    }
    Pipeline::new(Scanner::new(source), config)
}

fn body_of(bytes: &[u8], name: &str, descriptor: &str) -> (ClassFile, MethodBody) {
    let class = ClassFile::parse(bytes).unwrap();
    let index = class.find_method(name, descriptor).unwrap().unwrap();
    let mut rewriter = ClassRewriter::new(class.clone()).unwrap();
    let body = rewriter.body_mut(index).unwrap().unwrap().clone();
    (class, body)
}

#[test]
fn unmarked_units_round_trip_unchanged() -> Result<()> {
    let bytes = person();
    let pipeline = weaver(vec![bytes.clone(), named()], WeaveConfig::default());

    // Person is an injection target; a unit nobody references must come back untouched
    let other = ClassBuilder::new("com/example/Bystander")
        .field(FieldSpec::new(FieldAccess::PRIVATE, "count", "J"))
        .build()?;
    assert!(pipeline.transform("app", &other).unwrap().is_none());
    assert_eq!(ClassFile::parse(&other)?.to_bytes()?, other);
    assert!(ClassRewriter::parse(&bytes)?.finish()?.is_none());
    Ok(())
}

#[test]
fn accessor_is_synthesized_for_a_private_field() -> Result<()> {
    let pipeline = weaver(vec![person(), named()], WeaveConfig::default());
    let woven = pipeline.transform("app", &person()).unwrap().unwrap();

    let before = ScannedUnit::from_bytes(&person())?;
    let after = ScannedUnit::from_bytes(&woven)?;
    assert_eq!(after.content.methods.len(), before.content.methods.len() + 1);
    assert!(after.info.implements(&UnitRef::from("com/example/Named")));

    let accessor = after
        .content
        .methods
        .method("name", "()Ljava/lang/String;")
        .unwrap();
    assert_eq!(accessor.access_level(), AccessLevel::Public);
    assert!(!accessor.is_abstract());

    let (class, body) = body_of(&woven, "name", "()Ljava/lang/String;");
    let instructions: Vec<&Insn> = body.instructions().collect();
    assert_eq!(instructions.len(), 3);
    assert_eq!(instructions[0].opcode(), opcodes::ALOAD);
    let Insn::Constant { opcode, index } = instructions[1] else {
        panic!("expected a field read, got {:?}", instructions[1]);
    };
    assert_eq!(*opcode, opcodes::GETFIELD);
    assert_eq!(
        class.pool.member_ref(*index)?,
        (
            TARGET.to_string(),
            "name".to_string(),
            "Ljava/lang/String;".to_string()
        )
    );
    assert_eq!(instructions[2].opcode(), opcodes::ARETURN);
    Ok(())
}

#[test]
fn public_abstract_unmarked_methods_are_contract_violations() {
    let incomplete = ClassBuilder::new_interface("com/example/Incomplete")
        .annotation(inject_into(TARGET))
        .method(abstract_method("name", "()Ljava/lang/String;"))
        .build()
        .unwrap();
    let report = weaver(vec![person(), incomplete], WeaveConfig::default())
        .transform("app", &person())
        .unwrap_err();
    assert_eq!(report.kind, ReportKind::ContractViolation);
    assert_eq!(report.get("stage"), Some("injection"));
    assert_eq!(report.get("unit"), Some("com.example.Person"));
    assert!(!report.can_continue);
}

#[test]
fn default_methods_cannot_carry_accessor_markers() {
    let defaulted = ClassBuilder::new_interface("com/example/Defaulted")
        .annotation(inject_into(TARGET))
        .method(
            MethodSpec::new(MethodAccess::PUBLIC, "name", "()Ljava/lang/String;")
                .annotation(getter("name"))
                .code(|_, body| {
                    body.push(Insn::Simple(opcodes::ACONST_NULL));
                    body.push(Insn::Simple(opcodes::ARETURN));
                    Ok(())
                }),
        )
        .build()
        .unwrap();
    let report = weaver(vec![person(), defaulted], WeaveConfig::default())
        .transform("app", &person())
        .unwrap_err();
    assert_eq!(report.kind, ReportKind::ContractViolation);
    assert!(report.message.contains("default implementation"));
}

#[test]
fn missing_and_incompatible_fields_are_rejected() {
    let missing = ClassBuilder::new_interface("com/example/Missing")
        .annotation(inject_into(TARGET))
        .method(abstract_method("email", "()Ljava/lang/String;").annotation(getter("email")))
        .build()
        .unwrap();
    let report = weaver(vec![person(), missing], WeaveConfig::default())
        .transform("app", &person())
        .unwrap_err();
    assert_eq!(report.kind, ReportKind::ContractViolation);

    let mistyped = ClassBuilder::new_interface("com/example/Mistyped")
        .annotation(inject_into(TARGET))
        .method(abstract_method("age", "()J").annotation(getter("age")))
        .build()
        .unwrap();
    let report = weaver(vec![person(), mistyped], WeaveConfig::default())
        .transform("app", &person())
        .unwrap_err();
    assert_eq!(report.kind, ReportKind::ContractViolation);
}

#[test]
fn targets_that_already_declare_the_method_are_rejected() {
    let greeter = ClassBuilder::new_interface("com/example/Greeter")
        .annotation(inject_into(TARGET))
        .method(
            abstract_method("greet", "(Ljava/lang/String;)V").annotation(setter("name")),
        )
        .build()
        .unwrap();
    let report = weaver(vec![person(), greeter], WeaveConfig::default())
        .transform("app", &person())
        .unwrap_err();
    assert_eq!(report.kind, ReportKind::ContractViolation);
    assert!(report.message.contains("already declares"));
}

#[test]
fn interface_union_is_idempotent() -> Result<()> {
    let tagged = ClassBuilder::new_interface("com/example/Tagged")
        .annotation(inject_into(TARGET))
        .build()?;
    let scanner = Scanner::new(MemorySource::new().with(person())?.with(tagged)?);
    let config = WeaveConfig::default();
    let injections = OnceLock::new();
    let context = WeaveContext::new(&scanner, &config, &injections);

    let mut model = scanner.scan(&UnitRef::from(TARGET))?;
    let mut rewriter = ClassRewriter::parse(&person())?;
    assert!(InjectionStage.applies(&model, &context)?);
    assert!(InjectionStage.rewrite(&mut rewriter, &model, &context)?);
    model = std::sync::Arc::new(rewriter.snapshot()?);
    assert!(!InjectionStage.rewrite(&mut rewriter, &model, &context)?);

    assert_eq!(rewriter.interface_names()?, vec!["com/example/Tagged".to_string()]);
    Ok(())
}

#[test]
fn accessor_injection_is_idempotent() -> Result<()> {
    let scanner = Scanner::new(MemorySource::new().with(person())?.with(named())?);
    let config = WeaveConfig::default();
    let injections = OnceLock::new();
    let context = WeaveContext::new(&scanner, &config, &injections);
    let original = scanner.scan(&UnitRef::from(TARGET))?;

    // Same model twice: the rewriter already holds the accessor
    let mut rewriter = ClassRewriter::parse(&person())?;
    assert!(InjectionStage.rewrite(&mut rewriter, &original, &context)?);
    assert!(!InjectionStage.rewrite(&mut rewriter, &original, &context)?);

    // Model refreshed from the woven class
    let woven = std::sync::Arc::new(rewriter.snapshot()?);
    assert!(!InjectionStage.rewrite(&mut rewriter, &woven, &context)?);
    assert_eq!(rewriter.interface_names()?, vec!["com/example/Named".to_string()]);
    assert_eq!(rewriter.method_count(), 2);

    // Woven bytes handed to the hook again
    let bytes = weaver(vec![person(), named()], WeaveConfig::default())
        .transform("app", &person())
        .unwrap()
        .unwrap();
    let pipeline = weaver(vec![bytes.clone(), named()], WeaveConfig::default());
    assert!(pipeline.transform("app", &bytes).unwrap().is_none());
    Ok(())
}

#[test]
fn declaring_the_accessor_without_the_interface_is_rejected() {
    let target = ClassBuilder::new(TARGET)
        .field(FieldSpec::new(FieldAccess::PRIVATE, "name", "Ljava/lang/String;"))
        .method(
            MethodSpec::new(MethodAccess::PUBLIC, "name", "()Ljava/lang/String;").code(|_, body| {
                body.push(Insn::Simple(opcodes::ACONST_NULL));
                body.push(Insn::Simple(opcodes::ARETURN));
                Ok(())
            }),
        )
        .build()
        .unwrap();
    let report = weaver(vec![target.clone(), named()], WeaveConfig::default())
        .transform("app", &target)
        .unwrap_err();
    assert_eq!(report.kind, ReportKind::ContractViolation);
    assert!(report.message.contains("already declares"));
}

#[test]
fn targets_already_implementing_the_interface_are_left_alone() -> Result<()> {
    let tagged = ClassBuilder::new_interface("com/example/Tagged")
        .annotation(inject_into(TARGET))
        .build()?;
    let target = ClassBuilder::new(TARGET)
        .interface("com/example/Tagged")
        .build()?;
    let pipeline = weaver(vec![target.clone(), tagged], WeaveConfig::default());
    assert!(pipeline.transform("app", &target).unwrap().is_none());
    Ok(())
}

#[test]
fn type_variable_accessors_cast_on_write() -> Result<()> {
    let holder = ClassBuilder::new_interface("com/example/Holder")
        .signature(&format!("<T:L{OBJECT};>L{OBJECT};"))
        .annotation(inject_into(TARGET))
        .method(
            abstract_method("get", "()Ljava/lang/Object;")
                .signature("()TT;")
                .annotation(getter("name")),
        )
        .method(
            abstract_method("set", "(Ljava/lang/Object;)V")
                .signature("(TT;)V")
                .annotation(setter("name")),
        )
        .build()?;
    let pipeline = weaver(vec![person(), holder], WeaveConfig::default());
    let woven = pipeline.transform("app", &person()).unwrap().unwrap();

    let (class, body) = body_of(&woven, "set", "(Ljava/lang/Object;)V");
    let cast = body
        .instructions()
        .find_map(|insn| match insn {
            Insn::Constant { opcode, index } if *opcode == opcodes::CHECKCAST => Some(*index),
            _ => None,
        })
        .expect("setter casts its argument");
    assert_eq!(class.pool.class_name(cast)?, "java/lang/String");

    let (_, body) = body_of(&woven, "get", "()Ljava/lang/Object;");
    assert!(body
        .instructions()
        .all(|insn| insn.opcode() != opcodes::CHECKCAST));
    Ok(())
}

#[test]
fn accessor_parameters_keep_their_markers() -> Result<()> {
    let renaming = ClassBuilder::new_interface("com/example/Renaming")
        .annotation(inject_into(TARGET))
        .method(
            abstract_method("rename", "(Ljava/lang/String;)V")
                .annotation(setter("name"))
                .parameter_annotation(0, AnnotationSpec::new("Lio/classweave/marker/NotNull;")),
        )
        .build()?;
    let pipeline = weaver(vec![person(), renaming], WeaveConfig::default());
    let woven = pipeline.transform("app", &person()).unwrap().unwrap();

    // Validation ran after injection, so the accessor starts with a null check
    let (_, body) = body_of(&woven, "rename", "(Ljava/lang/String;)V");
    let opcodes: Vec<u8> = body.instructions().map(Insn::opcode).take(2).collect();
    assert_eq!(opcodes, vec![opcodes::ALOAD, opcodes::IFNONNULL]);
    Ok(())
}

#[test]
fn retry_and_validation_compose() -> Result<()> {
    let job = ClassBuilder::new("com/example/Job")
        .method(
            MethodSpec::new(MethodAccess::PUBLIC | MethodAccess::STATIC, "run", "(I)I")
                .annotation(
                    AnnotationSpec::new("Lio/classweave/marker/Retry;")
                        .with("attempts", SpecValue::Int(5))
                        .with("on", SpecValue::Class("Ljava/io/IOException;".into())),
                )
                .parameter_annotation(0, AnnotationSpec::new("Lio/classweave/marker/NonNegative;"))
                .code(|_, body| {
                    body.push(Insn::Simple(opcodes::ILOAD_0));
                    body.push(Insn::Simple(opcodes::IRETURN));
                    Ok(())
                }),
        )
        .build()?;
    let pipeline = weaver(vec![job.clone()], WeaveConfig::default());
    let woven = pipeline.transform("app", &job).unwrap().unwrap();

    let (class, body) = body_of(&woven, "run", "(I)I");
    assert_eq!(body.handlers.len(), 1);
    assert_eq!(class.pool.class_name(body.handlers[0].catch_type)?, "java/io/IOException");
    let instructions: Vec<u8> = body.instructions().map(Insn::opcode).collect();
    assert_eq!(instructions[..2], [opcodes::ILOAD, opcodes::IFGE]);
    assert!(instructions.contains(&opcodes::INVOKESTATIC));

    let unit = ScannedUnit::from_bytes(&woven)?;
    let original = unit.content.methods.method("run$retry", "(I)I").unwrap();
    assert!(original.is_static());
    assert_eq!(original.access_level(), AccessLevel::Private);
    Ok(())
}

#[test]
fn invalid_marker_arguments_are_contract_violations() -> Result<()> {
    let job = ClassBuilder::new("com/example/Job")
        .method(
            MethodSpec::new(MethodAccess::PUBLIC, "run", "()V")
                .annotation(
                    AnnotationSpec::new("Lio/classweave/marker/Retry;")
                        .with("attempts", SpecValue::Int(0)),
                )
                .code(|_, body| {
                    body.push(Insn::Simple(opcodes::RETURN));
                    Ok(())
                }),
        )
        .build()?;
    let report = weaver(vec![job.clone()], WeaveConfig::default())
        .transform("app", &job)
        .unwrap_err();
    assert_eq!(report.kind, ReportKind::ContractViolation);
    assert_eq!(report.get("stage"), Some("retry"));
    Ok(())
}

#[test]
fn modified_units_are_dumped() -> Result<()> {
    let directory = tempfile::tempdir().unwrap();
    let pipeline = weaver(
        vec![person(), named()],
        WeaveConfig::default().dump_directory(directory.path()),
    );
    let woven = pipeline.transform("app", &person()).unwrap().unwrap();

    let dumped = std::fs::read(directory.path().join("com/example/Person.class")).unwrap();
    assert_eq!(dumped, woven);
    let record = pipeline.dump_log().iter().next().unwrap();
    assert_eq!(record.unit, UnitRef::from(TARGET));
    assert_eq!(record.loader, "app");
    Ok(())
}
