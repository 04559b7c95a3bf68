//! Interface injection and accessor synthesis.
//!
//! For a unit that other interfaces asked to be injected into, the stage adds those
//! interfaces to its declared list and implements every abstract method they mark with
//! `FieldGetter` or `FieldSetter` by reading or writing the named field of the unit.
//!
//! Every requesting interface is validated completely before the first byte is emitted.
//! The rules are:
//!
//! - a public abstract instance method without an accessor marker cannot be implemented
//! - an accessor marker on a method that already has a default body is rejected
//! - the named field must exist in the target, with a type the method can carry
//! - the target must not already declare the method, unless it already implements the
//!   interface with a concrete method of that name and descriptor
//!
//! Type variables are resolved against the interface's generic declarations: a method
//! typed by a variable whose bound is `java/lang/Object`, or a supertype of the field's
//! class, accepts the field. Setters cast the argument to the field type in that case.
//!
//! Parameter markers of an interface method are copied onto the synthesized method, so
//! later stages see them.

use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
};

use crate::{
    assembly::{opcodes, Insn},
    classfile::{
        descriptor::{FieldType, ValueKind},
        AccessLevel, ClassFile, MethodAccess, MethodSpec,
    },
    metadata::{
        generics::{self, ActualType},
        FieldInfo, Member, MethodInfo, ScannedUnit, Scanner, UnitKind, UnitRef,
    },
    weave::{
        markers::MarkerKind,
        rewriter::ClassRewriter,
        stage::{Stage, WeaveContext},
    },
    Result,
};

/// Adds requested interfaces and synthesizes their field accessors.
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectionStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// One method to synthesize.
#[derive(Debug, Clone)]
struct Accessor {
    access: Access,
    name: String,
    descriptor: String,
    field: String,
    field_descriptor: String,
    static_field: bool,
    cast: Option<String>,
}

/// An interface with the accessors it needs.
struct Request {
    interface: UnitRef,
    class: ClassFile,
    accessors: Vec<Accessor>,
}

impl Stage for InjectionStage {
    fn name(&self) -> &'static str {
        "injection"
    }

    fn description(&self) -> &'static str {
        "Adds requested interfaces and synthesizes their field accessors"
    }

    fn applies(&self, unit: &ScannedUnit, context: &WeaveContext<'_>) -> Result<bool> {
        Ok(!context
            .injection_index()?
            .requests_for(unit.unit())
            .is_empty())
    }

    fn rewrite(
        &self,
        rewriter: &mut ClassRewriter,
        unit: &ScannedUnit,
        context: &WeaveContext<'_>,
    ) -> Result<bool> {
        let interfaces = context.injection_index()?.requests_for(unit.unit());
        if interfaces.is_empty() {
            return Ok(false);
        }
        if matches!(
            unit.info.kind,
            UnitKind::Interface | UnitKind::Annotation | UnitKind::Module
        ) {
            return Err(contract_error!(
                unit.unit(),
                "{} is {} and cannot receive injected interfaces",
                unit.unit(),
                unit.info.kind
            ));
        }

        let mut requests = Vec::with_capacity(interfaces.len());
        let mut planned: BTreeSet<(String, String)> = BTreeSet::new();
        for interface in interfaces {
            let request = plan(context.scanner, unit, interface)?;
            for accessor in &request.accessors {
                if !planned.insert((accessor.name.clone(), accessor.descriptor.clone())) {
                    return Err(contract_error!(
                        unit.unit(),
                        "{}{} is requested by more than one injected interface",
                        accessor.name,
                        accessor.descriptor
                    ));
                }
            }
            requests.push(request);
        }

        let mut modified = false;
        for request in &requests {
            let implemented = !rewriter.add_interface(request.interface.internal_name())?;
            if !implemented {
                log::debug!("Injected {} into {}", request.interface, unit.unit());
                modified = true;
            }
            for accessor in &request.accessors {
                if let Some(index) = rewriter.find_method(&accessor.name, &accessor.descriptor)? {
                    let access = rewriter.method(index)?.access;
                    if implemented && !access.intersects(MethodAccess::ABSTRACT | MethodAccess::STATIC) {
                        continue;
                    }
                    return Err(contract_error!(
                        unit.unit(),
                        "{} already declares {}{} requested by {}",
                        unit.unit(),
                        accessor.name,
                        accessor.descriptor,
                        request.interface
                    ));
                }
                synthesize(rewriter, request, accessor)?;
                modified = true;
            }
        }
        Ok(modified)
    }
}

fn plan(scanner: &Scanner, target: &ScannedUnit, interface: &UnitRef) -> Result<Request> {
    let requesting = scanner.scan(interface)?;
    let mut accessors = Vec::new();
    for method in &requesting.content.methods {
        if method.is_static() || method.name.starts_with('<') {
            continue;
        }
        let markers = MarkerKind::collect(&method.markers)?;
        let marked: Vec<(Access, &String)> = markers
            .iter()
            .filter_map(|kind| match kind {
                MarkerKind::FieldGetter { field } => Some((Access::Read, field)),
                MarkerKind::FieldSetter { field } => Some((Access::Write, field)),
                _ => None,
            })
            .collect();
        let (access, field) = match marked.as_slice() {
            [] if method.is_abstract() && method.access_level() == AccessLevel::Public => {
                return Err(contract_error!(
                    interface,
                    "{}.{}{} is abstract and carries no marker the engine can implement in {}",
                    interface,
                    method.name,
                    method.descriptor,
                    target.unit()
                ));
            }
            [] => continue,
            [(access, field)] => (*access, field.as_str()),
            _ => {
                return Err(contract_error!(
                    interface,
                    "{}.{}{} carries more than one accessor marker",
                    interface,
                    method.name,
                    method.descriptor
                ))
            }
        };

        if !method.is_abstract() {
            return Err(contract_error!(
                interface,
                "{}.{} already has a default implementation; accessor markers only apply to abstract methods",
                interface,
                method.name
            ));
        }
        if let Some(declared) = target.content.methods.method(&method.name, &method.descriptor) {
            if target.info.implements(interface) && !declared.is_abstract() && !declared.is_static() {
                log::debug!(
                    "{} already implements {}.{}",
                    target.unit(),
                    interface,
                    method.name
                );
                continue;
            }
            return Err(contract_error!(
                target.unit(),
                "{} already declares {}{} requested by {}",
                target.unit(),
                method.name,
                method.descriptor,
                interface
            ));
        }

        accessors.push(accessor(scanner, target, &requesting, method, access, field)?);
    }

    let data = scanner.source().read_unit(interface)?;
    let class = ClassFile::parse(&data)
        .map_err(|error| crate::Error::malformed_unit(interface.qualified_name(), error))?;
    Ok(Request {
        interface: interface.clone(),
        class,
        accessors,
    })
}

fn accessor(
    scanner: &Scanner,
    target: &ScannedUnit,
    interface: &ScannedUnit,
    method: &MethodInfo,
    access: Access,
    field_name: &str,
) -> Result<Accessor> {
    let field = target.content.fields.field(field_name).ok_or_else(|| {
        contract_error!(
            target.unit(),
            "{} has no field '{}' for {}.{}",
            target.unit(),
            field_name,
            interface.unit(),
            method.name
        )
    })?;

    let (declared, generic) = match access {
        Access::Read if method.parameters.is_empty() && method.return_descriptor != "V" => (
            method.return_descriptor.as_str(),
            method.signature.as_deref().and_then(return_signature),
        ),
        Access::Write if method.parameters.len() == 1 && method.return_descriptor == "V" => (
            method.parameters[0].descriptor.as_str(),
            method.parameters[0].signature.as_deref(),
        ),
        Access::Read => {
            return Err(contract_error!(
                interface.unit(),
                "FieldGetter {}.{}{} must take no arguments and return a value",
                interface.unit(),
                method.name,
                method.descriptor
            ))
        }
        Access::Write => {
            return Err(contract_error!(
                interface.unit(),
                "FieldSetter {}.{}{} must take one argument and return void",
                interface.unit(),
                method.name,
                method.descriptor
            ))
        }
    };

    let cast = match compatibility(scanner, interface, method, declared, generic, field)? {
        Some(cast) => cast,
        None => {
            return Err(contract_error!(
                target.unit(),
                "field {} {} cannot be carried by {}.{}{}",
                field.descriptor,
                field.name,
                interface.unit(),
                method.name,
                method.descriptor
            ))
        }
    };

    Ok(Accessor {
        access,
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
        field: field.name.clone(),
        field_descriptor: field.descriptor.clone(),
        static_field: field.is_static(),
        cast: if access == Access::Write { cast } else { None },
    })
}

/// The return part of a method signature, without thrown types.
fn return_signature(signature: &str) -> Option<&str> {
    let (_, returns) = signature.rsplit_once(')')?;
    returns.split('^').next()
}

/// `None` if the field does not fit the method type, otherwise the class to cast a
/// written value to, if one is needed.
fn compatibility(
    scanner: &Scanner,
    interface: &ScannedUnit,
    method: &MethodInfo,
    declared: &str,
    generic: Option<&str>,
    field: &FieldInfo,
) -> Result<Option<Option<String>>> {
    if declared == field.descriptor {
        return Ok(Some(None));
    }
    let Some(variable) = generic.filter(|signature| signature.starts_with('T')) else {
        return Ok(None);
    };
    let field_type = FieldType::parse(&field.descriptor)?;
    if !field_type.is_reference() {
        return Ok(None);
    }

    let scope = interface.method_scope(method)?;
    let bound = generics::parse_field_shape(&scope, variable)?;
    if bound.descriptor() != declared {
        return Ok(None);
    }
    let fits = match (&bound, &field_type) {
        (bound, _) if *bound == ActualType::object() => true,
        (ActualType::Class { unit, .. }, FieldType::Object(name)) => {
            is_subtype(scanner, &UnitRef::from_internal(name), unit)
        }
        _ => false,
    };
    Ok(fits.then(|| field_type.class_name()))
}

/// Walk the supertypes of `from` looking for `to`. Units that cannot be scanned end their
/// branch of the walk.
fn is_subtype(scanner: &Scanner, from: &UnitRef, to: &UnitRef) -> bool {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([from.clone()]);
    while let Some(unit) = queue.pop_front() {
        if &unit == to {
            return true;
        }
        if !seen.insert(unit.clone()) {
            continue;
        }
        let scanned: Arc<ScannedUnit> = match scanner.scan(&unit) {
            Ok(scanned) => scanned,
            Err(error) => {
                log::debug!("Stopping supertype walk at {unit}: {error}");
                continue;
            }
        };
        queue.extend(scanned.info.supertype.iter().cloned());
        queue.extend(scanned.info.interfaces.iter().cloned());
    }
    false
}

fn synthesize(rewriter: &mut ClassRewriter, request: &Request, accessor: &Accessor) -> Result<()> {
    let owner = rewriter.unit().internal_name().to_string();
    let field_kind = FieldType::parse(&accessor.field_descriptor)?.kind();
    let planned = accessor.clone();

    let spec = MethodSpec::new(MethodAccess::PUBLIC, &accessor.name, &accessor.descriptor).code(
        move |pool, body| {
            let field = pool.add_field_ref(&owner, &planned.field, &planned.field_descriptor)?;
            match planned.access {
                Access::Read => {
                    if planned.static_field {
                        body.push(Insn::Constant {
                            opcode: opcodes::GETSTATIC,
                            index: field,
                        });
                    } else {
                        body.push(Insn::load(ValueKind::Reference, 0));
                        body.push(Insn::Constant {
                            opcode: opcodes::GETFIELD,
                            index: field,
                        });
                    }
                    body.push(Insn::return_value(Some(field_kind)));
                }
                Access::Write => {
                    if !planned.static_field {
                        body.push(Insn::load(ValueKind::Reference, 0));
                    }
                    body.push(Insn::load(field_kind, 1));
                    if let Some(class) = &planned.cast {
                        body.push(Insn::Constant {
                            opcode: opcodes::CHECKCAST,
                            index: pool.add_class(class)?,
                        });
                    }
                    body.push(Insn::Constant {
                        opcode: if planned.static_field {
                            opcodes::PUTSTATIC
                        } else {
                            opcodes::PUTFIELD
                        },
                        index: field,
                    });
                    body.push(Insn::return_value(None));
                }
            }
            Ok(())
        },
    );
    let index = rewriter.add_method(spec)?;

    if let Some(origin) = request
        .class
        .find_method(&accessor.name, &accessor.descriptor)?
    {
        rewriter.import_parameter_annotations(
            index,
            &request.class,
            &request.class.methods[origin].attributes,
        )?;
    }

    log::debug!(
        "Synthesized {}.{}{} {} field {}",
        rewriter.unit(),
        accessor.name,
        accessor.descriptor,
        match accessor.access {
            Access::Read => "reading",
            Access::Write => "writing",
        },
        accessor.field
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_part_of_signatures() {
        assert_eq!(return_signature("()TT;"), Some("TT;"));
        assert_eq!(
            return_signature("<X:Ljava/lang/Object;>()TX;^Ljava/io/IOException;"),
            Some("TX;")
        );
        assert_eq!(return_signature("TT;"), None);
    }
}
