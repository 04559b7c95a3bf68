//! The full pass: members, parameters and body summaries.

use crate::{
    assembly::{read_local_variables, CodeAttribute},
    classfile::{
        attributes::{self, names, Attribute},
        descriptor::MethodDescriptor,
        ClassFile, ConstantPool, FieldEntry, MethodAccess, MethodEntry,
    },
    file::parser::Parser,
    metadata::{
        generics,
        members::{BodySummary, ComponentInfo, FieldInfo, MemberKey, MethodInfo, ParameterInfo},
        unit::UnitContent,
        MarkerMap, UnitRef,
    },
    Result,
};

/// Extracts [`UnitContent`] from class-file bytes.
pub struct ContentVisitor;

impl ContentVisitor {
    /// Run the full pass over `data`.
    ///
    /// # Errors
    /// Returns the decoding error of the class file, of a member attribute or of a `Code`
    /// attribute layout.
    pub fn visit(data: &[u8]) -> Result<UnitContent> {
        let class = ClassFile::parse(data)?;
        let mut content = UnitContent::default();

        for field in &class.fields {
            content.fields.insert(visit_field(&class.pool, field)?);
        }
        for method in &class.methods {
            content.methods.insert(visit_method(&class.pool, method)?);
        }
        if let Some(record) = attributes::find(&class.pool, &class.attributes, names::RECORD) {
            for component in attributes::read_record(&record.info)? {
                let name = class.pool.utf8(component.name_index)?;
                content.components.insert(ComponentInfo {
                    key: MemberKey::Component(name.clone()),
                    name,
                    descriptor: class.pool.utf8(component.descriptor_index)?,
                    signature: attributes::read_utf8_attribute(
                        &class.pool,
                        &component.attributes,
                        names::SIGNATURE,
                    )?,
                    markers: MarkerMap::from_attributes(&class.pool, &component.attributes)?,
                });
            }
        }

        Ok(content)
    }
}

fn visit_field(pool: &ConstantPool, field: &FieldEntry) -> Result<FieldInfo> {
    let name = pool.utf8(field.name_index)?;
    Ok(FieldInfo {
        key: MemberKey::field(&name),
        name,
        descriptor: pool.utf8(field.descriptor_index)?,
        signature: attributes::read_utf8_attribute(pool, &field.attributes, names::SIGNATURE)?,
        access: field.access,
        markers: MarkerMap::from_attributes(pool, &field.attributes)?,
    })
}

fn visit_method(pool: &ConstantPool, method: &MethodEntry) -> Result<MethodInfo> {
    let name = pool.utf8(method.name_index)?;
    let descriptor = pool.utf8(method.descriptor_index)?;
    let parsed = MethodDescriptor::parse(&descriptor)?;
    let signature = attributes::read_utf8_attribute(pool, &method.attributes, names::SIGNATURE)?;

    let code = attributes::find(pool, &method.attributes, names::CODE)
        .map(|attribute| CodeAttribute::parse(&attribute.info))
        .transpose()?;

    let parameters = visit_parameters(
        pool,
        method,
        &name,
        &descriptor,
        &parsed,
        signature.as_deref(),
        code.as_ref(),
    )?;

    let exceptions = match attributes::find(pool, &method.attributes, names::EXCEPTIONS) {
        Some(attribute) => attributes::read_index_list(&attribute.info)?
            .into_iter()
            .map(|index| pool.class_name(index).map(|name| UnitRef::from_internal(&name)))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let body = match &code {
        Some(code) => Some(BodySummary {
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            code_length: code.code.len(),
            handler_count: code.exception_table.len(),
            line_count: table_length(pool, &code.attributes, names::LINE_NUMBER_TABLE)?,
            local_count: table_length(pool, &code.attributes, names::LOCAL_VARIABLE_TABLE)?,
        }),
        None => None,
    };

    Ok(MethodInfo {
        key: MemberKey::method(&name, &descriptor),
        return_descriptor: parsed
            .returns
            .as_ref()
            .map_or_else(|| "V".to_string(), ToString::to_string),
        name,
        descriptor,
        signature,
        access: method.access,
        markers: MarkerMap::from_attributes(pool, &method.attributes)?,
        parameters,
        exceptions,
        body,
    })
}

fn visit_parameters(
    pool: &ConstantPool,
    method: &MethodEntry,
    name: &str,
    descriptor: &str,
    parsed: &MethodDescriptor,
    signature: Option<&str>,
    code: Option<&CodeAttribute<'_>>,
) -> Result<Vec<ParameterInfo>> {
    let count = parsed.parameters.len();
    let is_static = method.access.contains(MethodAccess::STATIC);
    let slots = parsed.parameter_slot_indices(is_static);
    let mut markers = MarkerMap::parameters_from_attributes(pool, &method.attributes, count)?;

    let declared = match attributes::find(pool, &method.attributes, names::METHOD_PARAMETERS) {
        Some(attribute) => attributes::read_method_parameters(&attribute.info)?,
        None => Vec::new(),
    };
    // Synthetic leading parameters may be left out of MethodParameters
    let declared_offset = count.saturating_sub(declared.len());

    let locals = match code
        .and_then(|code| attributes::find(pool, &code.attributes, names::LOCAL_VARIABLE_TABLE))
    {
        Some(attribute) => read_local_variables(&attribute.info, pool)?,
        None => Vec::new(),
    };

    let signatures = match signature.map(generics::parameter_signatures) {
        Some(Ok(pieces)) if pieces.len() == count => pieces.into_iter().map(Some).collect(),
        Some(Ok(_)) => {
            log::debug!("Signature of {name}{descriptor} does not cover every parameter");
            vec![None; count]
        }
        Some(Err(error)) => {
            log::debug!("Ignoring unreadable signature of {name}{descriptor}: {error}");
            vec![None; count]
        }
        None => vec![None; count],
    };

    let mut parameters = Vec::with_capacity(count);
    for (index, field_type) in parsed.parameters.iter().enumerate() {
        let slot = slots[index];
        let from_declared = index
            .checked_sub(declared_offset)
            .and_then(|position| declared.get(position));

        let declared_name = match from_declared {
            Some(parameter) if parameter.name_index != 0 => Some(pool.utf8(parameter.name_index)?),
            _ => None,
        };
        let recovered = declared_name.or_else(|| {
            locals
                .iter()
                .find(|local| local.slot == slot && local.start_pc == 0)
                .map(|local| local.name.clone())
        });

        parameters.push(ParameterInfo {
            key: MemberKey::Parameter {
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                index,
            },
            index,
            slot,
            named: recovered.is_some(),
            name: recovered.unwrap_or_else(|| format!("arg{index}")),
            descriptor: field_type.to_string(),
            signature: signatures[index].map(str::to_string),
            flags: from_declared.map_or(0, |parameter| parameter.access),
            markers: std::mem::take(&mut markers[index]),
        });
    }
    Ok(parameters)
}

fn table_length(pool: &ConstantPool, code_attributes: &[Attribute], name: &str) -> Result<usize> {
    match attributes::find(pool, code_attributes, name) {
        Some(attribute) => Ok(usize::from(Parser::new(&attribute.info).read_be::<u16>()?)),
        None => Ok(0),
    }
}
