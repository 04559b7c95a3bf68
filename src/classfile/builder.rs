//! Programmatic construction of class files.
//!
//! [`ClassBuilder`] composes a complete class file from [`FieldSpec`]s, [`MethodSpec`]s and
//! [`AnnotationSpec`]s, interning every name and constant into a fresh constant pool. Method
//! bodies are written against a [`MethodBody`] inside a closure, so they can refer to labels
//! and pool entries while being assembled.
//!
//! The builder is what tests, benchmarks and documentation use to produce input units
//! without a compiler, and what the weaving stages use to express synthesized members.
//!
//! # Examples
//!
//! ```rust
//! use classweave::assembly::{opcodes, Insn};
//! use classweave::classfile::{ClassBuilder, ClassFile, FieldAccess, FieldSpec, MethodAccess, MethodSpec};
//!
//! let bytes = ClassBuilder::new("com/example/Counter")
//!     .field(FieldSpec::new(FieldAccess::PRIVATE, "count", "I"))
//!     .method(
//!         MethodSpec::new(MethodAccess::PUBLIC, "count", "()I").code(|pool, body| {
//!             let field = pool.add_field_ref("com/example/Counter", "count", "I")?;
//!             body.push(Insn::Simple(opcodes::ALOAD_0));
//!             body.push(Insn::Constant { opcode: opcodes::GETFIELD, index: field });
//!             body.push(Insn::Simple(opcodes::IRETURN));
//!             Ok(())
//!         }),
//!     )
//!     .build()?;
//!
//! let class = ClassFile::parse(&bytes)?;
//! assert_eq!(class.find_method("count", "()I")?, Some(0));
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    assembly::{FrameContext, MethodBody},
    classfile::{
        annotations::{Annotation, ElementValue},
        attributes::names,
        Attribute, ClassAccess, ClassFile, ConstantPool, FieldAccess, FieldEntry, MethodAccess,
        MethodEntry,
    },
    file::io::{push_be, push_len_u16},
    Result,
};

/// Type alias for method body assembly closures
type CodeFn = Box<dyn FnOnce(&mut ConstantPool, &mut MethodBody) -> Result<()>>;

/// Default class file major version (Java 8).
pub const DEFAULT_MAJOR_VERSION: u16 = 52;

/// An annotation element value in source form.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecValue {
    /// `boolean`
    Bool(bool),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `String`
    String(String),
    /// Enum constant: type descriptor and constant name
    Enum(String, String),
    /// Class literal, as a return descriptor
    Class(String),
    /// Nested annotation
    Annotation(AnnotationSpec),
    /// Array of values
    Array(Vec<SpecValue>),
}

impl SpecValue {
    fn to_element(&self, pool: &mut ConstantPool) -> Result<ElementValue> {
        Ok(match self {
            SpecValue::Bool(value) => ElementValue::Const {
                tag: b'Z',
                index: pool.add_integer(i32::from(*value))?,
            },
            SpecValue::Int(value) => ElementValue::Const {
                tag: b'I',
                index: pool.add_integer(*value)?,
            },
            SpecValue::Long(value) => ElementValue::Const {
                tag: b'J',
                index: pool.add_long(*value)?,
            },
            SpecValue::String(value) => ElementValue::Const {
                tag: b's',
                index: pool.add_utf8(value)?,
            },
            SpecValue::Enum(descriptor, constant) => ElementValue::Enum {
                type_name: pool.add_utf8(descriptor)?,
                const_name: pool.add_utf8(constant)?,
            },
            SpecValue::Class(descriptor) => ElementValue::Class(pool.add_utf8(descriptor)?),
            SpecValue::Annotation(nested) => ElementValue::Annotation(nested.to_annotation(pool)?),
            SpecValue::Array(values) => ElementValue::Array(
                values
                    .iter()
                    .map(|value| value.to_element(pool))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

/// An annotation in source form.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationSpec {
    /// Field descriptor of the annotation interface, e.g. `Lcom/example/Marker;`
    pub descriptor: String,
    /// Whether the annotation is retained at run time
    pub visible: bool,
    /// Named element values in declaration order
    pub elements: Vec<(String, SpecValue)>,
}

impl AnnotationSpec {
    /// A run-time visible annotation of the given type descriptor.
    #[must_use]
    pub fn new(descriptor: &str) -> Self {
        AnnotationSpec {
            descriptor: descriptor.to_string(),
            visible: true,
            elements: Vec::new(),
        }
    }

    /// A class-file-only (invisible) annotation of the given type descriptor.
    #[must_use]
    pub fn invisible(descriptor: &str) -> Self {
        AnnotationSpec {
            visible: false,
            ..AnnotationSpec::new(descriptor)
        }
    }

    /// Add an element value.
    #[must_use]
    pub fn with(mut self, name: &str, value: SpecValue) -> Self {
        self.elements.push((name.to_string(), value));
        self
    }

    /// Intern this annotation into `pool`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool overflows.
    pub fn to_annotation(&self, pool: &mut ConstantPool) -> Result<Annotation> {
        let type_index = pool.add_utf8(&self.descriptor)?;
        let mut elements = Vec::with_capacity(self.elements.len());
        for (name, value) in &self.elements {
            elements.push((pool.add_utf8(name)?, value.to_element(pool)?));
        }
        Ok(Annotation {
            type_index,
            elements,
        })
    }
}

/// Encode `annotations` into the visible and invisible annotation attributes.
fn annotation_attributes(
    pool: &mut ConstantPool,
    annotations: &[AnnotationSpec],
) -> Result<Vec<Attribute>> {
    let mut attributes = Vec::with_capacity(2);
    for (visible, name) in [
        (true, names::RUNTIME_VISIBLE_ANNOTATIONS),
        (false, names::RUNTIME_INVISIBLE_ANNOTATIONS),
    ] {
        let selected: Vec<Annotation> = annotations
            .iter()
            .filter(|spec| spec.visible == visible)
            .map(|spec| spec.to_annotation(pool))
            .collect::<Result<_>>()?;
        if selected.is_empty() {
            continue;
        }
        let mut info = Vec::new();
        Annotation::write_list(&mut info, &selected)?;
        attributes.push(Attribute::new(pool, name, info)?);
    }
    Ok(attributes)
}

fn signature_attribute(pool: &mut ConstantPool, signature: &str) -> Result<Attribute> {
    let index = pool.add_utf8(signature)?;
    Attribute::new(pool, names::SIGNATURE, index.to_be_bytes().to_vec())
}

/// A field declaration.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    access: FieldAccess,
    name: String,
    descriptor: String,
    signature: Option<String>,
    annotations: Vec<AnnotationSpec>,
}

impl FieldSpec {
    /// Declare a field.
    #[must_use]
    pub fn new(access: FieldAccess, name: &str, descriptor: &str) -> Self {
        FieldSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
            annotations: Vec::new(),
        }
    }

    /// Attach a generic signature.
    #[must_use]
    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    /// Attach an annotation.
    #[must_use]
    pub fn annotation(mut self, annotation: AnnotationSpec) -> Self {
        self.annotations.push(annotation);
        self
    }

    fn build(self, pool: &mut ConstantPool) -> Result<FieldEntry> {
        let name_index = pool.add_utf8(&self.name)?;
        let descriptor_index = pool.add_utf8(&self.descriptor)?;
        let mut attributes = Vec::new();
        if let Some(signature) = &self.signature {
            attributes.push(signature_attribute(pool, signature)?);
        }
        attributes.extend(annotation_attributes(pool, &self.annotations)?);
        Ok(FieldEntry {
            access: self.access,
            name_index,
            descriptor_index,
            attributes,
        })
    }
}

/// A method declaration, with or without a body.
pub struct MethodSpec {
    access: MethodAccess,
    name: String,
    descriptor: String,
    signature: Option<String>,
    annotations: Vec<AnnotationSpec>,
    parameter_annotations: Vec<(usize, AnnotationSpec)>,
    parameter_names: Vec<String>,
    exceptions: Vec<String>,
    code: Option<CodeFn>,
}

impl MethodSpec {
    /// Declare a method. Without [`MethodSpec::code`] it has no `Code` attribute.
    #[must_use]
    pub fn new(access: MethodAccess, name: &str, descriptor: &str) -> Self {
        MethodSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
            annotations: Vec::new(),
            parameter_annotations: Vec::new(),
            parameter_names: Vec::new(),
            exceptions: Vec::new(),
            code: None,
        }
    }

    /// Provide the body.
    ///
    /// The closure receives the class's constant pool and an empty body. `max_stack` and
    /// `max_locals` are computed when the body is encoded.
    #[must_use]
    pub fn code<F>(mut self, assemble: F) -> Self
    where
        F: FnOnce(&mut ConstantPool, &mut MethodBody) -> Result<()> + 'static,
    {
        self.code = Some(Box::new(assemble));
        self
    }

    /// Attach a generic signature.
    #[must_use]
    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    /// Attach an annotation to the method.
    #[must_use]
    pub fn annotation(mut self, annotation: AnnotationSpec) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Attach an annotation to the parameter at `index` (0-based, receiver excluded).
    #[must_use]
    pub fn parameter_annotation(mut self, index: usize, annotation: AnnotationSpec) -> Self {
        self.parameter_annotations.push((index, annotation));
        self
    }

    /// Record parameter names in a `MethodParameters` attribute.
    #[must_use]
    pub fn parameter_names(mut self, parameter_names: &[&str]) -> Self {
        self.parameter_names = parameter_names.iter().map(ToString::to_string).collect();
        self
    }

    /// Declare a thrown exception class by internal name.
    #[must_use]
    pub fn exception(mut self, internal_name: &str) -> Self {
        self.exceptions.push(internal_name.to_string());
        self
    }

    pub(crate) fn build(self, owner: &str, pool: &mut ConstantPool) -> Result<MethodEntry> {
        let name_index = pool.add_utf8(&self.name)?;
        let descriptor_index = pool.add_utf8(&self.descriptor)?;
        let mut attributes = Vec::new();

        if let Some(assemble) = self.code {
            let context = FrameContext::new(owner, &self.name, &self.descriptor, self.access)?;
            let mut body = MethodBody::new();
            assemble(pool, &mut body)?;
            let info = body.encode(pool, &context)?;
            attributes.push(Attribute::new(pool, names::CODE, info)?);
        }

        if !self.exceptions.is_empty() {
            let mut info = Vec::with_capacity(2 + 2 * self.exceptions.len());
            push_len_u16(&mut info, self.exceptions.len(), "exceptions")?;
            for exception in &self.exceptions {
                push_be(&mut info, pool.add_class(exception)?);
            }
            attributes.push(Attribute::new(pool, names::EXCEPTIONS, info)?);
        }

        if let Some(signature) = &self.signature {
            attributes.push(signature_attribute(pool, signature)?);
        }

        attributes.extend(annotation_attributes(pool, &self.annotations)?);

        if !self.parameter_annotations.is_empty() {
            let count = crate::classfile::descriptor::MethodDescriptor::parse(&self.descriptor)?
                .parameters
                .len();
            for (visible, name) in [
                (true, names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS),
                (false, names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS),
            ] {
                let mut per_parameter: Vec<Vec<Annotation>> = vec![Vec::new(); count];
                let mut any = false;
                for (index, spec) in &self.parameter_annotations {
                    if spec.visible != visible {
                        continue;
                    }
                    let slot = per_parameter.get_mut(*index).ok_or_else(|| {
                        malformed_error!(
                            "Parameter annotation index {} exceeds {} parameters of {}",
                            index,
                            count,
                            self.name
                        )
                    })?;
                    slot.push(spec.to_annotation(pool)?);
                    any = true;
                }
                if any {
                    let mut info = Vec::new();
                    Annotation::write_parameter_list(&mut info, &per_parameter)?;
                    attributes.push(Attribute::new(pool, name, info)?);
                }
            }
        }

        if !self.parameter_names.is_empty() {
            let count = u8::try_from(self.parameter_names.len())
                .map_err(|_| malformed_error!("Too many parameter names"))?;
            let mut info = vec![count];
            for name in &self.parameter_names {
                push_be(&mut info, pool.add_utf8(name)?);
                push_be(&mut info, 0_u16);
            }
            attributes.push(Attribute::new(pool, names::METHOD_PARAMETERS, info)?);
        }

        Ok(MethodEntry {
            access: self.access,
            name_index,
            descriptor_index,
            attributes,
        })
    }
}

/// Composes a class file.
pub struct ClassBuilder {
    name: String,
    access: ClassAccess,
    super_class: Option<String>,
    interfaces: Vec<String>,
    major_version: u16,
    minor_version: u16,
    signature: Option<String>,
    source_file: Option<String>,
    annotations: Vec<AnnotationSpec>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
    record_components: Vec<(String, String)>,
}

impl ClassBuilder {
    /// Start a public class extending `java/lang/Object`.
    #[must_use]
    pub fn new(internal_name: &str) -> Self {
        ClassBuilder {
            name: internal_name.to_string(),
            access: ClassAccess::PUBLIC | ClassAccess::SUPER,
            super_class: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            major_version: DEFAULT_MAJOR_VERSION,
            minor_version: 0,
            signature: None,
            source_file: None,
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            record_components: Vec::new(),
        }
    }

    /// Start a public interface.
    #[must_use]
    pub fn new_interface(internal_name: &str) -> Self {
        ClassBuilder::new(internal_name)
            .access(ClassAccess::PUBLIC | ClassAccess::INTERFACE | ClassAccess::ABSTRACT)
    }

    /// Replace the access flags.
    #[must_use]
    pub fn access(mut self, access: ClassAccess) -> Self {
        self.access = access;
        self
    }

    /// Set the superclass, or `None` for `java/lang/Object` itself and modules.
    #[must_use]
    pub fn super_class(mut self, internal_name: Option<&str>) -> Self {
        self.super_class = internal_name.map(ToString::to_string);
        self
    }

    /// Add a direct superinterface.
    #[must_use]
    pub fn interface(mut self, internal_name: &str) -> Self {
        self.interfaces.push(internal_name.to_string());
        self
    }

    /// Set the class file version.
    #[must_use]
    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }

    /// Attach a generic class signature.
    #[must_use]
    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    /// Attach a `SourceFile` attribute.
    #[must_use]
    pub fn source_file(mut self, file_name: &str) -> Self {
        self.source_file = Some(file_name.to_string());
        self
    }

    /// Attach a class annotation.
    #[must_use]
    pub fn annotation(mut self, annotation: AnnotationSpec) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a method.
    #[must_use]
    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a record component; any component makes the class carry a `Record` attribute.
    #[must_use]
    pub fn record_component(mut self, name: &str, descriptor: &str) -> Self {
        self.record_components
            .push((name.to_string(), descriptor.to_string()));
        self
    }

    /// Assemble the class file structure.
    ///
    /// # Errors
    /// Returns an error if a descriptor is invalid, a body fails to encode or a table
    /// overflows.
    pub fn build_class(self) -> Result<ClassFile> {
        let mut pool = ConstantPool::new();
        let this_class = pool.add_class(&self.name)?;
        let super_class = match &self.super_class {
            Some(name) => pool.add_class(name)?,
            None => 0,
        };
        let interfaces = self
            .interfaces
            .iter()
            .map(|name| pool.add_class(name))
            .collect::<Result<Vec<_>>>()?;

        let fields = self
            .fields
            .into_iter()
            .map(|field| field.build(&mut pool))
            .collect::<Result<Vec<_>>>()?;
        let mut methods = Vec::with_capacity(self.methods.len());
        for method in self.methods {
            methods.push(method.build(&self.name, &mut pool)?);
        }

        let mut attributes = Vec::new();
        if let Some(source_file) = &self.source_file {
            let index = pool.add_utf8(source_file)?;
            attributes.push(Attribute::new(
                &mut pool,
                names::SOURCE_FILE,
                index.to_be_bytes().to_vec(),
            )?);
        }
        if let Some(signature) = &self.signature {
            attributes.push(signature_attribute(&mut pool, signature)?);
        }
        attributes.extend(annotation_attributes(&mut pool, &self.annotations)?);
        if !self.record_components.is_empty() {
            let mut info = Vec::new();
            push_len_u16(&mut info, self.record_components.len(), "record components")?;
            for (name, descriptor) in &self.record_components {
                push_be(&mut info, pool.add_utf8(name)?);
                push_be(&mut info, pool.add_utf8(descriptor)?);
                push_be(&mut info, 0_u16);
            }
            attributes.push(Attribute::new(&mut pool, names::RECORD, info)?);
        }

        Ok(ClassFile {
            minor_version: self.minor_version,
            major_version: self.major_version,
            pool,
            access: self.access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Assemble and emit the class file.
    ///
    /// # Errors
    /// See [`ClassBuilder::build_class`].
    pub fn build(self) -> Result<Vec<u8>> {
        self.build_class()?.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{opcodes::*, Insn},
        classfile::attributes,
    };

    #[test]
    fn annotations_are_split_by_retention() {
        let class = ClassBuilder::new("a/B")
            .annotation(AnnotationSpec::new("La/Visible;"))
            .annotation(AnnotationSpec::invisible("La/Hidden;").with("n", SpecValue::Int(3)))
            .build_class()
            .unwrap();

        let visible = class.attribute(names::RUNTIME_VISIBLE_ANNOTATIONS).unwrap();
        let hidden = class.attribute(names::RUNTIME_INVISIBLE_ANNOTATIONS).unwrap();
        assert_eq!(Annotation::parse_list(&visible.info).unwrap().len(), 1);
        let hidden = Annotation::parse_list(&hidden.info).unwrap();
        assert_eq!(class.pool.utf8(hidden[0].type_index).unwrap(), "La/Hidden;");
    }

    #[test]
    fn method_with_code_and_parameter_annotations() {
        let class = ClassBuilder::new("a/B")
            .method(
                MethodSpec::new(MethodAccess::PUBLIC | MethodAccess::STATIC, "id", "(JI)J")
                    .parameter_annotation(1, AnnotationSpec::invisible("La/Positive;"))
                    .parameter_names(&["value", "unused"])
                    .exception("java/io/IOException")
                    .code(|_, body| {
                        body.push(Insn::Simple(0x1E)); // lload_0
                        body.push(Insn::Simple(LRETURN));
                        Ok(())
                    }),
            )
            .build_class()
            .unwrap();

        let method = &class.methods[0];
        let code = attributes::find(&class.pool, &method.attributes, names::CODE).unwrap();
        let raw = crate::assembly::CodeAttribute::parse(&code.info).unwrap();
        assert_eq!((raw.max_stack, raw.max_locals), (2, 3));

        let parameters = attributes::find(
            &class.pool,
            &method.attributes,
            names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS,
        )
        .unwrap();
        let parameters = Annotation::parse_parameter_list(&parameters.info).unwrap();
        assert_eq!(parameters.len(), 2);
        assert!(parameters[0].is_empty());
        assert_eq!(parameters[1].len(), 1);
    }

    #[test]
    fn parameter_annotation_out_of_range() {
        let result = ClassBuilder::new("a/B")
            .method(
                MethodSpec::new(MethodAccess::PUBLIC | MethodAccess::ABSTRACT, "f", "(I)V")
                    .parameter_annotation(2, AnnotationSpec::new("La/X;")),
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn record_and_interface() {
        let record = ClassBuilder::new("a/Point")
            .super_class(Some("java/lang/Record"))
            .record_component("x", "I")
            .build_class()
            .unwrap();
        let info = &record.attribute(names::RECORD).unwrap().info;
        assert_eq!(attributes::read_record(info).unwrap().len(), 1);

        let interface = ClassBuilder::new_interface("a/Api").build_class().unwrap();
        assert!(interface.is_interface());
    }
}
