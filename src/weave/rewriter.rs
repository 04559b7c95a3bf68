//! Editable view of one class file during weaving.
//!
//! A [`ClassRewriter`] owns the parsed [`ClassFile`] of the unit being woven. Method bodies
//! are decoded on first request and kept in decoded form until [`ClassRewriter::commit`]
//! encodes them back, which recomputes `max_stack` and `max_locals`. Every edit raises the
//! `modified` flag; a rewriter that was never edited emits nothing.
//!
//! # Example
//!
//! ```rust
//! use classweave::classfile::{ClassBuilder, MethodAccess, MethodSpec};
//! use classweave::assembly::{opcodes, Insn};
//! use classweave::weave::ClassRewriter;
//!
//! let bytes = ClassBuilder::new("com/example/Service").build()?;
//! let mut rewriter = ClassRewriter::parse(&bytes)?;
//! assert!(rewriter.add_interface("java/io/Serializable")?);
//! assert!(!rewriter.add_interface("java/io/Serializable")?);
//!
//! rewriter.add_method(
//!     MethodSpec::new(MethodAccess::PUBLIC, "ping", "()V")
//!         .code(|_, body| Ok(body.push(Insn::Simple(opcodes::RETURN)))),
//! )?;
//! let woven = rewriter.finish()?.expect("edited");
//! assert_ne!(woven, bytes);
//! # Ok::<(), classweave::Error>(())
//! ```

use std::collections::BTreeMap;

use crate::{
    assembly::{FrameContext, MethodBody},
    classfile::{
        annotations::Annotation,
        attributes::{self, names},
        descriptor::MethodDescriptor,
        Attribute, ClassFile, ConstantPool, MethodAccess, MethodEntry, MethodSpec,
    },
    metadata::{MarkerMap, ScannedUnit, UnitRef},
    Error, Result,
};

/// Attributes that carry the annotations of a method and its parameters.
pub const ANNOTATION_ATTRIBUTES: &[&str] = &[
    names::RUNTIME_VISIBLE_ANNOTATIONS,
    names::RUNTIME_INVISIBLE_ANNOTATIONS,
    names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS,
    names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS,
];

/// The class file of one unit, open for editing.
#[derive(Debug)]
pub struct ClassRewriter {
    class: ClassFile,
    unit: UnitRef,
    bodies: BTreeMap<usize, MethodBody>,
    modified: bool,
}

impl ClassRewriter {
    /// Parse `data` for editing.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedUnit`] if the bytes are not a valid class file.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let class = ClassFile::parse(data).map_err(|error| {
            let unit = ClassFile::peek_name(data)
                .map(|name| UnitRef::from_internal(&name).qualified_name())
                .unwrap_or_else(|_| "<unknown>".to_string());
            Error::malformed_unit(unit, error)
        })?;
        Self::new(class)
    }

    /// Open an already parsed class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if `this_class` is invalid.
    pub fn new(class: ClassFile) -> Result<Self> {
        let unit = UnitRef::from_internal(&class.this_name()?);
        Ok(ClassRewriter {
            class,
            unit,
            bodies: BTreeMap::new(),
            modified: false,
        })
    }

    /// The unit being rewritten.
    #[must_use]
    pub fn unit(&self) -> &UnitRef {
        &self.unit
    }

    /// The class file as edited so far. Bodies still in decoded form are not reflected
    /// until [`ClassRewriter::commit`].
    #[must_use]
    pub fn class(&self) -> &ClassFile {
        &self.class
    }

    /// The constant pool, for stages that intern entries for new instructions.
    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.class.pool
    }

    /// Returns `true` once any edit was made.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Internal names of the declared interfaces, in declaration order.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if an interface index is invalid.
    pub fn interface_names(&self) -> Result<Vec<String>> {
        self.class.interface_names()
    }

    /// Add `internal_name` to the declared interfaces unless it is already there.
    ///
    /// Returns `true` if the list changed.
    ///
    /// # Errors
    /// Returns an error if the constant pool is full or an existing entry is invalid.
    pub fn add_interface(&mut self, internal_name: &str) -> Result<bool> {
        if self
            .interface_names()?
            .iter()
            .any(|existing| existing == internal_name)
        {
            return Ok(false);
        }
        let index = self.class.pool.add_class(internal_name)?;
        self.class.interfaces.push(index);
        self.modified = true;
        Ok(true)
    }

    /// Number of methods, including added ones.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.class.methods.len()
    }

    /// The method at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if there is no such method.
    pub fn method(&self, index: usize) -> Result<&MethodEntry> {
        self.class
            .methods
            .get(index)
            .ok_or_else(|| invariant_error!("No method #{} in {}", index, self.unit))
    }

    /// Name and descriptor of the method at `index`.
    ///
    /// # Errors
    /// Returns an error if there is no such method or its entries are invalid.
    pub fn method_signature(&self, index: usize) -> Result<(String, String)> {
        Ok((
            self.class.method_name(index)?,
            self.class.method_descriptor(index)?,
        ))
    }

    /// Index of the method `name` with `descriptor`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if a method entry is invalid.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Result<Option<usize>> {
        self.class.find_method(name, descriptor)
    }

    /// Markers declared on the method at `index`.
    ///
    /// # Errors
    /// Returns an error if an annotation attribute cannot be decoded.
    pub fn method_markers(&self, index: usize) -> Result<MarkerMap> {
        MarkerMap::from_attributes(&self.class.pool, &self.method(index)?.attributes)
    }

    /// Markers of each descriptor parameter of the method at `index`.
    ///
    /// # Errors
    /// Returns an error if the descriptor or an annotation attribute cannot be decoded.
    pub fn parameter_markers(&self, index: usize) -> Result<Vec<MarkerMap>> {
        let count = MethodDescriptor::parse(&self.class.method_descriptor(index)?)?
            .parameters
            .len();
        MarkerMap::parameters_from_attributes(
            &self.class.pool,
            &self.method(index)?.attributes,
            count,
        )
    }

    /// The frame context of the method at `index`.
    ///
    /// # Errors
    /// Returns an error if there is no such method or its descriptor is invalid.
    pub fn frame_context(&self, index: usize) -> Result<FrameContext> {
        let (name, descriptor) = self.method_signature(index)?;
        FrameContext::new(
            self.unit.internal_name(),
            &name,
            &descriptor,
            self.method(index)?.access,
        )
    }

    /// Add a method and return its index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if a method with the same name and descriptor
    /// exists, and any error raised while assembling the body.
    pub fn add_method(&mut self, spec: MethodSpec) -> Result<usize> {
        let entry = spec.build(self.unit.internal_name(), &mut self.class.pool)?;
        let name = self.class.pool.utf8(entry.name_index)?;
        let descriptor = self.class.pool.utf8(entry.descriptor_index)?;
        if self.find_method(&name, &descriptor)?.is_some() {
            return Err(invariant_error!(
                "{} already declares {}{}",
                self.unit,
                name,
                descriptor
            ));
        }
        self.class.methods.push(entry);
        self.modified = true;
        Ok(self.class.methods.len() - 1)
    }

    /// Give the method at `index` a new name.
    ///
    /// # Errors
    /// Returns an error if there is no such method or the constant pool is full.
    pub fn rename_method(&mut self, index: usize, name: &str) -> Result<()> {
        self.method(index)?;
        let name_index = self.class.pool.add_utf8(name)?;
        self.class.methods[index].name_index = name_index;
        self.modified = true;
        Ok(())
    }

    /// Replace the access flags of the method at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if there is no such method.
    pub fn set_method_access(&mut self, index: usize, access: MethodAccess) -> Result<()> {
        self.method(index)?;
        self.class.methods[index].access = access;
        self.modified = true;
        Ok(())
    }

    /// Remove and return the attributes called one of `attribute_names` from the method at
    /// `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if there is no such method.
    pub fn take_method_attributes(
        &mut self,
        index: usize,
        attribute_names: &[&str],
    ) -> Result<Vec<Attribute>> {
        self.method(index)?;
        let pool = &self.class.pool;
        let (taken, kept): (Vec<Attribute>, Vec<Attribute>) =
            std::mem::take(&mut self.class.methods[index].attributes)
                .into_iter()
                .partition(|attribute| {
                    attribute_names
                        .iter()
                        .any(|name| attribute.is(pool, name))
                });
        self.class.methods[index].attributes = kept;
        if !taken.is_empty() {
            self.modified = true;
        }
        Ok(taken)
    }

    /// Append attributes to the method at `index`. The attributes must index this class's
    /// constant pool.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if there is no such method.
    pub fn push_method_attributes(
        &mut self,
        index: usize,
        attributes: impl IntoIterator<Item = Attribute>,
    ) -> Result<()> {
        self.method(index)?;
        let before = self.class.methods[index].attributes.len();
        self.class.methods[index].attributes.extend(attributes);
        if self.class.methods[index].attributes.len() != before {
            self.modified = true;
        }
        Ok(())
    }

    /// Copy the parameter annotations of a method of another class onto the method at
    /// `index`, re-interning them into this class's constant pool.
    ///
    /// # Errors
    /// Returns an error if an annotation table cannot be decoded or re-interned.
    pub fn import_parameter_annotations(
        &mut self,
        index: usize,
        from: &ClassFile,
        from_attributes: &[Attribute],
    ) -> Result<()> {
        self.method(index)?;
        for name in [
            names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS,
            names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS,
        ] {
            let Some(attribute) = attributes::find(&from.pool, from_attributes, name) else {
                continue;
            };
            let mut table = Vec::new();
            for parameter in Annotation::parse_parameter_list(&attribute.info)? {
                table.push(
                    parameter
                        .iter()
                        .map(|annotation| annotation.import(&from.pool, &mut self.class.pool))
                        .collect::<Result<Vec<_>>>()?,
                );
            }
            let mut info = Vec::new();
            Annotation::write_parameter_list(&mut info, &table)?;
            let copied = Attribute::new(&mut self.class.pool, name, info)?;
            self.class.methods[index].attributes.push(copied);
            self.modified = true;
        }
        Ok(())
    }

    /// The decoded body of the method at `index`, or `None` for abstract and native methods.
    ///
    /// Requesting a body counts as an edit: it is encoded again on commit.
    ///
    /// # Errors
    /// Returns an error if there is no such method or its `Code` attribute cannot be
    /// decoded.
    pub fn body_mut(&mut self, index: usize) -> Result<Option<&mut MethodBody>> {
        if !self.bodies.contains_key(&index) {
            let context = self.frame_context(index)?;
            let attributes = &self.method(index)?.attributes;
            let Some(body) = MethodBody::from_attributes(attributes, &self.class.pool, &context)?
            else {
                return Ok(None);
            };
            self.bodies.insert(index, body);
        }
        self.modified = true;
        Ok(self.bodies.get_mut(&index))
    }

    /// Encode every decoded body back into its `Code` attribute.
    ///
    /// # Errors
    /// Returns the encoder error of the first body that fails.
    pub fn commit(&mut self) -> Result<()> {
        for (index, body) in std::mem::take(&mut self.bodies) {
            let context = self.frame_context(index)?;
            let info = body.encode(&mut self.class.pool, &context)?;
            let position = self.class.methods[index]
                .attributes
                .iter()
                .position(|attribute| attribute.is(&self.class.pool, names::CODE))
                .ok_or_else(|| invariant_error!("Method #{} of {} lost its body", index, self.unit))?;
            self.class.methods[index].attributes[position].info = info;
        }
        Ok(())
    }

    /// Commit and rescan the current state, so later stages see earlier edits.
    ///
    /// # Errors
    /// Returns the commit error, or [`crate::Error::MalformedUnit`] if the edited class no
    /// longer scans.
    pub fn snapshot(&mut self) -> Result<ScannedUnit> {
        self.commit()?;
        ScannedUnit::from_bytes(&self.class.to_bytes()?)
    }

    /// Commit and emit the class file, or `None` if nothing was edited.
    ///
    /// # Errors
    /// Returns the commit error, or [`crate::Error::Malformed`] if a table overflowed.
    pub fn finish(mut self) -> Result<Option<Vec<u8>>> {
        if !self.modified {
            return Ok(None);
        }
        self.commit()?;
        self.class.to_bytes().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{opcodes, Insn},
        classfile::{AnnotationSpec, ClassBuilder, FieldAccess, FieldSpec},
        metadata::Member,
    };

    fn sample() -> Vec<u8> {
        ClassBuilder::new("com/example/Service")
            .interface("java/lang/Runnable")
            .field(FieldSpec::new(FieldAccess::PRIVATE, "count", "I"))
            .method(
                MethodSpec::new(MethodAccess::PUBLIC, "run", "()V")
                    .annotation(AnnotationSpec::new("Lio/classweave/marker/Retry;"))
                    .code(|_, body| {
                        body.push(Insn::Simple(opcodes::RETURN));
                        Ok(())
                    }),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn untouched_rewriter_emits_nothing() {
        let mut rewriter = ClassRewriter::parse(&sample()).unwrap();
        assert!(!rewriter.add_interface("java/lang/Runnable").unwrap());
        assert!(!rewriter.is_modified());
        assert_eq!(rewriter.finish().unwrap(), None);
    }

    #[test]
    fn interfaces_are_unioned_once() {
        let mut rewriter = ClassRewriter::parse(&sample()).unwrap();
        assert!(rewriter.add_interface("java/io/Closeable").unwrap());
        assert!(!rewriter.add_interface("java/io/Closeable").unwrap());
        assert_eq!(
            rewriter.interface_names().unwrap(),
            vec!["java/lang/Runnable", "java/io/Closeable"]
        );
    }

    #[test]
    fn duplicate_methods_are_rejected() {
        let mut rewriter = ClassRewriter::parse(&sample()).unwrap();
        let spec = MethodSpec::new(MethodAccess::PUBLIC, "run", "()V");
        assert!(matches!(
            rewriter.add_method(spec),
            Err(Error::Error(_))
        ));
    }

    #[test]
    fn rename_and_move_annotations() {
        let mut rewriter = ClassRewriter::parse(&sample()).unwrap();
        let index = rewriter.find_method("run", "()V").unwrap().unwrap();
        assert_eq!(rewriter.method_markers(index).unwrap().len(), 1);

        let taken = rewriter
            .take_method_attributes(index, ANNOTATION_ATTRIBUTES)
            .unwrap();
        assert_eq!(taken.len(), 1);
        rewriter.rename_method(index, "run$retry").unwrap();

        let added = rewriter
            .add_method(MethodSpec::new(MethodAccess::PUBLIC, "run", "()V").code(|_, body| {
                body.push(Insn::Simple(opcodes::RETURN));
                Ok(())
            }))
            .unwrap();
        rewriter.push_method_attributes(added, taken).unwrap();

        let scanned = rewriter.snapshot().unwrap();
        let renamed = scanned.content.methods.method("run$retry", "()V").unwrap();
        assert!(renamed.markers().is_empty());
        let wrapper = scanned.content.methods.method("run", "()V").unwrap();
        assert_eq!(wrapper.markers().len(), 1);
    }

    #[test]
    fn edited_bodies_are_reencoded() {
        let mut rewriter = ClassRewriter::parse(&sample()).unwrap();
        let index = rewriter.find_method("run", "()V").unwrap().unwrap();
        let body = rewriter.body_mut(index).unwrap().unwrap();
        body.insert(
            0,
            [
                crate::assembly::Node::Insn(Insn::int(1)),
                crate::assembly::Node::Insn(Insn::Simple(opcodes::POP)),
            ],
        );

        let woven = rewriter.finish().unwrap().unwrap();
        let scanned = ScannedUnit::from_bytes(&woven).unwrap();
        let summary = scanned
            .content
            .methods
            .method("run", "()V")
            .unwrap()
            .body
            .unwrap();
        assert_eq!(summary.code_length, 3);
        assert_eq!(summary.max_stack, 1);
    }
}
