//! Fields, methods, parameters and record components.
//!
//! Every member kind implements [`Member`], the capability surface stages query without
//! caring which kind they hold. A member's [`MemberKey`] is fixed when the scanner builds
//! it; [`MemberTable`] uses it for constant-time lookup while iterating in declaration
//! order.

use std::{collections::HashMap, fmt};

use crate::{
    classfile::{AccessLevel, FieldAccess, MethodAccess},
    metadata::{MarkerMap, UnitRef},
};

/// Stable identity of a member within its unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberKey {
    /// A field, identified by name
    Field(String),
    /// A method, identified by name and descriptor
    Method {
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },
    /// A parameter, identified by its method and 0-based position
    Parameter {
        /// Declaring method name
        name: String,
        /// Declaring method descriptor
        descriptor: String,
        /// Position among the descriptor's parameters
        index: usize,
    },
    /// A record component, identified by name
    Component(String),
}

impl MemberKey {
    /// Key of a method.
    #[must_use]
    pub fn method(name: &str, descriptor: &str) -> Self {
        MemberKey::Method {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    /// Key of a field.
    #[must_use]
    pub fn field(name: &str) -> Self {
        MemberKey::Field(name.to_string())
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKey::Field(name) | MemberKey::Component(name) => f.write_str(name),
            MemberKey::Method { name, descriptor } => write!(f, "{name}{descriptor}"),
            MemberKey::Parameter {
                name,
                descriptor,
                index,
            } => write!(f, "{name}{descriptor}#{index}"),
        }
    }
}

/// The capability surface shared by every member kind.
pub trait Member {
    /// Identity of the member.
    fn key(&self) -> &MemberKey;

    /// Simple name; parameters without a recorded name use `arg<index>`.
    fn name(&self) -> &str;

    /// Declared type as a field or method descriptor.
    fn descriptor(&self) -> &str;

    /// Generic signature, if one was recorded.
    fn signature(&self) -> Option<&str>;

    /// Visibility.
    fn access_level(&self) -> AccessLevel;

    /// Raw access and property flags.
    fn modifiers(&self) -> u16;

    /// Attached markers.
    fn markers(&self) -> &MarkerMap;

    /// Returns `true` if a marker of type `marker_type` is attached.
    fn has_marker(&self, marker_type: &UnitRef) -> bool {
        self.markers().contains(marker_type)
    }
}

/// A declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    /// Identity
    pub key: MemberKey,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Generic signature
    pub signature: Option<String>,
    /// Access and property flags
    pub access: FieldAccess,
    /// Attached markers
    pub markers: MarkerMap,
}

impl FieldInfo {
    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(FieldAccess::STATIC)
    }
}

impl Member for FieldInfo {
    fn key(&self) -> &MemberKey {
        &self.key
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn descriptor(&self) -> &str {
        &self.descriptor
    }
    fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
    fn access_level(&self) -> AccessLevel {
        self.access.level()
    }
    fn modifiers(&self) -> u16 {
        self.access.bits()
    }
    fn markers(&self) -> &MarkerMap {
        &self.markers
    }
}

/// One formal parameter of a method.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    /// Identity
    pub key: MemberKey,
    /// Position among the descriptor's parameters
    pub index: usize,
    /// First local variable slot holding the argument
    pub slot: u16,
    /// Name from `MethodParameters` or the local variable table, else `arg<index>`
    pub name: String,
    /// Whether `name` was recovered from the unit rather than invented
    pub named: bool,
    /// Field descriptor of the parameter
    pub descriptor: String,
    /// Generic signature of the parameter, if the method has one
    pub signature: Option<String>,
    /// Flags from `MethodParameters`
    pub flags: u16,
    /// Attached markers
    pub markers: MarkerMap,
}

impl Member for ParameterInfo {
    fn key(&self) -> &MemberKey {
        &self.key
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn descriptor(&self) -> &str {
        &self.descriptor
    }
    fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
    fn access_level(&self) -> AccessLevel {
        AccessLevel::Package
    }
    fn modifiers(&self) -> u16 {
        self.flags
    }
    fn markers(&self) -> &MarkerMap {
        &self.markers
    }
}

/// Structural facts about a method's `Code` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BodySummary {
    /// Declared operand stack size
    pub max_stack: u16,
    /// Declared local variable count
    pub max_locals: u16,
    /// Length of the code array in bytes
    pub code_length: usize,
    /// Exception table rows
    pub handler_count: usize,
    /// `LineNumberTable` entries
    pub line_count: usize,
    /// `LocalVariableTable` entries
    pub local_count: usize,
}

/// A declared method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    /// Identity
    pub key: MemberKey,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Generic signature
    pub signature: Option<String>,
    /// Access and property flags
    pub access: MethodAccess,
    /// Attached markers
    pub markers: MarkerMap,
    /// Formal parameters in declaration order
    pub parameters: Vec<ParameterInfo>,
    /// Return type descriptor, `V` for void
    pub return_descriptor: String,
    /// Declared thrown exceptions
    pub exceptions: Vec<UnitRef>,
    /// Summary of the body, `None` for abstract and native methods
    pub body: Option<BodySummary>,
}

impl MethodInfo {
    /// Returns `true` if the method has a body.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Returns `true` for abstract methods.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access.contains(MethodAccess::ABSTRACT)
    }

    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccess::STATIC)
    }

    /// Returns `true` for instance and class initializers.
    #[must_use]
    pub fn is_initializer(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }
}

impl Member for MethodInfo {
    fn key(&self) -> &MemberKey {
        &self.key
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn descriptor(&self) -> &str {
        &self.descriptor
    }
    fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
    fn access_level(&self) -> AccessLevel {
        self.access.level()
    }
    fn modifiers(&self) -> u16 {
        self.access.bits()
    }
    fn markers(&self) -> &MarkerMap {
        &self.markers
    }
}

/// A component of a value-record unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInfo {
    /// Identity
    pub key: MemberKey,
    /// Component name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Generic signature
    pub signature: Option<String>,
    /// Attached markers
    pub markers: MarkerMap,
}

impl Member for ComponentInfo {
    fn key(&self) -> &MemberKey {
        &self.key
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn descriptor(&self) -> &str {
        &self.descriptor
    }
    fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
    // Components are exposed through their public accessor
    fn access_level(&self) -> AccessLevel {
        AccessLevel::Public
    }
    fn modifiers(&self) -> u16 {
        0
    }
    fn markers(&self) -> &MarkerMap {
        &self.markers
    }
}

/// Members keyed for lookup, ordered by declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberTable<T: Member> {
    entries: Vec<T>,
    index: HashMap<MemberKey, usize>,
}

impl<T: Member> Default for MemberTable<T> {
    fn default() -> Self {
        MemberTable {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Member> MemberTable<T> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. A member with an existing key replaces the earlier one in place.
    pub fn insert(&mut self, member: T) {
        match self.index.get(member.key()) {
            Some(position) => self.entries[*position] = member,
            None => {
                self.index.insert(member.key().clone(), self.entries.len());
                self.entries.push(member);
            }
        }
    }

    /// The member with `key`.
    #[must_use]
    pub fn get(&self, key: &MemberKey) -> Option<&T> {
        self.index.get(key).map(|position| &self.entries[*position])
    }

    /// Returns `true` if a member with `key` exists.
    #[must_use]
    pub fn contains(&self, key: &MemberKey) -> bool {
        self.index.contains_key(key)
    }

    /// Members in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Members carrying a marker of type `marker_type`.
    pub fn with_marker<'a>(&'a self, marker_type: &'a UnitRef) -> impl Iterator<Item = &'a T> {
        self.entries
            .iter()
            .filter(move |member| member.has_marker(marker_type))
    }
}

impl MemberTable<FieldInfo> {
    /// The field called `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.get(&MemberKey::field(name))
    }
}

impl MemberTable<MethodInfo> {
    /// The method with `name` and `descriptor`.
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.get(&MemberKey::method(name, descriptor))
    }

    /// Every overload called `name`, in declaration order.
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodInfo> {
        self.entries.iter().filter(move |method| method.name == name)
    }
}

impl<'a, T: Member> IntoIterator for &'a MemberTable<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MarkerInstance;

    fn field(name: &str) -> FieldInfo {
        FieldInfo {
            key: MemberKey::field(name),
            name: name.to_string(),
            descriptor: "I".to_string(),
            signature: None,
            access: FieldAccess::PRIVATE,
            markers: MarkerMap::new(),
        }
    }

    #[test]
    fn table_keeps_declaration_order() {
        let mut table = MemberTable::new();
        table.insert(field("b"));
        table.insert(field("a"));
        let mut marked = field("b");
        marked
            .markers
            .insert(MarkerInstance::new(UnitRef::from("m/Tag")));
        table.insert(marked);

        assert_eq!(
            table.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            vec!["b", "a"]
        );
        assert_eq!(table.field("a").unwrap().access_level(), AccessLevel::Private);
        let tag = UnitRef::from("m/Tag");
        assert_eq!(table.with_marker(&tag).count(), 1);
        assert!(table.field("c").is_none());
    }

    #[test]
    fn key_display() {
        assert_eq!(MemberKey::method("run", "()V").to_string(), "run()V");
        let parameter = MemberKey::Parameter {
            name: "run".into(),
            descriptor: "(I)V".into(),
            index: 0,
        };
        assert_eq!(parameter.to_string(), "run(I)V#0");
    }
}
