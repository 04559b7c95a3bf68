//! Declaration scopes and use-site resolution.
//!
//! Resolution happens in two steps. First the type-parameter block of a class or method
//! signature is read into a [`GenericScope`], resolving every bound once. Then use-site
//! types are parsed against that scope: each type variable becomes its declaration's
//! bound, wildcards become their bound (or `java/lang/Object` for `*`) and variance is
//! dropped.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    metadata::generics::{
        reader::SignatureReader,
        shape::{ActualType, GenericDeclaration, UnitShapes},
    },
    Error, Result,
};

/// Nesting limit for type arguments and arrays in one signature.
const MAX_NESTING_DEPTH: usize = 64;

/// Type parameters visible at one declaration site.
///
/// Method scopes chain to their class scope; a lookup checks the innermost scope first,
/// so method-level declarations shadow class-level ones of the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericScope {
    declarations: Vec<GenericDeclaration>,
    parent: Option<Arc<GenericScope>>,
}

impl GenericScope {
    /// An empty scope without parent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain this scope below `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<Arc<GenericScope>>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// The enclosing scope.
    #[must_use]
    pub fn parent(&self) -> Option<&GenericScope> {
        self.parent.as_deref()
    }

    /// Find the declaration of `name`, searching outward.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&GenericDeclaration> {
        self.declarations
            .iter()
            .find(|declaration| declaration.name == name)
            .or_else(|| self.parent.as_deref().and_then(|parent| parent.lookup(name)))
    }

    /// Declarations made directly in this scope, in declaration order.
    #[must_use]
    pub fn declarations(&self) -> &[GenericDeclaration] {
        &self.declarations
    }

    /// Number of declarations made directly in this scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns `true` if this scope declares nothing itself.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// Read the type-parameter declarations at the start of a class or method signature.
///
/// A signature without a `<...>` block yields an empty scope.
///
/// # Errors
/// - [`crate::Error::UnsupportedGenericDeclaration`] if a bound has type arguments or the
///   bounds of two parameters refer to each other
/// - [`crate::Error::UnknownGenericParameter`] if a bound names an undeclared variable
/// - [`crate::Error::Malformed`] for syntax errors
pub fn parse_declarations(signature: &str) -> Result<GenericScope> {
    declare(signature, None)
}

/// Like [`parse_declarations`], for a method whose bounds may refer to the type
/// parameters of its class. The result is chained below `parent`.
///
/// # Errors
/// Same as [`parse_declarations`].
pub fn parse_declarations_in(parent: &Arc<GenericScope>, signature: &str) -> Result<GenericScope> {
    declare(signature, Some(parent)).map(|scope| scope.with_parent(Arc::clone(parent)))
}

/// Resolve the parameter shapes of a method signature against `scope`.
///
/// The signature's own type-parameter block is skipped; build `scope` with
/// [`parse_declarations_in`] to make those declarations visible.
///
/// # Errors
/// Returns [`crate::Error::UnknownGenericParameter`] for undeclared variables and
/// [`crate::Error::Malformed`] for syntax errors.
pub fn parse_parameter_shapes(scope: &GenericScope, signature: &str) -> Result<Vec<ActualType>> {
    let mut reader = SignatureReader::new(signature);
    skip_declarations(&mut reader)?;
    let block = reader.read_block('(', ')')?;
    let mut parameters = SignatureReader::new(block);
    let mut shapes = Vec::new();
    while !parameters.is_empty() {
        shapes.push(parse_shape(&mut parameters, scope, 0)?);
    }
    Ok(shapes)
}

/// Resolve the return shape of a method signature. `void` is `Primitive('V')`.
///
/// # Errors
/// Same as [`parse_parameter_shapes`].
pub fn parse_return_shape(scope: &GenericScope, signature: &str) -> Result<ActualType> {
    let mut reader = SignatureReader::new(signature);
    skip_declarations(&mut reader)?;
    reader.read_block('(', ')')?;
    let shape = parse_shape(&mut reader, scope, 0)?;
    // Only a throws clause may follow
    if !reader.is_empty() && reader.peek() != Some('^') {
        return Err(malformed_error!(
            "Unexpected '{}' after return type in '{}'",
            reader.rest(),
            signature
        ));
    }
    Ok(shape)
}

/// Resolve a field signature.
///
/// # Errors
/// Same as [`parse_parameter_shapes`], plus [`crate::Error::Malformed`] for trailing input.
pub fn parse_field_shape(scope: &GenericScope, signature: &str) -> Result<ActualType> {
    let mut reader = SignatureReader::new(signature);
    let shape = parse_shape(&mut reader, scope, 0)?;
    expect_end(&reader)?;
    Ok(shape)
}

/// Resolve the superclass and superinterfaces of a class signature.
///
/// # Errors
/// Same as [`parse_parameter_shapes`].
pub fn parse_unit_shapes(scope: &GenericScope, signature: &str) -> Result<UnitShapes> {
    let mut reader = SignatureReader::new(signature);
    skip_declarations(&mut reader)?;
    let supertype = parse_shape(&mut reader, scope, 0)?;
    let mut interfaces = Vec::new();
    while !reader.is_empty() {
        interfaces.push(parse_shape(&mut reader, scope, 0)?);
    }
    Ok(UnitShapes {
        supertype,
        interfaces,
    })
}

fn skip_declarations(reader: &mut SignatureReader<'_>) -> Result<()> {
    if reader.peek() == Some('<') {
        reader.read_block('<', '>')?;
    }
    Ok(())
}

fn expect_end(reader: &SignatureReader<'_>) -> Result<()> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(malformed_error!(
            "Trailing '{}' in signature '{}'",
            reader.rest(),
            reader.input()
        ))
    }
}

fn parse_shape(reader: &mut SignatureReader<'_>, scope: &GenericScope, depth: usize) -> Result<ActualType> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(malformed_error!(
            "Signature '{}' nests deeper than {}",
            reader.input(),
            MAX_NESTING_DEPTH
        ));
    }

    match reader.next_char()? {
        c @ ('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' | 'V') => Ok(ActualType::Primitive(c)),
        '[' => Ok(ActualType::Array(Box::new(parse_shape(reader, scope, depth + 1)?))),
        'T' => {
            let name = reader.read_identifier(&[';'])?;
            reader.expect(';')?;
            scope
                .lookup(name)
                .map(|declaration| declaration.bound.clone())
                .ok_or_else(|| Error::UnknownGenericParameter(name.to_string()))
        }
        'L' => {
            let mut internal_name = String::new();
            let mut args = Vec::new();
            loop {
                internal_name.push_str(reader.read_identifier(&['<', ';', '.'])?);
                if reader.eat('<') {
                    // Arguments of an outer class are dropped in favour of the innermost ones
                    args.clear();
                    while !reader.eat('>') {
                        args.push(parse_argument(reader, scope, depth + 1)?);
                    }
                }
                if reader.eat('.') {
                    internal_name.push('$');
                    continue;
                }
                reader.expect(';')?;
                break;
            }
            Ok(ActualType::Class {
                unit: internal_name.as_str().into(),
                args,
            })
        }
        other => Err(malformed_error!(
            "Unknown type tag '{}' in signature '{}'",
            other,
            reader.input()
        )),
    }
}

fn parse_argument(reader: &mut SignatureReader<'_>, scope: &GenericScope, depth: usize) -> Result<ActualType> {
    if reader.eat('*') {
        return Ok(ActualType::object());
    }
    // Variance is not tracked
    if !reader.eat('+') {
        reader.eat('-');
    }
    parse_shape(reader, scope, depth)
}

struct RawDeclaration<'a> {
    name: &'a str,
    bounds: Vec<&'a str>,
}

struct Declarer<'a, 'p> {
    raw: Vec<RawDeclaration<'a>>,
    parent: Option<&'p GenericScope>,
    resolved: HashMap<&'a str, GenericDeclaration>,
    visiting: HashSet<&'a str>,
}

fn declare(signature: &str, parent: Option<&Arc<GenericScope>>) -> Result<GenericScope> {
    let mut reader = SignatureReader::new(signature);
    if reader.peek() != Some('<') {
        return Ok(GenericScope::new());
    }

    let block = reader.read_block('<', '>')?;
    let mut inner = SignatureReader::new(block);
    let mut raw = Vec::new();
    while !inner.is_empty() {
        let name = inner.read_identifier(&[':'])?;
        inner.expect(':')?;
        let mut bounds = Vec::new();
        // The class bound may be empty when interface bounds follow
        if inner.peek() != Some(':') {
            bounds.push(inner.read_type()?);
        }
        while inner.eat(':') {
            bounds.push(inner.read_type()?);
        }
        raw.push(RawDeclaration { name, bounds });
    }

    let mut declarer = Declarer {
        raw,
        parent: parent.map(|p| &**p),
        resolved: HashMap::new(),
        visiting: HashSet::new(),
    };
    let names: Vec<&str> = declarer.raw.iter().map(|r| r.name).collect();
    let mut declarations = Vec::with_capacity(names.len());
    for name in names {
        declarations.push(declarer.resolve(name)?);
    }

    Ok(GenericScope {
        declarations,
        parent: None,
    })
}

impl<'a> Declarer<'a, '_> {
    // Bounds may refer to parameters declared later in the same block, so each one is
    // resolved on first demand.
    fn resolve(&mut self, name: &'a str) -> Result<GenericDeclaration> {
        if let Some(done) = self.resolved.get(name) {
            return Ok(done.clone());
        }
        if !self.visiting.insert(name) {
            return Err(Error::UnsupportedGenericDeclaration(name.to_string()));
        }

        let bounds: Vec<&'a str> = self
            .raw
            .iter()
            .find(|raw| raw.name == name)
            .map(|raw| raw.bounds.clone())
            .unwrap_or_default();
        let mut shapes = Vec::with_capacity(bounds.len());
        for bound in bounds {
            shapes.push(self.resolve_bound(name, bound)?);
        }

        let mut shapes = shapes.into_iter();
        let declaration = GenericDeclaration {
            name: name.to_string(),
            bound: shapes.next().unwrap_or_else(ActualType::object),
            additional_bounds: shapes.collect(),
        };
        self.visiting.remove(name);
        self.resolved.insert(name, declaration.clone());
        Ok(declaration)
    }

    fn resolve_bound(&mut self, declaring: &'a str, bound: &'a str) -> Result<ActualType> {
        if bound.contains('<') {
            return Err(Error::UnsupportedGenericDeclaration(declaring.to_string()));
        }
        let dimensions = bound.len() - bound.trim_start_matches('[').len();
        let element = &bound[dimensions..];

        let shape = if let Some(variable) = element.strip_prefix('T').and_then(|v| v.strip_suffix(';')) {
            if self.raw.iter().any(|raw| raw.name == variable) {
                self.resolve(variable)?.bound
            } else {
                self.parent
                    .and_then(|parent| parent.lookup(variable))
                    .map(|declaration| declaration.bound.clone())
                    .ok_or_else(|| Error::UnknownGenericParameter(variable.to_string()))?
            }
        } else {
            let mut reader = SignatureReader::new(element);
            let shape = parse_shape(&mut reader, &GenericScope::new(), 0)?;
            expect_end(&reader)?;
            shape
        };
        Ok(shape.wrap(dimensions))
    }
}
