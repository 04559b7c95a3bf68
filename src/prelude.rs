//! # classweave Prelude
//!
//! The types most hosts and tools need, for a single glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classweave operations
pub use crate::Error;

/// The result type used throughout classweave
pub use crate::Result;

/// Structured failure reports
pub use crate::report::{CrashReport, ReportKind};

// ================================================================================================
// Discovery
// ================================================================================================

/// Lookup paths and unit sources
pub use crate::classpath::{Archive, ClassPath, MemorySource, UnitSource};

/// The memoizing scanner and its unit model
pub use crate::metadata::{
    FieldInfo, MarkerInstance, MarkerMap, MarkerValue, Member, MemberKey, MethodInfo,
    ParameterInfo, ScannedUnit, Scanner, UnitContent, UnitInfo, UnitKind, UnitRef,
};

/// Generic shapes
pub use crate::metadata::generics::{ActualType, GenericScope};

// ================================================================================================
// Class Files and Bytecode
// ================================================================================================

/// The container format and the builder for synthesized units
pub use crate::classfile::{
    AccessLevel, AnnotationSpec, ClassAccess, ClassBuilder, ClassFile, FieldAccess, FieldSpec,
    MethodAccess, MethodSpec,
};

/// Editable method bodies
pub use crate::assembly::{opcodes, Insn, Label, MethodBody, Node};

// ================================================================================================
// Weaving
// ================================================================================================

/// The load hook, the pipeline and its stages
pub use crate::weave::{
    ClassRewriter, MarkerKind, MarkerType, Pipeline, ScopeTracker, Stage, WeaveConfig,
    WeaveContext, Weaver,
};
