//! Error types for the recurrence code generator.
//!
//! This module defines all error types used throughout the crate,
//! organized by the phase that produces them.

use thiserror::Error;
use std::fmt;

/// Top-level error type for the generator.
#[derive(Error, Debug)]
pub enum RecurgenError {
    /// Error while parsing a rule-body DSL string
    #[error("DSL error: {0}")]
    Dsl(#[from] DslError),

    /// Error while parsing a constraint expression
    #[error("Constraint error: {0}")]
    Constraint(#[from] ConstraintError),

    /// Error while building a recurrence definition
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Error during code generation
    #[error("Code generation error: {0}")]
    Codegen(#[from] CodegenError),

    /// Error during reference evaluation
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error while parsing the einsum-like rule DSL or an index-arithmetic
/// expression.
#[derive(Error, Debug, Clone)]
pub struct DslError {
    /// The error message
    pub message: String,
    /// The offending input fragment
    pub fragment: String,
    /// The kind of DSL error
    pub kind: DslErrorKind,
}

impl DslError {
    /// Create a new DSL error for the given fragment.
    pub fn new(kind: DslErrorKind, message: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fragment: fragment.into(),
            kind,
        }
    }
}

impl fmt::Display for DslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in `{}`", self.message, self.fragment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DslErrorKind {
    /// Term contains no bracketed recursive call
    MissingCall,
    /// Shift token is neither a bare index nor `index±integer`
    MalformedShift,
    /// Shift list names an index that was not declared
    UnknownIndex,
    /// Shift list names the same index twice
    DuplicateShift,
    /// Unbalanced brackets or parentheses
    UnbalancedDelimiter,
    /// Text after the bracketed call
    TrailingInput,
    /// Empty expression or term
    Empty,
    /// Malformed integer arithmetic in an index expression
    InvalidIndexExpr,
}

/// Error while parsing a guard constraint.
#[derive(Error, Debug, Clone)]
pub struct ConstraintError {
    /// The error message
    pub message: String,
    /// The unparsed constraint text
    pub text: String,
}

impl ConstraintError {
    pub fn new(message: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: `{}`", self.message, self.text)
    }
}

/// Error while building a recurrence definition via the fluent API.
///
/// Carries the recurrence name and, when the failure happened inside a
/// `.rule(...)` call, the index of the offending rule, so a faulty
/// definition can be located without inspecting generated output.
#[derive(Error, Debug, Clone)]
pub struct DefinitionError {
    /// Name of the recurrence being defined
    pub recurrence: String,
    /// Index of the rule that failed to build, if applicable
    pub rule_index: Option<usize>,
    /// The error message
    pub message: String,
}

impl DefinitionError {
    pub fn new(recurrence: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recurrence: recurrence.into(),
            rule_index: None,
            message: message.into(),
        }
    }

    /// Attach the index of the rule being built.
    pub fn with_rule_index(mut self, index: usize) -> Self {
        self.rule_index = Some(index);
        self
    }
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rule_index {
            Some(i) => write!(f, "{} (recurrence `{}`, rule {})", self.message, self.recurrence, i),
            None => write!(f, "{} (recurrence `{}`)", self.message, self.recurrence),
        }
    }
}

/// Error during code generation.
#[derive(Error, Debug, Clone)]
pub struct CodegenError {
    /// The error message
    pub message: String,
    /// The kind of codegen error
    pub kind: CodegenErrorKind,
}

impl CodegenError {
    pub fn new(kind: CodegenErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenErrorKind {
    /// Recurrence shape not supported by this generator
    UnsupportedShape,
    /// Layered generation requires at least one layer index
    MissingLayerIndex,
}

/// Error during reference evaluation of a recurrence.
#[derive(Error, Debug, Clone)]
pub struct EvalError {
    /// The error message
    pub message: String,
    /// The kind of evaluation error
    pub kind: EvalErrorKind,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// A runtime variable was not supplied
    MissingVariable,
    /// An array parameter was not supplied or is too short
    MissingArray,
    /// Recursion depth limit exceeded (likely a non-terminating definition)
    RecursionLimit,
    /// Expression shape the evaluator does not handle
    Unsupported,
}

/// Result type using RecurgenError.
pub type Result<T> = std::result::Result<T, RecurgenError>;
