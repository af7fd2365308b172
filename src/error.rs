//! Errors surfaced at the engine boundary.

use thiserror::Error;

use crate::core::attr::AttributeKind;

/// Errors produced while constructing schemas, rules, or events.
///
/// Matching itself never fails: predicates evaluate to a tri-state and missing
/// attributes propagate as [Truth::Undefined](crate::core::value::Truth::Undefined).
/// Every fallible operation leaves the engine untouched on error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Two attributes with the same name were registered in one schema.
    #[error("duplicate attribute '{0}'")]
    DuplicateAttribute(String),

    /// A rule or event referenced an attribute the schema does not know.
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// A predicate or event value does not fit the attribute's registered kind.
    #[error("schema mismatch on '{attribute}': attribute is {expected:?}, found {found}")]
    SchemaMismatch {
        /// Name of the offending attribute.
        attribute: String,
        /// The kind the schema registered for the attribute.
        expected: AttributeKind,
        /// Description of the predicate or value that was supplied instead.
        found: String,
    },

    /// A structurally degenerate expression was passed to `add_rule`.
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
}

/// Result type for all fallible engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
