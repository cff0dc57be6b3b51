//! Error taxonomy for the save engine.
//!
//! Nothing here is retried internally: a graph either fully encodes/decodes
//! or the whole operation fails with one of these errors.

use crate::id::EntityId;

/// Errors that can occur while encoding a graph.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("unknown type signature '{signature}'")]
    UnknownType { signature: String },
    #[error("cannot serialize {found} where {expected} was declared")]
    TypeMismatch { expected: String, found: String },
    #[error("enum {signature} has no variant named '{variant}'")]
    UnknownVariant { signature: String, variant: String },
    #[error("entity reference in '{member}' holds an instance with no repository identifier")]
    MissingIdentity { member: String },
    #[error("definition reference in '{member}' holds an instance with no definition key")]
    MissingDefinitionKey { member: String },
    #[error("data view of {type_name} exported unknown member '{member}'")]
    UnknownMember { type_name: String, member: String },
    #[error("no stringifier registered for {signature}")]
    NoStringifier { signature: String },
}

/// Errors that can occur while decoding a stream or resolving deferred
/// references afterwards.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown type signature '{signature}'; was this saved by an incompatible version?")]
    UnknownType { signature: String },
    #[error("expected {expected}, got {found} at line {line}, column {column}")]
    TypeMismatch {
        expected: String,
        found: String,
        line: u32,
        column: u32,
    },
    #[error("expected {expected}, got '{found}' at line {line}, column {column}")]
    MalformedToken {
        expected: String,
        found: String,
        line: u32,
        column: u32,
    },
    #[error("unexpected end of input while reading {expected} at line {line}, column {column}")]
    UnexpectedEnd {
        expected: String,
        line: u32,
        column: u32,
    },
    #[error("back-reference to {type_name} #{seq} points at nothing decoded earlier in the stream")]
    UnresolvedBackref { type_name: String, seq: u32 },
    #[error("no live entity with identifier {0} exists after full decode")]
    UnresolvedEntity(EntityId),
    #[error("no definition with key '{0}' exists after full decode")]
    UnresolvedDefinition(String),
}
