//! Ecliptic Save -- the graph serialization engine for the Ecliptic
//! turn-based space-empire simulation.
//!
//! This crate persists and reconstructs large, cyclic, polymorphic object
//! graphs to and from a line-oriented text format. It walks a dynamic value
//! model, assigns identity to already-visited reference values to break
//! cycles, encodes values by their registered runtime shape, and defers
//! resolution of entity-repository and definition-library references until
//! the entire graph has been read back.
//!
//! # Two-Phase Decode
//!
//! Entity (`g`) and definition (`m`) markers point into repositories that
//! may not be fully populated while decoding is still in progress, so they
//! are patched in a second pass:
//!
//! ```rust,ignore
//! let codec = Codec::new(&types, &stringifiers);
//! let (root, pending) = codec.decode_pending(text, &declared)?;
//! // ... repopulate the entity repository from `root` ...
//! pending.resolve(&repository, &library)?;
//! ```
//!
//! [`Codec::deserialize`] does both phases in one call when the
//! repositories are already populated.
//!
//! # Key Types
//!
//! - [`catalog::TypeRegistry`] -- canonical signatures to runtime
//!   descriptors, with legacy alias resolution.
//! - [`descriptor::TypeDescriptor`] -- per-type shape and member metadata,
//!   registered explicitly instead of discovered by reflection.
//! - [`stringify::StringifierRegistry`] -- pluggable single-token
//!   converters for value-like types.
//! - [`context::GraphContext`] -- per-call identity tables and the deferred
//!   resolution queue.
//! - [`value::Value`] -- the closed dynamic value model, with shared
//!   reference shapes for sequences, mappings, arrays and composites.
//! - [`Codec`] -- the serialize/deserialize entry points.

pub mod aliases;
pub mod catalog;
pub mod context;
pub mod descriptor;
mod decode;
mod encode;
pub mod error;
pub mod id;
mod scan;
pub mod sig;
pub mod stringify;
pub mod value;

use tracing::warn;

use crate::catalog::TypeRegistry;
use crate::context::{DefinitionLookup, EntityLookup, GraphContext, PendingResolutions};
use crate::decode::{Decoded, Decoder};
use crate::encode::Encoder;
use crate::error::{DecodeError, EncodeError};
use crate::sig::TypeSig;
use crate::stringify::StringifierRegistry;
use crate::value::Value;

/// The serialize/deserialize entry points, bound to a type registry and a
/// stringifier registry. Both registries are process-lifetime and shared;
/// the codec itself is a cheap, copyable pair of borrows.
#[derive(Clone, Copy)]
pub struct Codec<'a> {
    pub types: &'a TypeRegistry,
    pub stringifiers: &'a StringifierRegistry,
}

impl<'a> Codec<'a> {
    pub fn new(types: &'a TypeRegistry, stringifiers: &'a StringifierRegistry) -> Self {
        Self {
            types,
            stringifiers,
        }
    }

    /// Serialize a value under its declared signature with a fresh context.
    pub fn serialize(&self, value: &Value, declared: &TypeSig) -> Result<String, EncodeError> {
        let mut ctx = GraphContext::new();
        self.serialize_with(value, declared, &mut ctx)
    }

    /// Serialize with a caller-owned context, for embedding a sub-graph
    /// that must share identity numbering with an outer graph.
    pub fn serialize_with(
        &self,
        value: &Value,
        declared: &TypeSig,
        ctx: &mut GraphContext,
    ) -> Result<String, EncodeError> {
        Encoder::run(self.types, self.stringifiers, ctx, value, declared)
    }

    /// First decode phase only: build the graph and hand back the deferred
    /// reference queue for the caller to resolve once its repositories are
    /// populated -- typically from payloads inside the decoded graph itself.
    pub fn decode_pending(
        &self,
        text: &str,
        declared: &TypeSig,
    ) -> Result<(Value, PendingResolutions), DecodeError> {
        let mut ctx = GraphContext::new();
        self.decode_pending_with(text, declared, &mut ctx)
    }

    /// [`decode_pending`](Codec::decode_pending) with a caller-owned context.
    pub fn decode_pending_with(
        &self,
        text: &str,
        declared: &TypeSig,
        ctx: &mut GraphContext,
    ) -> Result<(Value, PendingResolutions), DecodeError> {
        let (root, pending) = Decoder::run(self.types, self.stringifiers, ctx, text, declared)?;
        match root {
            Decoded::Now(value) => Ok((value, pending)),
            Decoded::Entity(_) | Decoded::Definition(_) => {
                warn!("root value is a reference marker; use deserialize to resolve it");
                Ok((Value::Null, pending))
            }
        }
    }

    /// Decode and resolve in one call: build the graph, then drain every
    /// deferred reference against the given repositories, in FIFO order.
    pub fn deserialize(
        &self,
        text: &str,
        declared: &TypeSig,
        entities: &dyn EntityLookup,
        definitions: &dyn DefinitionLookup,
    ) -> Result<Value, DecodeError> {
        let mut ctx = GraphContext::new();
        self.deserialize_with(text, declared, &mut ctx, entities, definitions)
    }

    /// [`deserialize`](Codec::deserialize) with a caller-owned context.
    pub fn deserialize_with(
        &self,
        text: &str,
        declared: &TypeSig,
        ctx: &mut GraphContext,
        entities: &dyn EntityLookup,
        definitions: &dyn DefinitionLookup,
    ) -> Result<Value, DecodeError> {
        let (root, pending) = Decoder::run(self.types, self.stringifiers, ctx, text, declared)?;
        pending.resolve(entities, definitions)?;
        match root {
            Decoded::Now(value) => Ok(value),
            Decoded::Entity(id) => entities
                .entity(id)
                .map(Value::Object)
                .ok_or(DecodeError::UnresolvedEntity(id)),
            Decoded::Definition(key) => definitions
                .definition(&key)
                .map(Value::Object)
                .ok_or(DecodeError::UnresolvedDefinition(key)),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
