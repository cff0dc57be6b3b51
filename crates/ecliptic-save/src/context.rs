//! Per-call graph state: identity assignment, decoded-instance tables, and
//! the deferred resolution queue.
//!
//! A [`GraphContext`] is scoped to exactly one encode or one decode call and
//! is never shared across concurrent calls. Sequence numbers are per-type and
//! assigned in traversal order, which is identical on both sides of the wire:
//! the encoder assigns when it first emits a reference value's full payload,
//! the decoder when it constructs the matching empty value -- both strictly
//! before recursing into elements or members.

use std::collections::HashMap;

use tracing::trace;

use crate::error::DecodeError;
use crate::id::{EntityId, SeqId, TypeId};
use crate::value::{ObjRef, Value};

/// Looks up live entities by repository identifier. Implemented by the
/// entity repository collaborator.
pub trait EntityLookup {
    fn entity(&self, id: EntityId) -> Option<ObjRef>;
}

/// Looks up immutable definition objects by their stable string key.
/// Implemented by the definition library collaborator.
pub trait DefinitionLookup {
    fn definition(&self, key: &str) -> Option<ObjRef>;
}

/// The environment a deferred action resolves against.
pub struct ResolveCx<'a> {
    pub entities: &'a dyn EntityLookup,
    pub definitions: &'a dyn DefinitionLookup,
}

/// A one-shot resolution step queued during decode and run after the full
/// graph has been reconstructed.
pub type DeferredAction = Box<dyn FnOnce(&ResolveCx<'_>) -> Result<(), DecodeError>>;

/// Result of asking the context for a reference value's sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// The value was seen before; emit a back-reference to this number.
    Seen(SeqId),
    /// First sighting; a fresh number was assigned and the full payload
    /// should follow.
    Assigned(SeqId),
}

/// Mutable state for one encode or one decode of a graph.
#[derive(Default)]
pub struct GraphContext {
    // encode side
    known: HashMap<usize, SeqId>,
    encode_counters: HashMap<TypeId, u32>,
    pins: Vec<Value>,
    // decode side
    decoded: HashMap<(TypeId, SeqId), Value>,
    decode_counters: HashMap<TypeId, u32>,
    deferred: Vec<DeferredAction>,
}

impl GraphContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number for a reference value being encoded. Called only for
    /// reference-shaped values (sequences, mappings, arrays, composite
    /// instances), never for scalars, text, or stringifier-handled values.
    ///
    /// `pin` keeps the value alive for the rest of the call so the address
    /// key cannot be reused by a later allocation.
    pub fn id_for(&mut self, type_id: TypeId, addr: usize, pin: &Value) -> Identity {
        if let Some(seq) = self.known.get(&addr) {
            return Identity::Seen(*seq);
        }
        let counter = self.encode_counters.entry(type_id).or_insert(0);
        let seq = SeqId(*counter);
        *counter += 1;
        self.known.insert(addr, seq);
        self.pins.push(pin.clone());
        Identity::Assigned(seq)
    }

    /// Record a freshly constructed value under the next sequence number for
    /// its type. Must be called before any of the value's elements or
    /// members are decoded, so cycles can resolve back to it.
    pub fn register_decoded(&mut self, type_id: TypeId, value: Value) -> SeqId {
        let counter = self.decode_counters.entry(type_id).or_insert(0);
        let seq = SeqId(*counter);
        *counter += 1;
        self.decoded.insert((type_id, seq), value);
        seq
    }

    /// The value registered under (type, sequence), if any.
    pub fn decoded(&self, type_id: TypeId, seq: SeqId) -> Option<Value> {
        self.decoded.get(&(type_id, seq)).cloned()
    }

    /// Queue a resolution step to run after the root decode completes.
    pub fn defer(&mut self, action: DeferredAction) {
        self.deferred.push(action);
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub(crate) fn take_deferred(&mut self) -> PendingResolutions {
        PendingResolutions {
            actions: std::mem::take(&mut self.deferred),
        }
    }
}

/// The deferred actions of one decode, drained strictly once, in enqueue
/// order, after the root value has been built.
pub struct PendingResolutions {
    actions: Vec<DeferredAction>,
}

impl std::fmt::Debug for PendingResolutions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResolutions")
            .field("actions", &self.actions.len())
            .finish()
    }
}

impl PendingResolutions {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every pending action in FIFO order. An action that fails aborts
    /// the remaining queue and propagates its error; the partially-linked
    /// graph should then be discarded by the caller.
    pub fn resolve(
        self,
        entities: &dyn EntityLookup,
        definitions: &dyn DefinitionLookup,
    ) -> Result<(), DecodeError> {
        let cx = ResolveCx {
            entities,
            definitions,
        };
        let count = self.actions.len();
        for action in self.actions {
            action(&cx)?;
        }
        trace!(count, "resolved deferred references");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
